//! In-memory session used as a test double.
//!
//! Nothing here talks to MySQL. It backs the crate's own tests and lets callers
//! exercise the engine without a server.
//!
//! Tables are plain row vectors. Fingerprints follow the same construction as the
//! SQL expressions (`#`-joined non-NULL values followed by a NULL-flag string) but
//! use CRC32C, so values are only comparable between memory sessions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{
    ChecksumRequest, ChecksumSession, KeyBoundary, RangeEndRequest, RangeEndStrategy,
    TimeWindowRequest, UniqueKeyCandidate,
};
use crate::core::{
    CheckLevel, ChunkRange, Column, ColumnList, ColumnType, ColumnValues, SqlValue, TableRef,
};
use crate::error::{ChecksumError, Result};

/// One in-memory table for [`MemorySession`]. Test double, not a storage engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    columns: Vec<String>,
    unique_keys: Vec<UniqueKeyCandidate>,
    rows: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_unique_key(mut self, candidate: UniqueKeyCandidate) -> Self {
        self.unique_keys.push(candidate);
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Columns with the type class of their first non-NULL value.
    fn column_list(&self) -> ColumnList {
        ColumnList::from_columns(
            self.columns
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let column_type = self
                        .rows
                        .iter()
                        .filter_map(|row| row.get(i))
                        .find(|v| !v.is_null())
                        .map_or(ColumnType::Unknown, value_type);
                    Column::new(name.as_str()).with_type(column_type)
                })
                .collect(),
        )
    }

    fn check_arity(&self, table: &TableRef, row: &[SqlValue]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ChecksumError::query(
                table.to_string(),
                format!("expected {} values, got {}", self.columns.len(), row.len()),
            ));
        }
        Ok(())
    }

    fn ordinal(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| ChecksumError::query("<memory>", format!("unknown column '{}'", column)))
    }

    fn ordinals(&self, columns: &ColumnList) -> Result<Vec<usize>> {
        columns.names().iter().map(|c| self.ordinal(c)).collect()
    }

    /// Rows sorted by `key`, each paired with its key tuple.
    fn sorted_by(&self, key: &ColumnList) -> Result<Vec<(ColumnValues, &Vec<SqlValue>)>> {
        let key_ordinals = self.ordinals(key)?;
        let mut rows: Vec<(ColumnValues, &Vec<SqlValue>)> = self
            .rows
            .iter()
            .map(|row| (project(row, &key_ordinals), row))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    /// Rows in `(start, max]` (or `[start, max]`), sorted by `key`.
    fn rows_in_range(
        &self,
        key: &ColumnList,
        start: &ColumnValues,
        max: &ColumnValues,
        include_start: bool,
    ) -> Result<Vec<(ColumnValues, &Vec<SqlValue>)>> {
        Ok(self
            .sorted_by(key)?
            .into_iter()
            .filter(|(k, _)| (if include_start { k >= start } else { k > start }) && k <= max)
            .collect())
    }
}

fn value_type(value: &SqlValue) -> ColumnType {
    match value {
        SqlValue::Int(_) | SqlValue::UInt(_) => ColumnType::Integer,
        SqlValue::Float(_) => ColumnType::Float,
        SqlValue::Text(_) => ColumnType::Text,
        SqlValue::Bytes(_) => ColumnType::Binary,
        SqlValue::DateTime(_) => ColumnType::DateTime,
        SqlValue::Null => ColumnType::Unknown,
    }
}

fn project(row: &[SqlValue], ordinals: &[usize]) -> ColumnValues {
    ColumnValues::from_values(
        ordinals
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or(SqlValue::Null))
            .collect(),
    )
}

/// `CONCAT_WS('#', v1, .., vn, CONCAT(ISNULL(v1), .., ISNULL(vn)))`
fn concat_ws(values: &[SqlValue]) -> String {
    let mut parts: Vec<String> = values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
        .collect();
    parts.push(
        values
            .iter()
            .map(|v| if v.is_null() { '1' } else { '0' })
            .collect(),
    );
    parts.join("#")
}

fn row_fingerprint(values: &[SqlValue]) -> u32 {
    crc32c::crc32c(concat_ws(values).as_bytes())
}

fn level_checksums(rows: impl Iterator<Item = Vec<SqlValue>>, level: CheckLevel) -> Vec<String> {
    match level {
        CheckLevel::Aggregate => {
            let xor = rows.fold(0u64, |acc, row| acc ^ row_fingerprint(&row) as u64);
            vec![format!("{:x}", xor)]
        }
        CheckLevel::Superset => rows.map(|row| format!("{:x}", row_fingerprint(&row))).collect(),
    }
}

/// In-memory implementation of [`ChecksumSession`].
///
/// A test double: fingerprints use CRC32C rather than MySQL's `CRC32`, so they
/// never match a real server's.
pub struct MemorySession {
    label: String,
    tables: RwLock<BTreeMap<TableRef, MemoryTable>>,
    pending_failures: AtomicU32,
    offset_hits: AtomicU64,
    temptable_hits: AtomicU64,
    checksum_calls: AtomicU64,
}

impl MemorySession {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tables: RwLock::new(BTreeMap::new()),
            pending_failures: AtomicU32::new(0),
            offset_hits: AtomicU64::new(0),
            temptable_hits: AtomicU64::new(0),
            checksum_calls: AtomicU64::new(0),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<TableRef, MemoryTable>>> {
        self.tables
            .read()
            .map_err(|_| ChecksumError::query(self.label.as_str(), "table lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<TableRef, MemoryTable>>> {
        self.tables
            .write()
            .map_err(|_| ChecksumError::query(self.label.as_str(), "table lock poisoned"))
    }

    /// Create or replace a table. Every row must have one value per column.
    pub fn add_table(&self, table: TableRef, contents: MemoryTable) -> Result<()> {
        for row in &contents.rows {
            contents.check_arity(&table, row)?;
        }
        self.write()?.insert(table, contents);
        Ok(())
    }

    pub fn insert_row(&self, table: &TableRef, row: Vec<SqlValue>) -> Result<()> {
        let mut tables = self.write()?;
        let contents = tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        contents.check_arity(table, &row)?;
        contents.rows.push(row);
        Ok(())
    }

    /// Set `column` on every row whose `key_column` equals `key`. Returns the number of rows changed.
    pub fn update_rows(
        &self,
        table: &TableRef,
        key_column: &str,
        key: &SqlValue,
        column: &str,
        value: SqlValue,
    ) -> Result<usize> {
        let mut tables = self.write()?;
        let contents = tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        let key_ordinal = contents.ordinal(key_column)?;
        let value_ordinal = contents.ordinal(column)?;
        let mut changed = 0;
        for row in contents.rows.iter_mut().filter(|r| r.get(key_ordinal) == Some(key)) {
            if let Some(slot) = row.get_mut(value_ordinal) {
                *slot = value.clone();
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Remove every row whose `key_column` equals `key`. Returns the number of rows removed.
    pub fn delete_rows(&self, table: &TableRef, key_column: &str, key: &SqlValue) -> Result<usize> {
        let mut tables = self.write()?;
        let contents = tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        let key_ordinal = contents.ordinal(key_column)?;
        let before = contents.rows.len();
        contents.rows.retain(|r| r.get(key_ordinal) != Some(key));
        Ok(before - contents.rows.len())
    }

    /// Make the next `count` fingerprint calls fail with a transient error.
    pub fn fail_next_checksums(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Chunk boundaries found by the offset strategy.
    pub fn offset_hits(&self) -> u64 {
        self.offset_hits.load(Ordering::SeqCst)
    }

    /// Chunk boundaries found by the temp-table strategy.
    pub fn temptable_hits(&self) -> u64 {
        self.temptable_hits.load(Ordering::SeqCst)
    }

    /// Fingerprint calls served, including failed ones.
    pub fn checksum_calls(&self) -> u64 {
        self.checksum_calls.load(Ordering::SeqCst)
    }

    fn before_checksum(&self) -> Result<()> {
        self.checksum_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ChecksumError::pool(
                "injected failure",
                format!("memory session {}", self.label),
            ));
        }
        Ok(())
    }
}

fn missing_table(table: &TableRef) -> ChecksumError {
    ChecksumError::query(table.to_string(), "table doesn't exist")
}

#[async_trait]
impl ChecksumSession for MemorySession {
    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .keys()
            .filter(|t| t.database == database)
            .map(|t| t.table.clone())
            .collect())
    }

    async fn columns(&self, table: &TableRef) -> Result<ColumnList> {
        Ok(self
            .read()?
            .get(table)
            .map(MemoryTable::column_list)
            .unwrap_or_default())
    }

    async fn unique_key_candidates(&self, table: &TableRef) -> Result<Vec<UniqueKeyCandidate>> {
        Ok(self
            .read()?
            .get(table)
            .map(|t| t.unique_keys.clone())
            .unwrap_or_default())
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        let tables = self.read()?;
        let contents = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(contents.len() as i64)
    }

    async fn key_boundary(
        &self,
        table: &TableRef,
        key: &ColumnList,
        boundary: KeyBoundary,
    ) -> Result<Option<ColumnValues>> {
        let tables = self.read()?;
        let contents = tables.get(table).ok_or_else(|| missing_table(table))?;
        let sorted = contents.sorted_by(key)?;
        let picked = match boundary {
            KeyBoundary::Min => sorted.first(),
            KeyBoundary::Max => sorted.last(),
        };
        Ok(picked.map(|(k, _)| k.clone()))
    }

    async fn range_end(
        &self,
        table: &TableRef,
        request: &RangeEndRequest<'_>,
        strategy: RangeEndStrategy,
    ) -> Result<Option<ColumnValues>> {
        if request.chunk_size < 1 {
            return Err(ChecksumError::Config(format!(
                "chunk size must be positive, got {}",
                request.chunk_size
            )));
        }
        let tables = self.read()?;
        let contents = tables.get(table).ok_or_else(|| missing_table(table))?;
        let rows = contents.rows_in_range(
            request.key,
            request.range_start,
            request.range_max,
            request.include_range_start,
        )?;
        let chunk_size = request.chunk_size as usize;

        let found = match strategy {
            RangeEndStrategy::Offset => rows.get(chunk_size - 1).map(|(k, _)| k.clone()),
            RangeEndStrategy::Temptable => rows.iter().take(chunk_size).last().map(|(k, _)| k.clone()),
        };
        if found.is_some() {
            let counter = match strategy {
                RangeEndStrategy::Offset => &self.offset_hits,
                RangeEndStrategy::Temptable => &self.temptable_hits,
            };
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn range_checksum(
        &self,
        table: &TableRef,
        request: &ChecksumRequest<'_>,
    ) -> Result<Vec<String>> {
        self.before_checksum()?;
        let tables = self.read()?;
        let contents = tables.get(table).ok_or_else(|| missing_table(table))?;
        let check_ordinals = contents.ordinals(request.check_columns)?;
        let rows = contents.rows_in_range(
            request.key,
            &request.range.min,
            &request.range.max,
            request.range.include_min,
        )?;
        Ok(level_checksums(
            rows.into_iter().map(|(_, row)| project(row, &check_ordinals).into_values()),
            request.level,
        ))
    }

    async fn row_checksums(
        &self,
        table: &TableRef,
        check_columns: &ColumnList,
        key: &ColumnList,
        range: &ChunkRange,
    ) -> Result<Vec<(ColumnValues, String)>> {
        self.before_checksum()?;
        let tables = self.read()?;
        let contents = tables.get(table).ok_or_else(|| missing_table(table))?;
        let check_ordinals = contents.ordinals(check_columns)?;
        let rows = contents.rows_in_range(key, &range.min, &range.max, range.include_min)?;

        Ok(rows
            .into_iter()
            .map(|(k, row)| {
                let hexed: Vec<SqlValue> = project(row, &check_ordinals)
                    .into_values()
                    .into_iter()
                    .map(|v| match v {
                        SqlValue::Null => SqlValue::Null,
                        SqlValue::Bytes(b) => SqlValue::Text(hex::encode_upper(b)),
                        other => SqlValue::Text(hex::encode_upper(other.to_string())),
                    })
                    .collect();
                (k, format!("{:x}", row_fingerprint(&hexed)))
            })
            .collect())
    }

    async fn time_window_checksum(
        &self,
        table: &TableRef,
        request: &TimeWindowRequest<'_>,
    ) -> Result<Vec<String>> {
        self.before_checksum()?;
        let tables = self.read()?;
        let contents = tables.get(table).ok_or_else(|| missing_table(table))?;
        let check_ordinals = contents.ordinals(request.check_columns)?;
        let time_ordinal = contents.ordinal(request.time_column)?;
        let begin = SqlValue::DateTime(request.window.begin);
        let end = SqlValue::DateTime(request.window.end);

        let rows = contents
            .sorted_by(request.key)?
            .into_iter()
            .filter(|(_, row)| {
                row.get(time_ordinal)
                    .is_some_and(|at| at >= &begin && at < &end)
            })
            .map(|(_, row)| project(row, &check_ordinals).into_values());
        Ok(level_checksums(rows, request.level))
    }

    async fn ping(&self) -> Result<()> {
        self.read().map(|_| ())
    }

    fn host(&self) -> &str {
        &self.label
    }

    fn db_type(&self) -> &'static str {
        "memory"
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableRef {
        TableRef::new("shop", "orders")
    }

    fn session_with(rows: i64) -> MemorySession {
        let session = MemorySession::new("test");
        let table = MemoryTable::new(&["id", "name"])
            .with_unique_key(UniqueKeyCandidate::new("PRIMARY", &["id"], "int"))
            .with_rows(
                (1..=rows)
                    .map(|i| vec![SqlValue::Int(i), SqlValue::from(format!("row-{}", i))])
                    .collect(),
            );
        session.add_table(orders(), table).unwrap();
        session
    }

    fn ids(values: &[i64]) -> ColumnValues {
        ColumnValues::from_values(values.iter().map(|&v| SqlValue::Int(v)).collect())
    }

    #[test]
    fn test_null_and_empty_string_differ() {
        assert_ne!(
            concat_ws(&[SqlValue::Int(1), SqlValue::Null]),
            concat_ws(&[SqlValue::Int(1), SqlValue::from("")])
        );
        assert_eq!(concat_ws(&[SqlValue::Int(1), SqlValue::Null]), "1#01");
    }

    #[tokio::test]
    async fn test_key_boundaries() {
        let session = session_with(25);
        let key = ColumnList::parse("id");
        let min = session.key_boundary(&orders(), &key, KeyBoundary::Min).await.unwrap();
        let max = session.key_boundary(&orders(), &key, KeyBoundary::Max).await.unwrap();
        assert_eq!(min, Some(ids(&[1])));
        assert_eq!(max, Some(ids(&[25])));
    }

    #[tokio::test]
    async fn test_range_end_strategies() {
        let session = session_with(25);
        let key = ColumnList::parse("id");
        let start = ids(&[20]);
        let max = ids(&[25]);
        let request = RangeEndRequest {
            key: &key,
            index_name: "PRIMARY",
            range_start: &start,
            range_max: &max,
            chunk_size: 10,
            include_range_start: false,
            hint: "",
        };
        let offset = session
            .range_end(&orders(), &request, RangeEndStrategy::Offset)
            .await
            .unwrap();
        assert_eq!(offset, None);
        let temptable = session
            .range_end(&orders(), &request, RangeEndStrategy::Temptable)
            .await
            .unwrap();
        assert_eq!(temptable, Some(ids(&[25])));
        assert_eq!(session.offset_hits(), 0);
        assert_eq!(session.temptable_hits(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_checksum_ignores_row_order() {
        let a = session_with(0);
        let b = session_with(0);
        for i in [1, 2, 3] {
            a.insert_row(&orders(), vec![SqlValue::Int(i), SqlValue::from("x")]).unwrap();
        }
        for i in [3, 1, 2] {
            b.insert_row(&orders(), vec![SqlValue::Int(i), SqlValue::from("x")]).unwrap();
        }
        let columns = ColumnList::parse("id,name");
        let key = ColumnList::parse("id");
        let range = ChunkRange::new(ids(&[1]), ids(&[3]), true);
        let request = ChecksumRequest {
            check_columns: &columns,
            key: &key,
            range: &range,
            level: CheckLevel::Aggregate,
        };
        let left = a.range_checksum(&orders(), &request).await.unwrap();
        let right = b.range_checksum(&orders(), &request).await.unwrap();
        assert_eq!(left, right);
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let session = session_with(3);
        session.fail_next_checksums(1);
        let columns = ColumnList::parse("id,name");
        let key = ColumnList::parse("id");
        let range = ChunkRange::new(ids(&[1]), ids(&[3]), true);
        let request = ChecksumRequest {
            check_columns: &columns,
            key: &key,
            range: &range,
            level: CheckLevel::Superset,
        };
        let err = session.range_checksum(&orders(), &request).await.unwrap_err();
        assert!(err.is_transient());
        let rows = session.range_checksum(&orders(), &request).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(session.checksum_calls(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let session = session_with(5);
        let changed = session
            .update_rows(&orders(), "id", &SqlValue::Int(2), "name", SqlValue::Null)
            .unwrap();
        assert_eq!(changed, 1);
        let removed = session.delete_rows(&orders(), "id", &SqlValue::Int(3)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(session.row_count(&orders()).await.unwrap(), 4);
        assert!(session.row_count(&TableRef::new("shop", "missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_short_rows_are_rejected() {
        let session = MemorySession::new("test");
        let ragged = MemoryTable::new(&["id", "name"]).with_rows(vec![
            vec![SqlValue::Int(1), SqlValue::from("a")],
            vec![SqlValue::Int(2)],
        ]);
        assert!(session.add_table(orders(), ragged).is_err());
        assert!(session.row_count(&orders()).await.is_err());

        let session = session_with(2);
        assert!(session.insert_row(&orders(), vec![SqlValue::Int(3)]).is_err());
        let changed = session
            .update_rows(&orders(), "id", &SqlValue::Int(2), "name", SqlValue::Null)
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn test_columns_carry_inferred_types() {
        let session = session_with(3);
        let columns = session.columns(&orders()).await.unwrap();
        assert_eq!(columns.names(), vec!["id", "name"]);
        assert_eq!(columns.column("id").unwrap().column_type, ColumnType::Integer);
        assert_eq!(columns.column("name").unwrap().column_type, ColumnType::Text);

        let empty = session_with(0).columns(&orders()).await.unwrap();
        assert_eq!(empty.column("id").unwrap().column_type, ColumnType::Unknown);
        assert!(session.columns(&TableRef::new("shop", "missing")).await.unwrap().is_empty());
    }
}
