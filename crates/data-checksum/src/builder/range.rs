//! Key-bound and chunk-boundary queries.

use super::{chunk_bounds_predicate, comment, order_by, PreparedQuery};
use crate::core::{qualify_mysql, quote_all, quote_mysql, ColumnList, SqlValue, TableRef};
use crate::error::{ChecksumError, Result};

fn key_bound_query(table: &TableRef, key: &ColumnList, descending: bool, label: &str) -> Result<PreparedQuery> {
    let columns = quote_all(&key.names())?.join(", ");
    let sql = format!(
        "SELECT {} {} FROM {} ORDER BY {} LIMIT 1",
        comment(label),
        columns,
        qualify_mysql(&table.database, &table.table)?,
        order_by(key, descending)?,
    );
    Ok(PreparedQuery::without_args(sql))
}

/// Smallest key tuple of the table.
pub fn min_key_query(table: &TableRef, key: &ColumnList) -> Result<PreparedQuery> {
    key_bound_query(table, key, false, "min")
}

/// Largest key tuple of the table.
pub fn max_key_query(table: &TableRef, key: &ColumnList) -> Result<PreparedQuery> {
    key_bound_query(table, key, true, "max")
}

fn check_chunk_size(chunk_size: i64) -> Result<()> {
    if chunk_size < 1 {
        return Err(ChecksumError::Config(format!(
            "chunk size must be positive, got {}",
            chunk_size
        )));
    }
    Ok(())
}

/// Key tuple `chunk_size` rows past `range_start`, bounded by `range_max`.
///
/// Returns no row when fewer than `chunk_size` rows remain.
#[allow(clippy::too_many_arguments)]
pub fn range_end_via_offset_query(
    table: &TableRef,
    key: &ColumnList,
    index_name: &str,
    range_start: &[SqlValue],
    range_max: &[SqlValue],
    chunk_size: i64,
    include_range_start: bool,
    hint: &str,
) -> Result<PreparedQuery> {
    check_chunk_size(chunk_size)?;
    let columns = quote_all(&key.names())?.join(", ");
    let (predicate, args) = chunk_bounds_predicate(key, range_start, range_max, include_range_start)?;

    let sql = format!(
        "SELECT {} {} FROM {} FORCE INDEX ({}) WHERE {} ORDER BY {} LIMIT 1 OFFSET {}",
        comment(hint),
        columns,
        qualify_mysql(&table.database, &table.table)?,
        quote_mysql(index_name)?,
        predicate,
        order_by(key, false)?,
        chunk_size - 1,
    );
    Ok(PreparedQuery::new(sql, args))
}

/// Largest key tuple among the next `chunk_size` rows past `range_start`.
///
/// Used when the offset query finds nothing; returns no row only when the
/// remaining range is empty.
#[allow(clippy::too_many_arguments)]
pub fn range_end_via_temptable_query(
    table: &TableRef,
    key: &ColumnList,
    index_name: &str,
    range_start: &[SqlValue],
    range_max: &[SqlValue],
    chunk_size: i64,
    include_range_start: bool,
    hint: &str,
) -> Result<PreparedQuery> {
    check_chunk_size(chunk_size)?;
    let columns = quote_all(&key.names())?.join(", ");
    let (predicate, args) = chunk_bounds_predicate(key, range_start, range_max, include_range_start)?;

    let sql = format!(
        "SELECT {} {columns} FROM (SELECT {columns} FROM {} FORCE INDEX ({}) WHERE {} ORDER BY {} LIMIT {}) select_chunk ORDER BY {} LIMIT 1",
        comment(hint),
        qualify_mysql(&table.database, &table.table)?,
        quote_mysql(index_name)?,
        predicate,
        order_by(key, false)?,
        chunk_size,
        order_by(key, true)?,
        columns = columns,
    );
    Ok(PreparedQuery::new(sql, args))
}
