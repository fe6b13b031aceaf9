//! MySQL session implementation.
//!
//! Runs the statements produced by [`crate::builder`] through a SQLx connection
//! pool. Every call fetches with `fetch_optional`/`fetch_all`, so the cursor is
//! released before the call returns on every path.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::{
    ChecksumRequest, ChecksumSession, KeyBoundary, RangeEndRequest, RangeEndStrategy,
    TimeWindowRequest, UniqueKeyCandidate,
};
use crate::builder::metadata::{
    group_concat_session_query, COLUMNS_QUERY, LIST_TABLES_QUERY, UNIQUE_KEYS_QUERY,
};
use crate::builder::{
    max_key_query, min_key_query, range_checksum_query, range_end_via_offset_query,
    range_end_via_temptable_query, row_checksums_query, row_count_query,
    time_window_checksum_query, PreparedQuery,
};
use crate::config::ConnectionConfig;
use crate::core::{ChunkRange, Column, ColumnList, ColumnType, ColumnValues, SqlValue, TableRef};
use crate::error::{ChecksumError, Result};

/// MySQL session backed by a SQLx pool.
pub struct MysqlSession {
    pool: MySqlPool,
    endpoint: String,
}

impl MysqlSession {
    /// Create a pool from configuration and test it.
    ///
    /// `label` names the side ("source", "target") in errors and logs.
    pub async fn connect(config: &ConnectionConfig, max_conns: usize, label: &str) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);
        if !config.database.is_empty() {
            options = options.database(&config.database);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(|e| ChecksumError::pool(e, format!("creating MySQL {} pool", label)))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| ChecksumError::pool(e, format!("testing MySQL {} connection", label)))?;

        info!(
            "Connected to MySQL {}: {}:{} (max {} connections)",
            label, config.host, config.port, max_conns
        );

        Ok(Self {
            pool,
            endpoint: config.endpoint(),
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool, endpoint: impl Into<String>) -> Self {
        Self {
            pool,
            endpoint: endpoint.into(),
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn fetch_optional(&self, query: &PreparedQuery) -> Result<Option<MySqlRow>> {
        debug!("{}", query.sql);
        Ok(bind_args(sqlx::query(&query.sql), &query.args)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn fetch_all(&self, query: &PreparedQuery) -> Result<Vec<MySqlRow>> {
        debug!("{}", query.sql);
        Ok(bind_args(sqlx::query(&query.sql), &query.args)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Run a metadata query on a connection with `group_concat_max_len` raised.
    async fn fetch_metadata(&self, sql: &str, binds: &[&str]) -> Result<Vec<MySqlRow>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ChecksumError::pool(e, "acquiring MySQL metadata connection"))?;

        sqlx::query(&group_concat_session_query())
            .execute(&mut *conn)
            .await?;

        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(bind.to_string());
        }
        Ok(query.fetch_all(&mut *conn).await?)
    }

    async fn key_tuple(&self, query: &PreparedQuery, arity: usize, table: &TableRef) -> Result<Option<ColumnValues>> {
        match self.fetch_optional(query).await? {
            Some(row) => {
                let mut values = ColumnValues::new(arity);
                values
                    .fill(decode_row(&row)?)
                    .map_err(|e| ChecksumError::query(table.to_string(), e.to_string()))?;
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    async fn checksum_strings(&self, query: &PreparedQuery) -> Result<Vec<String>> {
        let rows = self.fetch_all(query).await?;
        rows.iter()
            .map(|row| decode_value(row, 0).map(|v| v.to_string()))
            .collect()
    }
}

type RangeEndBuilder = fn(
    &TableRef,
    &ColumnList,
    &str,
    &[SqlValue],
    &[SqlValue],
    i64,
    bool,
    &str,
) -> Result<PreparedQuery>;

/// Bind each argument with its native type. NULL binds as a typed NULL string.
fn bind_args<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &[SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::UInt(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bytes(v) => query.bind(v.clone()),
            SqlValue::DateTime(v) => query.bind(*v),
        };
    }
    query
}

/// Decode one column by its reported type name.
fn decode_value(row: &MySqlRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    let value = match type_name.as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "BOOLEAN" => {
            SqlValue::Int(row.try_get::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => SqlValue::UInt(row.try_get::<u64, _>(index)?),
        "FLOAT" | "DOUBLE" => match row.try_get::<f64, _>(index) {
            Ok(v) => SqlValue::Float(v),
            Err(_) => SqlValue::Float(row.try_get::<f32, _>(index)? as f64),
        },
        "DECIMAL" => SqlValue::Text(row.try_get::<rust_decimal::Decimal, _>(index)?.to_string()),
        "DATETIME" | "TIMESTAMP" => SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(index)?),
        "DATE" => SqlValue::Text(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => SqlValue::Text(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        _ => match row.try_get::<String, _>(index) {
            Ok(v) => SqlValue::Text(v),
            Err(_) => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(index)?),
        },
    };
    Ok(value)
}

fn decode_row(row: &MySqlRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn text_column(row: &MySqlRow, column: &str, table: &TableRef) -> Result<String> {
    row.try_get::<Option<String>, _>(column)
        .map(Option::unwrap_or_default)
        .map_err(|e| ChecksumError::schema(table.to_string(), format!("reading {}: {}", column, e)))
}

#[async_trait]
impl ChecksumSession for MysqlSession {
    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let rows = self.fetch_metadata(LIST_TABLES_QUERY, &[database]).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_NAME")
                    .map_err(|e| ChecksumError::schema(database, format!("listing tables: {}", e)))
            })
            .collect()
    }

    async fn columns(&self, table: &TableRef) -> Result<ColumnList> {
        let rows = self
            .fetch_metadata(COLUMNS_QUERY, &[&table.database, &table.table])
            .await?;
        let columns = rows
            .iter()
            .map(|row| {
                Ok(Column::new(text_column(row, "COLUMN_NAME", table)?).with_type(
                    ColumnType::from_data_type(&text_column(row, "DATA_TYPE", table)?),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnList::from_columns(columns))
    }

    async fn unique_key_candidates(&self, table: &TableRef) -> Result<Vec<UniqueKeyCandidate>> {
        let rows = self
            .fetch_metadata(
                UNIQUE_KEYS_QUERY,
                &[&table.database, &table.table, &table.database, &table.table],
            )
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let has_nullable = row
                .try_get::<Option<i64>, _>("HAS_NULLABLE")
                .map_err(|e| ChecksumError::schema(table.to_string(), e.to_string()))?
                .unwrap_or(0);
            candidates.push(UniqueKeyCandidate {
                index_name: text_column(row, "INDEX_NAME", table)?,
                column_names: ColumnList::parse(&text_column(row, "COLUMN_NAMES", table)?).names(),
                first_column_type: text_column(row, "DATA_TYPE", table)?.to_lowercase(),
                first_column_charset: text_column(row, "CHARACTER_SET_NAME", table)?,
                has_nullable: has_nullable != 0,
            });
        }
        Ok(candidates)
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        let query = row_count_query(table)?;
        debug!("{}", query.sql);
        let row = sqlx::query(&query.sql).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn key_boundary(
        &self,
        table: &TableRef,
        key: &ColumnList,
        boundary: KeyBoundary,
    ) -> Result<Option<ColumnValues>> {
        let query = match boundary {
            KeyBoundary::Min => min_key_query(table, key)?,
            KeyBoundary::Max => max_key_query(table, key)?,
        };
        self.key_tuple(&query, key.len(), table).await
    }

    async fn range_end(
        &self,
        table: &TableRef,
        request: &RangeEndRequest<'_>,
        strategy: RangeEndStrategy,
    ) -> Result<Option<ColumnValues>> {
        let build: RangeEndBuilder = match strategy {
            RangeEndStrategy::Offset => range_end_via_offset_query,
            RangeEndStrategy::Temptable => range_end_via_temptable_query,
        };
        let query = build(
            table,
            request.key,
            request.index_name,
            request.range_start.values(),
            request.range_max.values(),
            request.chunk_size,
            request.include_range_start,
            request.hint,
        )?;
        self.key_tuple(&query, request.key.len(), table).await
    }

    async fn range_checksum(
        &self,
        table: &TableRef,
        request: &ChecksumRequest<'_>,
    ) -> Result<Vec<String>> {
        let query = range_checksum_query(
            table,
            request.check_columns,
            request.key,
            request.range,
            request.level,
        )?;
        self.checksum_strings(&query).await
    }

    async fn row_checksums(
        &self,
        table: &TableRef,
        check_columns: &ColumnList,
        key: &ColumnList,
        range: &ChunkRange,
    ) -> Result<Vec<(ColumnValues, String)>> {
        let query = row_checksums_query(table, check_columns, key, range)?;
        let rows = self.fetch_all(&query).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = decode_row(row)?;
            if values.len() != key.len() + 1 {
                return Err(ChecksumError::query(
                    table.to_string(),
                    format!("expected {} columns in row checksum result, got {}", key.len() + 1, values.len()),
                ));
            }
            let checksum = values.pop().map(|v| v.to_string()).unwrap_or_default();
            records.push((ColumnValues::from_values(values), checksum));
        }
        Ok(records)
    }

    async fn time_window_checksum(
        &self,
        table: &TableRef,
        request: &TimeWindowRequest<'_>,
    ) -> Result<Vec<String>> {
        let query = time_window_checksum_query(
            table,
            request.check_columns,
            request.key,
            request.time_column,
            &request.window,
            request.level,
        )?;
        self.checksum_strings(&query).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ChecksumError::pool(e, format!("pinging MySQL {}", self.endpoint)))?;
        Ok(())
    }

    fn host(&self) -> &str {
        &self.endpoint
    }

    fn db_type(&self) -> &'static str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
