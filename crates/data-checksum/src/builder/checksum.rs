//! Fingerprint queries.
//!
//! Rows are fingerprinted as `CRC32(CONCAT_WS('#', c1, .., cn, CONCAT(ISNULL(c1), .., ISNULL(cn))))`.
//! `CONCAT_WS` skips NULLs, so the trailing null-flag string keeps `NULL` and `''`
//! from producing the same fingerprint.

use super::{chunk_bounds_predicate, comment, order_by, PreparedQuery};
use crate::core::{qualify_mysql, quote_all, quote_mysql, CheckLevel, ChunkRange, ColumnList, SqlValue, TableRef, TimeWindow};
use crate::error::{ChecksumError, Result};

fn row_crc(columns: &[String]) -> String {
    let null_flags: Vec<String> = columns.iter().map(|c| format!("ISNULL({})", c)).collect();
    format!(
        "CRC32(CONCAT_WS('#', {}, CONCAT({})))",
        columns.join(", "),
        null_flags.join(", ")
    )
}

/// Fingerprint expression for the given level.
fn checksum_expr(check_columns: &ColumnList, level: CheckLevel) -> Result<String> {
    if check_columns.is_empty() {
        return Err(ChecksumError::Config(
            "checksum requires at least one column".into(),
        ));
    }
    let crc = row_crc(&quote_all(&check_columns.names())?);
    Ok(match level {
        CheckLevel::Aggregate => format!(
            "COALESCE(LOWER(CONV(BIT_XOR(CAST({} AS UNSIGNED)), 10, 16)), 0)",
            crc
        ),
        CheckLevel::Superset => {
            format!("COALESCE(LOWER(CONV(CAST({} AS UNSIGNED), 10, 16)), 0)", crc)
        }
    })
}

/// Chunk fingerprint: one aggregate value, or one value per row in key order.
pub fn range_checksum_query(
    table: &TableRef,
    check_columns: &ColumnList,
    key: &ColumnList,
    range: &ChunkRange,
    level: CheckLevel,
) -> Result<PreparedQuery> {
    let expr = checksum_expr(check_columns, level)?;
    let (predicate, args) =
        chunk_bounds_predicate(key, range.min.values(), range.max.values(), range.include_min)?;

    let mut sql = format!(
        "SELECT {} {} AS checksum FROM {} WHERE {}",
        comment("checksum"),
        expr,
        qualify_mysql(&table.database, &table.table)?,
        predicate,
    );
    if level == CheckLevel::Superset {
        sql.push_str(&format!(" ORDER BY {}", order_by(key, false)?));
    }
    Ok(PreparedQuery::new(sql, args))
}

/// Key tuple plus a per-row fingerprint of the hex-encoded columns, for differential analysis.
pub fn row_checksums_query(
    table: &TableRef,
    check_columns: &ColumnList,
    key: &ColumnList,
    range: &ChunkRange,
) -> Result<PreparedQuery> {
    if check_columns.is_empty() {
        return Err(ChecksumError::Config(
            "row checksum requires at least one column".into(),
        ));
    }
    let key_columns = quote_all(&key.names())?;
    let hexed: Vec<String> = quote_all(&check_columns.names())?
        .into_iter()
        .map(|c| format!("HEX({})", c))
        .collect();
    let (predicate, args) =
        chunk_bounds_predicate(key, range.min.values(), range.max.values(), range.include_min)?;

    let sql = format!(
        "SELECT {} {}, COALESCE(LOWER(CONV(CAST({} AS UNSIGNED), 10, 16)), 0) AS record_checksum FROM {} WHERE {} ORDER BY {}",
        comment("rows"),
        key_columns.join(", "),
        row_crc(&hexed),
        qualify_mysql(&table.database, &table.table)?,
        predicate,
        order_by(key, false)?,
    );
    Ok(PreparedQuery::new(sql, args))
}

/// Fingerprint of rows whose `time_column` falls in `[window.begin, window.end)`.
pub fn time_window_checksum_query(
    table: &TableRef,
    check_columns: &ColumnList,
    key: &ColumnList,
    time_column: &str,
    window: &TimeWindow,
    level: CheckLevel,
) -> Result<PreparedQuery> {
    let expr = checksum_expr(check_columns, level)?;
    let column = quote_mysql(time_column)?;

    let mut sql = format!(
        "SELECT {} {} AS checksum FROM {} WHERE {} >= ? AND {} < ?",
        comment("time-range"),
        expr,
        qualify_mysql(&table.database, &table.table)?,
        column,
        column,
    );
    if level == CheckLevel::Superset {
        sql.push_str(&format!(" ORDER BY {}", order_by(key, false)?));
    }
    Ok(PreparedQuery::new(
        sql,
        vec![SqlValue::DateTime(window.begin), SqlValue::DateTime(window.end)],
    ))
}

/// Total row count.
pub fn row_count_query(table: &TableRef) -> Result<PreparedQuery> {
    Ok(PreparedQuery::without_args(format!(
        "SELECT {} COUNT(*) FROM {}",
        comment(""),
        qualify_mysql(&table.database, &table.table)?
    )))
}
