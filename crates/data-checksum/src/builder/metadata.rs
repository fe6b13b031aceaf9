//! `information_schema` lookups.
//!
//! String results are cast to CHAR so the driver decodes them as text regardless
//! of the server's metadata collation.

/// Session limit for `GROUP_CONCAT`; the default of 1024 bytes truncates wide tables.
pub const GROUP_CONCAT_MAX_LEN: usize = 10240;

/// Raise `group_concat_max_len` for the current session.
pub fn group_concat_session_query() -> String {
    format!("SET SESSION group_concat_max_len = {}", GROUP_CONCAT_MAX_LEN)
}

/// Column names and data types in ordinal order. Binds: schema, table.
pub const COLUMNS_QUERY: &str = r#"
    SELECT
      CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
      CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// Every unique index with its leading column's type and charset. Binds: schema, table, schema, table.
///
/// Candidates are ranked in Rust, see `checksum::introspect::select_unique_key`.
pub const UNIQUE_KEYS_QUERY: &str = r#"
    SELECT
      CAST(UNIQUES.INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
      CAST(UNIQUES.COLUMN_NAMES AS CHAR) AS COLUMN_NAMES,
      CAST(UNIQUES.COUNT_COLUMN_IN_INDEX AS SIGNED) AS COUNT_COLUMN_IN_INDEX,
      CAST(COLUMNS.DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
      CAST(IFNULL(COLUMNS.CHARACTER_SET_NAME, '') AS CHAR(255)) AS CHARACTER_SET_NAME,
      CAST(UNIQUES.HAS_NULLABLE AS SIGNED) AS HAS_NULLABLE
    FROM information_schema.COLUMNS INNER JOIN (
      SELECT
        TABLE_SCHEMA,
        TABLE_NAME,
        INDEX_NAME,
        COUNT(*) AS COUNT_COLUMN_IN_INDEX,
        GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX ASC) AS COLUMN_NAMES,
        SUBSTRING_INDEX(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX ASC), ',', 1) AS FIRST_COLUMN_NAME,
        SUM(NULLABLE = 'YES') > 0 AS HAS_NULLABLE
      FROM information_schema.STATISTICS
      WHERE NON_UNIQUE = 0
        AND TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
      GROUP BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME
    ) AS UNIQUES
    ON (COLUMNS.COLUMN_NAME = UNIQUES.FIRST_COLUMN_NAME)
    WHERE COLUMNS.TABLE_SCHEMA = ?
      AND COLUMNS.TABLE_NAME = ?
"#;

/// Base tables of a database, sorted by name. Binds: schema.
pub const LIST_TABLES_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_concat_session_query() {
        assert_eq!(
            group_concat_session_query(),
            "SET SESSION group_concat_max_len = 10240"
        );
    }

    #[test]
    fn test_unique_keys_query_binds() {
        assert_eq!(UNIQUE_KEYS_QUERY.matches('?').count(), 4);
        assert!(UNIQUE_KEYS_QUERY.contains("NON_UNIQUE = 0"));
        assert!(!UNIQUE_KEYS_QUERY.contains("LIMIT"));
    }

    #[test]
    fn test_column_and_table_queries_binds() {
        assert_eq!(COLUMNS_QUERY.matches('?').count(), 2);
        assert!(COLUMNS_QUERY.contains("ORDER BY ORDINAL_POSITION"));
        assert_eq!(LIST_TABLES_QUERY.matches('?').count(), 1);
    }
}
