//! MySQL statement builders.
//!
//! Every function here is pure: it takes names, column lists and bound values and
//! returns statement text plus positional arguments. Execution lives in
//! [`crate::session`].
//!
//! - [`range`]: key bounds and next-chunk boundary queries
//! - [`checksum`]: chunk, row and time-window fingerprint queries
//! - [`metadata`]: `information_schema` lookups

pub mod checksum;
pub mod metadata;
pub mod range;

pub use checksum::{
    range_checksum_query, row_checksums_query, row_count_query, time_window_checksum_query,
};
pub use range::{
    max_key_query, min_key_query, range_end_via_offset_query, range_end_via_temptable_query,
};

use crate::core::{quote_all, ColumnList, SqlValue};
use crate::error::{ChecksumError, Result};

/// Statement text and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl PreparedQuery {
    pub fn new(sql: String, args: Vec<SqlValue>) -> Self {
        Self { sql, args }
    }

    pub fn without_args(sql: String) -> Self {
        Self { sql, args: vec![] }
    }
}

/// Comparison operator for key-tuple predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonSign {
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
}

impl ComparisonSign {
    fn strict(self) -> &'static str {
        match self {
            ComparisonSign::LessThan | ComparisonSign::LessThanOrEquals => "<",
            ComparisonSign::GreaterThan | ComparisonSign::GreaterThanOrEquals => ">",
        }
    }

    fn includes_equal(self) -> bool {
        matches!(
            self,
            ComparisonSign::LessThanOrEquals | ComparisonSign::GreaterThanOrEquals
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ComparisonSign::LessThan => "<",
            ComparisonSign::LessThanOrEquals => "<=",
            ComparisonSign::GreaterThan => ">",
            ComparisonSign::GreaterThanOrEquals => ">=",
        }
    }
}

/// Build a predicate comparing the key tuple against `values` in lexicographic order.
///
/// For a key `(a, b)` and `>` this expands to
/// `((a > ?) OR ((a = ?) AND (b > ?)))`; the inclusive variants add an all-equal term.
pub fn range_comparison(
    key: &ColumnList,
    values: &[SqlValue],
    sign: ComparisonSign,
) -> Result<(String, Vec<SqlValue>)> {
    if key.is_empty() {
        return Err(ChecksumError::Config(
            "range comparison requires at least one key column".into(),
        ));
    }
    if key.len() != values.len() {
        return Err(ChecksumError::Config(format!(
            "range comparison has {} key columns but {} values",
            key.len(),
            values.len()
        )));
    }

    let columns = quote_all(&key.names())?;

    if columns.len() == 1 {
        return Ok((
            format!("({} {} ?)", columns[0], sign.as_str()),
            vec![values[0].clone()],
        ));
    }

    let mut terms = Vec::with_capacity(columns.len() + 1);
    let mut args = Vec::new();

    for i in 0..columns.len() {
        let mut parts = Vec::with_capacity(i + 1);
        for j in 0..i {
            parts.push(format!("({} = ?)", columns[j]));
            args.push(values[j].clone());
        }
        parts.push(format!("({} {} ?)", columns[i], sign.strict()));
        args.push(values[i].clone());
        terms.push(format!("({})", parts.join(" AND ")));
    }

    if sign.includes_equal() {
        let parts: Vec<String> = columns.iter().map(|c| format!("({} = ?)", c)).collect();
        args.extend(values.iter().cloned());
        terms.push(format!("({})", parts.join(" AND ")));
    }

    Ok((format!("({})", terms.join(" OR ")), args))
}

/// Lower and upper predicates for a chunk, joined with AND.
pub(crate) fn chunk_bounds_predicate(
    key: &ColumnList,
    min: &[SqlValue],
    max: &[SqlValue],
    include_min: bool,
) -> Result<(String, Vec<SqlValue>)> {
    let lower_sign = if include_min {
        ComparisonSign::GreaterThanOrEquals
    } else {
        ComparisonSign::GreaterThan
    };
    let (lower, mut args) = range_comparison(key, min, lower_sign)?;
    let (upper, upper_args) = range_comparison(key, max, ComparisonSign::LessThanOrEquals)?;
    args.extend(upper_args);
    Ok((format!("{} AND {}", lower, upper), args))
}

/// `ORDER BY` column list with a direction on every column.
pub(crate) fn order_by(key: &ColumnList, descending: bool) -> Result<String> {
    let direction = if descending { "DESC" } else { "ASC" };
    Ok(quote_all(&key.names())?
        .into_iter()
        .map(|c| format!("{} {}", c, direction))
        .collect::<Vec<_>>()
        .join(", "))
}

/// SQL comment carrying a caller-supplied hint. Comment terminators are removed.
pub(crate) fn comment(hint: &str) -> String {
    let mut hint = hint.to_string();
    // removing one terminator can join its neighbours into another
    while hint.contains("*/") || hint.contains("/*") {
        hint = hint.replace("*/", "").replace("/*", "");
    }
    if hint.trim().is_empty() {
        "/* data-checksum */".to_string()
    } else {
        format!("/* data-checksum {} */", hint.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<SqlValue> {
        values.iter().map(|&v| SqlValue::Int(v)).collect()
    }

    #[test]
    fn test_single_column_comparison() {
        let key = ColumnList::parse("id");
        let (sql, args) = range_comparison(&key, &ints(&[5]), ComparisonSign::GreaterThan).unwrap();
        assert_eq!(sql, "(`id` > ?)");
        assert_eq!(args, ints(&[5]));
    }

    #[test]
    fn test_composite_strict_comparison() {
        let key = ColumnList::parse("a,b");
        let (sql, args) = range_comparison(&key, &ints(&[1, 2]), ComparisonSign::GreaterThan).unwrap();
        assert_eq!(sql, "(((`a` > ?)) OR ((`a` = ?) AND (`b` > ?)))");
        assert_eq!(args, ints(&[1, 1, 2]));
    }

    #[test]
    fn test_composite_inclusive_comparison() {
        let key = ColumnList::parse("a,b");
        let (sql, args) =
            range_comparison(&key, &ints(&[1, 2]), ComparisonSign::LessThanOrEquals).unwrap();
        assert_eq!(
            sql,
            "(((`a` < ?)) OR ((`a` = ?) AND (`b` < ?)) OR ((`a` = ?) AND (`b` = ?)))"
        );
        assert_eq!(args, ints(&[1, 1, 2, 1, 2]));
    }

    #[test]
    fn test_comparison_arity_mismatch() {
        let key = ColumnList::parse("a,b");
        assert!(range_comparison(&key, &ints(&[1]), ComparisonSign::LessThan).is_err());
        assert!(range_comparison(&ColumnList::default(), &[], ComparisonSign::LessThan).is_err());
    }

    #[test]
    fn test_chunk_bounds_predicate() {
        let key = ColumnList::parse("id");
        let (sql, args) = chunk_bounds_predicate(&key, &ints(&[1]), &ints(&[10]), true).unwrap();
        assert_eq!(sql, "(`id` >= ?) AND (`id` <= ?)");
        assert_eq!(args, ints(&[1, 10]));

        let (sql, _) = chunk_bounds_predicate(&key, &ints(&[1]), &ints(&[10]), false).unwrap();
        assert_eq!(sql, "(`id` > ?) AND (`id` <= ?)");
    }

    #[test]
    fn test_comment_strips_terminators() {
        assert_eq!(comment(""), "/* data-checksum */");
        assert_eq!(comment("iteration:3 */ DROP"), "/* data-checksum iteration:3  DROP */");
    }

    #[test]
    fn test_comment_strips_nested_terminators() {
        assert_eq!(comment("**// DROP TABLE x; --"), "/* data-checksum DROP TABLE x; -- */");
        assert_eq!(comment("//**"), "/* data-checksum */");

        for hint in ["**//", "//**", "*/*/", "/*/**//*"] {
            let sql = comment(&format!("a{}b", hint));
            assert_eq!(sql.matches("*/").count(), 1, "{}", sql);
            assert_eq!(sql.matches("/*").count(), 1, "{}", sql);
            assert!(sql.ends_with(" */"));
        }
    }
}
