//! Scalar values read from and bound to MySQL statements.
//!
//! [`SqlValue`] is the single value type flowing through the engine: key tuples,
//! checksum strings and range bounds are all made of it. Ordering and hashing are
//! total (variant first, then value) so key tuples can be used in maps and sorted.

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{ChecksumError, Result};

/// Datetime format used for display and time-range configuration.
///
/// Fractional seconds are written only when non-zero and are optional when parsing.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single scalar value.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    fn discriminant(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Int(_) => 1,
            SqlValue::UInt(_) => 2,
            SqlValue::Float(_) => 3,
            SqlValue::Text(_) => 4,
            SqlValue::Bytes(_) => 5,
            SqlValue::DateTime(_) => 6,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// JSON form used when persisting range bounds.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Int(v) => JsonValue::from(*v),
            SqlValue::UInt(v) => JsonValue::from(*v),
            SqlValue::Float(v) => JsonValue::from(*v),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            SqlValue::DateTime(dt) => JsonValue::String(dt.format(DATETIME_FORMAT).to_string()),
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SqlValue {}

impl PartialOrd for SqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SqlValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
            (SqlValue::Int(a), SqlValue::Int(b)) => a.cmp(b),
            (SqlValue::UInt(a), SqlValue::UInt(b)) => a.cmp(b),
            (SqlValue::Float(a), SqlValue::Float(b)) => a.total_cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Bytes(a), SqlValue::Bytes(b)) => a.cmp(b),
            (SqlValue::DateTime(a), SqlValue::DateTime(b)) => a.cmp(b),
            _ => self.discriminant().cmp(&other.discriminant()),
        }
    }
}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            SqlValue::Null => {}
            SqlValue::Int(v) => v.hash(state),
            SqlValue::UInt(v) => v.hash(state),
            SqlValue::Float(v) => v.to_bits().hash(state),
            SqlValue::Text(s) => s.hash(state),
            SqlValue::Bytes(b) => b.hash(state),
            SqlValue::DateTime(dt) => dt.hash(state),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::UInt(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

/// Fixed-arity row of values: one key tuple or one scalar result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnValues {
    values: Vec<SqlValue>,
}

impl ColumnValues {
    /// Create a row of `len` NULL slots.
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![SqlValue::Null; len],
        }
    }

    pub fn from_values(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Replace every slot with the values of one fetched row.
    ///
    /// The row must have exactly the buffer's arity; on mismatch the buffer is left untouched.
    pub fn fill(&mut self, row: Vec<SqlValue>) -> Result<()> {
        if row.len() != self.values.len() {
            return Err(ChecksumError::query(
                "<row>",
                format!(
                    "expected {} columns in result row, got {}",
                    self.values.len(),
                    row.len()
                ),
            ));
        }
        self.values = row;
        Ok(())
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// String rendering of one column; bytes are read as text.
    pub fn string_column(&self, index: usize) -> String {
        self.values
            .get(index)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.values.iter().map(SqlValue::to_json).collect())
    }
}

impl fmt::Display for ColumnValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = (0..self.values.len())
            .map(|i| self.string_column(i))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Int(-5).to_string(), "-5");
        assert_eq!(SqlValue::Bytes(b"abc".to_vec()).to_string(), "abc");
        let dt = NaiveDateTime::parse_from_str("2024-01-02 03:04:05", DATETIME_FORMAT).unwrap();
        assert_eq!(SqlValue::DateTime(dt).to_string(), "2024-01-02 03:04:05");
    }

    #[test]
    fn test_datetime_keeps_fractional_seconds() {
        let whole = NaiveDateTime::parse_from_str("2024-01-02 03:04:05", DATETIME_FORMAT).unwrap();
        let micros = whole + chrono::Duration::microseconds(250_000);
        let value = SqlValue::DateTime(micros);

        assert_eq!(value.to_string(), "2024-01-02 03:04:05.250");
        assert_eq!(value.to_json(), JsonValue::String("2024-01-02 03:04:05.250".into()));
        assert_ne!(value.to_string(), SqlValue::DateTime(whole).to_string());

        let parsed = NaiveDateTime::parse_from_str("2024-01-02 03:04:05.000001", DATETIME_FORMAT).unwrap();
        assert_eq!(parsed - whole, chrono::Duration::microseconds(1));
    }

    #[test]
    fn test_ordering_within_variant() {
        assert!(SqlValue::Int(1) < SqlValue::Int(2));
        assert!(SqlValue::Text("a".into()) < SqlValue::Text("b".into()));
        assert!(SqlValue::Float(-0.5) < SqlValue::Float(0.5));
        assert!(SqlValue::Null < SqlValue::Int(i64::MIN));
    }

    #[test]
    fn test_variants_are_distinct_keys() {
        let mut set = HashSet::new();
        set.insert(SqlValue::Int(1));
        set.insert(SqlValue::UInt(1));
        set.insert(SqlValue::Text("1".into()));
        set.insert(SqlValue::Int(1));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_tuple_ordering_is_lexicographic() {
        let a = ColumnValues::from_values(vec![SqlValue::Int(1), SqlValue::Int(9)]);
        let b = ColumnValues::from_values(vec![SqlValue::Int(2), SqlValue::Int(0)]);
        assert!(a < b);
    }

    #[test]
    fn test_fill_checks_arity() {
        let mut row = ColumnValues::new(2);
        assert!(row.fill(vec![SqlValue::Int(1)]).is_err());
        assert!(row.values().iter().all(SqlValue::is_null));

        row.fill(vec![SqlValue::Int(1), SqlValue::from("x")]).unwrap();
        assert_eq!(row.to_string(), "1,x");
        assert_eq!(row.string_column(1), "x");
    }

    #[test]
    fn test_to_json() {
        let row = ColumnValues::from_values(vec![SqlValue::Int(7), SqlValue::Null]);
        assert_eq!(row.to_json().to_string(), "[7,null]");
    }
}
