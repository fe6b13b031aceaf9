//! Named, ordered column sets.

use std::collections::HashMap;
use std::fmt;

/// Type class inferred from MySQL metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    #[default]
    Unknown,
    Timestamp,
    DateTime,
    Enum,
    MediumInt,
    Integer,
    Text,
    Json,
    Float,
    Binary,
}

impl ColumnType {
    /// Map an `information_schema.COLUMNS.DATA_TYPE` value to a type class.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "timestamp" => ColumnType::Timestamp,
            "datetime" => ColumnType::DateTime,
            "enum" => ColumnType::Enum,
            "mediumint" => ColumnType::MediumInt,
            "tinyint" | "smallint" | "int" | "integer" | "bigint" => ColumnType::Integer,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" => ColumnType::Text,
            "json" => ColumnType::Json,
            "float" | "double" => ColumnType::Float,
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                ColumnType::Binary
            }
            _ => ColumnType::Unknown,
        }
    }

    /// True for classes that cannot hold a point in time. `Unknown` is given the benefit of the doubt.
    pub fn is_non_temporal(self) -> bool {
        !matches!(
            self,
            ColumnType::Unknown | ColumnType::Timestamp | ColumnType::DateTime
        )
    }
}

/// A column in a comparison or key list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }
}

/// Ordered list of columns with name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnList {
    columns: Vec<Column>,
    ordinals: HashMap<String, usize>,
}

impl ColumnList {
    /// Build from an ordered list of names.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self::from_columns(names.iter().map(|n| Column::new(n.as_ref())).collect())
    }

    pub fn from_columns(columns: Vec<Column>) -> Self {
        let ordinals = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, ordinals }
    }

    /// Parse a comma-delimited list of names. Whitespace around names is dropped.
    pub fn parse(names: &str) -> Self {
        let names: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        Self::new(&names)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.ordinals.get(name).map(|&i| &self.columns[i])
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// True when every column here exists in `other`, in any order.
    pub fn is_subset_of(&self, other: &ColumnList) -> bool {
        self.columns
            .iter()
            .all(|c| other.ordinals.contains_key(&c.name))
    }

    /// Names here that `other` lacks, in this list's order.
    pub fn missing_from(&self, other: &ColumnList) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| other.ordinal(&c.name).is_none())
            .map(|c| c.name.clone())
            .collect()
    }

    /// This list's names in order, carrying the metadata `table` holds for them.
    pub fn described_by(&self, table: &ColumnList) -> ColumnList {
        Self::from_columns(
            self.columns
                .iter()
                .map(|c| table.column(&c.name).cloned().unwrap_or_else(|| c.clone()))
                .collect(),
        )
    }
}

impl fmt::Display for ColumnList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(","))
    }
}
