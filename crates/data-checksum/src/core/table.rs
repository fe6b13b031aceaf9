//! Table identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A table qualified by its database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Parse `database.table`. The table part may itself contain dots.
    pub fn parse(qualified: &str) -> Option<Self> {
        let (database, table) = qualified.split_once('.')?;
        if database.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self::new(database.trim(), table.trim()))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// One source table and the target table it is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePair {
    pub source: TableRef,
    pub target: TableRef,
}

impl TablePair {
    pub fn new(source: TableRef, target: TableRef) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for TablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.source, self.target)
    }
}
