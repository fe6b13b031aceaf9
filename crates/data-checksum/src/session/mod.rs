//! Database sessions used by the checksum engine.
//!
//! The [`ChecksumSession`] trait is the only way the engine reaches a database.
//! Implementations:
//!
//! - [`MysqlSession`]: sqlx connection pool against a live server
//! - [`MemorySession`]: in-process test double, fingerprints are not MySQL-compatible
//!
//! Both sides of a comparison hold an `Arc<dyn ChecksumSession>`; the engine
//! never knows which implementation it is talking to.

pub mod memory;
pub mod mysql;

pub use memory::{MemorySession, MemoryTable};
pub use mysql::MysqlSession;

use async_trait::async_trait;

use crate::core::{CheckLevel, ChunkRange, ColumnList, ColumnValues, TableRef, TimeWindow};
use crate::error::Result;

/// Which end of the key order to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBoundary {
    Min,
    Max,
}

/// How the next chunk's upper bound is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEndStrategy {
    /// `LIMIT 1 OFFSET chunk_size - 1`; finds nothing once fewer than `chunk_size` rows remain.
    Offset,
    /// Max of the next `chunk_size` rows; finds nothing only when the range is empty.
    Temptable,
}

/// Inputs for locating the next chunk boundary.
#[derive(Debug, Clone)]
pub struct RangeEndRequest<'a> {
    pub key: &'a ColumnList,
    pub index_name: &'a str,
    pub range_start: &'a ColumnValues,
    pub range_max: &'a ColumnValues,
    pub chunk_size: i64,
    pub include_range_start: bool,
    pub hint: &'a str,
}

/// Inputs for a chunk fingerprint.
#[derive(Debug, Clone)]
pub struct ChecksumRequest<'a> {
    pub check_columns: &'a ColumnList,
    pub key: &'a ColumnList,
    pub range: &'a ChunkRange,
    pub level: CheckLevel,
}

/// Inputs for a time-window fingerprint.
#[derive(Debug, Clone)]
pub struct TimeWindowRequest<'a> {
    pub check_columns: &'a ColumnList,
    pub key: &'a ColumnList,
    pub time_column: &'a str,
    pub window: TimeWindow,
    pub level: CheckLevel,
}

/// One unique index as reported by `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKeyCandidate {
    pub index_name: String,
    pub column_names: Vec<String>,
    /// `DATA_TYPE` of the leading column, lower case.
    pub first_column_type: String,
    /// Charset of the leading column; empty for non-string types.
    pub first_column_charset: String,
    pub has_nullable: bool,
}

impl UniqueKeyCandidate {
    pub fn new<S: AsRef<str>>(index_name: &str, columns: &[S], first_column_type: &str) -> Self {
        Self {
            index_name: index_name.to_string(),
            column_names: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            first_column_type: first_column_type.to_lowercase(),
            first_column_charset: String::new(),
            has_nullable: false,
        }
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.first_column_charset = charset.to_string();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.has_nullable = true;
        self
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    pub fn is_primary(&self) -> bool {
        self.index_name == "PRIMARY"
    }
}

/// Operations the checksum engine needs from one database.
///
/// Every method is a single round trip whose cursor is released before it returns.
#[async_trait]
pub trait ChecksumSession: Send + Sync {
    /// Base tables of a database, sorted by name.
    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    /// Columns in ordinal order with their type class. Empty when the table does not exist.
    async fn columns(&self, table: &TableRef) -> Result<ColumnList>;

    async fn unique_key_candidates(&self, table: &TableRef) -> Result<Vec<UniqueKeyCandidate>>;

    async fn row_count(&self, table: &TableRef) -> Result<i64>;

    /// Smallest or largest key tuple; `None` for an empty table.
    async fn key_boundary(
        &self,
        table: &TableRef,
        key: &ColumnList,
        boundary: KeyBoundary,
    ) -> Result<Option<ColumnValues>>;

    async fn range_end(
        &self,
        table: &TableRef,
        request: &RangeEndRequest<'_>,
        strategy: RangeEndStrategy,
    ) -> Result<Option<ColumnValues>>;

    /// Chunk fingerprint: a single value at aggregate level, one value per row in key order otherwise.
    async fn range_checksum(
        &self,
        table: &TableRef,
        request: &ChecksumRequest<'_>,
    ) -> Result<Vec<String>>;

    /// Key tuple and per-row fingerprint of every row in the range, in key order.
    async fn row_checksums(
        &self,
        table: &TableRef,
        check_columns: &ColumnList,
        key: &ColumnList,
        range: &ChunkRange,
    ) -> Result<Vec<(ColumnValues, String)>>;

    async fn time_window_checksum(
        &self,
        table: &TableRef,
        request: &TimeWindowRequest<'_>,
    ) -> Result<Vec<String>>;

    /// Round trip used by health checks.
    async fn ping(&self) -> Result<()>;

    /// Host or label identifying this side in job records.
    fn host(&self) -> &str;

    fn db_type(&self) -> &'static str;

    async fn close(&self);
}
