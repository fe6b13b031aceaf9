//! Chunk bounds and checksum levels.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::value::{ColumnValues, SqlValue, DATETIME_FORMAT};

/// How chunk fingerprints are computed and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    /// One XOR-aggregated CRC32 per chunk; sides must match exactly.
    Aggregate,
    /// One CRC32 per row in key order; the source may be an ordered subsequence of the target.
    Superset,
}

impl CheckLevel {
    pub fn from_superset_flag(superset_as_equal: bool) -> Self {
        if superset_as_equal {
            CheckLevel::Superset
        } else {
            CheckLevel::Aggregate
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            CheckLevel::Aggregate => 1,
            CheckLevel::Superset => 2,
        }
    }
}

/// Key-tuple bounds of one chunk.
///
/// The upper bound is always inclusive. The lower bound is inclusive only for the
/// first chunk of a table; afterwards it is the previous chunk's upper bound and
/// therefore exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    pub min: ColumnValues,
    pub max: ColumnValues,
    pub include_min: bool,
}

impl ChunkRange {
    pub fn new(min: ColumnValues, max: ColumnValues, include_min: bool) -> Self {
        Self {
            min,
            max,
            include_min,
        }
    }
}

/// Half-open `[begin, end)` window over a datetime column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(begin: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { begin, end }
    }

    /// The window expressed as chunk bounds, for tracking.
    pub fn as_range(&self) -> ChunkRange {
        ChunkRange::new(
            ColumnValues::from_values(vec![SqlValue::DateTime(self.begin)]),
            ColumnValues::from_values(vec![SqlValue::DateTime(self.end)]),
            true,
        )
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.begin.format(DATETIME_FORMAT),
            self.end.format(DATETIME_FORMAT)
        )
    }
}
