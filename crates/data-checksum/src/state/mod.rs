//! Job tracking for audit and resume.
//!
//! A job is one run over a set of table pairs. Each pair is a comparison with its
//! own status; each evaluated chunk is appended as a chunk record. Resume only
//! looks at comparison status: pairs still `pending` or `running` are rerun from
//! scratch.
//!
//! Backends:
//!
//! - [`MysqlJobTracker`]: tables in a MySQL database
//! - [`FileJobTracker`]: signed JSON state file plus a JSONL chunk log
//! - [`NoOpJobTracker`]: nothing is persisted

pub mod backend;
pub mod file;
pub mod mysql;
pub mod noop;

pub use backend::{
    chunk_status_to_str, comparison_status_to_str, job_status_to_str, str_to_chunk_status,
    str_to_comparison_status, str_to_job_status, JobTracker,
};
pub use file::FileJobTracker;
pub use mysql::MysqlJobTracker;
pub use noop::NoOpJobTracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::core::TablePair;

/// Overall job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Status of one table pair within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ComparisonStatus {
    /// Pairs a resume has to rerun.
    pub fn is_unfinished(self) -> bool {
        matches!(self, ComparisonStatus::Pending | ComparisonStatus::Running)
    }
}

/// Result of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Equal,
    Different,
}

impl ChunkStatus {
    pub fn from_equal(equal: bool) -> Self {
        if equal {
            ChunkStatus::Equal
        } else {
            ChunkStatus::Different
        }
    }
}

/// One table pair within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableComparison {
    pub comparison_id: i64,
    pub job_id: String,
    pub pair: TablePair,
    pub status: ComparisonStatus,
    #[serde(default)]
    pub source_row_count: Option<i64>,
    #[serde(default)]
    pub target_row_count: Option<i64>,
    #[serde(default)]
    pub chunks_processed: u64,
    #[serde(default)]
    pub chunks_equal: u64,
    #[serde(default)]
    pub chunks_different: u64,
    #[serde(default)]
    pub is_equal: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TableComparison {
    pub fn pending(comparison_id: i64, job_id: &str, pair: TablePair) -> Self {
        Self {
            comparison_id,
            job_id: job_id.to_string(),
            pair,
            status: ComparisonStatus::Pending,
            source_row_count: None,
            target_row_count: None,
            chunks_processed: 0,
            chunks_equal: 0,
            chunks_different: 0,
            is_equal: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Final figures for a table pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableComparisonUpdate {
    pub status: ComparisonStatus,
    pub source_row_count: Option<i64>,
    pub target_row_count: Option<i64>,
    pub chunks_processed: u64,
    pub chunks_equal: u64,
    pub chunks_different: u64,
    pub is_equal: Option<bool>,
    pub error: Option<String>,
}

impl TableComparisonUpdate {
    /// Update for a pair that failed before producing a result.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ComparisonStatus::Failed,
            source_row_count: None,
            target_row_count: None,
            chunks_processed: 0,
            chunks_equal: 0,
            chunks_different: 0,
            is_equal: None,
            error: Some(error.into()),
        }
    }
}

/// One evaluated chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkComparison {
    pub comparison_id: i64,
    pub chunk_number: u64,
    pub range_start: JsonValue,
    pub range_end: JsonValue,
    pub status: ChunkStatus,
    pub source_checksum: String,
    pub target_checksum: String,
    pub processing_time_ms: u64,
}

/// Per-job totals written when the job ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub status: JobStatus,
    pub total_tables: u64,
    pub tables_equal: u64,
    pub tables_different: u64,
    pub tables_failed: u64,
}

/// Job id of the form `{source}_{target}_{unix_ts}`.
pub fn make_job_id(source_host: &str, target_host: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", source_host, target_host, at.timestamp())
}

/// `base`, or `base_n` with the smallest `n` for which `taken` is false.
pub fn unique_job_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut job_id = base.to_string();
    let mut suffix = 1;
    while taken(&job_id) {
        job_id = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    job_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(make_job_id("src:3306", "tgt:3306", at), "src:3306_tgt:3306_1704067200");
    }

    #[test]
    fn test_job_id_collisions_get_a_suffix() {
        let taken = ["a_b_1".to_string(), "a_b_1_1".to_string()];
        assert_eq!(unique_job_id("a_b_1", |id| taken.iter().any(|t| t == id)), "a_b_1_2");
        assert_eq!(unique_job_id("a_b_2", |id| taken.iter().any(|t| t == id)), "a_b_2");
    }

    #[test]
    fn test_unfinished_statuses() {
        assert!(ComparisonStatus::Pending.is_unfinished());
        assert!(ComparisonStatus::Running.is_unfinished());
        assert!(!ComparisonStatus::Completed.is_unfinished());
        assert!(!ComparisonStatus::Failed.is_unfinished());
    }
}
