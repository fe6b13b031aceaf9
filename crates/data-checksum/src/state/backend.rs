//! Job tracker trait.
//!
//! The orchestrator works with `Arc<dyn JobTracker>` without knowing the concrete type.

use async_trait::async_trait;

use super::{
    ChunkComparison, ChunkStatus, ComparisonStatus, JobStatus, JobSummary, TableComparison,
    TableComparisonUpdate,
};
use crate::core::TablePair;
use crate::error::{ChecksumError, Result};

/// Trait for job progress persistence backends.
///
/// Implementations must be `Send + Sync` to allow sharing across pair tasks.
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// Initialize the tracking storage. Safe to call multiple times.
    async fn init_schema(&self) -> Result<()>;

    /// Start a job and return its id.
    async fn create_job(&self, source_host: &str, target_host: &str) -> Result<String>;

    /// Add a table pair to a job with status `pending`. Returns the comparison id.
    async fn register_table(&self, job_id: &str, pair: &TablePair) -> Result<i64>;

    /// Set a comparison to `running`.
    async fn start_table(&self, comparison_id: i64) -> Result<()>;

    /// Append one chunk result.
    async fn record_chunk(&self, chunk: &ChunkComparison) -> Result<()>;

    /// Write final status, counts and tallies for a comparison.
    async fn finish_table(&self, comparison_id: i64, update: &TableComparisonUpdate) -> Result<()>;

    /// Write job totals and end time.
    async fn complete_job(&self, job_id: &str, summary: &JobSummary) -> Result<()>;

    /// Comparisons still `pending` or `running`, ordered by comparison id.
    async fn pending_tables(&self, job_id: &str) -> Result<Vec<TableComparison>>;

    /// Comparisons already `completed` or `failed`, ordered by comparison id.
    async fn finished_tables(&self, job_id: &str) -> Result<Vec<TableComparison>>;

    /// Backend name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Helper function to convert JobStatus to string representation.
pub fn job_status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

/// Helper function to parse JobStatus from string.
pub fn str_to_job_status(s: &str) -> Result<JobStatus> {
    match s {
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        _ => Err(ChecksumError::Tracking(format!("Invalid job status: {}", s))),
    }
}

/// Helper function to convert ComparisonStatus to string representation.
pub fn comparison_status_to_str(status: ComparisonStatus) -> &'static str {
    match status {
        ComparisonStatus::Pending => "pending",
        ComparisonStatus::Running => "running",
        ComparisonStatus::Completed => "completed",
        ComparisonStatus::Failed => "failed",
    }
}

/// Helper function to parse ComparisonStatus from string.
pub fn str_to_comparison_status(s: &str) -> Result<ComparisonStatus> {
    match s {
        "pending" => Ok(ComparisonStatus::Pending),
        "running" => Ok(ComparisonStatus::Running),
        "completed" => Ok(ComparisonStatus::Completed),
        "failed" => Ok(ComparisonStatus::Failed),
        _ => Err(ChecksumError::Tracking(format!(
            "Invalid comparison status: {}",
            s
        ))),
    }
}

pub fn chunk_status_to_str(status: ChunkStatus) -> &'static str {
    match status {
        ChunkStatus::Equal => "equal",
        ChunkStatus::Different => "different",
    }
}

pub fn str_to_chunk_status(s: &str) -> Result<ChunkStatus> {
    match s {
        "equal" => Ok(ChunkStatus::Equal),
        "different" => Ok(ChunkStatus::Different),
        _ => Err(ChecksumError::Tracking(format!("Invalid chunk status: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        let statuses = [
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ];

        for status in statuses {
            let s = job_status_to_str(status);
            let parsed = str_to_job_status(s).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_comparison_status_roundtrip() {
        let statuses = [
            ComparisonStatus::Pending,
            ComparisonStatus::Running,
            ComparisonStatus::Completed,
            ComparisonStatus::Failed,
        ];

        for status in statuses {
            let s = comparison_status_to_str(status);
            let parsed = str_to_comparison_status(s).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_chunk_status_roundtrip() {
        for status in [ChunkStatus::Equal, ChunkStatus::Different] {
            assert_eq!(str_to_chunk_status(chunk_status_to_str(status)).unwrap(), status);
        }
    }

    #[test]
    fn test_invalid_statuses() {
        assert!(str_to_job_status("invalid").is_err());
        assert!(str_to_comparison_status("in_progress").is_err());
        assert!(str_to_chunk_status("").is_err());
    }
}
