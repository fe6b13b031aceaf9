//! No-op job tracker used when tracking is not configured.
//!
//! Runs complete normally but leave no record, so there is nothing to resume.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::backend::JobTracker;
use super::{make_job_id, ChunkComparison, JobSummary, TableComparison, TableComparisonUpdate};
use crate::core::TablePair;
use crate::error::Result;

/// Job tracker that doesn't persist anything.
///
/// Logs a warning on first use.
pub struct NoOpJobTracker {
    warned: AtomicBool,
    next_comparison_id: AtomicI64,
}

impl NoOpJobTracker {
    /// Create a new no-op tracker.
    pub fn new() -> Self {
        Self {
            warned: AtomicBool::new(false),
            next_comparison_id: AtomicI64::new(1),
        }
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!(
                "Job tracking is not configured: progress will not be persisted \
                 and this job cannot be resumed."
            );
        }
    }
}

impl Default for NoOpJobTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobTracker for NoOpJobTracker {
    async fn init_schema(&self) -> Result<()> {
        self.warn_once();
        Ok(())
    }

    async fn create_job(&self, source_host: &str, target_host: &str) -> Result<String> {
        self.warn_once();
        Ok(make_job_id(source_host, target_host, Utc::now()))
    }

    async fn register_table(&self, _job_id: &str, _pair: &TablePair) -> Result<i64> {
        Ok(self.next_comparison_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn start_table(&self, _comparison_id: i64) -> Result<()> {
        Ok(())
    }

    async fn record_chunk(&self, _chunk: &ChunkComparison) -> Result<()> {
        Ok(())
    }

    async fn finish_table(&self, _comparison_id: i64, _update: &TableComparisonUpdate) -> Result<()> {
        Ok(())
    }

    async fn complete_job(&self, _job_id: &str, _summary: &JobSummary) -> Result<()> {
        Ok(())
    }

    async fn pending_tables(&self, _job_id: &str) -> Result<Vec<TableComparison>> {
        self.warn_once();
        Ok(Vec::new())
    }

    async fn finished_tables(&self, _job_id: &str) -> Result<Vec<TableComparison>> {
        Ok(Vec::new())
    }

    fn backend_type(&self) -> &'static str {
        "noop"
    }
}
