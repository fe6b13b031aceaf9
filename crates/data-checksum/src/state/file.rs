//! File-backed job tracker.
//!
//! Job and comparison state lives in one JSON file, rewritten atomically after
//! every change and signed with HMAC-SHA256 keyed by the config hash. Chunk
//! records are appended to a `<path>.chunks.jsonl` sidecar and never signed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::backend::JobTracker;
use super::{
    make_job_id, unique_job_id, ChunkComparison, ComparisonStatus, JobStatus, JobSummary,
    TableComparison, TableComparisonUpdate,
};
use crate::core::TablePair;
use crate::error::{ChecksumError, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    source_host: String,
    target_host: String,
    status: JobStatus,
    started_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    summary: Option<JobSummary>,
}

/// Everything the state file holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrackerState {
    config_hash: String,
    next_comparison_id: i64,
    jobs: BTreeMap<String, JobRecord>,
    comparisons: BTreeMap<i64, TableComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hmac: Option<String>,
}

impl TrackerState {
    fn new(config_hash: &str) -> Self {
        Self {
            config_hash: config_hash.to_string(),
            next_comparison_id: 1,
            ..Self::default()
        }
    }

    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)?;
        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| ChecksumError::tracking(e, "creating state HMAC"))?;
        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        let expected = state.compute_hmac()?;
        match &state.hmac {
            Some(stored) if *stored == expected => Ok(state),
            Some(_) => Err(ChecksumError::Tracking(format!(
                "state file {} failed its integrity check (HMAC mismatch)",
                path.display()
            ))),
            None => Err(ChecksumError::Tracking(format!(
                "state file {} has no HMAC signature",
                path.display()
            ))),
        }
    }

    fn comparison_mut(&mut self, comparison_id: i64) -> Result<&mut TableComparison> {
        self.comparisons.get_mut(&comparison_id).ok_or_else(|| {
            ChecksumError::Tracking(format!("unknown comparison id {}", comparison_id))
        })
    }
}

/// Job tracker persisting to a signed JSON file.
pub struct FileJobTracker {
    path: PathBuf,
    state: Mutex<TrackerState>,
}

impl FileJobTracker {
    /// Open for a new run.
    ///
    /// An existing file written under another config hash is replaced on the
    /// next save. A file that fails its integrity check is an error.
    pub fn open(path: impl Into<PathBuf>, config_hash: &str) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let state = TrackerState::read(&path)?;
            if state.config_hash == config_hash {
                state
            } else {
                warn!(
                    "State file {} was written for a different config, starting fresh",
                    path.display()
                );
                TrackerState::new(config_hash)
            }
        } else {
            TrackerState::new(config_hash)
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Open for resume. The file must exist and match the current config.
    pub fn open_existing(path: impl Into<PathBuf>, config_hash: &str) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(ChecksumError::Tracking(format!(
                "no state file at {}",
                path.display()
            )));
        }

        let state = TrackerState::read(&path)?;
        if state.config_hash != config_hash {
            return Err(ChecksumError::ConfigChanged);
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar holding one JSON chunk record per line.
    pub fn chunk_log_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".chunks.jsonl");
        PathBuf::from(name)
    }

    /// All comparisons of a job, ordered by comparison id.
    pub async fn comparisons(&self, job_id: &str) -> Vec<TableComparison> {
        let state = self.state.lock().await;
        state
            .comparisons
            .values()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect()
    }

    async fn comparisons_where(
        &self,
        job_id: &str,
        keep: impl Fn(&TableComparison) -> bool,
    ) -> Result<Vec<TableComparison>> {
        let state = self.state.lock().await;
        if !state.jobs.contains_key(job_id) {
            return Err(ChecksumError::Tracking(format!("unknown job {}", job_id)));
        }
        Ok(state
            .comparisons
            .values()
            .filter(|c| c.job_id == job_id && keep(c))
            .cloned()
            .collect())
    }

    /// Status of a job, if it exists.
    pub async fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        let state = self.state.lock().await;
        state.jobs.get(job_id).map(|job| job.status)
    }

    /// Totals written by `complete_job`, if the job has finished.
    pub async fn job_summary(&self, job_id: &str) -> Option<JobSummary> {
        let state = self.state.lock().await;
        state.jobs.get(job_id).and_then(|job| job.summary)
    }

    /// Read back every chunk record from the sidecar.
    pub async fn chunk_records(&self) -> Result<Vec<ChunkComparison>> {
        let path = self.chunk_log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(ChecksumError::from))
            .collect()
    }

    async fn save(&self, state: &mut TrackerState) -> Result<()> {
        state.hmac = Some(state.compute_hmac()?);
        let content = serde_json::to_string_pretty(&*state)?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Saved tracker state to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl JobTracker for FileJobTracker {
    async fn init_schema(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    async fn create_job(&self, source_host: &str, target_host: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let job_id = unique_job_id(&make_job_id(source_host, target_host, now), |id| {
            state.jobs.contains_key(id)
        });

        state.jobs.insert(
            job_id.clone(),
            JobRecord {
                job_id: job_id.clone(),
                source_host: source_host.to_string(),
                target_host: target_host.to_string(),
                status: JobStatus::Running,
                started_at: now,
                completed_at: None,
                summary: None,
            },
        );
        self.save(&mut state).await?;
        Ok(job_id)
    }

    async fn register_table(&self, job_id: &str, pair: &TablePair) -> Result<i64> {
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(job_id) {
            return Err(ChecksumError::Tracking(format!("unknown job {}", job_id)));
        }

        let comparison_id = state.next_comparison_id;
        state.next_comparison_id += 1;
        state.comparisons.insert(
            comparison_id,
            TableComparison::pending(comparison_id, job_id, pair.clone()),
        );
        self.save(&mut state).await?;
        Ok(comparison_id)
    }

    async fn start_table(&self, comparison_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let comparison = state.comparison_mut(comparison_id)?;
        comparison.status = ComparisonStatus::Running;
        comparison.started_at = Some(Utc::now());
        comparison.finished_at = None;
        comparison.error = None;
        self.save(&mut state).await
    }

    async fn record_chunk(&self, chunk: &ChunkComparison) -> Result<()> {
        let mut line = serde_json::to_string(chunk)?;
        line.push('\n');

        // Serialize appends with state writes.
        let _state = self.state.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.chunk_log_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn finish_table(&self, comparison_id: i64, update: &TableComparisonUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        let comparison = state.comparison_mut(comparison_id)?;
        comparison.status = update.status;
        comparison.source_row_count = update.source_row_count;
        comparison.target_row_count = update.target_row_count;
        comparison.chunks_processed = update.chunks_processed;
        comparison.chunks_equal = update.chunks_equal;
        comparison.chunks_different = update.chunks_different;
        comparison.is_equal = update.is_equal;
        comparison.error = update.error.clone();
        comparison.finished_at = Some(Utc::now());
        self.save(&mut state).await
    }

    async fn complete_job(&self, job_id: &str, summary: &JobSummary) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ChecksumError::Tracking(format!("unknown job {}", job_id)))?;
        job.status = summary.status;
        job.completed_at = Some(Utc::now());
        job.summary = Some(*summary);
        self.save(&mut state).await
    }

    async fn pending_tables(&self, job_id: &str) -> Result<Vec<TableComparison>> {
        self.comparisons_where(job_id, |c| c.status.is_unfinished()).await
    }

    async fn finished_tables(&self, job_id: &str) -> Result<Vec<TableComparison>> {
        self.comparisons_where(job_id, |c| !c.status.is_unfinished()).await
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
