//! Job orchestrator - resolves table pairs and compares them with a bounded worker pool.

pub mod progress;

pub use progress::ProgressUpdate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checksum::{ChecksumContext, ChecksumSettings, TableCheckResult, TableChecker};
use crate::config::{Config, TablesConfig, TrackingBackend};
use crate::core::{TablePair, TableRef};
use crate::error::{ChecksumError, Result};
use crate::session::{ChecksumSession, MysqlSession};
use crate::state::{
    ComparisonStatus, FileJobTracker, JobStatus, JobSummary, JobTracker, MysqlJobTracker,
    NoOpJobTracker, TableComparison, TableComparisonUpdate,
};

/// Delay unit for retries; attempt `n` waits `n` units.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// How the job tracker is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerOpen {
    /// Start a new job. A file tracker may replace state from another config.
    NewJob,
    /// Continue an existing job. A file tracker must match the current config.
    Resume,
}

/// Build the tracker described by `config.tracking`.
pub async fn tracker_from_config(config: &Config, open: TrackerOpen) -> Result<Arc<dyn JobTracker>> {
    let Some(tracking) = &config.tracking else {
        return Ok(Arc::new(NoOpJobTracker::new()));
    };

    match tracking.backend {
        TrackingBackend::Mysql => Ok(Arc::new(MysqlJobTracker::connect(tracking).await?)),
        TrackingBackend::File => {
            let path = tracking
                .path
                .clone()
                .ok_or_else(|| ChecksumError::Config("tracking.path is required for the file backend".into()))?;
            let tracker = match open {
                TrackerOpen::NewJob => FileJobTracker::open(path, &config.hash())?,
                TrackerOpen::Resume => FileJobTracker::open_existing(path, &config.hash())?,
            };
            Ok(Arc::new(tracker))
        }
    }
}

/// Pairs listed explicitly under `tables.pairs`.
pub fn explicit_pairs(tables: &TablesConfig) -> Result<Vec<TablePair>> {
    tables
        .pairs
        .iter()
        .map(|p| {
            let source = TableRef::parse(&p.source).ok_or_else(|| {
                ChecksumError::Config(format!("table pair source '{}' is not db.table", p.source))
            })?;
            let target = match &p.target {
                Some(target) => TableRef::parse(target).ok_or_else(|| {
                    ChecksumError::Config(format!("table pair target '{}' is not db.table", target))
                })?,
                None => source.clone(),
            };
            Ok(TablePair::new(source, target))
        })
        .collect()
}

/// Filter the tables of the `db_index`-th source database and map each to its target.
pub fn discovered_pairs(
    tables: &TablesConfig,
    db_index: usize,
    source_database: &str,
    listed: &[String],
) -> Result<Vec<TablePair>> {
    let pattern = match &tables.source_table_regex {
        Some(pattern) if !pattern.is_empty() => Some(Regex::new(pattern)?),
        _ => None,
    };

    let target_database = match tables.target_databases.get(db_index) {
        Some(target) if !tables.target_database_as_source => target.clone(),
        _ => source_database.to_string(),
    };
    let target_database = format!("{}{}", target_database, tables.target_database_suffix);

    let selected = listed
        .iter()
        .filter(|t| tables.source_tables.is_empty() || tables.source_tables.contains(t))
        .filter(|t| pattern.as_ref().map_or(true, |re| re.is_match(t)));

    Ok(selected
        .enumerate()
        .map(|(i, table)| {
            let target_table = match tables.target_tables.get(i) {
                Some(target) if !tables.target_table_as_source => target.clone(),
                _ => table.clone(),
            };
            TablePair::new(
                TableRef::new(source_database, table.as_str()),
                TableRef::new(
                    target_database.as_str(),
                    format!("{}{}", target_table, tables.target_table_suffix),
                ),
            )
        })
        .collect())
}

/// A table pair that could not be compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTable {
    pub pair: String,
    pub error: String,
    pub exit_code: u8,
}

/// Result of a job run or resume.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: String,

    /// completed, failed or cancelled.
    pub status: String,

    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    pub tables_total: usize,
    pub tables_equal: usize,
    pub tables_different: usize,
    pub tables_failed: usize,

    /// Pairs whose contents differ.
    pub different_tables: Vec<String>,

    pub failed_tables: Vec<FailedTable>,

    #[serde(skip)]
    pub results: Vec<TableCheckResult>,
}

impl JobResult {
    /// Every pair finished and compared equal.
    pub fn is_equal(&self) -> bool {
        self.tables_different == 0 && self.tables_failed == 0 && self.status == "completed"
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }

    pub fn to_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "tables".to_string(),
                serde_json::Value::Array(self.results.iter().map(TableCheckResult::to_json).collect()),
            );
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

/// Connectivity of both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// What became of one pair task.
enum PairOutcome {
    Checked(TableCheckResult),
    Failed(FailedTable),
    Cancelled,
}

/// Everything a spawned pair task needs.
struct PairTask {
    comparison_id: i64,
    pair: TablePair,
    source: Arc<dyn ChecksumSession>,
    target: Arc<dyn ChecksumSession>,
    tracker: Arc<dyn JobTracker>,
    settings: ChecksumSettings,
    retries: u32,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl PairTask {
    async fn run(self) -> PairOutcome {
        let mut attempt: u32 = 0;
        loop {
            let context = ChecksumContext::new(
                self.pair.clone(),
                Arc::clone(&self.source),
                Arc::clone(&self.target),
                self.settings.clone(),
            );
            let mut checker = TableChecker::new(context, Arc::clone(&self.tracker), self.comparison_id)
                .with_cancellation(self.cancel.clone());
            if let Some(tx) = &self.progress {
                checker = checker.with_progress(tx.clone());
            }

            match checker.run().await {
                Ok(result) => {
                    return match self
                        .tracker
                        .finish_table(self.comparison_id, &result.tracker_update())
                        .await
                    {
                        Ok(()) => PairOutcome::Checked(result),
                        Err(e) => self.fail(e).await,
                    };
                }
                Err(ChecksumError::Cancelled) => {
                    warn!("{}: cancelled, left for resume", self.pair);
                    self.report_pair("cancelled").await;
                    return PairOutcome::Cancelled;
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    let delay = RETRY_BACKOFF * attempt;
                    warn!(
                        "{}: attempt {} failed, retrying in {:?}: {}",
                        self.pair, attempt, delay, e
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            warn!("{}: cancelled during retry backoff, left for resume", self.pair);
                            self.report_pair("cancelled").await;
                            return PairOutcome::Cancelled;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return self.fail(e).await,
            }
        }
    }

    async fn fail(&self, e: ChecksumError) -> PairOutcome {
        error!("{}: {}", self.pair, e);
        if let Err(tracking) = self
            .tracker
            .finish_table(self.comparison_id, &TableComparisonUpdate::failed(e.to_string()))
            .await
        {
            error!("{}: could not record failure: {}", self.pair, tracking);
        }
        self.report_pair("failed").await;
        PairOutcome::Failed(FailedTable {
            pair: self.pair.to_string(),
            error: e.to_string(),
            exit_code: e.exit_code(),
        })
    }

    async fn report_pair(&self, outcome: &str) {
        if let Some(tx) = &self.progress {
            let _ = tx
                .send(ProgressUpdate::Pair {
                    pair: self.pair.to_string(),
                    outcome: outcome.to_string(),
                    chunks_processed: 0,
                    duration_ms: 0,
                })
                .await;
        }
    }
}

/// Checksum job orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn ChecksumSession>,
    target: Arc<dyn ChecksumSession>,
    tracker: Arc<dyn JobTracker>,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Connect both MySQL sides and the tracker for a new job.
    pub async fn new(config: Config) -> Result<Self> {
        Self::connect(config, TrackerOpen::NewJob).await
    }

    /// Connect both MySQL sides and the tracker for resuming a job.
    pub async fn for_resume(config: Config) -> Result<Self> {
        Self::connect(config, TrackerOpen::Resume).await
    }

    async fn connect(config: Config, open: TrackerOpen) -> Result<Self> {
        let source = MysqlSession::connect(
            &config.source,
            config.source.get_max_connections(),
            "source",
        )
        .await?;
        let target = MysqlSession::connect(
            &config.target,
            config.target.get_max_connections(),
            "target",
        )
        .await?;
        let tracker = tracker_from_config(&config, open).await?;

        Ok(Self::with_sessions(config, Arc::new(source), Arc::new(target)).with_tracker(tracker))
    }

    /// Use existing sessions. Tracking is off until [`with_tracker`](Self::with_tracker).
    pub fn with_sessions(
        config: Config,
        source: Arc<dyn ChecksumSession>,
        target: Arc<dyn ChecksumSession>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            tracker: Arc::new(NoOpJobTracker::new()),
            progress_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn JobTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Receive one update per chunk and per finished pair.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn tracker(&self) -> &Arc<dyn JobTracker> {
        &self.tracker
    }

    /// Table pairs the configuration selects.
    pub async fn resolve_table_pairs(&self) -> Result<Vec<TablePair>> {
        let tables = &self.config.tables;
        let pairs = if !tables.pairs.is_empty() {
            explicit_pairs(tables)?
        } else {
            let mut pairs = Vec::new();
            for (i, database) in tables.source_databases.iter().enumerate() {
                let listed = self.source.list_tables(database).await?;
                debug!("{}: {} base tables", database, listed.len());
                pairs.extend(discovered_pairs(tables, i, database, &listed)?);
            }
            pairs
        };

        if pairs.is_empty() {
            return Err(ChecksumError::Config(
                "no table pairs to compare - check the tables section".into(),
            ));
        }
        Ok(pairs)
    }

    /// Start a new job over every resolved pair.
    pub async fn run(&self) -> Result<JobResult> {
        let pairs = self.resolve_table_pairs().await?;

        self.tracker.init_schema().await?;
        let job_id = self
            .tracker
            .create_job(self.source.host(), self.target.host())
            .await?;
        info!(
            "Starting job {}: {} table pairs (tracking: {})",
            job_id,
            pairs.len(),
            self.tracker.backend_type()
        );

        let mut work = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let comparison_id = self.tracker.register_table(&job_id, &pair).await?;
            work.push((comparison_id, pair));
        }

        self.execute(job_id, work, Vec::new()).await
    }

    /// Rerun the pairs of `job_id` that are still pending or running.
    ///
    /// Pairs that finished before the interruption are not compared again, but
    /// their recorded outcome still counts toward the job totals.
    pub async fn resume(&self, job_id: &str) -> Result<JobResult> {
        self.tracker.init_schema().await?;
        let pending = self.tracker.pending_tables(job_id).await?;
        let finished = self.tracker.finished_tables(job_id).await?;
        info!(
            "Resuming job {}: {} table pairs left, {} already finished",
            job_id,
            pending.len(),
            finished.len()
        );

        let work = pending
            .into_iter()
            .map(|c| (c.comparison_id, c.pair))
            .collect();
        self.execute(job_id.to_string(), work, finished).await
    }

    async fn execute(
        &self,
        job_id: String,
        work: Vec<(i64, TablePair)>,
        finished: Vec<TableComparison>,
    ) -> Result<JobResult> {
        let started_at = Utc::now();
        let started = Instant::now();

        let settings = ChecksumSettings::from_config(&self.config.checksum)?;
        let workers = self.config.checksum.get_workers().max(1);
        let retries = self.config.checksum.get_retries();
        let semaphore = Arc::new(Semaphore::new(workers));
        let tables_total = work.len() + finished.len();

        info!("Comparing {} table pairs with {} workers", work.len(), workers);

        let mut handles = Vec::with_capacity(work.len());
        for (comparison_id, pair) in work {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, not starting {}", pair);
                continue;
            }

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Cancellation requested, not starting {}", pair);
                    continue;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|e| ChecksumError::Config(format!("worker pool closed: {}", e)))?
                }
            };

            let task = PairTask {
                comparison_id,
                pair: pair.clone(),
                source: Arc::clone(&self.source),
                target: Arc::clone(&self.target),
                tracker: Arc::clone(&self.tracker),
                settings: settings.clone(),
                retries,
                cancel: self.cancel.clone(),
                progress: self.progress_tx.clone(),
            };
            let handle = tokio::spawn(async move {
                let outcome = task.run().await;
                drop(permit);
                outcome
            });
            handles.push((pair, handle));
        }

        let mut tables_equal = 0usize;
        let mut different_tables = Vec::new();
        let mut failed_tables = Vec::new();
        for comparison in finished {
            match (comparison.status, comparison.is_equal) {
                (ComparisonStatus::Failed, _) => failed_tables.push(FailedTable {
                    pair: comparison.pair.to_string(),
                    error: comparison.error.unwrap_or_default(),
                    exit_code: crate::error::EXIT_DATABASE_ERROR,
                }),
                (_, Some(true)) => tables_equal += 1,
                _ => different_tables.push(comparison.pair.to_string()),
            }
        }

        let mut results = Vec::new();
        let mut cancelled = 0usize;
        for (pair, handle) in handles {
            match handle.await {
                Ok(PairOutcome::Checked(result)) => results.push(result),
                Ok(PairOutcome::Failed(failed)) => failed_tables.push(failed),
                Ok(PairOutcome::Cancelled) => cancelled += 1,
                Err(e) => {
                    error!("{}: task panicked: {}", pair, e);
                    failed_tables.push(FailedTable {
                        pair: pair.to_string(),
                        error: format!("task panicked: {}", e),
                        exit_code: crate::error::EXIT_DATABASE_ERROR,
                    });
                }
            }
        }

        tables_equal += results.iter().filter(|r| r.is_equal()).count();
        different_tables.extend(
            results
                .iter()
                .filter(|r| !r.is_equal())
                .map(|r| r.pair.to_string()),
        );

        let status = if cancelled > 0 || self.cancel.is_cancelled() {
            JobStatus::Cancelled
        } else if !failed_tables.is_empty() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };

        let summary = JobSummary {
            status,
            total_tables: tables_total as u64,
            tables_equal: tables_equal as u64,
            tables_different: different_tables.len() as u64,
            tables_failed: failed_tables.len() as u64,
        };
        self.tracker.complete_job(&job_id, &summary).await?;

        let result = JobResult {
            job_id,
            status: crate::state::job_status_to_str(status).to_string(),
            duration_seconds: started.elapsed().as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            tables_total,
            tables_equal,
            tables_different: different_tables.len(),
            tables_failed: failed_tables.len(),
            different_tables,
            failed_tables,
            results,
        };

        info!(
            "Job {} {}: {}/{} pairs equal, {} different, {} failed in {:.1}s",
            result.job_id,
            result.status,
            result.tables_equal,
            result.tables_total,
            result.tables_different,
            result.tables_failed,
            result.duration_seconds
        );

        Ok(result)
    }

    /// Check connectivity of both sides.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        let healthy = source.is_ok() && target.is_ok();
        Ok(HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy,
        })
    }

    /// Close both sessions.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
