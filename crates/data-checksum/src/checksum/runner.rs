//! Per-pair comparison loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::context::{ChecksumContext, ChunkOutcome, ChunkProgress};
use crate::core::TablePair;
use crate::differ::{DifferenceReport, TableDiffer};
use crate::error::{ChecksumError, Result};
use crate::orchestrator::ProgressUpdate;
use crate::state::{ChunkComparison, ChunkStatus, ComparisonStatus, JobTracker, TableComparisonUpdate};

/// Verdict for one table pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    Equal,
    Different,
    /// Row counts alone proved the tables differ; no chunk was compared.
    CountMismatch,
}

impl TableOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TableOutcome::Equal => "equal",
            TableOutcome::Different => "different",
            TableOutcome::CountMismatch => "count_mismatch",
        }
    }
}

/// Result of comparing one table pair.
#[derive(Debug, Clone)]
pub struct TableCheckResult {
    pub pair: TablePair,
    pub outcome: TableOutcome,
    pub source_row_count: Option<i64>,
    pub target_row_count: Option<i64>,
    pub chunks_processed: u64,
    pub chunks_equal: u64,
    pub chunks_different: u64,
    pub difference: Option<DifferenceReport>,
    pub duration: Duration,
}

impl TableCheckResult {
    fn new(pair: TablePair) -> Self {
        Self {
            pair,
            outcome: TableOutcome::Equal,
            source_row_count: None,
            target_row_count: None,
            chunks_processed: 0,
            chunks_equal: 0,
            chunks_different: 0,
            difference: None,
            duration: Duration::ZERO,
        }
    }

    pub fn is_equal(&self) -> bool {
        self.outcome == TableOutcome::Equal
    }

    /// Final figures for the job tracker.
    pub fn tracker_update(&self) -> TableComparisonUpdate {
        TableComparisonUpdate {
            status: ComparisonStatus::Completed,
            source_row_count: self.source_row_count,
            target_row_count: self.target_row_count,
            chunks_processed: self.chunks_processed,
            chunks_equal: self.chunks_equal,
            chunks_different: self.chunks_different,
            is_equal: Some(self.is_equal()),
            error: None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "source": self.pair.source.to_string(),
            "target": self.pair.target.to_string(),
            "outcome": self.outcome.as_str(),
            "source_row_count": self.source_row_count,
            "target_row_count": self.target_row_count,
            "chunks_processed": self.chunks_processed,
            "chunks_equal": self.chunks_equal,
            "chunks_different": self.chunks_different,
            "duration_ms": self.duration.as_millis() as u64,
            "difference": self.difference.as_ref().map(DifferenceReport::to_json),
        })
    }
}

/// Drives one [`ChecksumContext`] from precheck to verdict, recording each chunk.
pub struct TableChecker {
    context: ChecksumContext,
    tracker: Arc<dyn JobTracker>,
    comparison_id: i64,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl TableChecker {
    pub fn new(context: ChecksumContext, tracker: Arc<dyn JobTracker>, comparison_id: i64) -> Self {
        Self {
            context,
            tracker,
            comparison_id,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Compare the pair. Table differences are reported in the result, never as errors.
    ///
    /// The tracker is moved to `running` here; writing the final status is left
    /// to the caller so retries and failures are recorded in one place.
    pub async fn run(mut self) -> Result<TableCheckResult> {
        let span = info_span!("table_pair", pair = %self.context.table.pair());
        async move { self.run_inner().await }.instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<TableCheckResult> {
        let started = Instant::now();
        let pair = self.context.table.pair().clone();
        let mut result = TableCheckResult::new(pair.clone());

        if self.cancel.is_cancelled() {
            return Err(ChecksumError::Cancelled);
        }

        info!("{}: starting comparison", pair);
        self.tracker.start_table(self.comparison_id).await?;

        if !self.context.settings().ignore_row_count_check {
            let precheck = self.context.precheck_by_count().await?;
            result.source_row_count = Some(precheck.source_count);
            result.target_row_count = Some(precheck.target_count);
            if !precheck.continue_chunking {
                result.outcome = TableOutcome::CountMismatch;
                result.duration = started.elapsed();
                self.report_pair(&result).await;
                return Ok(result);
            }
        }

        self.context.resolve_check_columns().await?;
        self.context.resolve_unique_key().await?;

        match self.context.settings().time_range.clone() {
            Some(time_range) => {
                for window in time_range.windows() {
                    if self.cancel.is_cancelled() {
                        return Err(ChecksumError::Cancelled);
                    }
                    self.context.range = Some(window.as_range());
                    let chunk_started = Utc::now();
                    let outcome = self.context.compare_time_window(&window).await;
                    self.finish_chunk(outcome, chunk_started, &mut result).await?;
                }
            }
            None => {
                self.context.read_global_min_values().await?;
                self.context.read_global_max_values().await?;
                loop {
                    if self.cancel.is_cancelled() {
                        return Err(ChecksumError::Cancelled);
                    }
                    if !self.context.compute_next_chunk().await? {
                        break;
                    }
                    let chunk_started = Utc::now();
                    let outcome = self.context.compare_chunk().await;
                    self.finish_chunk(outcome, chunk_started, &mut result).await?;
                }
            }
        }
        self.context.table.mark_finished();

        result.outcome = if result.chunks_different == 0 {
            TableOutcome::Equal
        } else {
            TableOutcome::Different
        };

        if result.chunks_different > 0 && self.context.settings().differential {
            let differ = TableDiffer::new(self.context.fork_for_differential())
                .with_cancellation(self.cancel.clone());
            result.difference = Some(differ.analyze_and_report().await?);
        }

        result.duration = started.elapsed();
        info!(
            "{}: {} after {} chunks ({} different) in {:.1}s",
            pair,
            result.outcome.as_str(),
            result.chunks_processed,
            result.chunks_different,
            result.duration.as_secs_f64()
        );
        self.report_pair(&result).await;
        Ok(result)
    }

    /// Record a chunk outcome and move to the next iteration. Errors end the pair.
    async fn finish_chunk(
        &mut self,
        outcome: Result<ChunkOutcome>,
        started_at: chrono::DateTime<Utc>,
        result: &mut TableCheckResult,
    ) -> Result<()> {
        let chunk_number = self.context.table.iteration();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: chunk {} failed: {}", self.context.table.pair(), chunk_number, e);
                self.context.record_progress(ChunkProgress {
                    chunk_number,
                    started_at,
                    finished_at: Utc::now(),
                    source_checksum: String::new(),
                    target_checksum: String::new(),
                    equal: false,
                    error: Some(e.to_string()),
                });
                return Err(e);
            }
        };

        let source_checksum = outcome.source_checksum();
        let target_checksum = outcome.target_checksum();
        self.context.record_progress(ChunkProgress {
            chunk_number,
            started_at,
            finished_at: Utc::now(),
            source_checksum: source_checksum.clone(),
            target_checksum: target_checksum.clone(),
            equal: outcome.equal,
            error: None,
        });

        let (range_start, range_end) = self
            .context
            .range()
            .map(|r| (r.min.to_json(), r.max.to_json()))
            .unwrap_or((JsonValue::Null, JsonValue::Null));
        if !outcome.equal {
            warn!(
                "{}: chunk {} differs between {} and {}",
                self.context.table.pair(),
                chunk_number,
                range_start,
                range_end
            );
        }

        self.tracker
            .record_chunk(&ChunkComparison {
                comparison_id: self.comparison_id,
                chunk_number,
                range_start,
                range_end,
                status: ChunkStatus::from_equal(outcome.equal),
                source_checksum,
                target_checksum,
                processing_time_ms: outcome.duration.as_millis() as u64,
            })
            .await?;

        result.chunks_processed += 1;
        if outcome.equal {
            result.chunks_equal += 1;
        } else {
            result.chunks_different += 1;
        }

        if let Some(tx) = &self.progress {
            let _ = tx
                .send(ProgressUpdate::Chunk {
                    pair: self.context.table.pair().to_string(),
                    chunk_number,
                    equal: outcome.equal,
                    elapsed_ms: outcome.duration.as_millis() as u64,
                })
                .await;
        }

        self.context.table.advance();
        Ok(())
    }

    async fn report_pair(&self, result: &TableCheckResult) {
        if let Some(tx) = &self.progress {
            let _ = tx
                .send(ProgressUpdate::Pair {
                    pair: result.pair.to_string(),
                    outcome: result.outcome.as_str().to_string(),
                    chunks_processed: result.chunks_processed,
                    duration_ms: result.duration.as_millis() as u64,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumSettings;
    use crate::core::{SqlValue, TableRef};
    use crate::session::{MemorySession, MemoryTable, UniqueKeyCandidate};
    use crate::state::NoOpJobTracker;

    fn table(rows: impl Iterator<Item = i64>) -> MemoryTable {
        MemoryTable::new(&["id", "name"])
            .with_unique_key(UniqueKeyCandidate::new("PRIMARY", &["id"], "int"))
            .with_rows(
                rows.map(|id| vec![SqlValue::Int(id), SqlValue::Text(format!("row-{}", id))])
                    .collect(),
            )
    }

    fn checker(
        source: MemoryTable,
        target: MemoryTable,
        settings: ChecksumSettings,
    ) -> TableChecker {
        let table_ref = TableRef::new("shop", "orders");
        let src = MemorySession::new("source");
        let tgt = MemorySession::new("target");
        src.add_table(table_ref.clone(), source).unwrap();
        tgt.add_table(table_ref.clone(), target).unwrap();
        let context = ChecksumContext::new(
            TablePair::new(table_ref.clone(), table_ref),
            Arc::new(src),
            Arc::new(tgt),
            settings,
        );
        TableChecker::new(context, Arc::new(NoOpJobTracker::new()), 1)
    }

    fn small_chunks() -> ChecksumSettings {
        ChecksumSettings {
            chunk_size: 10,
            ..ChecksumSettings::default()
        }
    }

    #[tokio::test]
    async fn test_identical_tables_are_equal() {
        let result = checker(table(1..=95), table(1..=95), small_chunks())
            .run()
            .await
            .unwrap();
        assert_eq!(result.outcome, TableOutcome::Equal);
        assert_eq!(result.chunks_processed, 10);
        assert_eq!(result.source_row_count, Some(95));
    }

    #[tokio::test]
    async fn test_count_mismatch_short_circuits() {
        let result = checker(table(1..=50), table(1..=40), small_chunks())
            .run()
            .await
            .unwrap();
        assert_eq!(result.outcome, TableOutcome::CountMismatch);
        assert_eq!(result.chunks_processed, 0);
        assert!(!result.is_equal());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let err = checker(table(1..=5), table(1..=5), small_chunks())
            .with_cancellation(token)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ChecksumError::Cancelled));
    }

    #[tokio::test]
    async fn test_progress_updates_per_chunk_and_pair() {
        let (tx, mut rx) = mpsc::channel(64);
        checker(table(1..=30), table(1..=30), small_chunks())
            .with_progress(tx)
            .run()
            .await
            .unwrap();

        let mut chunks = 0;
        let mut pairs = 0;
        while let Ok(update) = rx.try_recv() {
            match update {
                ProgressUpdate::Chunk { .. } => chunks += 1,
                ProgressUpdate::Pair { outcome, .. } => {
                    pairs += 1;
                    assert_eq!(outcome, "equal");
                }
            }
        }
        assert_eq!(chunks, 3);
        assert_eq!(pairs, 1);
    }
}
