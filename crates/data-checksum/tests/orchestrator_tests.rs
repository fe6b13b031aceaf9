//! Job-level behavior: worker pool, retries, failures, cancellation and resume.

mod common;

use std::sync::Arc;

use common::*;
use data_checksum::error::{EXIT_DATABASE_ERROR, EXIT_SCHEMA_ERROR};
use data_checksum::state::{
    ComparisonStatus, FileJobTracker, JobStatus, JobTracker, TableComparisonUpdate,
};
use data_checksum::{
    Config, MemorySession, MemoryTable, Orchestrator, ProgressUpdate, SqlValue, TablePair,
    TableRef,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Both sessions hold `shop.orders` and `shop.items`.
fn two_tables() -> (Arc<MemorySession>, Arc<MemorySession>) {
    let (src, tgt) = sessions(&orders(), keyed_table(1..=45), keyed_table(1..=45));
    src.add_table(items(), keyed_table(1..=12)).unwrap();
    tgt.add_table(items(), keyed_table(1..=12)).unwrap();
    (src, tgt)
}

fn orchestrator(
    extra: &str,
    src: &Arc<MemorySession>,
    tgt: &Arc<MemorySession>,
) -> Orchestrator {
    Orchestrator::with_sessions(
        config_for(&["shop.orders", "shop.items"], extra),
        src.clone(),
        tgt.clone(),
    )
}

#[tokio::test]
async fn test_job_reports_every_pair() {
    let (src, tgt) = two_tables();
    tgt.update_rows(&items(), "id", &SqlValue::Int(3), "name", SqlValue::from("changed"))
        .unwrap();

    let result = orchestrator("", &src, &tgt).run().await.unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.tables_total, 2);
    assert_eq!(result.tables_equal, 1);
    assert_eq!(result.tables_different, 1);
    assert_eq!(result.tables_failed, 0);
    assert_eq!(result.different_tables, vec!["shop.items => shop.items".to_string()]);
    assert!(!result.is_equal());

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["tables"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_progress_stream_covers_chunks_and_pairs() {
    let (src, tgt) = two_tables();
    let (tx, mut rx) = mpsc::channel(128);

    let orchestrator = orchestrator("", &src, &tgt).with_progress(tx);
    orchestrator.run().await.unwrap();
    drop(orchestrator);

    let mut chunks = 0;
    let mut pairs = 0;
    while let Some(update) = rx.recv().await {
        match update {
            ProgressUpdate::Chunk { .. } => chunks += 1,
            ProgressUpdate::Pair { .. } => pairs += 1,
        }
    }
    // 45 rows in 5 chunks, 12 rows in 2
    assert_eq!(chunks, 7);
    assert_eq!(pairs, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let (src, tgt) = two_tables();
    src.fail_next_checksums(2);

    let result = orchestrator("  retries: 3\n", &src, &tgt)
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.tables_equal, 2);
    assert!(result.failed_tables.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let (src, tgt) = two_tables();
    src.fail_next_checksums(1_000);

    let result = orchestrator("  retries: 2\n", &src, &tgt)
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, "failed");
    assert_eq!(result.tables_failed, 2);
    assert!(result.failed_tables.iter().all(|f| f.exit_code == EXIT_DATABASE_ERROR));
}

#[tokio::test]
async fn test_schema_error_fails_only_its_pair() {
    let (src, tgt) = two_tables();
    let keyless = || MemoryTable::new(&["id", "name"]);
    src.add_table(items(), keyless()).unwrap();
    tgt.add_table(items(), keyless()).unwrap();

    let result = orchestrator("", &src, &tgt).run().await.unwrap();

    assert_eq!(result.status, "failed");
    assert_eq!(result.tables_equal, 1);
    assert_eq!(result.tables_failed, 1);
    assert_eq!(result.failed_tables[0].pair, "shop.items => shop.items");
    assert_eq!(result.failed_tables[0].exit_code, EXIT_SCHEMA_ERROR);
}

#[tokio::test]
async fn test_discovered_pairs_follow_table_filters() {
    let (src, tgt) = two_tables();
    src.add_table(TableRef::new("shop", "audit"), keyed_table(1..=3))
        .unwrap();

    let yaml = r#"
source:
  host: source.test
  user: checker
target:
  host: target.test
  user: checker
tables:
  source_databases: [shop]
  source_table_regex: "^(orders|items)$"
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let orchestrator = Orchestrator::with_sessions(config, src.clone(), tgt.clone());

    let pairs = orchestrator.resolve_table_pairs().await.unwrap();
    let names: Vec<String> = pairs.iter().map(|p| p.source.table.clone()).collect();
    assert_eq!(names, vec!["items".to_string(), "orders".to_string()]);
}

/// Tallies for `shop.orders` (45 rows, 5 chunks) finished in an earlier run.
fn orders_finished(is_equal: bool) -> TableComparisonUpdate {
    TableComparisonUpdate {
        status: ComparisonStatus::Completed,
        source_row_count: Some(45),
        target_row_count: Some(45),
        chunks_processed: 5,
        chunks_equal: if is_equal { 5 } else { 4 },
        chunks_different: if is_equal { 0 } else { 1 },
        is_equal: Some(is_equal),
        error: None,
    }
}

/// A tracked job over `shop.orders` and `shop.items` in which only `orders` has finished.
async fn job_with_orders_finished(
    tracker: &FileJobTracker,
    update: &TableComparisonUpdate,
) -> String {
    let job_id = tracker.create_job("source", "target").await.unwrap();
    let done = tracker
        .register_table(&job_id, &TablePair::new(orders(), orders()))
        .await
        .unwrap();
    tracker
        .register_table(&job_id, &TablePair::new(items(), items()))
        .await
        .unwrap();
    tracker.start_table(done).await.unwrap();
    tracker.finish_table(done, update).await.unwrap();
    job_id
}

#[tokio::test]
async fn test_cancelled_job_can_be_resumed() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_for(&["shop.orders", "shop.items"], "");
    let (src, tgt) = two_tables();

    let token = CancellationToken::new();
    token.cancel();
    let tracker = Arc::new(FileJobTracker::open(&state_path, &config.hash()).unwrap());
    let first = Orchestrator::with_sessions(config.clone(), src.clone(), tgt.clone())
        .with_tracker(tracker.clone())
        .with_cancellation(token)
        .run()
        .await
        .unwrap();
    assert!(first.is_cancelled());
    assert_eq!(tracker.job_status(&first.job_id).await, Some(JobStatus::Cancelled));
    assert_eq!(tracker.pending_tables(&first.job_id).await.unwrap().len(), 2);
    drop(tracker);

    let tracker = Arc::new(FileJobTracker::open_existing(&state_path, &config.hash()).unwrap());
    let resumed = Orchestrator::with_sessions(config, src.clone(), tgt.clone())
        .with_tracker(tracker.clone())
        .resume(&first.job_id)
        .await
        .unwrap();

    assert_eq!(resumed.job_id, first.job_id);
    assert_eq!(resumed.status, "completed");
    assert_eq!(resumed.tables_equal, 2);
    assert!(tracker.pending_tables(&first.job_id).await.unwrap().is_empty());
    assert_eq!(tracker.job_status(&first.job_id).await, Some(JobStatus::Completed));
}

#[tokio::test]
async fn test_resume_skips_completed_pairs() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_for(&["shop.orders", "shop.items"], "");
    let (src, tgt) = two_tables();

    let tracker = Arc::new(FileJobTracker::open(&state_path, &config.hash()).unwrap());
    let job_id = job_with_orders_finished(&tracker, &orders_finished(true)).await;

    let calls_before = src.checksum_calls();
    let resumed = Orchestrator::with_sessions(config, src.clone(), tgt.clone())
        .with_tracker(tracker.clone())
        .resume(&job_id)
        .await
        .unwrap();

    assert_eq!(resumed.tables_total, 2);
    assert_eq!(resumed.tables_equal, 2);
    assert_eq!(resumed.results.len(), 1);
    assert_eq!(resumed.results[0].pair.source, items());
    // items holds 12 rows, so only its 2 chunks were fingerprinted
    assert_eq!(src.checksum_calls() - calls_before, 2);

    let comparisons = tracker.comparisons(&job_id).await;
    assert!(comparisons
        .iter()
        .all(|c| c.status == ComparisonStatus::Completed));
}

#[tokio::test]
async fn test_resume_keeps_differences_found_before_interruption() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_for(&["shop.orders", "shop.items"], "");
    let (src, tgt) = two_tables();

    let tracker = Arc::new(FileJobTracker::open(&state_path, &config.hash()).unwrap());
    let job_id = job_with_orders_finished(&tracker, &orders_finished(false)).await;

    let resumed = Orchestrator::with_sessions(config, src.clone(), tgt.clone())
        .with_tracker(tracker.clone())
        .resume(&job_id)
        .await
        .unwrap();

    assert_eq!(resumed.status, "completed");
    assert_eq!(resumed.tables_total, 2);
    assert_eq!(resumed.tables_equal, 1);
    assert_eq!(resumed.tables_different, 1);
    assert_eq!(resumed.different_tables, vec!["shop.orders => shop.orders".to_string()]);
    assert!(!resumed.is_equal());

    let summary = tracker.job_summary(&job_id).await.unwrap();
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.total_tables, 2);
    assert_eq!(summary.tables_different, 1);
}

#[tokio::test]
async fn test_resume_keeps_failures_recorded_before_interruption() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_for(&["shop.orders", "shop.items"], "");
    let (src, tgt) = two_tables();

    let tracker = Arc::new(FileJobTracker::open(&state_path, &config.hash()).unwrap());
    let failure = TableComparisonUpdate::failed("connection reset");
    let job_id = job_with_orders_finished(&tracker, &failure).await;

    let resumed = Orchestrator::with_sessions(config, src.clone(), tgt.clone())
        .with_tracker(tracker.clone())
        .resume(&job_id)
        .await
        .unwrap();

    assert_eq!(resumed.status, "failed");
    assert_eq!(resumed.tables_equal, 1);
    assert_eq!(resumed.tables_failed, 1);
    assert_eq!(resumed.failed_tables[0].pair, "shop.orders => shop.orders");
    assert_eq!(resumed.failed_tables[0].error, "connection reset");
    assert_eq!(tracker.job_status(&job_id).await, Some(JobStatus::Failed));
}

#[tokio::test]
async fn test_resume_refuses_changed_config() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_for(&["shop.orders"], "");

    let tracker = FileJobTracker::open(&state_path, &config.hash()).unwrap();
    tracker.create_job("source", "target").await.unwrap();
    drop(tracker);

    let changed = config_for(&["shop.orders"], "  superset_as_equal: true\n");
    assert!(FileJobTracker::open_existing(&state_path, &changed.hash()).is_err());

    let more_retries = config_for(&["shop.orders"], "  retries: 7\n");
    assert!(FileJobTracker::open_existing(&state_path, &more_retries.hash()).is_ok());
}
