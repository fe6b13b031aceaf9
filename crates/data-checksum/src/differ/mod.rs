//! Row-level difference analysis.
//!
//! Runs after the chunk loop has found at least one unequal chunk. Walks the same
//! key-range chunks again, this time fetching a fingerprint per row, and classifies
//! every key as identical, modified, or present on one side only.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checksum::ChecksumContext;
use crate::core::{ColumnValues, TablePair};
use crate::error::{ChecksumError, Result};

/// Differences kept per chunk.
pub const MAX_SAMPLES_PER_CHUNK: usize = 10;

/// Differences kept per report.
pub const MAX_REPORTED_DIFFERENCES: usize = 100;

/// Differences written to the log.
const MAX_LOGGED_DIFFERENCES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceKind {
    SourceOnly,
    TargetOnly,
    Modified,
}

impl DifferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DifferenceKind::SourceOnly => "source_only",
            DifferenceKind::TargetOnly => "target_only",
            DifferenceKind::Modified => "modified",
        }
    }
}

/// One key that differs between the sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDifference {
    pub key: ColumnValues,
    pub kind: DifferenceKind,
    pub source_checksum: Option<String>,
    pub target_checksum: Option<String>,
}

impl RecordDifference {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "key": self.key.to_json(),
            "kind": self.kind.as_str(),
            "source_checksum": self.source_checksum,
            "target_checksum": self.target_checksum,
        })
    }
}

/// Classification of one chunk's rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkDifferences {
    pub source_only: u64,
    pub target_only: u64,
    pub modified: u64,
    pub identical: u64,
    /// First differences found, at most [`MAX_SAMPLES_PER_CHUNK`].
    pub samples: Vec<RecordDifference>,
}

impl ChunkDifferences {
    fn push(&mut self, difference: RecordDifference) {
        match difference.kind {
            DifferenceKind::SourceOnly => self.source_only += 1,
            DifferenceKind::TargetOnly => self.target_only += 1,
            DifferenceKind::Modified => self.modified += 1,
        }
        if self.samples.len() < MAX_SAMPLES_PER_CHUNK {
            self.samples.push(difference);
        }
    }

    pub fn total(&self) -> u64 {
        self.source_only + self.target_only + self.modified
    }
}

/// Classify rows of one chunk.
///
/// Source rows are walked in key order first, then target rows whose key is not
/// on the source side.
pub fn compare_record_sets(
    source: &[(ColumnValues, String)],
    target: &[(ColumnValues, String)],
) -> ChunkDifferences {
    let target_by_key: HashMap<&ColumnValues, &String> =
        target.iter().map(|(key, checksum)| (key, checksum)).collect();
    let source_keys: HashSet<&ColumnValues> = source.iter().map(|(key, _)| key).collect();

    let mut result = ChunkDifferences::default();

    for (key, source_checksum) in source {
        match target_by_key.get(key) {
            Some(target_checksum) if *target_checksum == source_checksum => result.identical += 1,
            Some(target_checksum) => result.push(RecordDifference {
                key: key.clone(),
                kind: DifferenceKind::Modified,
                source_checksum: Some(source_checksum.clone()),
                target_checksum: Some((*target_checksum).clone()),
            }),
            None => result.push(RecordDifference {
                key: key.clone(),
                kind: DifferenceKind::SourceOnly,
                source_checksum: Some(source_checksum.clone()),
                target_checksum: None,
            }),
        }
    }

    for (key, target_checksum) in target {
        if !source_keys.contains(key) {
            result.push(RecordDifference {
                key: key.clone(),
                kind: DifferenceKind::TargetOnly,
                source_checksum: None,
                target_checksum: Some(target_checksum.clone()),
            });
        }
    }

    result
}

/// Row-level differences across a whole table pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferenceReport {
    pub pair: TablePair,
    pub source_only: u64,
    pub target_only: u64,
    pub modified: u64,
    pub identical: u64,
    pub chunks_analyzed: u64,
    pub differences: Vec<RecordDifference>,
    /// More differences were found than kept.
    pub truncated: bool,
}

impl DifferenceReport {
    pub fn new(pair: TablePair) -> Self {
        Self {
            pair,
            source_only: 0,
            target_only: 0,
            modified: 0,
            identical: 0,
            chunks_analyzed: 0,
            differences: Vec::new(),
            truncated: false,
        }
    }

    pub fn total_differences(&self) -> u64 {
        self.source_only + self.target_only + self.modified
    }

    /// Fold one chunk into the report.
    pub fn absorb(&mut self, chunk: ChunkDifferences) {
        self.source_only += chunk.source_only;
        self.target_only += chunk.target_only;
        self.modified += chunk.modified;
        self.identical += chunk.identical;
        self.chunks_analyzed += 1;

        if chunk.total() > chunk.samples.len() as u64 {
            self.truncated = true;
        }
        for sample in chunk.samples {
            if self.differences.len() < MAX_REPORTED_DIFFERENCES {
                self.differences.push(sample);
            } else {
                self.truncated = true;
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "source": self.pair.source.to_string(),
            "target": self.pair.target.to_string(),
            "source_only": self.source_only,
            "target_only": self.target_only,
            "modified": self.modified,
            "identical": self.identical,
            "chunks_analyzed": self.chunks_analyzed,
            "truncated": self.truncated,
            "differences": self.differences.iter().map(RecordDifference::to_json).collect::<Vec<_>>(),
        })
    }

    fn log_summary(&self) {
        info!(
            "{}: {} source-only, {} target-only, {} modified, {} identical rows across {} chunks",
            self.pair,
            self.source_only,
            self.target_only,
            self.modified,
            self.identical,
            self.chunks_analyzed
        );
        for difference in self.differences.iter().take(MAX_LOGGED_DIFFERENCES) {
            warn!(
                "{}: {} key [{}] source={} target={}",
                self.pair,
                difference.kind.as_str(),
                difference.key,
                difference.source_checksum.as_deref().unwrap_or("-"),
                difference.target_checksum.as_deref().unwrap_or("-")
            );
        }
        if self.differences.len() > MAX_LOGGED_DIFFERENCES || self.truncated {
            info!(
                "{}: {} differences in total, showing {}",
                self.pair,
                self.total_differences(),
                self.differences.len().min(MAX_LOGGED_DIFFERENCES)
            );
        }
    }
}

/// Walks a forked context chunk by chunk and collects row differences.
pub struct TableDiffer {
    context: ChecksumContext,
    cancel: Option<CancellationToken>,
}

impl TableDiffer {
    /// `context` should be a fresh fork with its columns and key already resolved.
    pub fn new(context: ChecksumContext) -> Self {
        Self {
            context,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    pub async fn analyze_and_report(mut self) -> Result<DifferenceReport> {
        let mut report = DifferenceReport::new(self.context.table.pair().clone());

        self.context.read_global_min_values().await?;
        self.context.read_global_max_values().await?;

        loop {
            if self.is_cancelled() {
                return Err(ChecksumError::Cancelled);
            }
            if !self.context.compute_next_chunk().await? {
                break;
            }

            let (source, target) = self.context.fetch_row_checksums().await?;
            report.absorb(compare_record_sets(&source, &target));
            self.context.table.advance();
        }
        self.context.table.mark_finished();

        report.log_summary();
        Ok(report)
    }
}
