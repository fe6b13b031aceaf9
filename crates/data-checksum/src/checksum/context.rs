//! Per-pair comparison state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::time_range::TimeWindowSettings;
use crate::config::{ChecksumConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::core::{CheckLevel, ChunkRange, ColumnList, ColumnValues, TablePair, TableRef};
use crate::error::Result;
use crate::session::ChecksumSession;

/// Identity and iteration counter of one table pair.
///
/// `iteration` counts completed chunks and is only advanced through `&mut self`.
#[derive(Debug, Clone)]
pub struct TableContext {
    pair: TablePair,
    iteration: u64,
    finished: bool,
}

impl TableContext {
    pub fn new(pair: TablePair) -> Self {
        Self {
            pair,
            iteration: 0,
            finished: false,
        }
    }

    pub fn pair(&self) -> &TablePair {
        &self.pair
    }

    pub fn source(&self) -> &TableRef {
        &self.pair.source
    }

    pub fn target(&self) -> &TableRef {
        &self.pair.target
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Mark the current chunk complete.
    pub fn advance(&mut self) {
        self.iteration += 1;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
    }
}

/// Knobs for one pair's comparison.
#[derive(Debug, Clone)]
pub struct ChecksumSettings {
    pub chunk_size: i64,
    pub level: CheckLevel,
    /// Comma-separated columns; all source columns when `None`.
    pub columns: Option<String>,
    pub differential: bool,
    pub ignore_row_count_check: bool,
    pub query_hint: String,
    pub time_range: Option<TimeWindowSettings>,
}

impl Default for ChecksumSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            level: CheckLevel::Aggregate,
            columns: None,
            differential: false,
            ignore_row_count_check: false,
            query_hint: String::new(),
            time_range: None,
        }
    }
}

impl ChecksumSettings {
    pub fn from_config(config: &ChecksumConfig) -> Result<Self> {
        let time_range = match &config.time_range {
            Some(range) => Some(range.parse()?),
            None => None,
        };
        Ok(Self {
            chunk_size: config.get_chunk_size(),
            level: config.level(),
            columns: config.columns.clone(),
            differential: config.differential,
            ignore_row_count_check: config.ignore_row_count_check,
            query_hint: config.query_hint.clone(),
            time_range,
        })
    }

    /// Chunk size within [10, 100000].
    pub fn effective_chunk_size(&self) -> i64 {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }
}

/// Ledger entry for one evaluated chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunk_number: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_checksum: String,
    pub target_checksum: String,
    pub equal: bool,
    pub error: Option<String>,
}

/// Result of evaluating one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub equal: bool,
    pub duration: Duration,
    pub source: Vec<String>,
    pub target: Vec<String>,
}

impl ChunkOutcome {
    pub fn source_checksum(&self) -> String {
        self.source.join(",")
    }

    pub fn target_checksum(&self) -> String {
        self.target.join(",")
    }
}

/// Everything needed to compare one table pair.
///
/// Chunk N's upper bound becomes chunk N+1's lower bound.
pub struct ChecksumContext {
    pub table: TableContext,
    pub(super) source: Arc<dyn ChecksumSession>,
    pub(super) target: Arc<dyn ChecksumSession>,
    pub(super) settings: ChecksumSettings,
    pub(super) check_columns: ColumnList,
    pub(super) unique_key: ColumnList,
    pub(super) index_name: String,
    pub(super) global_min: Option<ColumnValues>,
    pub(super) global_max: Option<ColumnValues>,
    pub(super) range: Option<ChunkRange>,
    pub(super) progress: BTreeMap<u64, ChunkProgress>,
}

impl ChecksumContext {
    pub fn new(
        pair: TablePair,
        source: Arc<dyn ChecksumSession>,
        target: Arc<dyn ChecksumSession>,
        settings: ChecksumSettings,
    ) -> Self {
        Self {
            table: TableContext::new(pair),
            source,
            target,
            settings,
            check_columns: ColumnList::default(),
            unique_key: ColumnList::default(),
            index_name: String::new(),
            global_min: None,
            global_max: None,
            range: None,
            progress: BTreeMap::new(),
        }
    }

    /// Fresh iteration over the same pair, sharing sessions and resolved columns.
    pub fn fork_for_differential(&self) -> Self {
        Self {
            table: TableContext::new(self.table.pair().clone()),
            source: Arc::clone(&self.source),
            target: Arc::clone(&self.target),
            settings: self.settings.clone(),
            check_columns: self.check_columns.clone(),
            unique_key: self.unique_key.clone(),
            index_name: self.index_name.clone(),
            global_min: None,
            global_max: None,
            range: None,
            progress: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &ChecksumSettings {
        &self.settings
    }

    pub fn check_columns(&self) -> &ColumnList {
        &self.check_columns
    }

    pub fn unique_key(&self) -> &ColumnList {
        &self.unique_key
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn global_min(&self) -> Option<&ColumnValues> {
        self.global_min.as_ref()
    }

    pub fn global_max(&self) -> Option<&ColumnValues> {
        self.global_max.as_ref()
    }

    /// Bounds of the most recently computed chunk.
    pub fn range(&self) -> Option<&ChunkRange> {
        self.range.as_ref()
    }

    pub fn progress(&self) -> &BTreeMap<u64, ChunkProgress> {
        &self.progress
    }

    /// Add a ledger entry for the current iteration. Existing entries are never replaced.
    pub fn record_progress(&mut self, entry: ChunkProgress) {
        self.progress.entry(entry.chunk_number).or_insert(entry);
    }

    pub(super) fn hint(&self) -> String {
        format!(
            "{} iteration:{}",
            self.settings.query_hint,
            self.table.iteration()
        )
    }
}
