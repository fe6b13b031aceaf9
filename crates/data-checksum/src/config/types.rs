//! Configuration type definitions with auto-tuning based on system resources.

use std::fmt;
use std::path::PathBuf;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::checksum::TimeWindowSettings;
use crate::core::{CheckLevel, DATETIME_FORMAT};
use crate::error::{ChecksumError, Result};

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: i64 = 10;
/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: i64 = 100_000;
/// Chunk size when none is configured.
pub const DEFAULT_CHUNK_SIZE: i64 = 1_000;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Side whose data is authoritative.
    pub source: ConnectionConfig,

    /// Side being verified against the source.
    pub target: ConnectionConfig,

    /// Which table pairs to compare.
    #[serde(default)]
    pub tables: TablesConfig,

    /// Comparison behavior.
    #[serde(default)]
    pub checksum: ChecksumConfig,

    /// Job tracking. No tracking when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingConfig>,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.apply_tuning(&resources);
        self
    }

    fn apply_tuning(&mut self, resources: &SystemResources) {
        self.checksum = std::mem::take(&mut self.checksum).with_auto_tuning(resources);
        let workers = self.checksum.get_workers();

        // Each running pair holds at most one connection per side, plus one for the differ.
        let conns = (workers * 2).clamp(4, 64);
        if self.source.max_connections.is_none() {
            self.source.max_connections = Some(conns);
        }
        if self.target.max_connections.is_none() {
            self.target.max_connections = Some(conns);
        }

        info!(
            "Auto-tuned config: workers={}, chunk_size={}, source_conns={}, target_conns={}",
            workers,
            self.checksum.get_chunk_size(),
            self.source.get_max_connections(),
            self.target.get_max_connections(),
        );
    }
}

/// MySQL connection settings for one side of the comparison.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type (always "mysql").
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Default database for the connection. Tables are always qualified, so this is optional.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,

    /// Connect and pool acquire timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pool size. Auto-tuned from the worker count if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl ConnectionConfig {
    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(8)
    }

    /// `host:port`, used to label the side in job records.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// One explicitly configured pair. The target defaults to the source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePairConfig {
    /// `database.table`
    pub source: String,

    /// `database.table`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Table pair selection.
///
/// Explicit `pairs` take precedence. Otherwise every base table of each
/// `source_databases` entry is listed, filtered and mapped to a target name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default)]
    pub pairs: Vec<TablePairConfig>,

    #[serde(default)]
    pub source_databases: Vec<String>,

    /// Only these tables when non-empty.
    #[serde(default)]
    pub source_tables: Vec<String>,

    /// Only tables whose name matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table_regex: Option<String>,

    /// Positional target database for each source database.
    #[serde(default)]
    pub target_databases: Vec<String>,

    /// Positional target table for each selected source table.
    #[serde(default)]
    pub target_tables: Vec<String>,

    #[serde(default)]
    pub target_database_as_source: bool,

    #[serde(default = "default_true")]
    pub target_table_as_source: bool,

    #[serde(default)]
    pub target_database_suffix: String,

    #[serde(default)]
    pub target_table_suffix: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            source_databases: Vec::new(),
            source_tables: Vec::new(),
            source_table_regex: None,
            target_databases: Vec::new(),
            target_tables: Vec::new(),
            target_database_as_source: false,
            target_table_as_source: true,
            target_database_suffix: String::new(),
            target_table_suffix: String::new(),
        }
    }
}

/// Comparison behavior.
/// Performance fields use Option<T> to distinguish "not set" (auto-tuned) from explicit values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChecksumConfig {
    /// Rows per chunk, clamped to [10, 100000] (default: 1000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Treat a target holding extra rows as equal.
    #[serde(default)]
    pub superset_as_equal: bool,

    /// Comma-separated columns to compare. All columns of the source table when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,

    /// Run row-level analysis for tables with unequal chunks.
    #[serde(default)]
    pub differential: bool,

    /// Skip the row-count precheck.
    #[serde(default)]
    pub ignore_row_count_check: bool,

    /// Concurrent table pairs. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Attempts per pair on transient database errors (default: 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Text added to the comment of every statement.
    #[serde(default)]
    pub query_hint: String,

    /// Iterate fixed windows over a datetime column instead of key ranges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRangeConfig>,
}

impl ChecksumConfig {
    /// Apply auto-tuned defaults based on system resources.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Workers: half the cores, at least 2 and at most 16
        if self.workers.is_none() {
            self.workers = Some((resources.cpu_cores / 2).clamp(2, 16));
        }
        self
    }

    /// Effective chunk size, clamped to the accepted range.
    pub fn get_chunk_size(&self) -> i64 {
        self.chunk_size
            .map(|size| (size.min(MAX_CHUNK_SIZE as usize) as i64).clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE))
            .unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }

    pub fn get_retries(&self) -> u32 {
        self.retries.unwrap_or(10)
    }

    pub fn level(&self) -> CheckLevel {
        CheckLevel::from_superset_flag(self.superset_as_equal)
    }
}

/// Time-range iteration settings as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeConfig {
    /// Datetime column the windows are taken over.
    pub column: String,

    /// `YYYY-MM-DD HH:MM:SS`, inclusive.
    pub begin: String,

    /// `YYYY-MM-DD HH:MM:SS`, exclusive.
    pub end: String,

    /// Window width in seconds.
    pub step_secs: u64,
}

impl TimeRangeConfig {
    /// Parse bounds and step into iteration settings.
    pub fn parse(&self) -> Result<TimeWindowSettings> {
        if self.column.trim().is_empty() {
            return Err(ChecksumError::Config(
                "checksum.time_range.column is required".into(),
            ));
        }
        let begin = parse_datetime(&self.begin, "checksum.time_range.begin")?;
        let end = parse_datetime(&self.end, "checksum.time_range.end")?;
        if end < begin {
            return Err(ChecksumError::Config(
                "illegal time range, end is before begin".into(),
            ));
        }
        if self.step_secs == 0 {
            return Err(ChecksumError::Config(
                "checksum.time_range.step_secs must be at least 1".into(),
            ));
        }
        let step_secs = i64::try_from(self.step_secs).map_err(|_| {
            ChecksumError::Config("checksum.time_range.step_secs is too large".into())
        })?;
        let step = ChronoDuration::try_seconds(step_secs).ok_or_else(|| {
            ChecksumError::Config("checksum.time_range.step_secs is too large".into())
        })?;
        Ok(TimeWindowSettings::new(self.column.trim(), begin, end, step))
    }
}

fn parse_datetime(value: &str, field: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT).map_err(|e| {
        ChecksumError::Config(format!(
            "{} '{}' is not a valid datetime (expected YYYY-MM-DD HH:MM:SS[.ffffff]): {}",
            field, value, e
        ))
    })
}

/// Where job progress is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingBackend {
    /// Tables in a MySQL database.
    #[default]
    Mysql,

    /// A signed JSON state file.
    File,
}

/// Job tracking settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub backend: TrackingBackend,

    #[serde(default)]
    pub host: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Database holding the tracking tables (default: "_data_checksum").
    #[serde(default = "default_tracking_database")]
    pub database: String,

    /// State file for the file backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl fmt::Debug for TrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("path", &self.path)
            .finish()
    }
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_tracking_database() -> String {
    "_data_checksum".to_string()
}

fn default_true() -> bool {
    true
}
