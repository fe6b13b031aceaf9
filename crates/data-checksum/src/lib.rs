//! # data-checksum
//!
//! Online consistency checking between a MySQL source and target table.
//!
//! Each table pair is split into ordered key-range chunks. Every chunk is
//! fingerprinted on both sides with a CRC32-based checksum computed inside MySQL,
//! and the fingerprints are compared. Features:
//!
//! - **Two check levels**: an XOR aggregate per chunk, or ordered per-row
//!   checksums that let the target be a superset of the source
//! - **Row-count precheck** that short-circuits clearly different tables
//! - **Differential analysis** listing source-only, target-only and modified keys
//! - **Time-range mode** that compares fixed datetime windows instead of key ranges
//! - **Job tracking** in MySQL or a signed JSON file, with resume
//!
//! ## Example
//!
//! ```rust,no_run
//! use data_checksum::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> data_checksum::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("{}/{} pairs equal", result.tables_equal, result.tables_total);
//!     Ok(())
//! }
//! ```
//!
//! ## Test double
//!
//! [`MemorySession`] and [`MemoryTable`] are exported so integration tests and
//! downstream crates can drive the engine without a server. They are not a
//! storage engine: fingerprints use CRC32C and never match MySQL's.

pub mod builder;
pub mod checksum;
pub mod config;
pub mod core;
pub mod differ;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod state;

// Re-exports for convenient access
pub use checksum::{
    ChecksumContext, ChecksumSettings, TableCheckResult, TableChecker, TableOutcome,
};
pub use config::{ChecksumConfig, Config, ConnectionConfig, TablesConfig, TrackingConfig};
pub use core::{CheckLevel, ChunkRange, ColumnValues, SqlValue, TablePair, TableRef};
pub use differ::{DifferenceReport, TableDiffer};
pub use error::{ChecksumError, Result};
pub use orchestrator::{HealthCheckResult, JobResult, Orchestrator, ProgressUpdate};
pub use session::{ChecksumSession, MemorySession, MemoryTable, MysqlSession};
pub use state::{FileJobTracker, JobTracker, MysqlJobTracker, NoOpJobTracker};
