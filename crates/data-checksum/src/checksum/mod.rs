//! Chunked range-checksum engine.
//!
//! A [`ChecksumContext`] owns everything known about one table pair: sessions,
//! resolved columns, the unique key, global key bounds and the current chunk.
//! The engine is split by concern:
//!
//! - `introspect`: check columns and unique key selection
//! - `iterator`: key-range chunk boundaries
//! - `comparator`: chunk fingerprints and the equality policy
//! - `precheck`: row-count short circuit
//! - `time_range`: fixed-width datetime windows instead of key ranges
//! - `runner`: the per-pair loop that ties them together

pub mod comparator;
pub mod context;
pub mod introspect;
pub mod iterator;
pub mod precheck;
pub mod runner;
pub mod time_range;

pub use comparator::{chunk_results_equal, is_ordered_subsequence, RowChecksums};
pub use context::{ChecksumContext, ChecksumSettings, ChunkOutcome, ChunkProgress, TableContext};
pub use introspect::select_unique_key;
pub use precheck::{count_policy, PrecheckOutcome};
pub use runner::{TableCheckResult, TableChecker, TableOutcome};
pub use time_range::TimeWindowSettings;
