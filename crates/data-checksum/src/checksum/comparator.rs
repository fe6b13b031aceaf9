//! Chunk fingerprint comparison.

use std::time::Instant;

use tracing::debug;

use super::context::{ChecksumContext, ChunkOutcome};
use crate::core::{CheckLevel, ColumnValues};
use crate::error::{ChecksumError, Result};
use crate::session::ChecksumRequest;

/// True when every element of `source` appears in `target` in the same relative order.
pub fn is_ordered_subsequence(source: &[String], target: &[String]) -> bool {
    let mut remaining = target.iter();
    source.iter().all(|s| remaining.any(|t| t == s))
}

/// Decide whether two chunk fingerprints agree.
///
/// Identical sequences are always equal. At superset level the source may also be
/// an ordered subsequence of the target.
pub fn chunk_results_equal(source: &[String], target: &[String], level: CheckLevel) -> bool {
    if source == target {
        return true;
    }
    level == CheckLevel::Superset && is_ordered_subsequence(source, target)
}

impl ChecksumContext {
    /// Fingerprint the current chunk on both sides and compare.
    ///
    /// Both fetches run concurrently and both finish before either result is
    /// looked at. A source error wins over a target error.
    pub async fn compare_chunk(&self) -> Result<ChunkOutcome> {
        let range = self.range.as_ref().ok_or_else(|| {
            ChecksumError::query(
                self.table.source().to_string(),
                "no chunk bounds computed before comparison",
            )
        })?;
        let request = ChecksumRequest {
            check_columns: &self.check_columns,
            key: &self.unique_key,
            range,
            level: self.settings.level,
        };

        let started = Instant::now();
        let (source, target) = tokio::join!(
            self.source.range_checksum(self.table.source(), &request),
            self.target.range_checksum(self.table.target(), &request),
        );
        let source = source?;
        let target = target?;

        let equal = chunk_results_equal(&source, &target, self.settings.level);
        debug!(
            "{}: chunk {} {} ({} vs {} values)",
            self.table.pair(),
            self.table.iteration(),
            if equal { "equal" } else { "different" },
            source.len(),
            target.len()
        );

        Ok(ChunkOutcome {
            equal,
            duration: started.elapsed(),
            source,
            target,
        })
    }

    /// Key tuple and row fingerprint of every row in the current chunk, from both sides.
    pub async fn fetch_row_checksums(&self) -> Result<(RowChecksums, RowChecksums)> {
        let range = self.range.as_ref().ok_or_else(|| {
            ChecksumError::query(
                self.table.source().to_string(),
                "no chunk bounds computed before row comparison",
            )
        })?;

        let (source, target) = tokio::join!(
            self.source.row_checksums(
                self.table.source(),
                &self.check_columns,
                &self.unique_key,
                range
            ),
            self.target.row_checksums(
                self.table.target(),
                &self.check_columns,
                &self.unique_key,
                range
            ),
        );
        Ok((source?, target?))
    }
}

/// `(key tuple, row checksum)` pairs in key order.
pub type RowChecksums = Vec<(ColumnValues, String)>;
