//! Row-count precheck.

use tracing::{debug, warn};

use super::context::ChecksumContext;
use crate::core::CheckLevel;
use crate::error::Result;

/// Counts on both sides and what they imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecheckOutcome {
    pub counts_equal: bool,
    /// False when the counts alone prove the tables differ.
    pub continue_chunking: bool,
    pub source_count: i64,
    pub target_count: i64,
}

/// `(counts_equal, continue_chunking)` for a pair of counts.
///
/// Equal counts never prove equal contents, so chunking always follows. At
/// superset level a larger target is tolerated; any other difference is conclusive.
pub fn count_policy(source_count: i64, target_count: i64, level: CheckLevel) -> (bool, bool) {
    if source_count == target_count {
        return (true, true);
    }
    let tolerated = level == CheckLevel::Superset && source_count < target_count;
    (false, tolerated)
}

impl ChecksumContext {
    /// Count rows on both sides concurrently and apply [`count_policy`].
    pub async fn precheck_by_count(&self) -> Result<PrecheckOutcome> {
        let (source, target) = tokio::join!(
            self.source.row_count(self.table.source()),
            self.target.row_count(self.table.target()),
        );
        let source_count = source?;
        let target_count = target?;

        let (counts_equal, continue_chunking) =
            count_policy(source_count, target_count, self.settings.level);

        if counts_equal {
            debug!("{}: both sides have {} rows", self.table.pair(), source_count);
        } else {
            warn!(
                "{}: row counts differ (source {}, target {})",
                self.table.pair(),
                source_count,
                target_count
            );
        }

        Ok(PrecheckOutcome {
            counts_equal,
            continue_chunking,
            source_count,
            target_count,
        })
    }
}
