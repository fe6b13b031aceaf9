//! Key-range chunk iteration.
//!
//! Boundaries are always computed on the source table. The first chunk starts at
//! the global minimum (inclusive); every later chunk starts just after the previous
//! chunk's upper bound. The upper bound is the key `chunk_size` rows ahead, or, for
//! the tail of the table, the largest key among the remaining rows.

use tracing::debug;

use super::context::ChecksumContext;
use crate::core::{ChunkRange, ColumnValues};
use crate::error::Result;
use crate::session::{KeyBoundary, RangeEndRequest, RangeEndStrategy};

impl ChecksumContext {
    /// Read the smallest key tuple of the source table. Absent for an empty table.
    pub async fn read_global_min_values(&mut self) -> Result<()> {
        self.global_min = self
            .source
            .key_boundary(self.table.source(), &self.unique_key, KeyBoundary::Min)
            .await?;
        Ok(())
    }

    /// Read the largest key tuple of the source table. Absent for an empty table.
    pub async fn read_global_max_values(&mut self) -> Result<()> {
        self.global_max = self
            .source
            .key_boundary(self.table.source(), &self.unique_key, KeyBoundary::Max)
            .await?;
        Ok(())
    }

    /// Compute the bounds of the next chunk.
    ///
    /// Returns `false` once the key range is exhausted or the table is empty.
    pub async fn compute_next_chunk(&mut self) -> Result<bool> {
        let (Some(global_min), Some(global_max)) = (self.global_min.clone(), self.global_max.clone())
        else {
            return Ok(false);
        };

        let first = self.table.iteration() == 0;
        let lower: ColumnValues = match (&self.range, first) {
            (Some(previous), false) => previous.max.clone(),
            _ => global_min,
        };

        let hint = self.hint();
        let request = RangeEndRequest {
            key: &self.unique_key,
            index_name: &self.index_name,
            range_start: &lower,
            range_max: &global_max,
            chunk_size: self.settings.effective_chunk_size(),
            include_range_start: first,
            hint: &hint,
        };

        let source = self.table.source();
        let upper = match self
            .source
            .range_end(source, &request, RangeEndStrategy::Offset)
            .await?
        {
            Some(upper) => Some(upper),
            None => {
                debug!(
                    "{}: iteration {} falls back to temp-table range end",
                    source,
                    self.table.iteration()
                );
                self.source
                    .range_end(source, &request, RangeEndStrategy::Temptable)
                    .await?
            }
        };

        match upper {
            Some(upper) => {
                debug!(
                    "{}: chunk {} is {}{}, {}]",
                    source,
                    self.table.iteration(),
                    if first { "[" } else { "(" },
                    lower,
                    upper
                );
                self.range = Some(ChunkRange::new(lower, upper, first));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
