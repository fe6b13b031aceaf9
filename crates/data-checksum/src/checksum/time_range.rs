//! Fixed-width windows over a datetime column.

use std::time::Instant;

use chrono::{Duration as ChronoDuration, NaiveDateTime};

use super::comparator::chunk_results_equal;
use super::context::{ChecksumContext, ChunkOutcome};
use crate::core::TimeWindow;
use crate::error::Result;
use crate::session::TimeWindowRequest;

/// Column and bounds for time-range iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindowSettings {
    pub column: String,
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
    pub step: ChronoDuration,
}

impl TimeWindowSettings {
    pub fn new(
        column: impl Into<String>,
        begin: NaiveDateTime,
        end: NaiveDateTime,
        step: ChronoDuration,
    ) -> Self {
        Self {
            column: column.into(),
            begin,
            end,
            step,
        }
    }

    /// Window `index`, or `None` once its lower bound reaches `end`.
    pub fn window(&self, index: u64) -> Option<TimeWindow> {
        if self.step <= ChronoDuration::zero() {
            return None;
        }
        let offset = self.step.checked_mul(i32::try_from(index).ok()?)?;
        let lower = self.begin.checked_add_signed(offset)?;
        if lower >= self.end {
            return None;
        }
        let upper = lower
            .checked_add_signed(self.step)
            .map_or(self.end, |upper| upper.min(self.end));
        Some(TimeWindow::new(lower, upper))
    }

    /// Every window in order.
    pub fn windows(&self) -> impl Iterator<Item = TimeWindow> + '_ {
        (0u64..).map_while(move |index| self.window(index))
    }
}

impl ChecksumContext {
    /// Fingerprint one time window on both sides and compare.
    pub async fn compare_time_window(&self, window: &TimeWindow) -> Result<ChunkOutcome> {
        let column = self
            .settings
            .time_range
            .as_ref()
            .map(|t| t.column.as_str())
            .unwrap_or_default();
        let request = TimeWindowRequest {
            check_columns: &self.check_columns,
            key: &self.unique_key,
            time_column: column,
            window: *window,
            level: self.settings.level,
        };

        let started = Instant::now();
        let (source, target) = tokio::join!(
            self.source.time_window_checksum(self.table.source(), &request),
            self.target.time_window_checksum(self.table.target(), &request),
        );
        let source = source?;
        let target = target?;

        Ok(ChunkOutcome {
            equal: chunk_results_equal(&source, &target, self.settings.level),
            duration: started.elapsed(),
            source,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DATETIME_FORMAT;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).unwrap()
    }

    #[test]
    fn test_windows_cover_range_and_cap_last() {
        let settings = TimeWindowSettings::new(
            "updated_at",
            at("2024-01-01 00:00:00"),
            at("2024-01-01 02:30:00"),
            ChronoDuration::hours(1),
        );
        let windows: Vec<TimeWindow> = settings.windows().collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].begin, at("2024-01-01 00:00:00"));
        assert_eq!(windows[1].begin, windows[0].end);
        assert_eq!(windows[2].begin, at("2024-01-01 02:00:00"));
        assert_eq!(windows[2].end, at("2024-01-01 02:30:00"));
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let settings = TimeWindowSettings::new(
            "updated_at",
            at("2024-01-01 00:00:00"),
            at("2024-01-01 02:00:00"),
            ChronoDuration::hours(1),
        );
        assert_eq!(settings.windows().count(), 2);
    }

    #[test]
    fn test_empty_range_and_bad_step() {
        let begin = at("2024-01-01 00:00:00");
        let empty = TimeWindowSettings::new("t", begin, begin, ChronoDuration::hours(1));
        assert_eq!(empty.windows().count(), 0);

        let zero_step = TimeWindowSettings::new(
            "t",
            begin,
            at("2024-01-02 00:00:00"),
            ChronoDuration::zero(),
        );
        assert_eq!(zero_step.windows().count(), 0);
    }
}
