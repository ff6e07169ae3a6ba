// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry scheduling from a fixed backoff table.
//!
//! The table is indexed by the number of failed attempt cycles (`runs`).
//! Its length is the automatic retry ceiling: once `runs` reaches it, the
//! meeting is exhausted and needs manual attention.

use chrono::{DateTime, Duration, Utc};

use crate::config::ConfigError;
use crate::flow::ArchiveFlowStatus;

/// Default backoff, in minutes.
pub const DEFAULT_BACKOFF_MINUTES: [u32; 5] = [5, 30, 240, 1440, 1440];

/// Ordered minute offsets between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffTable(Vec<u32>);

/// Where a meeting stands with respect to automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// May run now.
    Eligible,
    /// Must wait until `next_run`.
    Waiting { next_run: DateTime<Utc> },
    /// `runs` reached the table length.
    Exhausted { runs: u32 },
    /// The flow already finished.
    Finished,
}

impl BackoffTable {
    /// Create a table. It must be non-empty and every offset must be positive.
    pub fn new(minutes: Vec<u32>) -> Result<Self, ConfigError> {
        if minutes.is_empty() {
            return Err(ConfigError::Invalid(
                "MINUTES_ARCHIVE_BACKOFF_MINUTES",
                "backoff table must not be empty",
            ));
        }
        if minutes.contains(&0) {
            return Err(ConfigError::Invalid(
                "MINUTES_ARCHIVE_BACKOFF_MINUTES",
                "backoff offsets must be positive",
            ));
        }
        Ok(Self(minutes))
    }

    /// Parse a comma separated list such as `5,30,240`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let minutes = raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>().map_err(|_| {
                    ConfigError::Invalid(
                        "MINUTES_ARCHIVE_BACKOFF_MINUTES",
                        "expected comma separated minutes",
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(minutes)
    }

    pub fn minutes(&self) -> &[u32] {
        &self.0
    }

    /// Maximum number of automatic retries.
    pub fn max_runs(&self) -> u32 {
        u32::try_from(self.0.len()).unwrap_or(u32::MAX)
    }

    /// Delay before the next attempt after `runs` failed cycles.
    ///
    /// `None` once the table is exhausted.
    pub fn delay_for_attempt(&self, runs: u32) -> Option<Duration> {
        let index = usize::try_from(runs).ok()?;
        self.0
            .get(index)
            .map(|minutes| Duration::minutes(i64::from(*minutes)))
    }

    /// `now + table[runs]`, or `None` once the table is exhausted.
    pub fn compute_next_run(&self, runs: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.delay_for_attempt(runs).map(|delay| now + delay)
    }

    /// Classify a flow. Eligible iff `runs < len` and `nextRun <= now`.
    pub fn eligibility(&self, flow: &ArchiveFlowStatus, now: DateTime<Utc>) -> Eligibility {
        if flow.finished {
            return Eligibility::Finished;
        }
        if flow.runs >= self.max_runs() {
            return Eligibility::Exhausted { runs: flow.runs };
        }
        if flow.next_run > now {
            return Eligibility::Waiting {
                next_run: flow.next_run,
            };
        }
        Eligibility::Eligible
    }

    pub fn is_eligible(&self, flow: &ArchiveFlowStatus, now: DateTime<Utc>) -> bool {
        self.eligibility(flow, now) == Eligibility::Eligible
    }

    /// Advance the schedule after a failed stage.
    ///
    /// `runs` is incremented and `nextRun` becomes `now + table[runs_before]`.
    /// `nextRun` never moves backwards, and is left alone when the table is
    /// already exhausted.
    pub fn schedule_failure(&self, flow: &mut ArchiveFlowStatus, now: DateTime<Utc>) {
        if let Some(next_run) = self.compute_next_run(flow.runs, now)
            && next_run > flow.next_run
        {
            flow.next_run = next_run;
        }
        flow.runs = flow.runs.saturating_add(1);
    }
}

impl Default for BackoffTable {
    fn default() -> Self {
        Self(DEFAULT_BACKOFF_MINUTES.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_compute_next_run_follows_table() {
        let table = BackoffTable::default();
        for (runs, minutes) in DEFAULT_BACKOFF_MINUTES.iter().enumerate() {
            let next = table.compute_next_run(runs as u32, now()).unwrap();
            assert_eq!(next - now(), Duration::minutes(i64::from(*minutes)));
        }
        assert_eq!(table.compute_next_run(5, now()), None);
        assert_eq!(table.compute_next_run(42, now()), None);
    }

    #[test]
    fn test_eligibility() {
        let table = BackoffTable::default();
        let mut flow = ArchiveFlowStatus::new(now());
        assert_eq!(table.eligibility(&flow, now()), Eligibility::Eligible);

        flow.next_run = now() + Duration::minutes(1);
        assert!(matches!(table.eligibility(&flow, now()), Eligibility::Waiting { .. }));

        // nextRun == now is eligible
        assert!(table.is_eligible(&flow, now() + Duration::minutes(1)));

        flow.runs = 5;
        assert_eq!(
            table.eligibility(&flow, now() + Duration::days(10)),
            Eligibility::Exhausted { runs: 5 }
        );

        flow.finish(now());
        assert_eq!(table.eligibility(&flow, now()), Eligibility::Finished);
    }

    #[test]
    fn test_schedule_failure() {
        let table = BackoffTable::default();
        let mut flow = ArchiveFlowStatus::new(now());

        table.schedule_failure(&mut flow, now());
        assert_eq!(flow.runs, 1);
        assert_eq!(flow.next_run, now() + Duration::minutes(5));

        table.schedule_failure(&mut flow, now());
        assert_eq!(flow.runs, 2);
        assert_eq!(flow.next_run, now() + Duration::minutes(30));
    }

    #[test]
    fn test_next_run_never_moves_backwards() {
        let table = BackoffTable::default();
        let mut flow = ArchiveFlowStatus::new(now());
        flow.next_run = now() + Duration::days(3);
        table.schedule_failure(&mut flow, now());
        assert_eq!(flow.runs, 1);
        assert_eq!(flow.next_run, now() + Duration::days(3));
    }

    #[test]
    fn test_schedule_failure_when_exhausted() {
        let table = BackoffTable::new(vec![1]).unwrap();
        let mut flow = ArchiveFlowStatus::new(now());
        table.schedule_failure(&mut flow, now());
        let next_run = flow.next_run;
        table.schedule_failure(&mut flow, now() + Duration::hours(1));
        assert_eq!(flow.runs, 2);
        assert_eq!(flow.next_run, next_run);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            BackoffTable::parse("5, 30,240").unwrap().minutes(),
            &[5, 30, 240]
        );
        assert!(BackoffTable::parse("").is_err());
        assert!(BackoffTable::parse("5,0").is_err());
        assert!(BackoffTable::parse("5,abc").is_err());
    }
}
