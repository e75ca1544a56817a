//! Poll timing policy.
//!
//! The loop polls immediately while the feed keeps producing comments,
//! waits the poll interval once it has caught up, and waits a fixed backoff
//! after a failed cycle.

use std::time::Duration;

/// Lowest poll interval the upstream API tolerates, in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Default poll interval, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default sleep after a failed poll cycle, in seconds.
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 60;

/// What happened in the last poll cycle, as far as timing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    /// The feed returned comments; more may be waiting.
    Busy,
    /// The feed had nothing new.
    CaughtUp,
    /// The cycle failed.
    Failed,
}

/// Fixed-interval polling with a floor and a fixed error backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    poll_interval: Duration,
    error_backoff: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL_SECS, DEFAULT_ERROR_BACKOFF_SECS)
    }
}

impl PollSchedule {
    /// Build a schedule, raising `poll_interval_secs` to the floor if needed.
    pub fn new(poll_interval_secs: u64, error_backoff_secs: u64) -> Self {
        Self {
            poll_interval: Duration::from_secs(effective_poll_interval(poll_interval_secs)),
            error_backoff: Duration::from_secs(error_backoff_secs),
        }
    }

    /// Wait between polls once caught up.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait after a failed cycle.
    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    /// How long to wait before the next poll.
    pub fn delay_after(&self, result: CycleResult) -> Duration {
        match result {
            CycleResult::Busy => Duration::ZERO,
            CycleResult::CaughtUp => self.poll_interval,
            CycleResult::Failed => self.error_backoff,
        }
    }
}

/// Apply the minimum poll interval.
pub fn effective_poll_interval(requested_secs: u64) -> u64 {
    requested_secs.max(MIN_POLL_INTERVAL_SECS)
}
