//! Security-log monitoring.
//!
//! Two loops run side by side: [`DropLogMonitor`] follows the kernel log for
//! `FWDROP:` lines and alerts on bursts, [`DenyAggregator`] periodically
//! counts DENY/DROP audit events. Both may report the same denials through
//! different channels.

mod aggregator;
mod tailer;

pub use aggregator::DenyAggregator;
pub use tailer::{DropLogMonitor, LineSource, TailFollower};

use chrono::{DateTime, Duration as TimeDelta, Utc};

/// Start of a trailing window ending at `now`.
pub(crate) fn window_start(now: DateTime<Utc>, window_secs: u64) -> DateTime<Utc> {
    // clamp keeps the subtraction inside chrono's range
    now - TimeDelta::seconds(window_secs.min(i32::MAX as u64) as i64)
}
