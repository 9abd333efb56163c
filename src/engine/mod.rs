//! The herald engine coordinates trigger checks and turns notification events
//! into scheduled, throttled and finally delivered notifications.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub mod dispatcher;
pub mod events_worker;
pub mod lock_manager;
pub mod planner;
pub mod reporter;
pub mod scheduler;
pub mod throttle;

/// Returns `ts + duration`, saturating at the largest representable
/// timestamp.
pub(crate) fn offset(ts: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
