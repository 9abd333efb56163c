//! This module defines the persisted throttling state of a trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event volume and escalation state of a single trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    /// Start of the current counting window.
    pub window_start: DateTime<Utc>,

    /// Number of events recorded since `window_start`.
    pub event_count: u64,

    /// Timestamp of the most recently recorded event.
    #[serde(default)]
    pub last_event: Option<DateTime<Utc>>,

    /// Notifications before this instant are throttled.
    #[serde(default)]
    pub next_eligible: Option<DateTime<Utc>>,

    /// When a notification for the trigger was last delivered.
    #[serde(default)]
    pub last_sent: Option<DateTime<Utc>>,

    /// Index of the escalation tier applied by the last send, if any.
    #[serde(default)]
    pub tier: Option<usize>,

    /// Store version used for compare-and-set; 0 means not yet persisted.
    #[serde(skip)]
    pub version: u64,
}

impl ThrottleState {
    /// Creates an empty state whose window opens at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            event_count: 0,
            last_event: None,
            next_eligible: None,
            last_sent: None,
            tier: None,
            version: 0,
        }
    }

    /// Returns the throttle deadline if it is still in the future at `now`.
    pub fn throttled_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_eligible.filter(|next| *next > now)
    }

    /// Closes the current window and opens a new one at `now`, zeroing the
    /// count and clearing the escalation tier.
    ///
    /// A `next_eligible` deadline set by an earlier send survives the reset:
    /// notifications already promised a later slot keep it, and the deadline
    /// lapses on its own.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.window_start = now;
        self.event_count = 0;
        self.last_event = None;
        self.tier = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_reset_keeps_pending_deadline() {
        let now = Utc::now();
        let mut state = ThrottleState::new(now);
        state.event_count = 12;
        state.tier = Some(0);
        state.next_eligible = Some(now + Duration::minutes(30));

        state.reset(now + Duration::minutes(5));
        assert_eq!(state.event_count, 0);
        assert_eq!(state.tier, None);
        assert_eq!(state.throttled_until(now), Some(now + Duration::minutes(30)));
        assert_eq!(state.throttled_until(now + Duration::hours(1)), None);
    }
}
