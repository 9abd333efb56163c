//! This module defines scheduled notifications and their queue keys.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{event::NotificationEvent, trigger::TriggerData};

/// Uniquely identifies a pending entry in the notification queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    /// Trigger the notification belongs to.
    pub trigger_id: String,
    /// Contact the notification is addressed to.
    pub contact_id: String,
    /// Due timestamp in unix milliseconds.
    pub due_ms: i64,
    /// Store-assigned insertion sequence.
    pub sequence: i64,
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.trigger_id, self.contact_id, self.due_ms, self.sequence)
    }
}

/// A notification waiting in the queue for its due time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    /// Snapshot of the trigger at scheduling time.
    pub trigger: TriggerData,

    /// Contact to deliver to.
    pub contact_id: String,

    /// The event being delivered.
    pub event: NotificationEvent,

    /// Earliest time the notification may be delivered.
    pub due: DateTime<Utc>,

    /// Whether the notification is delivered with a rate-limited marker.
    pub throttled: bool,

    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub retry_count: u32,

    /// Insertion sequence assigned by the store; 0 until stored.
    #[serde(skip)]
    pub sequence: i64,
}

impl ScheduledNotification {
    /// Creates a new, not yet stored, notification.
    pub fn new(
        trigger: TriggerData,
        contact_id: impl Into<String>,
        event: NotificationEvent,
        due: DateTime<Utc>,
        throttled: bool,
    ) -> Self {
        Self {
            trigger,
            contact_id: contact_id.into(),
            event,
            due,
            throttled,
            retry_count: 0,
            sequence: 0,
        }
    }

    /// Returns the queue key of this notification.
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            trigger_id: self.trigger.id.clone(),
            contact_id: self.contact_id.clone(),
            due_ms: self.due.timestamp_millis(),
            sequence: self.sequence,
        }
    }

    /// Returns a copy rescheduled for another delivery attempt at `due`.
    pub fn retry_at(&self, due: DateTime<Utc>) -> Self {
        Self { due, retry_count: self.retry_count + 1, sequence: 0, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_key_display() {
        let due = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut notification = ScheduledNotification::new(
            TriggerData { id: "t1".into(), ..Default::default() },
            "c1",
            NotificationEvent::test_event("c1", due),
            due,
            false,
        );
        notification.sequence = 7;
        assert_eq!(notification.key().to_string(), "t1:c1:1700000000000:7");
    }

    #[test]
    fn test_retry_at_increments_count_and_clears_sequence() {
        let due = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut notification = ScheduledNotification::new(
            TriggerData::default(),
            "c1",
            NotificationEvent::test_event("c1", due),
            due,
            true,
        );
        notification.sequence = 3;
        let later = due + chrono::Duration::seconds(30);
        let retry = notification.retry_at(later);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.sequence, 0);
        assert_eq!(retry.due, later);
        assert!(retry.throttled);
    }
}
