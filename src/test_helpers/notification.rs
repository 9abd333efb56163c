//! A builder for creating `ScheduledNotification` instances in tests.

use chrono::{DateTime, Utc};

use super::{EventBuilder, TriggerBuilder};
use crate::models::{NotificationEvent, ScheduledNotification, TriggerData};

/// A builder for creating `ScheduledNotification` instances in tests.
pub struct NotificationBuilder {
    trigger: TriggerData,
    contact_id: String,
    event: Option<NotificationEvent>,
    due: DateTime<Utc>,
    throttled: bool,
    retry_count: u32,
}

impl NotificationBuilder {
    /// Creates a notification for `trigger_id` addressed to `contact_id`, due
    /// now.
    pub fn new(trigger_id: &str, contact_id: &str) -> Self {
        Self {
            trigger: TriggerBuilder::new(trigger_id).build(),
            contact_id: contact_id.to_string(),
            event: None,
            due: Utc::now(),
            throttled: false,
            retry_count: 0,
        }
    }

    /// Replaces the trigger snapshot.
    pub fn trigger(mut self, trigger: TriggerData) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the event.
    pub fn event(mut self, event: NotificationEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// Sets the due time.
    pub fn due(mut self, due: DateTime<Utc>) -> Self {
        self.due = due;
        self
    }

    /// Sets the throttled marker.
    pub fn throttled(mut self, throttled: bool) -> Self {
        self.throttled = throttled;
        self
    }

    /// Sets the number of failed attempts already made.
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Builds the `ScheduledNotification`.
    pub fn build(self) -> ScheduledNotification {
        let event = self
            .event
            .unwrap_or_else(|| EventBuilder::new(&self.trigger.id).timestamp(self.due).build());
        let mut notification =
            ScheduledNotification::new(self.trigger, self.contact_id, event, self.due, self.throttled);
        notification.retry_count = self.retry_count;
        notification
    }
}
