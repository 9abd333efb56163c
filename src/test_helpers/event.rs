//! A builder for creating `NotificationEvent` instances in tests.

use chrono::{DateTime, Utc};

use crate::models::{NotificationEvent, TriggerState};

/// A builder for creating `NotificationEvent` instances in tests.
pub struct EventBuilder {
    event: NotificationEvent,
}

impl EventBuilder {
    /// Creates an OK to ERROR transition of `test.metric` for the trigger.
    pub fn new(trigger_id: &str) -> Self {
        Self {
            event: NotificationEvent {
                timestamp: Utc::now(),
                metric: "test.metric".to_string(),
                value: Some(100.0),
                old_state: TriggerState::Ok,
                state: TriggerState::Error,
                trigger_id: trigger_id.to_string(),
                subscription_id: None,
                contact_id: None,
                message: None,
                pending_contacts: None,
            },
        }
    }

    /// Sets the event timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    /// Sets the metric name.
    pub fn metric(mut self, metric: &str) -> Self {
        self.event.metric = metric.to_string();
        self
    }

    /// Sets the metric value.
    pub fn value(mut self, value: f64) -> Self {
        self.event.value = Some(value);
        self
    }

    /// Sets the old and new states.
    pub fn transition(mut self, old_state: TriggerState, state: TriggerState) -> Self {
        self.event.old_state = old_state;
        self.event.state = state;
        self
    }

    /// Restricts the event to a single subscription.
    pub fn subscription(mut self, subscription_id: &str) -> Self {
        self.event.subscription_id = Some(subscription_id.to_string());
        self
    }

    /// Builds the `NotificationEvent`.
    pub fn build(self) -> NotificationEvent {
        self.event
    }
}
