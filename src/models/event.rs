//! This module defines notification events emitted by trigger evaluation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health state of a trigger or one of its metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerState {
    /// Values are within thresholds.
    Ok,
    /// Warning threshold crossed.
    Warn,
    /// Error threshold crossed.
    Error,
    /// No data received.
    NoData,
    /// Evaluation failed.
    Exception,
    /// Synthetic state used by test notifications.
    Test,
}

impl TriggerState {
    /// Ranks states by how urgently they need attention.
    pub fn severity(self) -> u8 {
        match self {
            TriggerState::Ok | TriggerState::Test => 0,
            TriggerState::Warn => 1,
            TriggerState::Error => 2,
            TriggerState::NoData => 3,
            TriggerState::Exception => 4,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerState::Ok => "OK",
            TriggerState::Warn => "WARN",
            TriggerState::Error => "ERROR",
            TriggerState::NoData => "NODATA",
            TriggerState::Exception => "EXCEPTION",
            TriggerState::Test => "TEST",
        };
        f.write_str(s)
    }
}

/// A trigger state change for a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// When the state change happened.
    pub timestamp: DateTime<Utc>,

    /// Metric whose state changed.
    pub metric: String,

    /// Metric value at the time of the change, if any.
    #[serde(default)]
    pub value: Option<f64>,

    /// State before the change.
    pub old_state: TriggerState,

    /// State after the change.
    pub state: TriggerState,

    /// Trigger that emitted the event; empty for synthetic test events.
    #[serde(default)]
    pub trigger_id: String,

    /// Subscription the event was matched to, if known.
    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Contact addressed directly; only set for synthetic test events.
    #[serde(default)]
    pub contact_id: Option<String>,

    /// Optional free-form message attached by the checker.
    #[serde(default)]
    pub message: Option<String>,

    /// Contacts still to be scheduled after an interrupted planning attempt.
    /// Only set on re-queued events, which the throttle tracker has already
    /// counted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_contacts: Option<Vec<String>>,
}

impl NotificationEvent {
    /// Creates the synthetic event used to verify a contact's delivery
    /// settings.
    pub fn test_event(contact_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            metric: "Test.metric.value".to_string(),
            value: Some(1.0),
            old_state: TriggerState::Test,
            state: TriggerState::Test,
            trigger_id: String::new(),
            subscription_id: None,
            contact_id: Some(contact_id.to_string()),
            message: None,
            pending_contacts: None,
        }
    }

    /// Returns the directly addressed contact of a synthetic test event.
    pub fn test_contact(&self) -> Option<&str> {
        self.contact_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&TriggerState::NoData).unwrap(), r#""NODATA""#);
        let state: TriggerState = serde_json::from_str(r#""WARN""#).unwrap();
        assert_eq!(state, TriggerState::Warn);
        assert_eq!(TriggerState::NoData.to_string(), "NODATA");
    }

    #[test]
    fn test_test_event_addresses_contact() {
        let event = NotificationEvent::test_event("c1", Utc::now());
        assert_eq!(event.test_contact(), Some("c1"));
        assert_eq!(event.state, TriggerState::Test);
        assert!(event.trigger_id.is_empty());
    }
}
