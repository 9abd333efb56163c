//! This module defines the trigger data consumed by the notification
//! pipeline.

use serde::{Deserialize, Serialize};

/// Prefix of the synthetic trigger identifiers used for test notifications.
pub const TEST_TRIGGER_PREFIX: &str = "test:";

/// A named alerting rule over one or more metric targets.
///
/// Triggers are owned by configuration; the notification pipeline only reads
/// them and embeds a snapshot into every scheduled notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriggerData {
    /// Unique identifier of the trigger.
    pub id: String,

    /// Human readable name of the trigger.
    pub name: String,

    /// Target expressions evaluated by the checker.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Threshold above which the trigger is in the WARN state.
    #[serde(default)]
    pub warn_value: Option<f64>,

    /// Threshold above which the trigger is in the ERROR state.
    #[serde(default)]
    pub error_value: Option<f64>,

    /// Tags used to match subscriptions.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TriggerData {
    /// Builds the synthetic trigger attached to a test notification for the
    /// given contact.
    pub fn test_trigger(contact_id: &str) -> Self {
        Self {
            id: format!("{TEST_TRIGGER_PREFIX}{contact_id}"),
            name: "Test notification".to_string(),
            ..Default::default()
        }
    }

    /// Returns true if this is a synthetic trigger created for a test
    /// notification.
    pub fn is_test(&self) -> bool {
        self.id.starts_with(TEST_TRIGGER_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_flagged() {
        let trigger = TriggerData::test_trigger("contact-1");
        assert_eq!(trigger.id, "test:contact-1");
        assert!(trigger.is_test());
        assert!(!TriggerData { id: "cpu".into(), ..Default::default() }.is_test());
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let trigger: TriggerData =
            serde_json::from_str(r#"{"id": "t1", "name": "cpu load"}"#).unwrap();
        assert_eq!(trigger.id, "t1");
        assert!(trigger.tags.is_empty());
        assert!(trigger.warn_value.is_none());
    }
}
