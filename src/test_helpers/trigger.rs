//! A builder for creating `TriggerData` instances in tests.

use crate::models::TriggerData;

/// A builder for creating `TriggerData` instances in tests.
pub struct TriggerBuilder {
    trigger: TriggerData,
}

impl TriggerBuilder {
    /// Creates a new `TriggerBuilder` for a trigger with the given id.
    pub fn new(id: &str) -> Self {
        Self {
            trigger: TriggerData {
                id: id.to_string(),
                name: format!("trigger {id}"),
                targets: vec!["test.target".to_string()],
                ..Default::default()
            },
        }
    }

    /// Sets the trigger name.
    pub fn name(mut self, name: &str) -> Self {
        self.trigger.name = name.to_string();
        self
    }

    /// Sets the trigger tags.
    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.trigger.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Sets the warn and error thresholds.
    pub fn thresholds(mut self, warn: f64, error: f64) -> Self {
        self.trigger.warn_value = Some(warn);
        self.trigger.error_value = Some(error);
        self
    }

    /// Builds the `TriggerData`.
    pub fn build(self) -> TriggerData {
        self.trigger
    }
}
