//! This module defines the subscription data structure.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// Maps a tag set to an ordered list of contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionData {
    /// Unique identifier of the subscription.
    pub id: String,

    /// Login of the user owning the subscription.
    pub user: String,

    /// Disabled subscriptions never match.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Tags a trigger must carry for this subscription to match.
    pub tags: Vec<String>,

    /// Contacts notified when the subscription matches, in order.
    pub contacts: Vec<String>,
}

impl SubscriptionData {
    /// Returns true if the subscription is enabled and every one of its tags is
    /// carried by the trigger.
    pub fn matches_tags(&self, trigger_tags: &[String]) -> bool {
        if !self.enabled || self.tags.is_empty() {
            return false;
        }
        let trigger_tags: HashSet<&str> = trigger_tags.iter().map(String::as_str).collect();
        self.tags.iter().all(|tag| trigger_tags.contains(tag.as_str()))
    }

    /// Removes the contact from the contact list. Returns true if the list
    /// changed.
    pub fn remove_contact(&mut self, contact_id: &str) -> bool {
        let before = self.contacts.len();
        self.contacts.retain(|id| id != contact_id);
        self.contacts.len() != before
    }
}
