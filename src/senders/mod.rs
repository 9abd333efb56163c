//! Delivery backends and the registry selecting one per contact type.
//!
//! Each configured sender serves exactly one contact type, named by the
//! sender's `name` option. The `type` option selects the implementation.

mod attachment;
mod error;
pub mod mail;
pub mod template;
pub mod webhook;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

pub use attachment::{Attachment, AttachmentRenderer, NoAttachment};
pub use error::SenderError;
pub use mail::MailSender;
pub use webhook::WebhookSender;

use crate::models::{ContactData, NotificationEvent, TriggerData};

/// A delivery backend for one contact type.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Delivers a batch of events for `trigger` to `contact`.
    ///
    /// `throttled` marks deliveries that were delayed by rate limiting and
    /// must say so to the recipient.
    async fn send_events(
        &self,
        events: &[NotificationEvent],
        contact: &ContactData,
        trigger: &TriggerData,
        attachment: Option<&Attachment>,
        throttled: bool,
    ) -> Result<(), SenderError>;
}

/// Reads a required, non-empty option.
pub(crate) fn required_option<'a>(
    options: &'a HashMap<String, String>,
    key: &str,
    sender_type: &str,
) -> Result<&'a str, SenderError> {
    optional_option(options, key).ok_or_else(|| {
        SenderError::ConfigError(format!("required {key} for sender type {sender_type}"))
    })
}

/// Reads an option, treating an empty value as absent.
pub(crate) fn optional_option<'a>(
    options: &'a HashMap<String, String>,
    key: &str,
) -> Option<&'a str> {
    options.get(key).map(String::as_str).filter(|value| !value.trim().is_empty())
}

/// Maps contact types to the senders delivering to them.
#[derive(Default, Clone)]
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn Sender>>,
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRegistry").field("contact_types", &self.contact_types()).finish()
    }
}

impl SenderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialises every configured sender.
    ///
    /// Each entry needs a `name`; its `type` (`mail` or `webhook`) defaults
    /// to the name. Unknown option keys are ignored.
    pub fn from_config(configs: &[HashMap<String, String>]) -> Result<Self, SenderError> {
        let mut registry = Self::new();
        for options in configs {
            let name = required_option(options, "name", "sender")?;
            let sender_type = optional_option(options, "type").unwrap_or(name);
            let sender: Arc<dyn Sender> = match sender_type {
                "mail" | "email" => Arc::new(MailSender::from_options(options)?),
                "webhook" => Arc::new(WebhookSender::from_options(options)?),
                other => {
                    return Err(SenderError::ConfigError(format!(
                        "unknown sender type {other} for sender {name}"
                    )));
                }
            };
            registry.register(name, sender)?;
            tracing::info!(contact_type = name, sender_type, "Sender registered.");
        }
        Ok(registry)
    }

    /// Registers a sender for a contact type. Each contact type can be
    /// registered once.
    pub fn register(
        &mut self,
        contact_type: impl Into<String>,
        sender: Arc<dyn Sender>,
    ) -> Result<(), SenderError> {
        let contact_type = contact_type.into();
        if self.senders.contains_key(&contact_type) {
            return Err(SenderError::ConfigError(format!(
                "sender for contact type {contact_type} registered twice"
            )));
        }
        self.senders.insert(contact_type, sender);
        Ok(())
    }

    /// Returns the sender for a contact type.
    pub fn get(&self, contact_type: &str) -> Option<Arc<dyn Sender>> {
        self.senders.get(contact_type).cloned()
    }

    /// Returns true if a sender serves the contact type.
    pub fn contains(&self, contact_type: &str) -> bool {
        self.senders.contains_key(contact_type)
    }

    /// Returns the registered contact types, sorted.
    pub fn contact_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.senders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Checks that every contact type is served by a registered sender.
    pub fn validate<'a, I>(&self, contact_types: I) -> Result<(), SenderError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for contact_type in contact_types {
            if !self.contains(contact_type) {
                return Err(SenderError::UnknownContactType(contact_type.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_from_config_registers_by_name() {
        let registry = SenderRegistry::from_config(&[
            options(&[("type", "webhook"), ("name", "slack-hook")]),
            options(&[("name", "webhook"), ("unknown_key", "ignored")]),
            options(&[("type", "mail"), ("name", "email"), ("from", "alerts@example.test")]),
        ])
        .unwrap();

        assert_eq!(registry.contact_types(), vec!["email", "slack-hook", "webhook"]);
        assert!(registry.get("slack-hook").is_some());
        assert!(registry.get("pager").is_none());
    }

    #[test]
    fn test_from_config_rejects_bad_entries() {
        let missing_name = SenderRegistry::from_config(&[options(&[("type", "webhook")])]);
        assert!(matches!(missing_name, Err(SenderError::ConfigError(_))));

        let unknown_type =
            SenderRegistry::from_config(&[options(&[("type", "pigeon"), ("name", "coo")])]);
        assert!(matches!(unknown_type, Err(SenderError::ConfigError(_))));

        let duplicate = SenderRegistry::from_config(&[
            options(&[("name", "webhook")]),
            options(&[("name", "webhook")]),
        ]);
        assert!(matches!(duplicate, Err(SenderError::ConfigError(_))));
    }

    #[test]
    fn test_validate_reports_unregistered_type() {
        let registry = SenderRegistry::from_config(&[options(&[("name", "webhook")])]).unwrap();
        assert!(registry.validate(["webhook"]).is_ok());
        let result = registry.validate(["webhook", "telegram"]);
        assert!(matches!(result, Err(SenderError::UnknownContactType(t)) if t == "telegram"));
    }
}
