//! Binary attachments, such as rendered charts, delivered alongside events.

use async_trait::async_trait;

use crate::models::{NotificationEvent, TriggerData};

/// A file attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name presented to the recipient.
    pub filename: String,
    /// MIME type of `data`.
    pub content_type: String,
    /// Raw file content.
    pub data: Vec<u8>,
}

/// Produces an optional attachment for a batch of events.
#[async_trait]
pub trait AttachmentRenderer: Send + Sync {
    /// Renders the attachment for `events` of `trigger`, if any.
    async fn render(&self, trigger: &TriggerData, events: &[NotificationEvent])
    -> Option<Attachment>;
}

/// Renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAttachment;

#[async_trait]
impl AttachmentRenderer for NoAttachment {
    async fn render(&self, _: &TriggerData, _: &[NotificationEvent]) -> Option<Attachment> {
        None
    }
}
