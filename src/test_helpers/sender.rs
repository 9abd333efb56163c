//! A sender that records every call and replies with scripted results.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;

use crate::{
    models::{ContactData, NotificationEvent, TriggerData},
    senders::{Attachment, Sender, SenderError},
};

/// One recorded `send_events` call.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    /// Events passed to the sender.
    pub events: Vec<NotificationEvent>,
    /// Destination contact.
    pub contact: ContactData,
    /// Trigger snapshot.
    pub trigger: TriggerData,
    /// Attachment file name, if one was passed.
    pub attachment: Option<String>,
    /// Throttled marker.
    pub throttled: bool,
}

/// Records calls; each call consumes the next scripted result, succeeding
/// once the script is exhausted.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sends: Mutex<Vec<RecordedSend>>,
    script: Mutex<VecDeque<Result<(), SenderError>>>,
}

impl RecordingSender {
    /// Creates a sender that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the results returned by the next calls.
    pub fn with_results(results: Vec<Result<(), SenderError>>) -> Self {
        Self { sends: Mutex::default(), script: Mutex::new(results.into()) }
    }

    /// Returns the calls recorded so far.
    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send_events(
        &self,
        events: &[NotificationEvent],
        contact: &ContactData,
        trigger: &TriggerData,
        attachment: Option<&Attachment>,
        throttled: bool,
    ) -> Result<(), SenderError> {
        if let Ok(mut sends) = self.sends.lock() {
            sends.push(RecordedSend {
                events: events.to_vec(),
                contact: contact.clone(),
                trigger: trigger.clone(),
                attachment: attachment.map(|a| a.filename.clone()),
                throttled,
            });
        }
        match self.script.lock() {
            Ok(mut script) => script.pop_front().unwrap_or(Ok(())),
            Err(_) => Ok(()),
        }
    }
}
