//! Mail delivery over SMTP.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use super::{
    Attachment, Sender, SenderError, optional_option, required_option,
    template::{DEFAULT_MAIL_TEMPLATE, MessageTemplate},
};
use crate::models::{ContactData, NotificationEvent, TriggerData, TriggerState};

const DEFAULT_SMTP_PORT: u16 = 25;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads an SMTP option given in camel case (`smtpHost`) or snake case
/// (`smtp_host`), ignoring key case.
fn smtp_option<'a>(options: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    fn normalize(key: &str) -> String {
        key.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
    }

    let wanted = normalize(key);
    optional_option(options, key).or_else(|| {
        options
            .keys()
            .filter(|candidate| normalize(candidate) == wanted)
            .find_map(|candidate| optional_option(options, candidate))
    })
}

/// Delivers notifications as templated mail through an SMTP relay.
pub struct MailSender {
    name: String,
    from: Mailbox,
    relay: (String, u16),
    template: MessageTemplate,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailSender {
    /// Creates a mail sender from its string-keyed options.
    ///
    /// Recognised keys: `name` (required), `from` (required), `smtpHost`
    /// (default `localhost`), `smtpPort` (default 25), `smtpUser`,
    /// `smtpPassword`, `template` (path to a template file) and `front_uri`
    /// (base URL for trigger links). The SMTP keys are also accepted in
    /// snake case, e.g. `smtp_host`.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, SenderError> {
        let name = required_option(options, "name", "mail")?.to_string();
        let from_raw = required_option(options, "from", "mail")?;
        let from: Mailbox = from_raw
            .parse()
            .map_err(|e| SenderError::ConfigError(format!("invalid from address {from_raw}: {e}")))?;

        let smtp_host = smtp_option(options, "smtpHost").unwrap_or("localhost");
        let smtp_port = match smtp_option(options, "smtpPort") {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                SenderError::ConfigError(format!("invalid smtpPort {raw}: {e}"))
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        let source = match optional_option(options, "template") {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                SenderError::ConfigError(format!("can not read mail template {path}: {e}"))
            })?,
            None => DEFAULT_MAIL_TEMPLATE.to_string(),
        };
        let template =
            MessageTemplate::new(source, optional_option(options, "front_uri").map(str::to_string))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
            .port(smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(password)) =
            (smtp_option(options, "smtpUser"), smtp_option(options, "smtpPassword"))
        {
            builder = builder.credentials(Credentials::new(user.to_string(), password.to_string()));
        }

        Ok(Self {
            name,
            from,
            relay: (smtp_host.to_string(), smtp_port),
            template,
            transport: builder.build(),
        })
    }

    /// Returns the contact type served by this sender.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the host and port of the SMTP relay.
    pub fn relay(&self) -> (&str, u16) {
        (&self.relay.0, self.relay.1)
    }

    /// Builds the message for a batch of events without sending it.
    pub fn build_message(
        &self,
        events: &[NotificationEvent],
        contact: &ContactData,
        trigger: &TriggerData,
        attachment: Option<&Attachment>,
        throttled: bool,
    ) -> Result<Message, SenderError> {
        let to: Mailbox = contact.value.parse().map_err(|e| {
            SenderError::InvalidDestination(format!("invalid mail address {}: {e}", contact.value))
        })?;

        let body = self.template.render(events, contact, trigger, throttled)?;
        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body));
        if let Some(attachment) = attachment {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                SenderError::Permanent(format!(
                    "invalid attachment content type {}: {e}",
                    attachment.content_type
                ))
            })?;
            parts = parts.singlepart(
                MailAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject(events, trigger, throttled))
            .multipart(parts)
            .map_err(|e| SenderError::Permanent(format!("failed to build message: {e}")))
    }
}

/// Builds the subject line: the most severe state among the events, the
/// trigger name and a throttling marker.
fn subject(events: &[NotificationEvent], trigger: &TriggerData, throttled: bool) -> String {
    let state = events
        .iter()
        .map(|event| event.state)
        .max_by_key(|state| state.severity())
        .unwrap_or(TriggerState::Ok);
    let mut subject = format!("[{state}] {}", trigger.name);
    if !trigger.tags.is_empty() {
        subject.push_str(&format!(" [{}]", trigger.tags.join("][")));
    }
    if throttled {
        subject.push_str(" (throttled)");
    }
    subject
}

#[async_trait]
impl Sender for MailSender {
    #[tracing::instrument(skip_all, fields(sender = %self.name, contact_id = %contact.id, trigger_id = %trigger.id), level = "debug")]
    async fn send_events(
        &self,
        events: &[NotificationEvent],
        contact: &ContactData,
        trigger: &TriggerData,
        attachment: Option<&Attachment>,
        throttled: bool,
    ) -> Result<(), SenderError> {
        let message = self.build_message(events, contact, trigger, attachment, throttled)?;
        self.transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                SenderError::Permanent(format!("mail rejected: {e}"))
            } else {
                SenderError::Transient(format!("mail delivery failed: {e}"))
            }
        })?;
        tracing::debug!(to = %contact.value, events = events.len(), "Mail delivered.");
        Ok(())
    }
}
