//! Webhook delivery.
//!
//! Posts the event batch as JSON to the contact's URL, or to the configured
//! `url` when the contact value is not a URL. Connections are never reused
//! across requests.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONNECTION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use url::Url;

use super::{Attachment, Sender, SenderError, optional_option, required_option};
use crate::models::{ContactData, NotificationEvent, TriggerData};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers notifications as HTTP POST requests.
#[derive(Debug)]
pub struct WebhookSender {
    /// Contact type served by this sender.
    name: String,
    /// Fallback destination for contacts whose value is not a URL.
    url: Option<Url>,
    /// Basic authentication credentials.
    credentials: Option<(String, String)>,
    /// Static headers added to every request.
    headers: HeaderMap,
    /// Request timeout.
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookSender {
    /// Creates a webhook sender from its string-keyed options.
    ///
    /// Recognised keys: `name` (required), `url`, `user`, `password`,
    /// `headers` (a YAML mapping) and `timeout` (seconds, default 30).
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, SenderError> {
        let name = required_option(options, "name", "webhook")?.to_string();

        let url = optional_option(options, "url")
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| SenderError::ConfigError(format!("invalid webhook url {raw}: {e}")))
            })
            .transpose()?;

        let credentials = match (optional_option(options, "user"), optional_option(options, "password")) {
            (Some(user), Some(password)) => Some((user.to_string(), password.to_string())),
            _ => None,
        };

        let headers = match optional_option(options, "headers") {
            Some(raw) => parse_headers(raw)?,
            None => HeaderMap::new(),
        };

        let timeout = match optional_option(options, "timeout") {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                SenderError::ConfigError(format!("invalid webhook timeout {raw}: {e}"))
            })?,
            None => DEFAULT_TIMEOUT,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| SenderError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { name, url, credentials, headers, timeout, client })
    }

    /// Returns the contact type served by this sender.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn destination(&self, contact: &ContactData) -> Result<Url, SenderError> {
        match Url::parse(&contact.value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
            _ => self.url.clone().ok_or_else(|| {
                SenderError::InvalidDestination(format!(
                    "contact {} has no webhook URL and no default url is configured",
                    contact.id
                ))
            }),
        }
    }
}

/// Builds the JSON document posted to the webhook.
pub fn build_payload(
    events: &[NotificationEvent],
    contact: &ContactData,
    trigger: &TriggerData,
    throttled: bool,
) -> serde_json::Value {
    json!({
        "trigger": {
            "id": trigger.id,
            "name": trigger.name,
            "tags": trigger.tags,
            "warn_value": trigger.warn_value,
            "error_value": trigger.error_value,
        },
        "events": events,
        "contact": {
            "id": contact.id,
            "type": contact.contact_type,
            "value": contact.value,
            "user": contact.user,
        },
        "throttled": throttled,
        "timestamp": Utc::now().timestamp(),
    })
}

fn parse_headers(raw: &str) -> Result<HeaderMap, SenderError> {
    let parsed: HashMap<String, String> = serde_yaml::from_str(raw)
        .map_err(|e| SenderError::ConfigError(format!("can not read webhook headers: {e}")))?;

    let mut headers = HeaderMap::new();
    for (key, value) in parsed {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| SenderError::ConfigError(format!("Invalid header name: {key}: {e}")))?;
        let value = HeaderValue::from_str(&value).map_err(|e| {
            SenderError::ConfigError(format!("Invalid header value for {key}: {value}: {e}"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn classify_request_error(error: reqwest::Error) -> SenderError {
    if error.is_builder() {
        SenderError::Permanent(format!("failed to build request: {error}"))
    } else {
        SenderError::Transient(format!("failed to perform request: {error}"))
    }
}

#[async_trait]
impl Sender for WebhookSender {
    #[tracing::instrument(skip_all, fields(sender = %self.name, contact_id = %contact.id, trigger_id = %trigger.id), level = "debug")]
    async fn send_events(
        &self,
        events: &[NotificationEvent],
        contact: &ContactData,
        trigger: &TriggerData,
        _attachment: Option<&Attachment>,
        throttled: bool,
    ) -> Result<(), SenderError> {
        let url = self.destination(contact)?;
        let payload = build_payload(events, contact, trigger, throttled);

        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(CONNECTION, "close")
            .headers(self.headers.clone())
            .json(&payload);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(%url, %status, events = events.len(), "Webhook delivered.");
            return Ok(());
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("failed to read response body: {e}"),
        };
        Err(SenderError::HttpStatus { status: status.as_u16(), body })
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::models::TriggerState;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn contact(value: &str) -> ContactData {
        ContactData {
            id: "c1".into(),
            user: "alice".into(),
            contact_type: "webhook".into(),
            value: value.into(),
        }
    }

    fn trigger() -> TriggerData {
        TriggerData {
            id: "t1".into(),
            name: "cpu load".into(),
            warn_value: Some(10.0),
            error_value: Some(20.0),
            tags: vec!["prod".into()],
            ..Default::default()
        }
    }

    fn events() -> Vec<NotificationEvent> {
        let mut event = NotificationEvent::test_event("c1", Utc::now());
        event.state = TriggerState::Warn;
        event.old_state = TriggerState::Ok;
        vec![event]
    }

    #[test]
    fn test_name_is_required() {
        let result = WebhookSender::from_options(&options(&[("url", "http://example.test")]));
        assert!(matches!(result, Err(SenderError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let bad_timeout = WebhookSender::from_options(&options(&[("name", "w"), ("timeout", "soon")]));
        assert!(matches!(bad_timeout, Err(SenderError::ConfigError(_))));

        let bad_headers =
            WebhookSender::from_options(&options(&[("name", "w"), ("headers", "- not a map")]));
        assert!(matches!(bad_headers, Err(SenderError::ConfigError(_))));
    }

    #[test]
    fn test_defaults() {
        let sender = WebhookSender::from_options(&options(&[("name", "webhook")])).unwrap();
        assert_eq!(sender.name(), "webhook");
        assert_eq!(sender.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_destination_prefers_contact_url() {
        let sender = WebhookSender::from_options(&options(&[
            ("name", "webhook"),
            ("url", "http://fallback.test/hook"),
        ]))
        .unwrap();
        assert_eq!(
            sender.destination(&contact("http://example.test/hook")).unwrap().as_str(),
            "http://example.test/hook"
        );
        assert_eq!(
            sender.destination(&contact("team-ops")).unwrap().as_str(),
            "http://fallback.test/hook"
        );

        let no_fallback = WebhookSender::from_options(&options(&[("name", "webhook")])).unwrap();
        assert!(matches!(
            no_fallback.destination(&contact("team-ops")),
            Err(SenderError::InvalidDestination(_))
        ));
    }

    #[tokio::test]
    async fn test_send_posts_event_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_header("x-team", "ops")
            .match_body(Matcher::PartialJson(json!({
                "trigger": {"id": "t1", "name": "cpu load"},
                "contact": {"id": "c1", "type": "webhook"},
                "throttled": true,
            })))
            .with_status(200)
            .create_async()
            .await;

        let sender = WebhookSender::from_options(&options(&[
            ("name", "webhook"),
            ("user", "user"),
            ("password", "pass"),
            ("headers", "X-Team: ops"),
        ]))
        .unwrap();
        let result = sender
            .send_events(&events(), &contact(&format!("{}/hook", server.url())), &trigger(), None, true)
            .await;

        assert!(result.is_ok(), "{result:?}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_permanent_with_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let sender = WebhookSender::from_options(&options(&[("name", "webhook")])).unwrap();
        let err = sender
            .send_events(&events(), &contact(&format!("{}/hook", server.url())), &trigger(), None, false)
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert!(matches!(&err, SenderError::HttpStatus { status: 404, body } if body == "not found"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/hook").with_status(503).create_async().await;

        let sender = WebhookSender::from_options(&options(&[("name", "webhook")])).unwrap();
        let err = sender
            .send_events(&events(), &contact(&format!("{}/hook", server.url())), &trigger(), None, false)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let sender =
            WebhookSender::from_options(&options(&[("name", "webhook"), ("timeout", "2")])).unwrap();
        let err = sender
            .send_events(&events(), &contact("http://127.0.0.1:1/hook"), &trigger(), None, false)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }
}
