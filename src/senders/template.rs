//! Rendering of notification bodies with the minijinja templating engine.

use minijinja::Environment;
use serde::Serialize;

use super::SenderError;
use crate::models::{ContactData, NotificationEvent, TriggerData};

/// Plain-text body used when no template file is configured.
pub const DEFAULT_MAIL_TEMPLATE: &str = r#"Trigger: {{ trigger.name }}
{%- if trigger.tags %}
Tags: {{ trigger.tags | join(", ") }}
{%- endif %}
{%- if trigger.warn_value is not none %}
Warn value: {{ trigger.warn_value }}
{%- endif %}
{%- if trigger.error_value is not none %}
Error value: {{ trigger.error_value }}
{%- endif %}
{%- if trigger_url %}
Details: {{ trigger_url }}
{%- endif %}

{% for event in events -%}
{{ event.timestamp }}  {{ event.metric }} = {{ event.value }} ({{ event.old_state }} to {{ event.state }})
{%- if event.message %}  {{ event.message }}{% endif %}
{% endfor %}
{%- if throttled %}
Please, fix your system or tune this trigger to generate less events.
{%- endif %}
"#;

#[derive(Debug, Serialize)]
struct EventView<'a> {
    timestamp: String,
    metric: &'a str,
    value: String,
    old_state: String,
    state: String,
    message: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MessageView<'a> {
    trigger: &'a TriggerData,
    trigger_url: Option<String>,
    contact: &'a ContactData,
    events: Vec<EventView<'a>>,
    throttled: bool,
}

/// Formats an optional metric value for display.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{v:.4}").trim_end_matches('0').trim_end_matches('.').to_string(),
        None => "-".to_string(),
    }
}

/// A template for notification bodies.
pub struct MessageTemplate {
    env: Environment<'static>,
    source: String,
    front_uri: Option<String>,
}

impl MessageTemplate {
    /// Creates a template from its source. The source is checked for syntax
    /// errors right away.
    pub fn new(source: impl Into<String>, front_uri: Option<String>) -> Result<Self, SenderError> {
        let env = Environment::new();
        let source = source.into();
        env.template_from_str(&source)?;
        Ok(Self { env, source, front_uri })
    }

    /// Renders the body for a batch of events.
    pub fn render(
        &self,
        events: &[NotificationEvent],
        contact: &ContactData,
        trigger: &TriggerData,
        throttled: bool,
    ) -> Result<String, SenderError> {
        let view = MessageView {
            trigger,
            trigger_url: self
                .front_uri
                .as_ref()
                .filter(|_| !trigger.is_test())
                .map(|uri| format!("{}/trigger/{}", uri.trim_end_matches('/'), trigger.id)),
            contact,
            events: events
                .iter()
                .map(|event| EventView {
                    timestamp: event.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                    metric: &event.metric,
                    value: format_value(event.value),
                    old_state: event.old_state.to_string(),
                    state: event.state.to_string(),
                    message: event.message.as_deref(),
                })
                .collect(),
            throttled,
        };

        self.env.render_str(&self.source, view).map_err(|e| {
            tracing::warn!(trigger_id = %trigger.id, error = %e, "Failed to render message template.");
            SenderError::TemplateError(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::TriggerState;

    fn trigger() -> TriggerData {
        TriggerData {
            id: "t1".into(),
            name: "cpu load".into(),
            warn_value: Some(10.0),
            error_value: Some(20.0),
            tags: vec!["prod".into(), "db".into()],
            ..Default::default()
        }
    }

    fn event(value: Option<f64>) -> NotificationEvent {
        NotificationEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            metric: "db.cpu".into(),
            value,
            old_state: TriggerState::Ok,
            state: TriggerState::Error,
            trigger_id: "t1".into(),
            subscription_id: None,
            contact_id: None,
            message: None,
            pending_contacts: None,
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(42.0)), "42");
        assert_eq!(format_value(Some(0.125)), "0.125");
        assert_eq!(format_value(Some(1.0 / 3.0)), "0.3333");
        assert_eq!(format_value(None), "-");
    }

    #[test]
    fn test_default_template_lists_trigger_and_events() {
        let template =
            MessageTemplate::new(DEFAULT_MAIL_TEMPLATE, Some("https://alerts.test/".into())).unwrap();
        let body = template
            .render(&[event(Some(25.0))], &ContactData::default(), &trigger(), true)
            .unwrap();

        assert!(body.contains("Trigger: cpu load"));
        assert!(body.contains("Tags: prod, db"));
        assert!(body.contains("Warn value: 10"));
        assert!(body.contains("Details: https://alerts.test/trigger/t1"));
        assert!(body.contains("2024-05-01 12:30:00 UTC  db.cpu = 25 (OK to ERROR)"));
        assert!(body.contains("generate less events"));
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        assert!(matches!(
            MessageTemplate::new("{{ trigger.name }", None),
            Err(SenderError::TemplateError(_))
        ));
    }
}
