use std::{collections::HashMap, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::{
    DispatcherConfig, EventsWorkerConfig, LockConfig, ThrottleConfig,
    deserialize_duration_from_seconds,
};

/// Provides the default value for shutdown_timeout_secs.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Application configuration for herald.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Database URL for the SQLite database.
    pub database_url: String,

    /// Dispatcher loop and retry settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Event accounting and escalation policy.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Trigger check lease settings.
    #[serde(default)]
    pub lock: LockConfig,

    /// Settings of the worker draining the event queue.
    #[serde(default)]
    pub events_worker: EventsWorkerConfig,

    /// Sender definitions. Each entry is a string-keyed option map whose
    /// `type` selects the sender implementation and whose `name` is the
    /// contact type it serves.
    #[serde(default)]
    pub senders: Vec<HashMap<String, String>>,

    /// Contact types offered to users. Every entry must be served by a
    /// configured sender.
    #[serde(default)]
    pub contact_types: Vec<String>,

    /// The maximum time in seconds to wait for graceful shutdown.
    #[serde(
        rename = "shutdown_timeout_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading `app.yaml` from the configuration
    /// directory, overridden by `HERALD__*` environment variables.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)))
            .add_source(Environment::with_prefix("HERALD").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
