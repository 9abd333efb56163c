//! Lease and background worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};

fn default_lease_duration() -> Duration {
    Duration::from_secs(30)
}

fn default_renew_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_events_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_batch_size() -> u32 {
    100
}

/// Trigger check lease settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Lifetime of a freshly acquired or renewed lease.
    #[serde(
        rename = "lease_secs",
        default = "default_lease_duration",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub lease_duration: Duration,

    /// Interval at which a held lease is renewed.
    #[serde(
        rename = "renew_interval_secs",
        default = "default_renew_interval",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub renew_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { lease_duration: default_lease_duration(), renew_interval: default_renew_interval() }
    }
}

/// Settings of the worker draining the notification event queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventsWorkerConfig {
    /// Interval between two fetches from the event queue.
    #[serde(
        rename = "poll_interval_ms",
        default = "default_events_poll_interval",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub poll_interval: Duration,

    /// Maximum number of events fetched per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for EventsWorkerConfig {
    fn default() -> Self {
        Self { poll_interval: default_events_poll_interval(), batch_size: default_batch_size() }
    }
}
