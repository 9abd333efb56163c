//! Dispatcher loop and delivery retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_base() -> u32 {
    2
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(3600)
}

/// Retry policy applied to transient delivery failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of re-deliveries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(
        rename = "initial_backoff_secs",
        default = "default_initial_backoff",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub initial_backoff: Duration,

    /// Multiplier applied to the delay on each further retry.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,

    /// Upper bound on any single retry delay.
    #[serde(
        rename = "max_backoff_secs",
        default = "default_max_backoff",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            backoff_base: default_backoff_base(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `retry_count + 1`, i.e.
    /// `initial * base^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = self.backoff_base.max(1).checked_pow(retry_count).unwrap_or(u32::MAX);
        self.initial_backoff.checked_mul(factor).unwrap_or(self.max_backoff).min(self.max_backoff)
    }

    /// Returns true if a notification that already failed `retry_count` times
    /// may be attempted again.
    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

/// Configuration of the dispatcher loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Interval between two polls of the notification queue.
    #[serde(
        rename = "poll_interval_ms",
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub poll_interval: Duration,

    /// Upper bound on a single sender call.
    #[serde(
        rename = "send_timeout_secs",
        default = "default_send_timeout",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub send_timeout: Duration,

    /// Retry policy for transient delivery failures.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            send_timeout: default_send_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(30));
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(3), Duration::from_secs(240));
        assert_eq!(policy.backoff(7), Duration::from_secs(3600));
        assert_eq!(policy.backoff(40), Duration::from_secs(3600));
    }

    #[test]
    fn test_can_retry_respects_max() {
        let policy = RetryPolicy { max_retries: 2, ..Default::default() };
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: DispatcherConfig =
            serde_yaml::from_str("poll_interval_ms: 200\nretry:\n  max_retries: 1\n").unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.send_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_backoff, Duration::from_secs(30));
    }
}
