//! Throttling and escalation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{deserialize_duration_from_seconds, serialize_duration_to_seconds};

fn default_window() -> Duration {
    Duration::from_secs(3 * 3600)
}

fn default_quiet_period() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(3600)
}

fn default_tiers() -> Vec<ThrottleTier> {
    vec![
        ThrottleTier { count: 10, delay: Duration::from_secs(30 * 60) },
        ThrottleTier { count: 20, delay: Duration::from_secs(3600) },
    ]
}

/// A cool-down stage that applies once a trigger has produced `count` events
/// within the current window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleTier {
    /// Event count threshold at which the tier starts to apply.
    pub count: u64,

    /// Delay imposed before the next notification.
    #[serde(
        rename = "delay_secs",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub delay: Duration,
}

/// Per-trigger event accounting and escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Length of a counting window before it is reopened.
    #[serde(
        rename = "window_secs",
        default = "default_window",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub window: Duration,

    /// A gap between events longer than this reopens the window.
    #[serde(
        rename = "quiet_period_secs",
        default = "default_quiet_period",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub quiet_period: Duration,

    /// Upper bound on any escalation delay.
    #[serde(
        rename = "max_delay_secs",
        default = "default_max_delay",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub max_delay: Duration,

    /// Escalation tiers. Order in the file does not matter.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<ThrottleTier>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            quiet_period: default_quiet_period(),
            max_delay: default_max_delay(),
            tiers: default_tiers(),
        }
    }
}

impl ThrottleConfig {
    /// Returns the index and delay of the highest tier whose threshold is
    /// reached by `event_count`, with the delay capped at `max_delay`.
    pub fn tier_for(&self, event_count: u64) -> Option<(usize, Duration)> {
        self.tiers
            .iter()
            .enumerate()
            .filter(|(_, tier)| event_count >= tier.count)
            .max_by_key(|(_, tier)| tier.count)
            .map(|(index, tier)| (index, tier.delay.min(self.max_delay)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_for_picks_highest_reached_threshold() {
        let config = ThrottleConfig::default();
        assert_eq!(config.tier_for(3), None);
        assert_eq!(config.tier_for(10), Some((0, Duration::from_secs(1800))));
        assert_eq!(config.tier_for(25), Some((1, Duration::from_secs(3600))));
    }

    #[test]
    fn test_tier_delay_is_capped() {
        let config = ThrottleConfig {
            max_delay: Duration::from_secs(600),
            tiers: vec![
                ThrottleTier { count: 50, delay: Duration::from_secs(7200) },
                ThrottleTier { count: 5, delay: Duration::from_secs(60) },
            ],
            ..Default::default()
        };
        assert_eq!(config.tier_for(6), Some((1, Duration::from_secs(60))));
        assert_eq!(config.tier_for(60), Some((0, Duration::from_secs(600))));
    }

    #[test]
    fn test_tiers_from_yaml() {
        let yaml = "window_secs: 600\ntiers:\n  - count: 3\n    delay_secs: 120\n";
        let config: ThrottleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window, Duration::from_secs(600));
        assert_eq!(config.quiet_period, Duration::from_secs(3600));
        assert_eq!(config.tiers, vec![ThrottleTier { count: 3, delay: Duration::from_secs(120) }]);
    }
}
