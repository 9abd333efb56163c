//! Serde helpers for durations expressed as integer milliseconds or seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Deserializes a `Duration` from an integer number of milliseconds.
pub fn deserialize_duration_from_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Deserializes a `Duration` from an integer number of seconds.
pub fn deserialize_duration_from_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Serializes a `Duration` as whole milliseconds.
pub fn serialize_duration_to_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Serializes a `Duration` as whole seconds.
pub fn serialize_duration_to_seconds<S>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Intervals {
        #[serde(
            deserialize_with = "deserialize_duration_from_ms",
            serialize_with = "serialize_duration_to_ms"
        )]
        poll_ms: Duration,
        #[serde(
            deserialize_with = "deserialize_duration_from_seconds",
            serialize_with = "serialize_duration_to_seconds"
        )]
        timeout_secs: Duration,
    }

    #[test]
    fn test_durations_from_yaml() {
        let parsed: Intervals = serde_yaml::from_str("poll_ms: 1500\ntimeout_secs: 30\n").unwrap();
        assert_eq!(parsed.poll_ms, Duration::from_millis(1500));
        assert_eq!(parsed.timeout_secs, Duration::from_secs(30));
    }

    #[test]
    fn test_durations_serialize_as_integers() {
        let value = Intervals {
            poll_ms: Duration::from_millis(250),
            timeout_secs: Duration::from_secs(60),
        };
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"poll_ms":250,"timeout_secs":60}"#);
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let result: Result<Intervals, _> =
            serde_json::from_str(r#"{"poll_ms": -1, "timeout_secs": 1}"#);
        assert!(result.is_err());
    }
}
