//! Configuration module for herald.

mod app_config;
mod dispatcher;
mod helpers;
mod throttle;
mod workers;

pub use app_config::AppConfig;
pub use dispatcher::{DispatcherConfig, RetryPolicy};
pub use helpers::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};
pub use throttle::{ThrottleConfig, ThrottleTier};
pub use workers::{EventsWorkerConfig, LockConfig};
