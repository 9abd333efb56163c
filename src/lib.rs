#![warn(missing_docs)]
//! Herald coordinates trigger checks and schedules, throttles and delivers the
//! notifications of an alerting pipeline.

pub mod config;
pub mod contacts;
pub mod engine;
pub mod models;
pub mod persistence;
pub mod senders;
pub mod supervisor;
pub mod test_helpers;
pub mod worker;
