//! A set of helpers for testing

mod contact;
mod event;
mod notification;
mod reporter;
mod sender;
mod store;
mod trigger;

pub use contact::ContactBuilder;
pub use event::EventBuilder;
pub use notification::NotificationBuilder;
pub use reporter::RecordingReporter;
pub use sender::{RecordedSend, RecordingSender};
pub use store::create_test_store;
pub use trigger::TriggerBuilder;
