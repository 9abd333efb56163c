//! This module contains the data models shared by the coordination and
//! delivery components.

pub mod contact;
pub mod event;
pub mod lock;
pub mod notification;
pub mod subscription;
pub mod throttle;
pub mod trigger;

pub use contact::ContactData;
pub use event::{NotificationEvent, TriggerState};
pub use lock::{Lease, TriggerCheckLock};
pub use notification::{NotificationKey, ScheduledNotification};
pub use subscription::SubscriptionData;
pub use throttle::ThrottleState;
pub use trigger::TriggerData;
