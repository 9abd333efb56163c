//! Reporting of notifications that could not be delivered.

use serde::Serialize;

use crate::models::NotificationKey;

/// A notification that was dropped without being delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    /// Queue key of the dropped notification.
    pub key: NotificationKey,
    /// Contact the notification was addressed to.
    pub contact_id: String,
    /// Trigger the notification belongs to.
    pub trigger_id: String,
    /// Description of the last error.
    pub error: String,
    /// Number of delivery attempts made, the failed one included.
    pub attempts: u32,
    /// True when the notification is dropped for good and will not be
    /// attempted again.
    pub permanent: bool,
    /// True when the drop followed the last allowed retry of a transient
    /// failure.
    pub exhausted: bool,
}

/// Receives delivery failures for operational alerting.
pub trait FailureReporter: Send + Sync {
    /// Reports a dropped notification.
    fn report(&self, failure: &DeliveryFailure);
}

/// Reports failures as `error` level tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &DeliveryFailure) {
        tracing::error!(
            key = %failure.key,
            contact_id = %failure.contact_id,
            trigger_id = %failure.trigger_id,
            attempts = failure.attempts,
            permanent = failure.permanent,
            exhausted = failure.exhausted,
            error = %failure.error,
            "Notification dropped without delivery."
        );
    }
}
