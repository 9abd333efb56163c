//! The dispatcher polls the notification queue and delivers what is due.
//!
//! Each cycle pops every due notification, groups them by contact, trigger and
//! throttled marker, resolves the contact and its sender, and delivers each
//! group with a single bounded sender call. Transient failures are re-queued
//! with exponential backoff; permanent failures and exhausted retries are
//! handed to the failure reporter. Delivery errors never abort the cycle;
//! queue errors do. A throttle update that fails after a successful send is
//! returned once the whole cycle has run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{
    offset,
    reporter::{DeliveryFailure, FailureReporter},
    scheduler::{NotificationScheduler, SchedulerError},
    throttle::{ThrottleError, ThrottleTracker},
};
use crate::{
    config::DispatcherConfig,
    models::{ContactData, NotificationEvent, ScheduledNotification},
    persistence::traits::Store,
    senders::{AttachmentRenderer, SenderError, SenderRegistry},
};

/// Errors that abort a dispatch cycle.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The queue could not be read.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Notifications were delivered but the send could not be recorded with
    /// the throttle tracker.
    #[error("Failed to record delivery in throttle state: {source}")]
    Throttle {
        /// Counters of the completed cycle.
        report: CycleReport,
        /// The first throttle failure of the cycle.
        #[source]
        source: ThrottleError,
    },
}

/// Counters describing a single dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Notifications popped from the queue.
    pub popped: usize,
    /// Notifications delivered.
    pub sent: usize,
    /// Notifications re-queued for another attempt.
    pub retried: usize,
    /// Notifications reported as undeliverable.
    pub failed: usize,
}

/// Notifications delivered together with a single sender call.
struct DeliveryGroup {
    contact_id: String,
    throttled: bool,
    notifications: Vec<ScheduledNotification>,
}

impl DeliveryGroup {
    fn trigger_id(&self) -> &str {
        &self.notifications[0].trigger.id
    }

    fn events(&self) -> Vec<NotificationEvent> {
        self.notifications.iter().map(|n| n.event.clone()).collect()
    }
}

/// Groups popped notifications by (contact, trigger, throttled), keeping the
/// order in which each group first appears.
fn group_notifications(notifications: Vec<ScheduledNotification>) -> Vec<DeliveryGroup> {
    let mut groups: Vec<DeliveryGroup> = Vec::new();
    for notification in notifications {
        let existing = groups.iter_mut().find(|group| {
            group.contact_id == notification.contact_id
                && group.throttled == notification.throttled
                && group.trigger_id() == notification.trigger.id
        });
        match existing {
            Some(group) => group.notifications.push(notification),
            None => groups.push(DeliveryGroup {
                contact_id: notification.contact_id.clone(),
                throttled: notification.throttled,
                notifications: vec![notification],
            }),
        }
    }
    groups
}

/// Delivers due notifications through the registered senders.
pub struct Dispatcher<S: Store> {
    store: Arc<S>,
    scheduler: Arc<NotificationScheduler<S>>,
    throttle: Arc<ThrottleTracker<S>>,
    registry: Arc<SenderRegistry>,
    renderer: Arc<dyn AttachmentRenderer>,
    reporter: Arc<dyn FailureReporter>,
    config: DispatcherConfig,
}

impl<S: Store> Dispatcher<S> {
    /// Creates a new dispatcher.
    pub fn new(
        store: Arc<S>,
        scheduler: Arc<NotificationScheduler<S>>,
        throttle: Arc<ThrottleTracker<S>>,
        registry: Arc<SenderRegistry>,
        renderer: Arc<dyn AttachmentRenderer>,
        reporter: Arc<dyn FailureReporter>,
        config: DispatcherConfig,
    ) -> Self {
        Self { store, scheduler, throttle, registry, renderer, reporter, config }
    }

    /// Returns the dispatcher configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs one poll cycle at `now`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, DispatcherError> {
        let due = self.scheduler.pop_due(now).await?;
        let mut report = CycleReport { popped: due.len(), ..Default::default() };
        if due.is_empty() {
            return Ok(report);
        }

        let mut throttle_error = None;
        for group in group_notifications(due) {
            if let Err(e) = self.deliver(group, now, &mut report).await {
                throttle_error.get_or_insert(e);
            }
        }

        tracing::info!(
            popped = report.popped,
            sent = report.sent,
            retried = report.retried,
            failed = report.failed,
            "Dispatch cycle completed."
        );
        match throttle_error {
            Some(source) => Err(DispatcherError::Throttle { report, source }),
            None => Ok(report),
        }
    }

    /// Delivers one group. Only a failure to record a successful send is
    /// returned; every delivery failure is handled here.
    async fn deliver(
        &self,
        group: DeliveryGroup,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), ThrottleError> {
        let contact = match self.store.get_contact(&group.contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                tracing::warn!(contact_id = %group.contact_id, "Contact no longer exists, notification dropped.");
                self.report_failures(group, "contact not found", report);
                return Ok(());
            }
            Err(e) => {
                tracing::error!(contact_id = %group.contact_id, error = %e, "Failed to load contact.");
                self.retry_or_fail(group, &e.to_string(), now, report).await;
                return Ok(());
            }
        };

        match self.send(&group, &contact).await {
            Ok(()) => {
                report.sent += group.notifications.len();
                let trigger = &group.notifications[0].trigger;
                if let Err(e) = self.throttle.mark_sent(&trigger.id, now, !trigger.is_test()).await {
                    tracing::error!(trigger_id = %trigger.id, error = %e, "Failed to record delivery in throttle state.");
                    return Err(e);
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(contact_id = %contact.id, trigger_id = %group.trigger_id(), error = %e, "Transient delivery failure.");
                self.retry_or_fail(group, &e.to_string(), now, report).await;
            }
            Err(e) => {
                tracing::warn!(contact_id = %contact.id, trigger_id = %group.trigger_id(), error = %e, "Permanent delivery failure.");
                self.report_failures(group, &e.to_string(), report);
            }
        }
        Ok(())
    }

    async fn send(&self, group: &DeliveryGroup, contact: &ContactData) -> Result<(), SenderError> {
        let sender = self
            .registry
            .get(&contact.contact_type)
            .ok_or_else(|| SenderError::UnknownContactType(contact.contact_type.clone()))?;

        let trigger = &group.notifications[0].trigger;
        let events = group.events();
        let attachment = self.renderer.render(trigger, &events).await;

        let delivery =
            sender.send_events(&events, contact, trigger, attachment.as_ref(), group.throttled);
        match tokio::time::timeout(self.config.send_timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(SenderError::Timeout(self.config.send_timeout)),
        }
    }

    /// Re-queues every notification of the group that has retries left and
    /// reports the others.
    async fn retry_or_fail(
        &self,
        group: DeliveryGroup,
        error: &str,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let policy = &self.config.retry;
        for notification in group.notifications {
            if !policy.can_retry(notification.retry_count) {
                self.report_failure(&notification, error, true);
                report.failed += 1;
                continue;
            }

            let retry = notification.retry_at(offset(now, policy.backoff(notification.retry_count)));
            match self.scheduler.add(retry).await {
                Ok(key) => {
                    tracing::debug!(%key, attempt = notification.retry_count + 1, "Notification re-queued.");
                    report.retried += 1;
                }
                Err(e) => {
                    let error = format!("{error}; re-queue failed: {e}");
                    self.report_failure(&notification, &error, false);
                    report.failed += 1;
                }
            }
        }
    }

    fn report_failures(&self, group: DeliveryGroup, error: &str, report: &mut CycleReport) {
        for notification in &group.notifications {
            self.report_failure(notification, error, false);
            report.failed += 1;
        }
    }

    /// Reports a notification that is dropped without delivery.
    fn report_failure(&self, notification: &ScheduledNotification, error: &str, exhausted: bool) {
        self.reporter.report(&DeliveryFailure {
            key: notification.key(),
            contact_id: notification.contact_id.clone(),
            trigger_id: notification.trigger.id.clone(),
            error: error.to_string(),
            attempts: notification.retry_count + 1,
            permanent: true,
            exhausted,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerData;

    fn notification(trigger: &str, contact: &str, throttled: bool) -> ScheduledNotification {
        let now = Utc::now();
        ScheduledNotification::new(
            TriggerData { id: trigger.into(), ..Default::default() },
            contact,
            NotificationEvent::test_event(contact, now),
            now,
            throttled,
        )
    }

    #[test]
    fn test_grouping_by_contact_trigger_and_throttle() {
        let groups = group_notifications(vec![
            notification("t1", "c1", false),
            notification("t2", "c1", false),
            notification("t1", "c1", false),
            notification("t1", "c1", true),
            notification("t1", "c2", false),
        ]);

        let shape: Vec<_> = groups
            .iter()
            .map(|g| (g.contact_id.as_str(), g.trigger_id(), g.throttled, g.notifications.len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("c1", "t1", false, 2),
                ("c1", "t2", false, 1),
                ("c1", "t1", true, 1),
                ("c2", "t1", false, 1),
            ]
        );
    }
}
