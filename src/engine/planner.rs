//! Turns notification events into scheduled notifications.
//!
//! For every event the planner resolves who must be notified, records the
//! event with the throttle tracker and enqueues one notification per contact,
//! either due right away or at the trigger's next eligible time with the
//! throttled marker set.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{
    scheduler::{NotificationScheduler, SchedulerError},
    throttle::{ThrottleError, ThrottleTracker},
};
use crate::{
    models::{NotificationEvent, ScheduledNotification, TriggerData},
    persistence::{error::PersistenceError, traits::Store},
};

/// Errors returned while planning notifications.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Entity lookup failed.
    #[error("Entity store error: {0}")]
    Store(#[from] PersistenceError),

    /// Throttle accounting failed.
    #[error("Throttle error: {0}")]
    Throttle(#[from] ThrottleError),

    /// Enqueueing failed.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Planning stopped after the event was counted by the throttle tracker.
    #[error("Planning stopped after {scheduled} notification(s): {source}")]
    Incomplete {
        /// Notifications enqueued before the failure.
        scheduled: usize,
        /// The event narrowed to the contacts that still need a notification.
        remaining: Box<NotificationEvent>,
        /// The failure that stopped planning.
        #[source]
        source: Box<PlannerError>,
    },
}

impl PlannerError {
    /// Returns the event to re-queue so that a later attempt finishes the
    /// remaining work without repeating what already succeeded.
    pub fn retry_event(&self) -> Option<&NotificationEvent> {
        match self {
            PlannerError::Incomplete { remaining, .. } => Some(remaining.as_ref()),
            _ => None,
        }
    }

    fn incomplete(
        event: &NotificationEvent,
        contacts: &[String],
        scheduled: usize,
        source: impl Into<PlannerError>,
    ) -> Self {
        let remaining = NotificationEvent {
            pending_contacts: Some(contacts[scheduled..].to_vec()),
            ..event.clone()
        };
        PlannerError::Incomplete {
            scheduled,
            remaining: Box::new(remaining),
            source: Box::new(source.into()),
        }
    }
}

/// Schedules notifications for incoming events.
pub struct NotificationPlanner<S: Store> {
    store: Arc<S>,
    throttle: Arc<ThrottleTracker<S>>,
    scheduler: Arc<NotificationScheduler<S>>,
}

impl<S: Store> NotificationPlanner<S> {
    /// Creates a new planner.
    pub fn new(
        store: Arc<S>,
        throttle: Arc<ThrottleTracker<S>>,
        scheduler: Arc<NotificationScheduler<S>>,
    ) -> Self {
        Self { store, throttle, scheduler }
    }

    /// Schedules the notifications for one event and returns how many were
    /// enqueued. Events for unknown triggers or contacts are dropped with a
    /// warning.
    ///
    /// The event is counted by the throttle tracker once. Any failure after
    /// that is returned as [`PlannerError::Incomplete`], carrying the event
    /// narrowed to the contacts not yet scheduled.
    #[tracing::instrument(skip(self, event), fields(trigger_id = %event.trigger_id, metric = %event.metric), level = "debug")]
    pub async fn process_event(
        &self,
        event: &NotificationEvent,
        now: DateTime<Utc>,
    ) -> Result<usize, PlannerError> {
        let Some((trigger, contacts)) = self.resolve_recipients(event).await? else {
            return Ok(0);
        };
        if contacts.is_empty() {
            tracing::debug!(trigger_id = %trigger.id, "No subscription matches the trigger.");
            return Ok(0);
        }

        if event.pending_contacts.is_none() {
            let event_count = self.throttle.record_event(&trigger.id, event.timestamp).await?;
            tracing::debug!(trigger_id = %trigger.id, event_count, "Event recorded.");
        }
        let original = NotificationEvent { pending_contacts: None, ..event.clone() };

        let eligibility = match self.throttle.get_eligibility(&trigger.id, now).await {
            Ok(eligibility) => eligibility,
            Err(e) => return Err(PlannerError::incomplete(&original, &contacts, 0, e)),
        };
        let due = if eligibility.eligible { now } else { eligibility.next_eligible };

        for (scheduled, contact_id) in contacts.iter().enumerate() {
            let notification = ScheduledNotification::new(
                trigger.clone(),
                contact_id.as_str(),
                original.clone(),
                due,
                eligibility.throttled,
            );
            if let Err(e) = self.scheduler.add(notification).await {
                return Err(PlannerError::incomplete(&original, &contacts, scheduled, e));
            }
        }

        tracing::debug!(
            trigger_id = %trigger.id,
            contacts = contacts.len(),
            throttled = eligibility.throttled,
            %due,
            "Notifications scheduled."
        );
        Ok(contacts.len())
    }

    /// Returns the trigger and the ordered, distinct contacts to notify, or
    /// `None` if the event refers to something that no longer exists.
    async fn resolve_recipients(
        &self,
        event: &NotificationEvent,
    ) -> Result<Option<(TriggerData, Vec<String>)>, PlannerError> {
        if let Some(contact_id) = event.test_contact() {
            if self.store.get_contact(contact_id).await?.is_none() {
                tracing::warn!(contact_id, "Test notification for unknown contact dropped.");
                return Ok(None);
            }
            return Ok(Some((TriggerData::test_trigger(contact_id), vec![contact_id.to_string()])));
        }

        let Some(trigger) = self.store.get_trigger(&event.trigger_id).await? else {
            tracing::warn!(trigger_id = %event.trigger_id, "Event for unknown trigger dropped.");
            return Ok(None);
        };
        if let Some(pending) = &event.pending_contacts {
            return Ok(Some((trigger, pending.clone())));
        }

        let subscriptions = match &event.subscription_id {
            Some(id) => self.store.get_subscriptions(std::slice::from_ref(id)).await?,
            None => self.store.get_tags_subscriptions(&trigger.tags).await?,
        };

        let mut seen = HashSet::new();
        let contacts = subscriptions
            .iter()
            .filter(|subscription| subscription.matches_tags(&trigger.tags))
            .flat_map(|subscription| subscription.contacts.iter())
            .filter(|contact_id| seen.insert(contact_id.as_str()))
            .cloned()
            .collect();
        Ok(Some((trigger, contacts)))
    }
}
