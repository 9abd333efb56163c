//! Drains the notification event queue into the planner.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::planner::{NotificationPlanner, PlannerError};
use crate::persistence::traits::Store;

/// Fetches queued notification events and schedules their notifications.
pub struct EventsWorker<S: Store> {
    store: Arc<S>,
    planner: Arc<NotificationPlanner<S>>,
    batch_size: u32,
}

impl<S: Store> EventsWorker<S> {
    /// Creates a new worker fetching up to `batch_size` events per tick.
    pub fn new(store: Arc<S>, planner: Arc<NotificationPlanner<S>>, batch_size: u32) -> Self {
        Self { store, planner, batch_size }
    }

    /// Processes one batch of events and returns how many notifications were
    /// scheduled.
    ///
    /// An event whose planning fails is pushed back onto the queue so it is
    /// picked up again on a later tick; the first such error is returned. An
    /// event that was only partly planned is re-queued for its remaining
    /// contacts.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, PlannerError> {
        let events = self.store.fetch_events(self.batch_size).await?;
        let mut scheduled = 0;
        let mut first_error = None;

        for event in events {
            match self.planner.process_event(&event, now).await {
                Ok(count) => scheduled += count,
                Err(e) => {
                    tracing::error!(trigger_id = %event.trigger_id, error = %e, "Failed to schedule notifications for event.");
                    let retry = e.retry_event().unwrap_or(&event);
                    if let Err(push_error) = self.store.push_event(retry).await {
                        tracing::error!(error = %push_error, "Failed to re-queue event; it is lost.");
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(scheduled),
        }
    }
}
