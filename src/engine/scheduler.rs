//! The durable, time-ordered notification queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    models::{NotificationKey, ScheduledNotification},
    persistence::{error::PersistenceError, traits::NotificationStore},
};

/// Errors returned by the notification scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The store is unavailable or failed; the operation may be retried.
    #[error("Notification store unavailable: {0}")]
    StoreUnavailable(#[from] PersistenceError),
}

/// Pending notifications due within a range, plus the size of the queue.
#[derive(Debug, Clone, Default)]
pub struct NotificationListing {
    /// Notifications due within the requested range, oldest first.
    pub notifications: Vec<ScheduledNotification>,
    /// Number of pending notifications in the whole queue.
    pub total: u64,
}

/// Inserts, pops and cancels scheduled notifications.
pub struct NotificationScheduler<S: NotificationStore + ?Sized> {
    store: Arc<S>,
}

impl<S: NotificationStore + ?Sized> NotificationScheduler<S> {
    /// Creates a new scheduler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Enqueues a notification and returns its queue key.
    #[tracing::instrument(skip(self, notification), fields(trigger_id = %notification.trigger.id, contact_id = %notification.contact_id, due = %notification.due), level = "debug")]
    pub async fn add(
        &self,
        mut notification: ScheduledNotification,
    ) -> Result<NotificationKey, SchedulerError> {
        notification.sequence = self.store.insert_notification(&notification).await?;
        Ok(notification.key())
    }

    /// Removes and returns every notification due at or before `now`, ordered
    /// by due time and then insertion order. Concurrent callers never receive
    /// the same entry.
    pub async fn pop_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, SchedulerError> {
        let mut due = self.store.pop_due_notifications(now).await?;
        due.sort_by_key(|n| (n.due, n.sequence));
        if !due.is_empty() {
            tracing::debug!(count = due.len(), "Popped due notifications.");
        }
        Ok(due)
    }

    /// Removes a pending notification. Cancelling an unknown key is a no-op.
    #[tracing::instrument(skip(self, key), fields(key = %key), level = "debug")]
    pub async fn cancel(&self, key: &NotificationKey) -> Result<(), SchedulerError> {
        if !self.store.remove_notification(key).await? {
            tracing::debug!("Notification already gone.");
        }
        Ok(())
    }

    /// Cancels every pending notification addressed to a contact and returns
    /// how many were removed.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn cancel_contact(&self, contact_id: &str) -> Result<usize, SchedulerError> {
        let mut removed = 0;
        for notification in self.store.get_contact_notifications(contact_id).await? {
            if self.store.remove_notification(&notification.key()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Lists notifications due within `[start, end]`.
    pub async fn list(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NotificationListing, SchedulerError> {
        let (notifications, total) = self.store.list_notifications(start, end).await?;
        Ok(NotificationListing { notifications, total })
    }
}
