//! This module defines the persistent store contract.
//!
//! The store is the single source of truth shared by every worker process.
//! Implementations must make each method atomic on its own; no method may rely
//! on multi-key transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::{
    models::{
        ContactData, NotificationEvent, NotificationKey, ScheduledNotification, SubscriptionData,
        ThrottleState, TriggerCheckLock, TriggerData,
    },
    persistence::error::PersistenceError,
};

/// Lease storage for trigger check locks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Writes a lease for `owner_token` unless a lease expiring after `now`
    /// exists. Returns true if the lease was written.
    async fn try_acquire_lock(
        &self,
        trigger_id: &str,
        owner_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError>;

    /// Extends the lease if `owner_token` still holds a live lease. Returns
    /// true if the lease was extended.
    async fn renew_lock(
        &self,
        trigger_id: &str,
        owner_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError>;

    /// Deletes the lease if it belongs to `owner_token`.
    async fn release_lock(&self, trigger_id: &str, owner_token: &str)
    -> Result<(), PersistenceError>;

    /// Reads the current lease record, live or stale.
    async fn get_lock(&self, trigger_id: &str) -> Result<Option<TriggerCheckLock>, PersistenceError>;
}

/// Storage for per-trigger throttling state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Reads the throttle state with its current version.
    async fn get_throttle_state(
        &self,
        trigger_id: &str,
    ) -> Result<Option<ThrottleState>, PersistenceError>;

    /// Writes `state` if the stored version still equals `state.version`
    /// (0 meaning "absent"). Returns true if the write happened.
    async fn compare_and_set_throttle_state(
        &self,
        trigger_id: &str,
        state: &ThrottleState,
    ) -> Result<bool, PersistenceError>;

    /// Deletes the throttle state.
    async fn delete_throttle_state(&self, trigger_id: &str) -> Result<(), PersistenceError>;
}

/// Storage for the time-ordered notification queue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts a notification and returns its assigned insertion sequence.
    async fn insert_notification(
        &self,
        notification: &ScheduledNotification,
    ) -> Result<i64, PersistenceError>;

    /// Reads, without removing, every notification due at or before `now`.
    async fn peek_due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, PersistenceError>;

    /// Removes a single entry. Returns true if this call deleted it.
    async fn remove_notification(&self, key: &NotificationKey) -> Result<bool, PersistenceError>;

    /// Atomically removes and returns every notification due at or before
    /// `now`.
    ///
    /// The default implementation claims entries one by one: an entry belongs
    /// to this caller only if its own delete removed it, so concurrent callers
    /// never receive the same entry.
    async fn pop_due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, PersistenceError> {
        let candidates = self.peek_due_notifications(now).await?;
        let mut claimed = Vec::with_capacity(candidates.len());
        for notification in candidates {
            if self.remove_notification(&notification.key()).await? {
                claimed.push(notification);
            }
        }
        Ok(claimed)
    }

    /// Lists notifications due within `[start, end]` along with the total
    /// number of pending notifications.
    async fn list_notifications(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<ScheduledNotification>, u64), PersistenceError>;

    /// Lists every pending notification addressed to a contact.
    async fn get_contact_notifications(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ScheduledNotification>, PersistenceError>;
}

/// Storage for the queue of raw notification events.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends an event to the queue.
    async fn push_event(&self, event: &NotificationEvent) -> Result<(), PersistenceError>;

    /// Atomically removes and returns up to `limit` oldest events.
    async fn fetch_events(&self, limit: u32) -> Result<Vec<NotificationEvent>, PersistenceError>;
}

/// Lookup and maintenance of triggers, contacts and subscriptions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Reads a trigger.
    async fn get_trigger(&self, trigger_id: &str) -> Result<Option<TriggerData>, PersistenceError>;

    /// Creates or replaces a trigger.
    async fn save_trigger(&self, trigger: &TriggerData) -> Result<(), PersistenceError>;

    /// Reads a contact.
    async fn get_contact(&self, contact_id: &str) -> Result<Option<ContactData>, PersistenceError>;

    /// Reads every contact.
    async fn get_all_contacts(&self) -> Result<Vec<ContactData>, PersistenceError>;

    /// Lists the ids of the contacts owned by a user.
    async fn get_user_contact_ids(&self, user: &str) -> Result<Vec<String>, PersistenceError>;

    /// Creates or replaces a contact.
    async fn save_contact(&self, contact: &ContactData) -> Result<(), PersistenceError>;

    /// Deletes a contact. Deleting a missing contact is not an error.
    async fn delete_contact(&self, contact_id: &str) -> Result<(), PersistenceError>;

    /// Reads a subscription.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionData>, PersistenceError>;

    /// Reads the given subscriptions; missing ids are skipped.
    async fn get_subscriptions(
        &self,
        subscription_ids: &[String],
    ) -> Result<Vec<SubscriptionData>, PersistenceError>;

    /// Lists the ids of the subscriptions owned by a user.
    async fn get_user_subscription_ids(&self, user: &str) -> Result<Vec<String>, PersistenceError>;

    /// Reads every subscription sharing at least one tag with `tags`.
    async fn get_tags_subscriptions(
        &self,
        tags: &[String],
    ) -> Result<Vec<SubscriptionData>, PersistenceError>;

    /// Creates or replaces a subscription.
    async fn save_subscription(&self, subscription: &SubscriptionData)
    -> Result<(), PersistenceError>;
}

/// The complete store contract consumed by the supervisor.
pub trait Store:
    LockStore + ThrottleStore + NotificationStore + EventStore + EntityStore + 'static
{
}

impl<T> Store for T where
    T: LockStore + ThrottleStore + NotificationStore + EventStore + EntityStore + 'static
{
}
