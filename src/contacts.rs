//! Contact management: creation, removal with its subscription cascade, and
//! test notifications.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    engine::scheduler::{NotificationScheduler, SchedulerError},
    models::{ContactData, NotificationEvent},
    persistence::{error::PersistenceError, traits::Store},
    senders::SenderRegistry,
};

/// Errors returned by the contact service.
#[derive(Debug, Error)]
pub enum ContactError {
    /// No sender serves the requested contact type.
    #[error("Unknown contact type: {0}")]
    UnknownContactType(String),

    /// The contact does not exist.
    #[error("Contact not found: {0}")]
    NotFound(String),

    /// The contact belongs to another user.
    #[error("Contact {contact_id} does not belong to user {user}")]
    NotOwner {
        /// The contact.
        contact_id: String,
        /// The requesting user.
        user: String,
    },

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),

    /// Cancelling the contact's pending notifications failed.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Manages contacts on behalf of users.
pub struct ContactService<S: Store> {
    store: Arc<S>,
    registry: Arc<SenderRegistry>,
    scheduler: Arc<NotificationScheduler<S>>,
}

impl<S: Store> ContactService<S> {
    /// Creates a new contact service.
    pub fn new(
        store: Arc<S>,
        registry: Arc<SenderRegistry>,
        scheduler: Arc<NotificationScheduler<S>>,
    ) -> Self {
        Self { store, registry, scheduler }
    }

    /// Creates a contact for `user` and returns it with its generated id.
    #[tracing::instrument(skip(self, value), level = "info")]
    pub async fn create_contact(
        &self,
        user: &str,
        contact_type: &str,
        value: &str,
    ) -> Result<ContactData, ContactError> {
        if !self.registry.contains(contact_type) {
            return Err(ContactError::UnknownContactType(contact_type.to_string()));
        }
        let contact = ContactData {
            id: uuid::Uuid::new_v4().to_string(),
            user: user.to_string(),
            contact_type: contact_type.to_string(),
            value: value.to_string(),
        };
        self.store.save_contact(&contact).await?;
        tracing::info!(contact_id = %contact.id, "Contact created.");
        Ok(contact)
    }

    /// Replaces the type and value of a contact owned by `user`.
    #[tracing::instrument(skip(self, value), level = "info")]
    pub async fn update_contact(
        &self,
        contact_id: &str,
        user: &str,
        contact_type: &str,
        value: &str,
    ) -> Result<ContactData, ContactError> {
        if !self.registry.contains(contact_type) {
            return Err(ContactError::UnknownContactType(contact_type.to_string()));
        }
        let mut contact = self.owned_contact(contact_id, user).await?;
        contact.contact_type = contact_type.to_string();
        contact.value = value.to_string();
        self.store.save_contact(&contact).await?;
        Ok(contact)
    }

    /// Lists every contact.
    pub async fn list_contacts(&self) -> Result<Vec<ContactData>, ContactError> {
        Ok(self.store.get_all_contacts().await?)
    }

    /// Lists the contacts owned by `user`.
    pub async fn get_user_contacts(&self, user: &str) -> Result<Vec<ContactData>, ContactError> {
        let mut contacts = Vec::new();
        for id in self.store.get_user_contact_ids(user).await? {
            if let Some(contact) = self.store.get_contact(&id).await? {
                contacts.push(contact);
            }
        }
        Ok(contacts)
    }

    /// Removes a contact owned by `user`.
    ///
    /// The contact is first taken out of every subscription of the user that
    /// lists it, one subscription write at a time, then deleted, and finally
    /// its pending notifications are cancelled. The steps are not atomic: if
    /// one fails the error is returned and earlier steps stay applied. A
    /// notification that still references a removed contact is dropped at
    /// dispatch time.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn remove_contact(&self, contact_id: &str, user: &str) -> Result<(), ContactError> {
        self.owned_contact(contact_id, user).await?;

        let subscription_ids = self.store.get_user_subscription_ids(user).await?;
        let subscriptions = self.store.get_subscriptions(&subscription_ids).await?;
        for mut subscription in subscriptions {
            if subscription.remove_contact(contact_id) {
                self.store.save_subscription(&subscription).await?;
                tracing::debug!(subscription_id = %subscription.id, "Contact removed from subscription.");
            }
        }

        self.store.delete_contact(contact_id).await?;
        let cancelled = self.scheduler.cancel_contact(contact_id).await?;
        tracing::info!(cancelled, "Contact removed.");
        Ok(())
    }

    /// Queues a synthetic event addressed to the contact so that its delivery
    /// settings can be verified end to end.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn test_contact(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ContactError> {
        if self.store.get_contact(contact_id).await?.is_none() {
            return Err(ContactError::NotFound(contact_id.to_string()));
        }
        self.store.push_event(&NotificationEvent::test_event(contact_id, now)).await?;
        Ok(())
    }

    async fn owned_contact(&self, contact_id: &str, user: &str) -> Result<ContactData, ContactError> {
        let contact = self
            .store
            .get_contact(contact_id)
            .await?
            .ok_or_else(|| ContactError::NotFound(contact_id.to_string()))?;
        if contact.user != user {
            return Err(ContactError::NotOwner {
                contact_id: contact_id.to_string(),
                user: user.to_string(),
            });
        }
        Ok(contact)
    }
}
