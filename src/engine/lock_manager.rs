//! Lease based mutual exclusion for trigger checks.
//!
//! Only one checker may evaluate a trigger at a time. A lock is a lease: it
//! carries an expiry and is reclaimable by anyone once that expiry has passed,
//! so a crashed worker never blocks a trigger for longer than one lease.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::offset;
use crate::{
    config::LockConfig,
    models::Lease,
    persistence::{error::PersistenceError, traits::LockStore},
};

/// Errors returned by the trigger lock manager.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another owner holds a live lease on the trigger.
    #[error("Trigger '{0}' is locked by another checker")]
    Contended(String),

    /// The caller's lease expired or was taken over.
    #[error("Lease on trigger '{0}' was lost")]
    LeaseLost(String),

    /// The store failed.
    #[error("Lock store error: {0}")]
    Store(#[from] PersistenceError),
}

/// Acquires, renews and releases trigger check leases.
pub struct TriggerLockManager<S: LockStore + ?Sized> {
    store: Arc<S>,
}

impl<S: LockStore + ?Sized> TriggerLockManager<S> {
    /// Creates a new lock manager over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Takes a fresh lease on `trigger_id` under a newly generated owner
    /// token. Fails with [`LockError::Contended`] if someone else holds a live
    /// lease.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn acquire(&self, trigger_id: &str, lease: Duration) -> Result<Lease, LockError> {
        let owner_token = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = offset(now, lease);

        if self.store.try_acquire_lock(trigger_id, &owner_token, now, expires_at).await? {
            tracing::debug!(trigger_id, owner_token, %expires_at, "Trigger lock acquired.");
            Ok(Lease { trigger_id: trigger_id.to_string(), owner_token, expires_at })
        } else {
            Err(LockError::Contended(trigger_id.to_string()))
        }
    }

    /// Extends a lease the caller still owns. Fails with
    /// [`LockError::LeaseLost`] if the lease expired or changed hands; the
    /// caller must then abandon the check.
    #[tracing::instrument(skip(self, lease), fields(trigger_id = %lease.trigger_id), level = "debug")]
    pub async fn renew(&self, lease: &mut Lease, duration: Duration) -> Result<(), LockError> {
        let now = Utc::now();
        let expires_at = offset(now, duration);

        if self.store.renew_lock(&lease.trigger_id, &lease.owner_token, now, expires_at).await? {
            lease.expires_at = expires_at;
            Ok(())
        } else {
            tracing::warn!(trigger_id = %lease.trigger_id, "Trigger lock lost before renewal.");
            Err(LockError::LeaseLost(lease.trigger_id.clone()))
        }
    }

    /// Releases a lease. Releasing a lease that is gone or owned by someone
    /// else is a no-op.
    #[tracing::instrument(skip(self, owner_token), level = "debug")]
    pub async fn release(&self, trigger_id: &str, owner_token: &str) -> Result<(), LockError> {
        self.store.release_lock(trigger_id, owner_token).await?;
        Ok(())
    }

    /// Runs `check` while holding the lease on `trigger_id`.
    ///
    /// The lease is renewed every `renew_interval` while `check` runs. If a
    /// renewal fails the token handed to `check` is cancelled, `check` is
    /// dropped and the renewal error is returned. The lease is released
    /// afterwards in every case.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        trigger_id: &str,
        lease_duration: Duration,
        renew_interval: Duration,
        check: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut lease = self.acquire(trigger_id, lease_duration).await?;
        let token = CancellationToken::new();

        let work = check(token.clone());
        tokio::pin!(work);
        let mut renewals = tokio::time::interval_at(
            tokio::time::Instant::now() + renew_interval,
            renew_interval,
        );

        let outcome = loop {
            tokio::select! {
                output = &mut work => break Ok(output),
                _ = renewals.tick() => {
                    if let Err(e) = self.renew(&mut lease, lease_duration).await {
                        token.cancel();
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = self.release(&lease.trigger_id, &lease.owner_token).await {
            tracing::warn!(trigger_id, error = %e, "Failed to release trigger lock; it will expire.");
        }
        outcome
    }

    /// Runs `check` exclusively with the lease settings from `config`.
    pub async fn run_check<F, Fut, T>(
        &self,
        trigger_id: &str,
        config: &LockConfig,
        check: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        self.run_exclusive(trigger_id, config.lease_duration, config.renew_interval, check).await
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};

    use super::*;
    use crate::persistence::traits::MockLockStore;

    #[tokio::test]
    async fn test_acquire_contended() {
        let mut store = MockLockStore::new();
        store
            .expect_try_acquire_lock()
            .with(eq("t1".to_string()), always(), always(), always())
            .returning(|_, _, _, _| Ok(false));

        let manager = TriggerLockManager::new(Arc::new(store));
        let result = manager.acquire("t1", Duration::from_secs(30)).await;
        assert!(matches!(result, Err(LockError::Contended(id)) if id == "t1"));
    }

    #[tokio::test]
    async fn test_store_error_is_surfaced() {
        let mut store = MockLockStore::new();
        store.expect_try_acquire_lock().returning(|_, _, _, _| {
            Err(PersistenceError::OperationFailed("disk on fire".into()))
        });

        let manager = TriggerLockManager::new(Arc::new(store));
        let result = manager.acquire("t1", Duration::from_secs(30)).await;
        assert!(matches!(result, Err(LockError::Store(_))));
    }

    #[tokio::test]
    async fn test_renew_lost_lease() {
        let mut store = MockLockStore::new();
        store.expect_try_acquire_lock().returning(|_, _, _, _| Ok(true));
        store.expect_renew_lock().returning(|_, _, _, _| Ok(false));

        let manager = TriggerLockManager::new(Arc::new(store));
        let mut lease = manager.acquire("t1", Duration::from_secs(30)).await.unwrap();
        let result = manager.renew(&mut lease, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(LockError::LeaseLost(_))));
    }

    #[tokio::test]
    async fn test_run_exclusive_cancels_check_when_lease_is_lost() {
        let mut store = MockLockStore::new();
        store.expect_try_acquire_lock().returning(|_, _, _, _| Ok(true));
        store.expect_renew_lock().returning(|_, _, _, _| Ok(false));
        store.expect_release_lock().times(1).returning(|_, _| Ok(()));

        let manager = TriggerLockManager::new(Arc::new(store));
        let result = manager
            .run_exclusive("t1", Duration::from_secs(1), Duration::from_millis(10), |token| {
                async move {
                    token.cancelled().await;
                    "unreachable"
                }
            })
            .await;
        assert!(matches!(result, Err(LockError::LeaseLost(_))));
    }

    #[tokio::test]
    async fn test_run_exclusive_returns_output_and_releases() {
        let mut store = MockLockStore::new();
        store.expect_try_acquire_lock().returning(|_, _, _, _| Ok(true));
        store.expect_renew_lock().returning(|_, _, _, _| Ok(true));
        store
            .expect_release_lock()
            .with(eq("t1".to_string()), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let manager = TriggerLockManager::new(Arc::new(store));
        let result = manager
            .run_exclusive("t1", Duration::from_secs(1), Duration::from_millis(5), |_| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                42
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }
}
