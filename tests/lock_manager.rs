//! Integration tests for trigger check leases shared between processes.

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use herald::{
    config::LockConfig,
    engine::lock_manager::{LockError, TriggerLockManager},
    persistence::traits::LockStore,
};

use crate::common::SharedDatabase;

#[tokio::test]
async fn test_only_one_process_holds_a_trigger() {
    let db = SharedDatabase::new().await;
    let first = TriggerLockManager::new(db.open().await);
    let second = TriggerLockManager::new(db.open().await);

    let lease = first.acquire("t1", Duration::from_secs(30)).await.unwrap();
    assert!(matches!(
        second.acquire("t1", Duration::from_secs(30)).await,
        Err(LockError::Contended(_))
    ));
    // Other triggers are unaffected.
    second.acquire("t2", Duration::from_secs(30)).await.unwrap();

    // Releasing with someone else's token does nothing.
    second.release("t1", "not-the-owner").await.unwrap();
    assert!(second.acquire("t1", Duration::from_secs(30)).await.is_err());

    first.release("t1", &lease.owner_token).await.unwrap();
    second.acquire("t1", Duration::from_secs(30)).await.unwrap();
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let db = SharedDatabase::new().await;
    let first = TriggerLockManager::new(db.open().await);
    let second = TriggerLockManager::new(db.open().await);

    let mut stale = first.acquire("t1", Duration::from_millis(100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let fresh = second.acquire("t1", Duration::from_secs(30)).await.unwrap();
    assert_ne!(fresh.owner_token, stale.owner_token);

    // The previous owner learns it lost the lease and cannot free it.
    let renewed = first.renew(&mut stale, Duration::from_secs(30)).await;
    assert!(matches!(renewed, Err(LockError::LeaseLost(_))));
    first.release("t1", &stale.owner_token).await.unwrap();
    assert!(first.acquire("t1", Duration::from_secs(30)).await.is_err());
}

#[tokio::test]
async fn test_run_exclusive_renews_past_the_lease_duration() {
    let db = SharedDatabase::new().await;
    let holder = TriggerLockManager::new(db.open().await);
    let rival = Arc::new(TriggerLockManager::new(db.open().await));
    let rejected = Arc::new(AtomicUsize::new(0));

    let rival_handle = Arc::clone(&rival);
    let rejected_count = Arc::clone(&rejected);
    let result = holder
        .run_exclusive(
            "t1",
            Duration::from_millis(300),
            Duration::from_millis(50),
            |token| async move {
                // Outlive the initial lease several times over.
                for _ in 0..4 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    if rival_handle.acquire("t1", Duration::from_secs(1)).await.is_err() {
                        rejected_count.fetch_add(1, Ordering::SeqCst);
                    }
                }
                token.is_cancelled()
            },
        )
        .await;

    assert!(!result.unwrap(), "check must not be cancelled while renewals succeed");
    assert_eq!(rejected.load(Ordering::SeqCst), 4);
    // Released on completion.
    rival.acquire("t1", Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_run_check_uses_configured_lease() {
    let db = SharedDatabase::new().await;
    let manager = TriggerLockManager::new(db.open().await);
    let store = db.open().await;
    let config = LockConfig {
        lease_duration: Duration::from_secs(45),
        renew_interval: Duration::from_secs(15),
    };

    let expires_at = manager
        .run_check("t1", &config, |_| async {
            store.get_lock("t1").await.unwrap().unwrap().expires_at
        })
        .await
        .unwrap();

    let remaining = expires_at - chrono::Utc::now();
    assert!(remaining > chrono::TimeDelta::seconds(40), "lease ends in {remaining}");
    assert!(store.get_lock("t1").await.unwrap().is_none());
}
