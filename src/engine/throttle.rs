//! Per-trigger event accounting and escalation.
//!
//! Every incoming event bumps the trigger's counter for the current window.
//! When a notification is delivered the counter is compared against the
//! configured escalation tiers, and a matching tier pushes the next eligible
//! send time into the future. Notifications scheduled before that time are
//! still delivered, but flagged as throttled.
//!
//! All updates are compare-and-set on a versioned record, so concurrent
//! workers never lose increments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::offset;
use crate::{
    config::ThrottleConfig,
    models::ThrottleState,
    persistence::{error::PersistenceError, traits::ThrottleStore},
};

const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Errors returned by the throttle tracker.
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The store failed.
    #[error("Throttle store error: {0}")]
    Store(#[from] PersistenceError),

    /// The state kept changing under us.
    #[error("Throttle state for trigger '{0}' is too contended to update")]
    Conflict(String),
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    /// True if a notification may be sent right away.
    pub eligible: bool,
    /// Earliest unthrottled send time; equals `now` when eligible.
    pub next_eligible: DateTime<Utc>,
    /// True if a notification scheduled now must carry the throttled marker.
    pub throttled: bool,
}

/// Tracks event volume and escalation per trigger.
pub struct ThrottleTracker<S: ThrottleStore + ?Sized> {
    store: Arc<S>,
    config: ThrottleConfig,
}

impl<S: ThrottleStore + ?Sized> ThrottleTracker<S> {
    /// Creates a new tracker with the given escalation policy.
    pub fn new(store: Arc<S>, config: ThrottleConfig) -> Self {
        Self { store, config }
    }

    /// Returns the escalation policy.
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Records an event at `timestamp` and returns the event count of the
    /// current window, this event included.
    ///
    /// The window is reopened first if it is older than the configured window
    /// length or if the trigger has been quiet for longer than the quiet
    /// period.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn record_event(
        &self,
        trigger_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, ThrottleError> {
        self.update(trigger_id, timestamp, |state| {
            if self.window_expired(state, timestamp) {
                tracing::debug!(trigger_id, window_start = %state.window_start, "Throttle window reset.");
                state.reset(timestamp);
            }
            state.event_count += 1;
            state.last_event = Some(state.last_event.map_or(timestamp, |last| last.max(timestamp)));
        })
        .await
        .map(|state| state.event_count)
    }

    /// Decides whether a notification for the trigger may go out at `now`.
    pub async fn get_eligibility(
        &self,
        trigger_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Eligibility, ThrottleError> {
        let deadline = self
            .store
            .get_throttle_state(trigger_id)
            .await?
            .and_then(|state| state.throttled_until(now));

        Ok(match deadline {
            Some(next_eligible) => Eligibility { eligible: false, next_eligible, throttled: true },
            None => Eligibility { eligible: true, next_eligible: now, throttled: false },
        })
    }

    /// Records a delivery at `now`. With `escalate`, the highest tier reached
    /// by the current event count delays the next eligible send time.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn mark_sent(
        &self,
        trigger_id: &str,
        now: DateTime<Utc>,
        escalate: bool,
    ) -> Result<(), ThrottleError> {
        let state = self
            .update(trigger_id, now, |state| {
                state.last_sent = Some(now);
                if !escalate {
                    return;
                }
                match self.config.tier_for(state.event_count) {
                    Some((tier, delay)) => {
                        let next = offset(now, delay);
                        state.next_eligible = Some(state.next_eligible.map_or(next, |n| n.max(next)));
                        state.tier = Some(tier);
                    }
                    None => state.tier = None,
                }
            })
            .await?;

        if let Some(tier) = state.tier {
            tracing::info!(
                trigger_id,
                tier,
                event_count = state.event_count,
                next_eligible = ?state.next_eligible,
                "Trigger escalated to throttle tier."
            );
        }
        Ok(())
    }

    /// Forgets all throttling state of the trigger, lifting any pending
    /// escalation.
    pub async fn clear(&self, trigger_id: &str) -> Result<(), ThrottleError> {
        self.store.delete_throttle_state(trigger_id).await?;
        tracing::info!(trigger_id, "Throttle state cleared.");
        Ok(())
    }

    fn window_expired(&self, state: &ThrottleState, timestamp: DateTime<Utc>) -> bool {
        let window_over = offset(state.window_start, self.config.window) <= timestamp;
        let quiet = state
            .last_event
            .is_some_and(|last| offset(last, self.config.quiet_period) < timestamp);
        window_over || quiet
    }

    /// Read-modify-write loop over the versioned state record.
    async fn update<F>(
        &self,
        trigger_id: &str,
        now: DateTime<Utc>,
        mut apply: F,
    ) -> Result<ThrottleState, ThrottleError>
    where
        F: FnMut(&mut ThrottleState),
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut state = self
                .store
                .get_throttle_state(trigger_id)
                .await?
                .unwrap_or_else(|| ThrottleState::new(now));
            apply(&mut state);
            if self.store.compare_and_set_throttle_state(trigger_id, &state).await? {
                return Ok(state);
            }
            tracing::debug!(trigger_id, "Throttle state changed concurrently, retrying.");
        }
        Err(ThrottleError::Conflict(trigger_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::*;
    use crate::{
        config::ThrottleTier,
        persistence::{SqliteStore, traits::MockThrottleStore},
    };

    async fn tracker(config: ThrottleConfig) -> ThrottleTracker<SqliteStore> {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        store.run_migrations().await.unwrap();
        ThrottleTracker::new(Arc::new(store), config)
    }

    fn small_config() -> ThrottleConfig {
        ThrottleConfig {
            window: Duration::from_secs(600),
            quiet_period: Duration::from_secs(120),
            max_delay: Duration::from_secs(3600),
            tiers: vec![
                ThrottleTier { count: 3, delay: Duration::from_secs(60) },
                ThrottleTier { count: 5, delay: Duration::from_secs(300) },
            ],
        }
    }

    #[tokio::test]
    async fn test_count_grows_within_window() {
        let tracker = tracker(small_config()).await;
        let start = Utc::now();
        for expected in 1..=4 {
            let ts = start + TimeDelta::seconds(expected * 10);
            assert_eq!(tracker.record_event("t1", ts).await.unwrap(), expected as u64);
        }
        assert_eq!(tracker.record_event("t2", start).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_quiet_period_and_window_reset_count() {
        let tracker = tracker(small_config()).await;
        let start = Utc::now();
        tracker.record_event("t1", start).await.unwrap();
        tracker.record_event("t1", start + TimeDelta::seconds(60)).await.unwrap();

        // Gap longer than the quiet period.
        let count = tracker.record_event("t1", start + TimeDelta::seconds(300)).await.unwrap();
        assert_eq!(count, 1);

        // Steady events, but the window runs out.
        let mut ts = start + TimeDelta::seconds(300);
        let mut count = 1;
        while ts < start + TimeDelta::seconds(890) {
            ts += TimeDelta::seconds(60);
            count = tracker.record_event("t1", ts).await.unwrap();
        }
        assert!(count < 10, "window should have reopened, count was {count}");
    }

    #[tokio::test]
    async fn test_escalation_throttles_until_tier_delay_passes() {
        let tracker = tracker(small_config()).await;
        let now = Utc::now();
        for i in 0..3 {
            tracker.record_event("t1", now + TimeDelta::seconds(i)).await.unwrap();
        }

        let before = tracker.get_eligibility("t1", now).await.unwrap();
        assert!(before.eligible);
        assert!(!before.throttled);

        tracker.mark_sent("t1", now, true).await.unwrap();
        let after = tracker.get_eligibility("t1", now + TimeDelta::seconds(1)).await.unwrap();
        assert!(!after.eligible);
        assert!(after.throttled);
        assert_eq!(after.next_eligible, now + TimeDelta::seconds(60));

        let later = tracker.get_eligibility("t1", now + TimeDelta::seconds(61)).await.unwrap();
        assert!(later.eligible);
    }

    #[tokio::test]
    async fn test_mark_sent_without_escalation_only_records_delivery() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        store.run_migrations().await.unwrap();
        let store = Arc::new(store);
        let tracker = ThrottleTracker::new(Arc::clone(&store), small_config());
        let now = Utc::now();
        for i in 0..5 {
            tracker.record_event("t1", now + TimeDelta::seconds(i)).await.unwrap();
        }

        tracker.mark_sent("t1", now, false).await.unwrap();
        let state = store.get_throttle_state("t1").await.unwrap().unwrap();
        assert_eq!(state.last_sent, Some(now));
        assert_eq!(state.next_eligible, None);
        assert!(tracker.get_eligibility("t1", now).await.unwrap().eligible);
    }

    #[tokio::test]
    async fn test_clear_lifts_escalation() {
        let tracker = tracker(small_config()).await;
        let now = Utc::now();
        for i in 0..3 {
            tracker.record_event("t1", now + TimeDelta::seconds(i)).await.unwrap();
        }
        tracker.mark_sent("t1", now, true).await.unwrap();
        assert!(!tracker.get_eligibility("t1", now).await.unwrap().eligible);

        tracker.clear("t1").await.unwrap();

        assert!(tracker.get_eligibility("t1", now).await.unwrap().eligible);
        assert_eq!(tracker.record_event("t1", now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_trigger_is_eligible() {
        let tracker = tracker(small_config()).await;
        let now = Utc::now();
        let eligibility = tracker.get_eligibility("nope", now).await.unwrap();
        assert_eq!(eligibility, Eligibility { eligible: true, next_eligible: now, throttled: false });
    }

    #[tokio::test]
    async fn test_update_gives_up_after_repeated_conflicts() {
        let mut store = MockThrottleStore::new();
        store.expect_get_throttle_state().returning(|_| Ok(None));
        store
            .expect_compare_and_set_throttle_state()
            .times(MAX_UPDATE_ATTEMPTS)
            .returning(|_, _| Ok(false));

        let tracker = ThrottleTracker::new(Arc::new(store), small_config());
        let result = tracker.record_event("t1", Utc::now()).await;
        assert!(matches!(result, Err(ThrottleError::Conflict(id)) if id == "t1"));
    }
}
