//! Implementation of the LockStore trait for SqliteStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{SqliteStore, from_millis, to_millis};
use crate::{
    models::TriggerCheckLock,
    persistence::{error::PersistenceError, traits::LockStore},
};

#[async_trait]
impl LockStore for SqliteStore {
    #[tracing::instrument(skip(self, owner_token), level = "debug")]
    async fn try_acquire_lock(
        &self,
        trigger_id: &str,
        owner_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        // The upsert only overwrites a row whose lease has already expired.
        let result = self
            .execute_query_with_error_handling(
                "acquire trigger check lock",
                sqlx::query(
                    "INSERT INTO trigger_check_locks (trigger_id, owner_token, expires_at) \
                     VALUES (?1, ?2, ?3) \
                     ON CONFLICT(trigger_id) DO UPDATE SET \
                         owner_token = excluded.owner_token, \
                         expires_at = excluded.expires_at \
                     WHERE trigger_check_locks.expires_at <= ?4",
                )
                .bind(trigger_id)
                .bind(owner_token)
                .bind(to_millis(expires_at))
                .bind(to_millis(now))
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, owner_token), level = "debug")]
    async fn renew_lock(
        &self,
        trigger_id: &str,
        owner_token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let result = self
            .execute_query_with_error_handling(
                "renew trigger check lock",
                sqlx::query(
                    "UPDATE trigger_check_locks SET expires_at = ?1 \
                     WHERE trigger_id = ?2 AND owner_token = ?3 AND expires_at > ?4",
                )
                .bind(to_millis(expires_at))
                .bind(trigger_id)
                .bind(owner_token)
                .bind(to_millis(now))
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, owner_token), level = "debug")]
    async fn release_lock(
        &self,
        trigger_id: &str,
        owner_token: &str,
    ) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "release trigger check lock",
            sqlx::query("DELETE FROM trigger_check_locks WHERE trigger_id = ? AND owner_token = ?")
                .bind(trigger_id)
                .bind(owner_token)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn get_lock(&self, trigger_id: &str) -> Result<Option<TriggerCheckLock>, PersistenceError> {
        let row = self
            .execute_query_with_error_handling(
                "get trigger check lock",
                sqlx::query(
                    "SELECT owner_token, expires_at FROM trigger_check_locks WHERE trigger_id = ?",
                )
                .bind(trigger_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(|row| {
            let owner_token: String = row
                .try_get("owner_token")
                .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
            let expires_at: i64 = row
                .try_get("expires_at")
                .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
            Ok(TriggerCheckLock {
                trigger_id: trigger_id.to_string(),
                owner_token,
                expires_at: from_millis(expires_at)?,
            })
        })
        .transpose()
    }
}
