//! Implementation of the ThrottleStore trait for SqliteStore

use async_trait::async_trait;
use sqlx::Row;

use super::SqliteStore;
use crate::{
    models::ThrottleState,
    persistence::{error::PersistenceError, traits::ThrottleStore},
};

#[async_trait]
impl ThrottleStore for SqliteStore {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_throttle_state(
        &self,
        trigger_id: &str,
    ) -> Result<Option<ThrottleState>, PersistenceError> {
        let row = self
            .execute_query_with_error_handling(
                "get throttle state",
                sqlx::query("SELECT version, state FROM throttle_states WHERE trigger_id = ?")
                    .bind(trigger_id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => {
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
                let state_str: String = row
                    .try_get("state")
                    .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
                let mut state: ThrottleState = serde_json::from_str(&state_str)?;
                state.version = version as u64;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, state), level = "debug")]
    async fn compare_and_set_throttle_state(
        &self,
        trigger_id: &str,
        state: &ThrottleState,
    ) -> Result<bool, PersistenceError> {
        let state_str = serde_json::to_string(state)?;

        let result = if state.version == 0 {
            self.execute_query_with_error_handling(
                "insert throttle state",
                sqlx::query(
                    "INSERT INTO throttle_states (trigger_id, version, state) VALUES (?, 1, ?) \
                     ON CONFLICT(trigger_id) DO NOTHING",
                )
                .bind(trigger_id)
                .bind(&state_str)
                .execute(&self.pool),
            )
            .await?
        } else {
            self.execute_query_with_error_handling(
                "update throttle state",
                sqlx::query(
                    "UPDATE throttle_states SET version = version + 1, state = ? \
                     WHERE trigger_id = ? AND version = ?",
                )
                .bind(&state_str)
                .bind(trigger_id)
                .bind(state.version as i64)
                .execute(&self.pool),
            )
            .await?
        };

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn delete_throttle_state(&self, trigger_id: &str) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "delete throttle state",
            sqlx::query("DELETE FROM throttle_states WHERE trigger_id = ?")
                .bind(trigger_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
