//! Implementation of the EventStore trait for SqliteStore

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use super::{SqliteStore, to_millis};
use crate::{
    models::NotificationEvent,
    persistence::{error::PersistenceError, traits::EventStore},
};

#[async_trait]
impl EventStore for SqliteStore {
    #[tracing::instrument(skip(self, event), fields(trigger_id = %event.trigger_id), level = "debug")]
    async fn push_event(&self, event: &NotificationEvent) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(event)?;
        self.execute_query_with_error_handling(
            "push notification event",
            sqlx::query("INSERT INTO notification_events (payload, created_at) VALUES (?, ?)")
                .bind(payload)
                .bind(to_millis(Utc::now()))
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn fetch_events(&self, limit: u32) -> Result<Vec<NotificationEvent>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "fetch notification events",
                sqlx::query(
                    "DELETE FROM notification_events WHERE id IN \
                     (SELECT id FROM notification_events ORDER BY id LIMIT ?) \
                     RETURNING id, payload",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool),
            )
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 =
                row.try_get("id").map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
            let payload: String = row
                .try_get("payload")
                .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
            match serde_json::from_str::<NotificationEvent>(&payload) {
                Ok(event) => events.push((id, event)),
                Err(e) => {
                    // Already deleted; a malformed event can never be processed.
                    tracing::error!(event_id = id, "Dropping undecodable notification event: {}", e);
                }
            }
        }
        events.sort_by_key(|(id, _)| *id);
        Ok(events.into_iter().map(|(_, event)| event).collect())
    }
}
