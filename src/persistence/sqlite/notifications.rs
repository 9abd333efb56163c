//! Implementation of the NotificationStore trait for SqliteStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, sqlite::SqliteRow};

use super::{SqliteStore, from_millis, to_millis};
use crate::{
    models::{NotificationKey, ScheduledNotification},
    persistence::{error::PersistenceError, traits::NotificationStore},
};

/// Decodes a queue row. The due time and sequence columns are authoritative
/// over the serialized payload.
fn notification_from_row(row: &SqliteRow) -> Result<ScheduledNotification, PersistenceError> {
    let sequence: i64 =
        row.try_get("sequence").map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
    let due_at: i64 =
        row.try_get("due_at").map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
    let payload: String =
        row.try_get("payload").map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

    let mut notification: ScheduledNotification = serde_json::from_str(&payload)?;
    notification.sequence = sequence;
    notification.due = from_millis(due_at)?;
    Ok(notification)
}

fn notifications_from_rows(
    rows: &[SqliteRow],
) -> Result<Vec<ScheduledNotification>, PersistenceError> {
    rows.iter().map(notification_from_row).collect()
}

#[async_trait]
impl NotificationStore for SqliteStore {
    #[tracing::instrument(skip(self, notification), fields(trigger_id = %notification.trigger.id, contact_id = %notification.contact_id), level = "debug")]
    async fn insert_notification(
        &self,
        notification: &ScheduledNotification,
    ) -> Result<i64, PersistenceError> {
        let payload = serde_json::to_string(notification)?;
        let result = self
            .execute_query_with_error_handling(
                "insert scheduled notification",
                sqlx::query(
                    "INSERT INTO scheduled_notifications (trigger_id, contact_id, due_at, payload) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&notification.trigger.id)
                .bind(&notification.contact_id)
                .bind(to_millis(notification.due))
                .bind(payload)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn peek_due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "peek due notifications",
                sqlx::query(
                    "SELECT sequence, due_at, payload FROM scheduled_notifications \
                     WHERE due_at <= ? ORDER BY due_at, sequence",
                )
                .bind(to_millis(now))
                .fetch_all(&self.pool),
            )
            .await?;
        notifications_from_rows(&rows)
    }

    #[tracing::instrument(skip(self, key), fields(key = %key), level = "debug")]
    async fn remove_notification(&self, key: &NotificationKey) -> Result<bool, PersistenceError> {
        let result = self
            .execute_query_with_error_handling(
                "remove scheduled notification",
                sqlx::query(
                    "DELETE FROM scheduled_notifications \
                     WHERE sequence = ? AND trigger_id = ? AND contact_id = ? AND due_at = ?",
                )
                .bind(key.sequence)
                .bind(&key.trigger_id)
                .bind(&key.contact_id)
                .bind(key.due_ms)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Selects and deletes the due range in one statement.
    #[tracing::instrument(skip(self), level = "debug")]
    async fn pop_due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "pop due notifications",
                sqlx::query(
                    "DELETE FROM scheduled_notifications WHERE due_at <= ? \
                     RETURNING sequence, due_at, payload",
                )
                .bind(to_millis(now))
                .fetch_all(&self.pool),
            )
            .await?;

        let mut notifications = Vec::with_capacity(rows.len());
        for row in &rows {
            match notification_from_row(row) {
                Ok(notification) => notifications.push(notification),
                Err(e) => {
                    // Already deleted; a malformed entry can never be delivered.
                    let sequence = row.try_get::<i64, _>("sequence").ok();
                    tracing::error!(?sequence, error = %e, "Dropping undecodable scheduled notification.");
                }
            }
        }
        // RETURNING does not guarantee any row order.
        notifications.sort_by_key(|n| (n.due, n.sequence));
        Ok(notifications)
    }

    async fn list_notifications(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<ScheduledNotification>, u64), PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "list scheduled notifications",
                sqlx::query(
                    "SELECT sequence, due_at, payload FROM scheduled_notifications \
                     WHERE due_at >= ? AND due_at <= ? ORDER BY due_at, sequence",
                )
                .bind(to_millis(start))
                .bind(to_millis(end))
                .fetch_all(&self.pool),
            )
            .await?;

        let total: i64 = self
            .execute_query_with_error_handling(
                "count scheduled notifications",
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scheduled_notifications")
                    .fetch_one(&self.pool),
            )
            .await?;

        Ok((notifications_from_rows(&rows)?, total as u64))
    }

    async fn get_contact_notifications(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ScheduledNotification>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "get contact notifications",
                sqlx::query(
                    "SELECT sequence, due_at, payload FROM scheduled_notifications \
                     WHERE contact_id = ? ORDER BY due_at, sequence",
                )
                .bind(contact_id)
                .fetch_all(&self.pool),
            )
            .await?;
        notifications_from_rows(&rows)
    }
}
