//! Implementation of the EntityStore trait for SqliteStore

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, sqlite::SqliteRow};

use super::SqliteStore;
use crate::{
    models::{ContactData, SubscriptionData, TriggerData},
    persistence::{error::PersistenceError, traits::EntityStore},
};

const SUBSCRIPTION_COLUMNS: &str = "id, user_login, enabled, tags, contacts";

fn get_column<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, PersistenceError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column).map_err(|e| PersistenceError::SerializationError(e.to_string()))
}

fn contact_from_row(row: &SqliteRow) -> Result<ContactData, PersistenceError> {
    Ok(ContactData {
        id: get_column(row, "id")?,
        user: get_column(row, "user_login")?,
        contact_type: get_column(row, "contact_type")?,
        value: get_column(row, "value")?,
    })
}

fn subscription_from_row(row: &SqliteRow) -> Result<SubscriptionData, PersistenceError> {
    let tags: String = get_column(row, "tags")?;
    let contacts: String = get_column(row, "contacts")?;
    Ok(SubscriptionData {
        id: get_column(row, "id")?,
        user: get_column(row, "user_login")?,
        enabled: get_column(row, "enabled")?,
        tags: serde_json::from_str(&tags)?,
        contacts: serde_json::from_str(&contacts)?,
    })
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get_trigger(&self, trigger_id: &str) -> Result<Option<TriggerData>, PersistenceError> {
        let data: Option<String> = self
            .execute_query_with_error_handling(
                "get trigger",
                sqlx::query_scalar::<_, String>("SELECT data FROM triggers WHERE id = ?")
                    .bind(trigger_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        data.map(|data| serde_json::from_str(&data).map_err(PersistenceError::from)).transpose()
    }

    #[tracing::instrument(skip(self, trigger), fields(trigger_id = %trigger.id), level = "debug")]
    async fn save_trigger(&self, trigger: &TriggerData) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(trigger)?;
        self.execute_query_with_error_handling(
            "save trigger",
            sqlx::query("INSERT OR REPLACE INTO triggers (id, data) VALUES (?, ?)")
                .bind(&trigger.id)
                .bind(data)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn get_contact(&self, contact_id: &str) -> Result<Option<ContactData>, PersistenceError> {
        let row = self
            .execute_query_with_error_handling(
                "get contact",
                sqlx::query(
                    "SELECT id, user_login, contact_type, value FROM contacts WHERE id = ?",
                )
                .bind(contact_id)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref().map(contact_from_row).transpose()
    }

    async fn get_all_contacts(&self) -> Result<Vec<ContactData>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "get all contacts",
                sqlx::query("SELECT id, user_login, contact_type, value FROM contacts ORDER BY id")
                    .fetch_all(&self.pool),
            )
            .await?;
        rows.iter().map(contact_from_row).collect()
    }

    async fn get_user_contact_ids(&self, user: &str) -> Result<Vec<String>, PersistenceError> {
        self.execute_query_with_error_handling(
            "get user contacts",
            sqlx::query_scalar::<_, String>(
                "SELECT id FROM contacts WHERE user_login = ? ORDER BY id",
            )
            .bind(user)
            .fetch_all(&self.pool),
        )
        .await
    }

    #[tracing::instrument(skip(self, contact), fields(contact_id = %contact.id), level = "debug")]
    async fn save_contact(&self, contact: &ContactData) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "save contact",
            sqlx::query(
                "INSERT OR REPLACE INTO contacts (id, user_login, contact_type, value) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&contact.id)
            .bind(&contact.user)
            .bind(&contact.contact_type)
            .bind(&contact.value)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn delete_contact(&self, contact_id: &str) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "delete contact",
            sqlx::query("DELETE FROM contacts WHERE id = ?").bind(contact_id).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionData>, PersistenceError> {
        let row = self
            .execute_query_with_error_handling(
                "get subscription",
                sqlx::query(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?"
                ))
                .bind(subscription_id)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn get_subscriptions(
        &self,
        subscription_ids: &[String],
    ) -> Result<Vec<SubscriptionData>, PersistenceError> {
        if subscription_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in subscription_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let rows = self
            .execute_query_with_error_handling(
                "get subscriptions",
                builder.build().fetch_all(&self.pool),
            )
            .await?;

        let mut subscriptions =
            rows.iter().map(subscription_from_row).collect::<Result<Vec<_>, _>>()?;
        // Keep the order the caller asked for.
        subscriptions.sort_by_key(|s| subscription_ids.iter().position(|id| *id == s.id));
        Ok(subscriptions)
    }

    async fn get_user_subscription_ids(&self, user: &str) -> Result<Vec<String>, PersistenceError> {
        self.execute_query_with_error_handling(
            "get user subscriptions",
            sqlx::query_scalar::<_, String>(
                "SELECT id FROM subscriptions WHERE user_login = ? ORDER BY id",
            )
            .bind(user)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_tags_subscriptions(
        &self,
        tags: &[String],
    ) -> Result<Vec<SubscriptionData>, PersistenceError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT s.id, s.user_login, s.enabled, s.tags, s.contacts \
             FROM subscriptions s, json_each(s.tags) t WHERE t.value IN (",
        );
        let mut separated = builder.separated(", ");
        for tag in tags {
            separated.push_bind(tag.clone());
        }
        separated.push_unseparated(") ORDER BY s.id");

        let rows = self
            .execute_query_with_error_handling(
                "get tag subscriptions",
                builder.build().fetch_all(&self.pool),
            )
            .await?;
        rows.iter().map(subscription_from_row).collect()
    }

    #[tracing::instrument(skip(self, subscription), fields(subscription_id = %subscription.id), level = "debug")]
    async fn save_subscription(
        &self,
        subscription: &SubscriptionData,
    ) -> Result<(), PersistenceError> {
        let tags = serde_json::to_string(&subscription.tags)?;
        let contacts = serde_json::to_string(&subscription.contacts)?;
        self.execute_query_with_error_handling(
            "save subscription",
            sqlx::query(
                "INSERT OR REPLACE INTO subscriptions (id, user_login, enabled, tags, contacts) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&subscription.id)
            .bind(&subscription.user)
            .bind(subscription.enabled)
            .bind(tags)
            .bind(contacts)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> SqliteStore {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    fn subscription(id: &str, user: &str, tags: &[&str], contacts: &[&str]) -> SubscriptionData {
        SubscriptionData {
            id: id.to_string(),
            user: user.to_string(),
            enabled: true,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            contacts: contacts.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_tag_lookup_returns_each_subscription_once() {
        let store = setup_store().await;
        store.save_subscription(&subscription("s1", "u", &["db", "prod"], &["c1"])).await.unwrap();
        store.save_subscription(&subscription("s2", "u", &["web"], &["c2"])).await.unwrap();

        let found = store
            .get_tags_subscriptions(&["db".to_string(), "prod".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "s1");
        assert!(store.get_tags_subscriptions(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_subscriptions_keeps_requested_order_and_skips_missing() {
        let store = setup_store().await;
        store.save_subscription(&subscription("a", "u", &["x"], &[])).await.unwrap();
        store.save_subscription(&subscription("b", "u", &["x"], &[])).await.unwrap();

        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let found = store.get_subscriptions(&ids).await.unwrap();
        assert_eq!(found.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_contact_crud() {
        let store = setup_store().await;
        let contact = ContactData {
            id: "c1".to_string(),
            user: "alice".to_string(),
            contact_type: "email".to_string(),
            value: "alice@example.test".to_string(),
        };
        store.save_contact(&contact).await.unwrap();

        assert_eq!(store.get_contact("c1").await.unwrap(), Some(contact));
        assert_eq!(store.get_user_contact_ids("alice").await.unwrap(), vec!["c1"]);

        store.delete_contact("c1").await.unwrap();
        assert!(store.get_contact("c1").await.unwrap().is_none());
        store.delete_contact("c1").await.unwrap();
    }
}
