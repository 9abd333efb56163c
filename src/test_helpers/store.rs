//! Store setup for tests.

use std::sync::Arc;

use crate::persistence::{SqliteStore, error::PersistenceError};

/// Creates a migrated in-memory SQLite store.
pub async fn create_test_store() -> Result<Arc<SqliteStore>, PersistenceError> {
    let store = SqliteStore::new("sqlite::memory:").await?;
    store.run_migrations().await?;
    Ok(Arc::new(store))
}
