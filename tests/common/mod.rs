//! Shared setup for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use herald::persistence::SqliteStore;
use tempfile::TempDir;

/// A database file that several stores, standing in for separate processes,
/// can open at once.
pub struct SharedDatabase {
    _dir: TempDir,
    url: String,
}

impl SharedDatabase {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("herald.db").display());
        let store = SqliteStore::new(&url).await.unwrap();
        store.run_migrations().await.unwrap();
        store.close().await;
        Self { _dir: dir, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn open(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(&self.url).await.unwrap())
    }
}
