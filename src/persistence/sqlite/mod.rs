//! This module provides a concrete implementation of the store contract using
//! SQLite.
//!
//! Every contract operation maps onto a single SQL statement so that SQLite's
//! statement atomicity provides the per-operation guarantees the contract
//! requires (guarded upserts for leases, versioned updates for throttle state,
//! `DELETE ... RETURNING` for queue pops).

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

mod entities;
mod events;
mod locks;
mod notifications;
mod throttle;

use crate::persistence::error::PersistenceError;

/// A store implementation backed by a SQLite database.
pub struct SqliteStore {
    /// The SQLite connection pool used for database operations.
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new instance of SqliteStore with the provided database URL.
    /// This will create the database file if it does not exist.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        tracing::debug!(database_url, "Attempting to connect to SQLite database.");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::InvalidInput(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        // Every connection to an in-memory database opens a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                PersistenceError::OperationFailed(format!("Failed to connect to database: {}", e))
            })?;
        tracing::info!(database_url, "Successfully connected to SQLite database.");
        Ok(Self { pool })
    }

    /// Runs database migrations.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        tracing::debug!("Running database migrations.");
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::info!("Database migrations completed successfully.");
        Ok(())
    }

    /// Closes the connection pool gracefully.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn close(&self) {
        tracing::debug!("Closing SQLite connection pool.");
        self.pool.close().await;
        tracing::info!("SQLite connection pool closed successfully.");
    }

    /// Helper to execute database queries with consistent error handling
    async fn execute_query_with_error_handling<F, T, E>(
        &self,
        operation: &str,
        query_fn: F,
    ) -> Result<T, PersistenceError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        query_fn.await.map_err(|e| {
            tracing::error!(error = %e, operation = %operation, "Database operation failed.");
            PersistenceError::OperationFailed(e.to_string())
        })
    }
}

/// Converts a timestamp to the unix milliseconds stored in the database.
fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Converts stored unix milliseconds back to a timestamp.
fn from_millis(ms: i64) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| PersistenceError::SerializationError(format!("Invalid timestamp: {ms}")))
}
