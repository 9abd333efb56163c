//! This module contains the persistent store contract and its SQLite
//! implementation.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
