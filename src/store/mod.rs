//! Local record store
//!
//! A small key-value table over `SQLite`. Every persisted record — credentials,
//! the current-user marker, per-user chat history, per-user speech preference
//! and the theme — is one string value under a namespaced key (see
//! [`RecordKey`]). Missing keys are not an error; callers supply defaults.
//! Concurrent writers are not coordinated: last write wins.

mod keys;

pub mod history;
pub mod prefs;

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::{Error, Result};

pub use history::ChatHistory;
pub use keys::RecordKey;
pub use prefs::{Preferences, Theme};

/// Current schema version, kept in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// Store connection pool
pub type StorePool = Pool<SqliteConnectionManager>;

/// Pooled store connection
pub type StoreConn = PooledConnection<SqliteConnectionManager>;

/// Open the record store at the given path
///
/// # Errors
///
/// Returns error if the database cannot be opened or migrated
pub fn open<P: AsRef<Path>>(path: P) -> Result<RecordStore> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Store(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Store(e.to_string()))?;
    migrate(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "record store opened");
    Ok(RecordStore { pool })
}

/// Open an in-memory record store (for testing)
///
/// # Errors
///
/// Returns error if the database cannot be initialized
pub fn open_memory() -> Result<RecordStore> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::Store(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Store(e.to_string()))?;
    migrate(&conn)?;

    Ok(RecordStore { pool })
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            PRAGMA user_version = 1;",
        )?;
    }

    Ok(())
}

/// Namespaced key-value persistence for all client records
#[derive(Clone)]
pub struct RecordStore {
    pool: StorePool,
}

impl RecordStore {
    /// Fetch the value stored under `key`, or `None` if absent
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub fn get(&self, key: &RecordKey<'_>) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                [key.to_string()],
                |row| row.get(0),
            )
            .ok();
        Ok(value)
    }

    /// Insert or replace the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn set(&self, key: &RecordKey<'_>, value: &str) -> Result<()> {
        let conn = self.conn()?;
        let key = key.to_string();
        conn.execute(
            "INSERT INTO records (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            [key.as_str(), value],
        )?;
        Ok(())
    }

    /// Remove the value stored under `key`; absent keys are not an error
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn remove(&self, key: &RecordKey<'_>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM records WHERE key = ?1", [key.to_string()])?;
        Ok(())
    }

    fn conn(&self) -> Result<StoreConn> {
        self.pool.get().map_err(|e| Error::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_none() {
        let store = open_memory().unwrap();
        assert_eq!(store.get(&RecordKey::Theme).unwrap(), None);
    }

    #[test]
    fn set_then_get() {
        let store = open_memory().unwrap();
        store.set(&RecordKey::Theme, "light").unwrap();
        assert_eq!(
            store.get(&RecordKey::Theme).unwrap().as_deref(),
            Some("light")
        );
    }

    #[test]
    fn last_write_wins() {
        let store = open_memory().unwrap();
        store.set(&RecordKey::Theme, "light").unwrap();
        store.set(&RecordKey::Theme, "dark").unwrap();
        assert_eq!(
            store.get(&RecordKey::Theme).unwrap().as_deref(),
            Some("dark")
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let store = open_memory().unwrap();
        store.set(&RecordKey::CurrentUser, "{}").unwrap();
        store.remove(&RecordKey::CurrentUser).unwrap();
        store.remove(&RecordKey::CurrentUser).unwrap();
        assert_eq!(store.get(&RecordKey::CurrentUser).unwrap(), None);
    }

    #[test]
    fn keys_are_scoped_per_user() {
        let store = open_memory().unwrap();
        store.set(&RecordKey::TtsEnabled("alice"), "true").unwrap();
        assert_eq!(store.get(&RecordKey::TtsEnabled("bob")).unwrap(), None);
    }
}
