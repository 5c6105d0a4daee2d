//! SQLite-backed key-value store.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::{PersistenceStore, StoreError};
use crate::db::Database;

/// Key-value store persisted in the `kv` table.
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  pub fn new(db: &Database) -> Self {
    Self { conn: db.conn() }
  }
}

impl PersistenceStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| StoreError::Backend(format!("Failed to read {}: {}", key, e)))
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| StoreError::Backend(format!("Failed to write {}: {}", key, e)))?;

    Ok(())
  }
}
