//! Named response caches: trait plus in-memory, no-op and SQLite backends.
//!
//! A backend is an ordered set of cache namespaces, each an opaque
//! url → response map. Namespaces are deleted wholesale.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::traits::Response;
use crate::db::Database;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Create the namespace if it doesn't exist yet.
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Look up `url` in one namespace.
  fn match_in(&self, cache_name: &str, url: &str) -> Result<Option<Response>>;

  /// Look up `url` across all namespaces, oldest namespace first.
  fn match_any(&self, url: &str) -> Result<Option<Response>>;

  /// Store a response, creating the namespace if needed.
  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()>;

  /// Namespace names in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Drop a namespace and everything in it. Returns whether it existed.
  fn delete(&self, cache_name: &str) -> Result<bool>;

  /// URLs stored in one namespace.
  fn urls(&self, cache_name: &str) -> Result<Vec<String>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn open(&self, _cache_name: &str) -> Result<()> {
    Ok(())
  }

  fn match_in(&self, _cache_name: &str, _url: &str) -> Result<Option<Response>> {
    Ok(None) // Always miss
  }

  fn match_any(&self, _url: &str) -> Result<Option<Response>> {
    Ok(None) // Always miss
  }

  fn put(&self, _cache_name: &str, _url: &str, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn keys(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete(&self, _cache_name: &str) -> Result<bool> {
    Ok(false)
  }

  fn urls(&self, _cache_name: &str) -> Result<Vec<String>> {
    Ok(Vec::new())
  }
}

/// Process-local caches.
#[derive(Default)]
pub struct MemoryStorage {
  caches: Mutex<Vec<(String, HashMap<String, Response>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    let mut caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    if !caches.iter().any(|(name, _)| name == cache_name) {
      caches.push((cache_name.to_string(), HashMap::new()));
    }
    Ok(())
  }

  fn match_in(&self, cache_name: &str, url: &str) -> Result<Option<Response>> {
    let caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(
      caches
        .iter()
        .find(|(name, _)| name == cache_name)
        .and_then(|(_, entries)| entries.get(url).cloned()),
    )
  }

  fn match_any(&self, url: &str) -> Result<Option<Response>> {
    let caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(caches.iter().find_map(|(_, entries)| entries.get(url).cloned()))
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    let mut caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    match caches.iter_mut().find(|(name, _)| name == cache_name) {
      Some((_, entries)) => {
        entries.insert(url.to_string(), response.clone());
      }
      None => {
        let entries = HashMap::from([(url.to_string(), response.clone())]);
        caches.push((cache_name.to_string(), entries));
      }
    }
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(caches.iter().map(|(name, _)| name.clone()).collect())
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    let before = caches.len();
    caches.retain(|(name, _)| name != cache_name);
    Ok(caches.len() != before)
  }

  fn urls(&self, cache_name: &str) -> Result<Vec<String>> {
    let caches = self.caches.lock().map_err(|_| StoreError::Poisoned)?;
    let mut urls: Vec<String> = caches
      .iter()
      .find(|(name, _)| name == cache_name)
      .map(|(_, entries)| entries.keys().cloned().collect())
      .unwrap_or_default();
    urls.sort();
    Ok(urls)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
  pub fn new(db: &Database) -> Self {
    Self { conn: db.conn() }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StoreError::Poisoned)
  }
}

fn backend(context: &str, e: impl std::fmt::Display) -> StoreError {
  StoreError::Backend(format!("{}: {}", context, e))
}

/// SHA256 of the URL for stable, fixed-length keys.
fn entry_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

fn decode_row(status: u16, headers: String, body: Vec<u8>) -> Result<Response> {
  let headers = serde_json::from_str(&headers).map_err(|e| backend("Failed to decode headers", e))?;
  Ok(Response {
    status,
    headers,
    body,
  })
}

impl CacheStorage for SqliteStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_names (cache_name) VALUES (?)",
        params![cache_name],
      )
      .map_err(|e| backend("Failed to open cache", e))?;
    Ok(())
  }

  fn match_in(&self, cache_name: &str, url: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM cache_entries WHERE cache_name = ? AND entry_key = ?",
        params![cache_name, entry_key(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| backend("Failed to query cache", e))?;

    row
      .map(|(status, headers, body)| decode_row(status, headers, body))
      .transpose()
  }

  fn match_any(&self, url: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT e.status, e.headers, e.body FROM cache_entries e
         INNER JOIN cache_names n ON n.cache_name = e.cache_name
         WHERE e.entry_key = ?
         ORDER BY n.rowid
         LIMIT 1",
        params![entry_key(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| backend("Failed to query cache", e))?;

    row
      .map(|(status, headers, body)| decode_row(status, headers, body))
      .transpose()
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    let headers =
      serde_json::to_string(&response.headers).map_err(|e| backend("Failed to encode headers", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| backend("Failed to begin transaction", e))?;

    let result = conn
      .execute(
        "INSERT OR IGNORE INTO cache_names (cache_name) VALUES (?)",
        params![cache_name],
      )
      .and_then(|_| {
        conn.execute(
          "INSERT OR REPLACE INTO cache_entries (cache_name, entry_key, url, status, headers, body, cached_at)
           VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
          params![cache_name, entry_key(url), url, response.status, headers, response.body],
        )
      });

    match result {
      Ok(_) => conn
        .execute("COMMIT", [])
        .map(|_| ())
        .map_err(|e| backend("Failed to commit transaction", e)),
      Err(e) => {
        let _ = conn.execute("ROLLBACK", []);
        Err(backend("Failed to store response", e))
      }
    }
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT cache_name FROM cache_names ORDER BY rowid")
      .map_err(|e| backend("Failed to prepare query", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| backend("Failed to list caches", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| backend("Failed to read cache name", e))?;
    Ok(names)
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let conn = self.lock()?;
    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| backend("Failed to begin transaction", e))?;

    let result = conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ?",
        params![cache_name],
      )
      .and_then(|_| {
        conn.execute(
          "DELETE FROM cache_names WHERE cache_name = ?",
          params![cache_name],
        )
      });

    match result {
      Ok(removed) => conn
        .execute("COMMIT", [])
        .map(|_| removed > 0)
        .map_err(|e| backend("Failed to commit transaction", e)),
      Err(e) => {
        let _ = conn.execute("ROLLBACK", []);
        Err(backend("Failed to delete cache", e))
      }
    }
  }

  fn urls(&self, cache_name: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT url FROM cache_entries WHERE cache_name = ? ORDER BY url")
      .map_err(|e| backend("Failed to prepare query", e))?;

    let urls = stmt
      .query_map(params![cache_name], |row| row.get(0))
      .map_err(|e| backend("Failed to list cache entries", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| backend("Failed to read cache entry", e))?;
    Ok(urls)
  }
}
