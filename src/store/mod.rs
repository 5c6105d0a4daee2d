//! Local key-value persistence.
//!
//! Mirrors the browser's local storage: string keys, string values, and
//! every structured record round-trips through JSON. Data which doesn't
//! parse is treated as absent so callers fall back to defaults. A failed
//! read is surfaced, and the component that hit it stops writing for the
//! rest of the session.

mod sqlite;

pub use sqlite::SqliteStore;

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::warn;

/// Failure talking to a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("storage backend error: {0}")]
  Backend(String),
  #[error("storage lock poisoned")]
  Poisoned,
  #[error("failed to encode value for {key}: {source}")]
  Encode {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Key-value store with browser local-storage semantics.
pub trait PersistenceStore: Send + Sync {
  /// Read the raw string stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  /// Replace the value stored under `key` in a single write.
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Read and parse a plain scalar (e.g. an integer string).
///
/// Unparsable values are logged and reported as absent. A backend failure
/// is returned as an error so callers can stop writing over data they
/// could not read.
pub fn load_parsed<T: FromStr>(
  store: &dyn PersistenceStore,
  key: &str,
) -> Result<Option<T>, StoreError> {
  let Some(raw) = store.get(key)? else {
    return Ok(None);
  };

  match raw.trim().parse() {
    Ok(value) => Ok(Some(value)),
    Err(_) => {
      warn!(key, value = %raw, "ignoring unparsable stored value");
      Ok(None)
    }
  }
}

/// Read and decode a JSON record.
///
/// Corrupt or foreign records are logged and reported as absent; backend
/// failures are returned.
pub fn load_json<T: DeserializeOwned>(
  store: &dyn PersistenceStore,
  key: &str,
) -> Result<Option<T>, StoreError> {
  let Some(raw) = store.get(key)? else {
    return Ok(None);
  };

  match serde_json::from_str(&raw) {
    Ok(value) => Ok(Some(value)),
    Err(e) => {
      warn!(key, error = %e, "ignoring corrupt stored record");
      Ok(None)
    }
  }
}

/// Serialize a record to JSON and store it with one write.
pub fn save_json<T: Serialize>(
  store: &dyn PersistenceStore,
  key: &str,
  value: &T,
) -> Result<(), StoreError> {
  let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
    key: key.to_string(),
    source,
  })?;
  store.set(key, &encoded)
}

/// Process-local store, used for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl PersistenceStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};

  /// Store whose every operation fails, for exercising degraded mode.
  pub struct FailingStore;

  impl PersistenceStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
      Err(StoreError::Backend("disk unavailable".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
      Err(StoreError::Backend("disk unavailable".into()))
    }
  }

  /// Memory store whose reads can be switched off while writes keep working.
  #[derive(Default)]
  pub struct UnreadableStore {
    pub inner: MemoryStore,
    reads_fail: AtomicBool,
  }

  impl UnreadableStore {
    pub fn set_reads_fail(&self, fail: bool) {
      self.reads_fail.store(fail, Ordering::SeqCst);
    }
  }

  impl PersistenceStore for UnreadableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
      if self.reads_fail.load(Ordering::SeqCst) {
        return Err(StoreError::Backend("read timed out".into()));
      }
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
      self.inner.set(key, value)
    }
  }
}
