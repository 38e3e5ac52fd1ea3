//! Client-local settings storage: versionless JSON blobs under fixed keys.
//!
//! Absence or parse failure of any blob means "use defaults", never a fatal
//! error. A corrupt sync-queue blob therefore loads as an empty queue.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::StorageError;

/// Fixed key: last-chosen fetch strategy.
pub const STRATEGY_KEY: &str = "strategy";
/// Fixed key: serialized pending sync actions.
pub const SYNC_QUEUE_KEY: &str = "sync_queue";
/// Fixed key: names of lists mirrored to the remote store.
pub const SYNCED_LISTS_KEY: &str = "synced_lists";
/// Fixed key: temporary-list provenance (renamed name -> original remote id).
pub const ORIGINAL_LISTS_KEY: &str = "original_lists";

const SETTINGS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Key-value settings store backed by SQLite.
pub struct SettingsStore {
  conn: Mutex<Connection>,
}

impl SettingsStore {
  /// Open or create the settings store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open settings store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open the settings store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// In-memory store for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("holdfast").join("settings.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SETTINGS_SCHEMA)
      .map_err(|e| eyre!("Failed to run settings migrations: {}", e))?;

    Ok(())
  }

  fn conn(&self) -> std::result::Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }

  /// Read and deserialize a blob. Missing keys, read failures, and corrupt
  /// blobs all yield None so callers fall back to defaults.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.get_raw(key) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(key, error = %e, "Failed to read setting");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, error = %e, "Corrupt setting blob, using defaults");
        None
      }
    }
  }

  /// Serialize and persist a blob under a fixed key.
  pub fn put<T: Serialize>(&self, key: &str, value: &T) -> std::result::Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    self.put_raw(key, &raw)
  }

  /// Remove a key. Missing keys are not an error.
  pub fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
    let conn = self.conn()?;
    conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
    Ok(())
  }

  fn get_raw(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
    let conn = self.conn()?;
    let value = conn
      .query_row(
        "SELECT value FROM settings WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn put_raw(&self, key: &str, raw: &str) -> std::result::Result<(), StorageError> {
    let conn = self.conn()?;
    conn.execute(
      "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
      params![key, raw],
    )?;
    Ok(())
  }
}
