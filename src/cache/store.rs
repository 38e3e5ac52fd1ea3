//! SQLite-backed bucket storage for request/response pairs.
//!
//! Entries keep insertion order via rowid so eviction can drop oldest-first.
//! All failures surface as StorageError; callers treat them as non-fatal
//! (the fetch result is still returned, it just does not persist).

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::StorageError;
use crate::request::{Request, Response};

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket TEXT NOT NULL,
    request_key TEXT NOT NULL,
    request BLOB NOT NULL,
    response BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (bucket, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_bucket ON entries(bucket, id);
"#;

/// Named, versioned buckets of request -> response pairs.
pub struct CacheStore {
  conn: Mutex<Connection>,
}

impl CacheStore {
  /// Open or create the cache store at the given path.
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// In-memory store for tests.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    let conn = Connection::open_in_memory()?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<(), StorageError> {
    let conn = self.conn()?;
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }

  /// Create a bucket if it does not already exist.
  pub fn open_bucket(&self, name: &str) -> Result<(), StorageError> {
    let conn = self.conn()?;
    conn.execute(
      "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
      params![name],
    )?;
    Ok(())
  }

  /// Look up the stored response for a request.
  pub fn match_request(
    &self,
    bucket: &str,
    request: &Request,
  ) -> Result<Option<Response>, StorageError> {
    let conn = self.conn()?;
    let blob: Option<Vec<u8>> = conn
      .query_row(
        "SELECT response FROM entries WHERE bucket = ? AND request_key = ?",
        params![bucket, request.cache_key()],
        |row| row.get(0),
      )
      .optional()?;

    match blob {
      Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
      None => Ok(None),
    }
  }

  /// Store a response under the request's key. Non-GET requests are never
  /// cached; re-storing an existing key counts as a fresh insertion for
  /// eviction ordering.
  pub fn put(
    &self,
    bucket: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), StorageError> {
    if !request.method.is_cacheable() {
      debug!(url = %request.url, method = request.method.as_str(), "Skipping cache for non-GET request");
      return Ok(());
    }

    let request_blob = serde_json::to_vec(request)?;
    let response_blob = serde_json::to_vec(response)?;

    let conn = self.conn()?;
    // DELETE + INSERT rather than REPLACE so the refreshed entry gets a new
    // rowid and moves to the back of the eviction order.
    conn.execute(
      "DELETE FROM entries WHERE bucket = ? AND request_key = ?",
      params![bucket, request.cache_key()],
    )?;
    conn.execute(
      "INSERT INTO entries (bucket, request_key, request, response) VALUES (?, ?, ?, ?)",
      params![bucket, request.cache_key(), request_blob, response_blob],
    )?;
    Ok(())
  }

  /// Delete a bucket and all of its entries.
  pub fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
    let conn = self.conn()?;
    conn.execute("DELETE FROM entries WHERE bucket = ?", params![name])?;
    conn.execute("DELETE FROM buckets WHERE name = ?", params![name])?;
    Ok(())
  }

  /// All bucket names, oldest first.
  pub fn bucket_names(&self) -> Result<Vec<String>, StorageError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY rowid")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  /// Stored requests in insertion order.
  pub fn keys(&self, bucket: &str) -> Result<Vec<Request>, StorageError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT request FROM entries WHERE bucket = ? ORDER BY id")?;
    let blobs = stmt
      .query_map(params![bucket], |row| row.get::<_, Vec<u8>>(0))?
      .collect::<Result<Vec<_>, _>>()?;

    let mut requests = Vec::with_capacity(blobs.len());
    for blob in blobs {
      requests.push(serde_json::from_slice(&blob)?);
    }
    Ok(requests)
  }

  pub fn entry_count(&self, bucket: &str) -> Result<usize, StorageError> {
    let conn = self.conn()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM entries WHERE bucket = ?",
      params![bucket],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  /// Delete oldest entries (insertion order) until the bucket holds at most
  /// `max_entries`.
  pub fn evict_oldest(&self, bucket: &str, max_entries: usize) -> Result<(), StorageError> {
    let count = self.entry_count(bucket)?;
    let excess = count.saturating_sub(max_entries);
    if excess == 0 {
      return Ok(());
    }

    let conn = self.conn()?;
    conn.execute(
      "DELETE FROM entries WHERE id IN (
         SELECT id FROM entries WHERE bucket = ? ORDER BY id ASC LIMIT ?
       )",
      params![bucket, excess as i64],
    )?;
    debug!(bucket, evicted = excess, "Evicted oldest cache entries");
    Ok(())
  }
}
