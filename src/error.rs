//! Error taxonomy for the cache and sync layers.
//!
//! Storage failures degrade to "not cached" / "not persisted" and are logged
//! by the owning component. Network failures trigger strategy fallback or
//! queuing and never reach the UI as raw errors. Remote rejections are
//! requeued alongside network failures.

use thiserror::Error;

/// Persistence failures (quota, serialization, database).
/// Always non-fatal to the caller: the operation simply does not persist.
#[derive(Error, Debug)]
pub enum StorageError {
  #[error("serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("storage lock poisoned")]
  LockPoisoned,
}

/// Network-level fetch failures, including the network-first timeout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
  #[error("request failed: {0}")]
  Transport(String),

  #[error("network timeout after {0}ms")]
  Timeout(u64),
}

impl From<reqwest::Error> for NetworkError {
  fn from(err: reqwest::Error) -> Self {
    NetworkError::Transport(err.to_string())
  }
}

/// Remote store failures. Rejections and transport failures are treated the
/// same by the sync queue: the action goes back on the queue for retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
  #[error("remote store unreachable: {0}")]
  Unreachable(String),

  #[error("remote store rejected write to {id}: {reason}")]
  Rejected { id: String, reason: String },
}

/// Control-protocol failures on the strategy-update channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
  #[error("no acknowledgement within {0}ms")]
  AckTimeout(u64),

  #[error("control channel closed")]
  ChannelClosed,
}
