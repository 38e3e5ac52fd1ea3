//! Durable FIFO queue of pending remote mutations.
//!
//! Actions are persisted on every mutation and reloaded at startup, so an
//! interrupted session replays exactly the unprocessed actions in their
//! original order. A corrupt stored queue loads as empty: data loss is
//! acceptable, a crash is not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::remote::RemoteStore;
use crate::settings::{SettingsStore, SYNC_QUEUE_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
  Sync,
  Delete,
}

/// A pending mutation keyed by resource id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
  #[serde(rename = "type")]
  pub kind: ActionKind,
  pub resource_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload: Option<Value>,
  pub enqueued_at: DateTime<Utc>,
  /// Failed replay count, used when a retry bound is configured.
  #[serde(default)]
  pub attempts: u32,
}

impl SyncAction {
  pub fn sync(resource_id: impl Into<String>, payload: Value) -> Self {
    Self {
      kind: ActionKind::Sync,
      resource_id: resource_id.into(),
      payload: Some(payload),
      enqueued_at: Utc::now(),
      attempts: 0,
    }
  }

  pub fn delete(resource_id: impl Into<String>) -> Self {
    Self {
      kind: ActionKind::Delete,
      resource_id: resource_id.into(),
      payload: None,
      enqueued_at: Utc::now(),
      attempts: 0,
    }
  }
}

/// Durable, ordered queue of pending mutations.
pub struct SyncQueue {
  settings: Arc<SettingsStore>,
  remote: Arc<dyn RemoteStore>,
  queue: Mutex<VecDeque<SyncAction>>,
  draining: AtomicBool,
  /// None retries forever, matching the original behavior.
  max_replay_attempts: Option<u32>,
}

impl SyncQueue {
  /// Create the queue, restoring any persisted actions. A corrupt blob
  /// restores as empty (SettingsStore logs the parse failure).
  pub fn new(
    settings: Arc<SettingsStore>,
    remote: Arc<dyn RemoteStore>,
    max_replay_attempts: Option<u32>,
  ) -> Self {
    let restored: Vec<SyncAction> = settings.get(SYNC_QUEUE_KEY).unwrap_or_default();
    if !restored.is_empty() {
      debug!(pending = restored.len(), "Restored sync queue");
    }

    Self {
      settings,
      remote,
      queue: Mutex::new(restored.into()),
      draining: AtomicBool::new(false),
      max_replay_attempts,
    }
  }

  pub fn len(&self) -> usize {
    self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Snapshot of the pending actions in processing order.
  pub fn pending(&self) -> Vec<SyncAction> {
    self
      .queue
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .cloned()
      .collect()
  }

  /// Append to the tail and persist before returning. A persistence failure
  /// is logged; the in-memory queue still holds the action.
  pub fn enqueue(&self, action: SyncAction) {
    debug!(
      resource = %action.resource_id,
      kind = ?action.kind,
      "Queued offline action"
    );
    self
      .queue
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push_back(action);
    self.persist();
  }

  /// Replay the queue against the remote store in FIFO order.
  ///
  /// Only one drain runs at a time; re-entrant calls are ignored, not
  /// queued. A per-action failure does not abort the pass: failed actions
  /// are re-appended to the tail in their original relative order. Never
  /// raises to the caller.
  pub async fn drain(&self) {
    if self
      .draining
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("Drain already in progress, ignoring");
      return;
    }

    let mut retries: Vec<SyncAction> = Vec::new();
    loop {
      let action = self
        .queue
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop_front();
      let Some(mut action) = action else {
        break;
      };

      match self.replay(&action).await {
        Ok(()) => {
          debug!(resource = %action.resource_id, "Replayed offline action");
        }
        Err(e) => {
          warn!(resource = %action.resource_id, error = %e, "Replay failed, requeueing");
          action.attempts += 1;
          match self.max_replay_attempts {
            Some(max) if action.attempts >= max => {
              warn!(
                resource = %action.resource_id,
                attempts = action.attempts,
                "Dropping action after repeated failures"
              );
            }
            _ => retries.push(action),
          }
        }
      }
    }

    {
      let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
      queue.extend(retries);
    }
    self.persist();

    self.draining.store(false, Ordering::SeqCst);
  }

  async fn replay(&self, action: &SyncAction) -> Result<(), RemoteError> {
    match action.kind {
      ActionKind::Sync => {
        let payload = action.payload.clone().unwrap_or(Value::Null);
        self.remote.set_record(&action.resource_id, &payload).await
      }
      ActionKind::Delete => self.remote.delete_record(&action.resource_id).await,
    }
  }

  fn persist(&self) {
    let snapshot = self.pending();
    if let Err(e) = self.settings.put(SYNC_QUEUE_KEY, &snapshot) {
      warn!(error = %e, "Failed to persist sync queue");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::MockRemoteStore;
  use serde_json::json;
  use std::time::Duration;

  fn queue_with(
    remote: Arc<MockRemoteStore>,
    max_attempts: Option<u32>,
  ) -> (Arc<SyncQueue>, Arc<SettingsStore>) {
    let settings = Arc::new(SettingsStore::open_in_memory().unwrap());
    let queue = Arc::new(SyncQueue::new(
      Arc::clone(&settings),
      remote as Arc<dyn RemoteStore>,
      max_attempts,
    ));
    (queue, settings)
  }

  #[tokio::test]
  async fn drain_replays_in_fifo_order_and_empties_queue() {
    let remote = Arc::new(MockRemoteStore::new());
    let (queue, _settings) = queue_with(Arc::clone(&remote), None);

    queue.enqueue(SyncAction::sync("L1", json!({ "heroes": [] })));
    queue.enqueue(SyncAction::sync("L2", json!({ "heroes": ["a"] })));
    queue.enqueue(SyncAction::delete("L3"));

    queue.drain().await;

    assert!(queue.is_empty());
    let writes = remote.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, "L1");
    assert_eq!(writes[1].0, "L2");
    assert_eq!(remote.deletes(), vec!["L3"]);
  }

  #[tokio::test]
  async fn failed_actions_remain_in_original_relative_order() {
    let remote = Arc::new(MockRemoteStore::new());
    remote.fail_id("L1");
    remote.fail_id("L3");
    let (queue, _settings) = queue_with(Arc::clone(&remote), None);

    queue.enqueue(SyncAction::sync("L1", json!(1)));
    queue.enqueue(SyncAction::sync("L2", json!(2)));
    queue.enqueue(SyncAction::sync("L3", json!(3)));
    queue.enqueue(SyncAction::sync("L4", json!(4)));

    queue.drain().await;

    let pending: Vec<String> = queue
      .pending()
      .into_iter()
      .map(|a| a.resource_id)
      .collect();
    assert_eq!(pending, vec!["L1", "L3"]);

    // The successes landed despite the interleaved failures
    assert_eq!(remote.record("L2"), Some(json!(2)));
    assert_eq!(remote.record("L4"), Some(json!(4)));

    // Once the remote recovers, the retries land too
    remote.clear_failures();
    queue.drain().await;
    assert!(queue.is_empty());
    assert_eq!(remote.record("L1"), Some(json!(1)));
  }

  #[tokio::test]
  async fn queue_survives_restart_in_order() {
    let remote = Arc::new(MockRemoteStore::new());
    let settings = Arc::new(SettingsStore::open_in_memory().unwrap());

    {
      let queue = SyncQueue::new(
        Arc::clone(&settings),
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        None,
      );
      queue.enqueue(SyncAction::sync("L1", json!({ "heroes": [] })));
      queue.enqueue(SyncAction::delete("L2"));
    }

    // Fresh instance over the same settings store simulates a restart
    let reloaded = SyncQueue::new(
      Arc::clone(&settings),
      Arc::clone(&remote) as Arc<dyn RemoteStore>,
      None,
    );
    let pending = reloaded.pending();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].resource_id, "L1");
    assert_eq!(pending[0].kind, ActionKind::Sync);
    assert_eq!(pending[1].resource_id, "L2");
    assert_eq!(pending[1].kind, ActionKind::Delete);
  }

  #[tokio::test]
  async fn corrupt_persisted_queue_loads_empty() {
    let remote = Arc::new(MockRemoteStore::new());
    let settings = Arc::new(SettingsStore::open_in_memory().unwrap());
    settings.put(SYNC_QUEUE_KEY, &json!({ "not": "a queue" })).unwrap();

    let queue = SyncQueue::new(
      Arc::clone(&settings),
      remote as Arc<dyn RemoteStore>,
      None,
    );
    assert!(queue.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn reentrant_drain_is_ignored() {
    let remote = Arc::new(MockRemoteStore::new());
    remote.set_delay(Duration::from_millis(100));
    let (queue, _settings) = queue_with(Arc::clone(&remote), None);

    queue.enqueue(SyncAction::sync("L1", json!(1)));

    let first = tokio::spawn({
      let queue = Arc::clone(&queue);
      async move { queue.drain().await }
    });
    // Let the first drain take the guard and park on the remote call
    tokio::task::yield_now().await;

    queue.drain().await; // ignored, returns immediately
    first.await.unwrap();

    assert_eq!(remote.writes().len(), 1);
    assert!(queue.is_empty());
  }

  #[tokio::test]
  async fn bounded_attempts_drop_permanently_failing_actions() {
    let remote = Arc::new(MockRemoteStore::new());
    remote.fail_id("poison");
    let (queue, _settings) = queue_with(Arc::clone(&remote), Some(2));

    queue.enqueue(SyncAction::sync("poison", json!(null)));

    queue.drain().await;
    assert_eq!(queue.len(), 1); // one failure, still retryable
    queue.drain().await;
    assert!(queue.is_empty()); // second failure hits the bound
  }

  #[tokio::test]
  async fn drain_persists_the_remaining_queue() {
    let remote = Arc::new(MockRemoteStore::new());
    remote.fail_id("L1");
    let (queue, settings) = queue_with(Arc::clone(&remote), None);

    queue.enqueue(SyncAction::sync("L1", json!(1)));
    queue.enqueue(SyncAction::sync("L2", json!(2)));
    queue.drain().await;

    let persisted: Vec<SyncAction> = settings.get(SYNC_QUEUE_KEY).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].resource_id, "L1");
    assert_eq!(persisted[0].attempts, 1);
  }
}
