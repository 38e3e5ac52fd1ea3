//! Cloud list records: the mirroring bookkeeping behind the user-facing
//! create / rename / delete / upload actions.
//!
//! The connectivity monitor gates every write: online writes go straight to
//! the remote store, offline or failed writes land in the sync queue. The
//! remote store is authoritative for any record flagged remote; the local
//! side only keeps the "synced list names" manifest and the original-list
//! provenance map in settings storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::RemoteError;
use crate::remote::{self, RemoteStore};
use crate::settings::{SettingsStore, ORIGINAL_LISTS_KEY, SYNCED_LISTS_KEY};
use crate::sync::{ConnectivityMonitor, SyncAction, SyncQueue};

/// Where a record lives relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
  LocalOnly,
  RemoteOnly,
  Mirrored,
}

/// A named list resource. Mirrored copies carry the remote id used for
/// update/delete addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord {
  pub name: String,
  pub remote_id: Option<String>,
  pub provenance: Provenance,
  pub payload: Value,
}

/// How a mutation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// Written to the remote store directly.
  Applied,
  /// Appended to the sync queue for replay on reconnect.
  Queued,
}

pub struct ListService {
  monitor: Arc<ConnectivityMonitor>,
  queue: Arc<SyncQueue>,
  remote: Arc<dyn RemoteStore>,
  settings: Arc<SettingsStore>,
}

impl ListService {
  pub fn new(
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<SyncQueue>,
    remote: Arc<dyn RemoteStore>,
    settings: Arc<SettingsStore>,
  ) -> Self {
    Self {
      monitor,
      queue,
      remote,
      settings,
    }
  }

  /// Create or update the remote mirror of a list.
  pub async fn upload_list(&self, name: &str, payload: &Value) -> SubmitOutcome {
    let outcome = if self.monitor.is_online() {
      match self.remote.set_record(name, payload).await {
        Ok(()) => SubmitOutcome::Applied,
        Err(e) => {
          warn!(list = name, error = %e, "Direct upload failed, queueing");
          self.queue.enqueue(SyncAction::sync(name, payload.clone()));
          SubmitOutcome::Queued
        }
      }
    } else {
      self.queue.enqueue(SyncAction::sync(name, payload.clone()));
      SubmitOutcome::Queued
    };

    // The manifest records mirroring intent; a queued upload is a mirror
    // that has not landed yet
    self.remember_synced(name);
    outcome
  }

  /// Remove the remote mirror of a list.
  pub async fn delete_list(&self, name: &str) -> SubmitOutcome {
    let outcome = if self.monitor.is_online() {
      match self.remote.delete_record(name).await {
        Ok(()) => SubmitOutcome::Applied,
        Err(e) => {
          warn!(list = name, error = %e, "Direct delete failed, queueing");
          self.queue.enqueue(SyncAction::delete(name));
          SubmitOutcome::Queued
        }
      }
    } else {
      self.queue.enqueue(SyncAction::delete(name));
      SubmitOutcome::Queued
    };

    self.forget_synced(name);
    self.forget_origin(name);
    outcome
  }

  /// Rename a mirrored list: the old record is deleted, the payload is
  /// re-uploaded under the new name, and the provenance map remembers the
  /// original remote id (chained renames collapse to the first id).
  pub async fn rename_list(&self, old_name: &str, new_name: &str, payload: &Value) -> SubmitOutcome {
    let origin = self
      .original_of(old_name)
      .unwrap_or_else(|| old_name.to_string());
    self.remember_origin(new_name, &origin);

    self.delete_list(old_name).await;
    self.upload_list(new_name, payload).await
  }

  /// Read a list from the remote store, classified by provenance.
  pub async fn fetch_list(&self, name: &str) -> Result<Option<ListRecord>, RemoteError> {
    let payload = match self.remote.get_record(name).await? {
      Some(payload) => payload,
      None => return Ok(None),
    };

    let provenance = if self.synced_lists().iter().any(|n| n == name) {
      Provenance::Mirrored
    } else {
      Provenance::RemoteOnly
    };

    Ok(Some(ListRecord {
      name: name.to_string(),
      remote_id: Some(name.to_string()),
      provenance,
      payload,
    }))
  }

  /// Check a candidate password against the shared hash in the remote auth
  /// document. Gates cloud writes in the UI.
  pub async fn verify_password(
    &self,
    auth_document: &str,
    candidate: &str,
  ) -> Result<bool, RemoteError> {
    remote::verify_shared_password(self.remote.as_ref(), auth_document, candidate).await
  }

  /// Names of lists mirrored (or queued to mirror) to the remote store.
  pub fn synced_lists(&self) -> Vec<String> {
    self.settings.get(SYNCED_LISTS_KEY).unwrap_or_default()
  }

  /// Original remote id behind a renamed list, if any.
  pub fn original_of(&self, name: &str) -> Option<String> {
    self.origin_map().get(name).cloned()
  }

  fn remember_synced(&self, name: &str) {
    let mut names = self.synced_lists();
    if !names.iter().any(|n| n == name) {
      names.push(name.to_string());
      if let Err(e) = self.settings.put(SYNCED_LISTS_KEY, &names) {
        warn!(error = %e, "Failed to persist synced list manifest");
      }
    }
  }

  fn forget_synced(&self, name: &str) {
    let mut names = self.synced_lists();
    names.retain(|n| n != name);
    if let Err(e) = self.settings.put(SYNCED_LISTS_KEY, &names) {
      warn!(error = %e, "Failed to persist synced list manifest");
    }
  }

  fn origin_map(&self) -> HashMap<String, String> {
    self.settings.get(ORIGINAL_LISTS_KEY).unwrap_or_default()
  }

  fn remember_origin(&self, name: &str, origin: &str) {
    let mut map = self.origin_map();
    map.insert(name.to_string(), origin.to_string());
    if let Err(e) = self.settings.put(ORIGINAL_LISTS_KEY, &map) {
      warn!(error = %e, "Failed to persist original-list map");
    }
  }

  fn forget_origin(&self, name: &str) {
    let mut map = self.origin_map();
    if map.remove(name).is_some() {
      if let Err(e) = self.settings.put(ORIGINAL_LISTS_KEY, &map) {
        warn!(error = %e, "Failed to persist original-list map");
      }
    }
  }
}
