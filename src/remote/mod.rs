//! Remote store capability: the authoritative document store for mirrored
//! resources, plus its push-based connectivity channel.
//!
//! The core never talks to a concrete backend directly; everything goes
//! through the RemoteStore trait. HttpRemoteStore implements it against a
//! JSON document endpoint (GET/PUT/DELETE {base}/{id}.json).

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Capability interface over the remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Cheap reachability probe. Also feeds the connectivity channel.
  async fn is_online(&self) -> bool;

  /// Read a record; None when the document does not exist.
  async fn get_record(&self, id: &str) -> Result<Option<Value>, RemoteError>;

  /// Upsert a record.
  async fn set_record(&self, id: &str, value: &Value) -> Result<(), RemoteError>;

  /// Remove a record. Removing a missing record is not an error.
  async fn delete_record(&self, id: &str) -> Result<(), RemoteError>;

  /// Push-based connectivity channel. None until the store has reported
  /// at least once; thereafter the last reported value.
  fn subscribe_connectivity(&self) -> watch::Receiver<Option<bool>>;
}

/// Verify a candidate password against the shared hash stored in the remote
/// auth document. The document holds `{"hash": "<sha256 hex>"}`.
pub async fn verify_shared_password<R: RemoteStore + ?Sized>(
  remote: &R,
  auth_document: &str,
  candidate: &str,
) -> Result<bool, RemoteError> {
  let doc = match remote.get_record(auth_document).await? {
    Some(doc) => doc,
    None => return Ok(false),
  };

  let stored = doc.get("hash").and_then(|v| v.as_str()).unwrap_or_default();
  if stored.is_empty() {
    return Ok(false);
  }

  let digest = hex::encode(Sha256::digest(candidate.as_bytes()));
  Ok(stored.eq_ignore_ascii_case(&digest))
}

/// Remote store over a JSON document HTTP endpoint.
pub struct HttpRemoteStore {
  client: reqwest::Client,
  base_url: String,
  connectivity_tx: watch::Sender<Option<bool>>,
}

impl HttpRemoteStore {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .connect_timeout(std::time::Duration::from_secs(10))
      .build()
      .map_err(|e| eyre!("Failed to build remote store client: {}", e))?;

    let (connectivity_tx, _) = watch::channel(None);

    Ok(Self {
      client,
      base_url: config.url.trim_end_matches('/').to_string(),
      connectivity_tx,
    })
  }

  fn document_url(&self, id: &str) -> String {
    format!("{}/{}.json", self.base_url, id.trim_matches('/'))
  }

  fn report_connectivity(&self, online: bool) {
    // send_replace so reporting works with no live subscribers
    self.connectivity_tx.send_replace(Some(online));
  }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
  async fn is_online(&self) -> bool {
    let url = self.document_url(".info/connected");
    let online = match self.client.get(&url).send().await {
      Ok(resp) => !resp.status().is_server_error(),
      Err(_) => false,
    };
    self.report_connectivity(online);
    online
  }

  async fn get_record(&self, id: &str) -> Result<Option<Value>, RemoteError> {
    let url = self.document_url(id);
    let resp = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !resp.status().is_success() {
      return Err(RemoteError::Rejected {
        id: id.to_string(),
        reason: format!("status {}", resp.status()),
      });
    }

    let value: Value = resp
      .json()
      .await
      .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

    // The endpoint returns JSON null for absent documents
    if value.is_null() {
      return Ok(None);
    }
    Ok(Some(value))
  }

  async fn set_record(&self, id: &str, value: &Value) -> Result<(), RemoteError> {
    let url = self.document_url(id);
    let resp = self
      .client
      .put(&url)
      .json(value)
      .send()
      .await
      .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

    if !resp.status().is_success() {
      return Err(RemoteError::Rejected {
        id: id.to_string(),
        reason: format!("status {}", resp.status()),
      });
    }
    Ok(())
  }

  async fn delete_record(&self, id: &str) -> Result<(), RemoteError> {
    let url = self.document_url(id);
    let resp = self
      .client
      .delete(&url)
      .send()
      .await
      .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(());
    }
    if !resp.status().is_success() {
      return Err(RemoteError::Rejected {
        id: id.to_string(),
        reason: format!("status {}", resp.status()),
      });
    }
    Ok(())
  }

  fn subscribe_connectivity(&self) -> watch::Receiver<Option<bool>> {
    self.connectivity_tx.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::MockRemoteStore;
  use serde_json::json;

  #[tokio::test]
  async fn verify_password_matches_stored_hash() {
    let remote = MockRemoteStore::new();
    let digest = hex::encode(Sha256::digest(b"hunter2"));
    remote.seed("auth/password", json!({ "hash": digest }));

    assert!(
      verify_shared_password(&remote, "auth/password", "hunter2")
        .await
        .unwrap()
    );
    assert!(
      !verify_shared_password(&remote, "auth/password", "wrong")
        .await
        .unwrap()
    );
  }

  #[tokio::test]
  async fn verify_password_fails_closed_without_document() {
    let remote = MockRemoteStore::new();
    assert!(
      !verify_shared_password(&remote, "auth/password", "anything")
        .await
        .unwrap()
    );
  }

  #[tokio::test]
  async fn verify_password_fails_closed_on_empty_hash() {
    let remote = MockRemoteStore::new();
    remote.seed("auth/password", json!({ "hash": "" }));
    assert!(
      !verify_shared_password(&remote, "auth/password", "")
        .await
        .unwrap()
    );
  }
}
