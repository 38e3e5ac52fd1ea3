//! Bucket lifecycle: install-time pre-population, activation-time cleanup.
//!
//! Install is all-or-nothing: every manifest asset is fetched before anything
//! is written, and a failed write discards the bucket, so no partial static
//! bucket is ever considered valid. Activation deletes every bucket that is
//! neither the current static nor the current runtime bucket; this is the
//! only mechanism that removes obsolete cached data.

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::net::Fetcher;
use crate::request::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Active,
  Superseded,
}

pub struct CacheLifecycleManager {
  store: Arc<CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  static_bucket: String,
  runtime_bucket: String,
  manifest: Vec<String>,
  state: Mutex<LifecycleState>,
}

impl CacheLifecycleManager {
  pub fn new(
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    static_bucket: impl Into<String>,
    runtime_bucket: impl Into<String>,
    manifest: Vec<String>,
  ) -> Self {
    Self {
      store,
      fetcher,
      static_bucket: static_bucket.into(),
      runtime_bucket: runtime_bucket.into(),
      manifest,
      state: Mutex::new(LifecycleState::Installing),
    }
  }

  pub fn state(&self) -> LifecycleState {
    // Poisoning cannot corrupt a Copy state, recover the inner value
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: LifecycleState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  /// Fetch and cache every manifest asset into the current static bucket.
  /// Any single failure aborts the whole install.
  pub async fn install(&self) -> Result<()> {
    self.set_state(LifecycleState::Installing);

    // Fetch everything before writing anything; the first failure aborts
    let fetches = self.manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Install failed fetching {}: {}", url, e))?;

      if !response.is_storable() {
        return Err(eyre!(
          "Install failed fetching {}: status {}",
          url,
          response.status
        ));
      }

      Ok((request, response))
    });
    let fetched = futures::future::try_join_all(fetches).await?;

    self
      .store
      .open_bucket(&self.static_bucket)
      .map_err(|e| eyre!("Install failed opening bucket: {}", e))?;

    for (request, response) in &fetched {
      if let Err(e) = self.store.put(&self.static_bucket, request, response) {
        // No partial bucket survives a failed install
        if let Err(del) = self.store.delete_bucket(&self.static_bucket) {
          warn!(bucket = %self.static_bucket, error = %del, "Failed to discard partial install bucket");
        }
        return Err(eyre!("Install failed writing {}: {}", request.url, e));
      }
    }

    debug!(
      bucket = %self.static_bucket,
      assets = self.manifest.len(),
      "Install complete"
    );
    self.set_state(LifecycleState::Waiting);
    Ok(())
  }

  /// Delete every bucket whose name is neither the current static nor the
  /// current runtime bucket, then open the runtime bucket.
  pub async fn activate(&self) -> Result<()> {
    let names = self
      .store
      .bucket_names()
      .map_err(|e| eyre!("Activate failed listing buckets: {}", e))?;

    for name in names {
      if name != self.static_bucket && name != self.runtime_bucket {
        self
          .store
          .delete_bucket(&name)
          .map_err(|e| eyre!("Activate failed deleting bucket {}: {}", name, e))?;
        debug!(bucket = %name, "Deleted superseded bucket");
      }
    }

    self
      .store
      .open_bucket(&self.runtime_bucket)
      .map_err(|e| eyre!("Activate failed opening runtime bucket: {}", e))?;

    self.set_state(LifecycleState::Active);
    Ok(())
  }

  /// Mark this version as replaced by a newer activation.
  pub fn supersede(&self) {
    self.set_state(LifecycleState::Superseded);
  }
}
