//! Programmable fakes for the network and remote-store capabilities.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{NetworkError, RemoteError};
use crate::net::Fetcher;
use crate::remote::RemoteStore;
use crate::request::{Request, Response};

/// Fetcher fake: fixed outcome per URL, optional artificial latency,
/// call counting.
pub(crate) struct MockFetcher {
  routes: Mutex<HashMap<String, Result<Response, NetworkError>>>,
  delay: Mutex<Option<Duration>>,
  calls: AtomicUsize,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      delay: Mutex::new(None),
      calls: AtomicUsize::new(0),
    }
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Ok(response));
  }

  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      Err(NetworkError::Transport("connection refused".to_string())),
    );
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetcher for MockFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let delay = *self.delay.lock().unwrap();
    if let Some(d) = delay {
      tokio::time::sleep(d).await;
    }

    let outcome = self.routes.lock().unwrap().get(&request.url).cloned();
    outcome.unwrap_or_else(|| Err(NetworkError::Transport("no route".to_string())))
  }
}

/// Remote store fake: in-memory records, per-id failure injection, write and
/// delete logs, and a drivable connectivity channel.
pub(crate) struct MockRemoteStore {
  records: Mutex<HashMap<String, Value>>,
  failing: Mutex<HashSet<String>>,
  online: AtomicBool,
  writes: Mutex<Vec<(String, Value)>>,
  deletes: Mutex<Vec<String>>,
  delay: Mutex<Option<Duration>>,
  connectivity_tx: watch::Sender<Option<bool>>,
}

impl MockRemoteStore {
  pub fn new() -> Self {
    let (connectivity_tx, _) = watch::channel(None);
    Self {
      records: Mutex::new(HashMap::new()),
      failing: Mutex::new(HashSet::new()),
      online: AtomicBool::new(true),
      writes: Mutex::new(Vec::new()),
      deletes: Mutex::new(Vec::new()),
      delay: Mutex::new(None),
      connectivity_tx,
    }
  }

  pub fn seed(&self, id: &str, value: Value) {
    self.records.lock().unwrap().insert(id.to_string(), value);
  }

  pub fn fail_id(&self, id: &str) {
    self.failing.lock().unwrap().insert(id.to_string());
  }

  pub fn clear_failures(&self) {
    self.failing.lock().unwrap().clear();
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// Push a report on the connectivity channel, like a `.info/connected`
  /// feed would.
  pub fn report_connectivity(&self, online: bool) {
    self.set_online(online);
    self.connectivity_tx.send_replace(Some(online));
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn record(&self, id: &str) -> Option<Value> {
    self.records.lock().unwrap().get(id).cloned()
  }

  pub fn writes(&self) -> Vec<(String, Value)> {
    self.writes.lock().unwrap().clone()
  }

  pub fn deletes(&self) -> Vec<String> {
    self.deletes.lock().unwrap().clone()
  }

  async fn pause(&self) {
    let delay = *self.delay.lock().unwrap();
    if let Some(d) = delay {
      tokio::time::sleep(d).await;
    }
  }

  fn check(&self, id: &str) -> Result<(), RemoteError> {
    if self.failing.lock().unwrap().contains(id) {
      return Err(RemoteError::Rejected {
        id: id.to_string(),
        reason: "injected failure".to_string(),
      });
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
  async fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  async fn get_record(&self, id: &str) -> Result<Option<Value>, RemoteError> {
    self.pause().await;
    self.check(id)?;
    Ok(self.records.lock().unwrap().get(id).cloned())
  }

  async fn set_record(&self, id: &str, value: &Value) -> Result<(), RemoteError> {
    self.pause().await;
    self.check(id)?;
    self
      .records
      .lock()
      .unwrap()
      .insert(id.to_string(), value.clone());
    self
      .writes
      .lock()
      .unwrap()
      .push((id.to_string(), value.clone()));
    Ok(())
  }

  async fn delete_record(&self, id: &str) -> Result<(), RemoteError> {
    self.pause().await;
    self.check(id)?;
    self.records.lock().unwrap().remove(id);
    self.deletes.lock().unwrap().push(id.to_string());
    Ok(())
  }

  fn subscribe_connectivity(&self) -> watch::Receiver<Option<bool>> {
    self.connectivity_tx.subscribe()
  }
}
