//! Offline service: owns the cache, lifecycle, connectivity, and sync queue
//! components, runs the control loop, and wires online transitions to queue
//! drains.
//!
//! The service runs in its own context; the UI talks to it only through
//! explicit asynchronous messages. Strategy updates use a request/ack
//! protocol: the caller treats a missing ack within 5 seconds as failure and
//! reports it without retrying.

use color_eyre::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::cache::{CacheLifecycleManager, CacheStore, FetchStrategyEngine, LifecycleState};
use crate::config::{Config, Strategy, StrategyConfig};
use crate::error::ProtocolError;
use crate::net::Fetcher;
use crate::remote::RemoteStore;
use crate::request::{Request, Response};
use crate::settings::{SettingsStore, STRATEGY_KEY};
use crate::sync::{ConnectivityMonitor, SyncQueue};

/// The UI gives up on a strategy update after this long without an ack.
pub const ACK_TIMEOUT_MS: u64 = 5000;

/// Messages accepted on the control channel.
#[derive(Debug)]
pub enum ControlMessage {
  /// UPDATE_CACHE_STRATEGY: switch the active strategy and acknowledge.
  UpdateStrategy {
    strategy: Strategy,
    reply: oneshot::Sender<StrategyUpdated>,
  },
}

/// STRATEGY_UPDATED acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyUpdated {
  pub strategy: Strategy,
}

/// Client-side handle to the service's control channel.
#[derive(Clone)]
pub struct ServiceHandle {
  tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ServiceHandle {
  /// Request a strategy switch and await the acknowledgement.
  ///
  /// No ack within the timeout is surfaced as ProtocolError::AckTimeout;
  /// the service-side state may or may not have applied by then. Callers
  /// report the failure and must not retry automatically.
  pub async fn update_strategy(&self, strategy: Strategy) -> Result<StrategyUpdated, ProtocolError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send(ControlMessage::UpdateStrategy {
        strategy,
        reply: reply_tx,
      })
      .map_err(|_| ProtocolError::ChannelClosed)?;

    match tokio::time::timeout(Duration::from_millis(ACK_TIMEOUT_MS), reply_rx).await {
      Ok(Ok(ack)) => Ok(ack),
      Ok(Err(_)) => Err(ProtocolError::ChannelClosed),
      Err(_) => Err(ProtocolError::AckTimeout(ACK_TIMEOUT_MS)),
    }
  }
}

/// The interceptor-side service.
pub struct OfflineService {
  engine: FetchStrategyEngine,
  lifecycle: CacheLifecycleManager,
  monitor: Arc<ConnectivityMonitor>,
  queue: Arc<SyncQueue>,
  settings: Arc<SettingsStore>,
  active: Mutex<StrategyConfig>,
}

impl OfflineService {
  /// Build the service and spawn its background tasks: the control loop,
  /// the remote-connectivity bridge, and the drain-on-online trigger.
  /// Must be called from within a tokio runtime.
  pub fn start(
    config: &Config,
    store: Arc<CacheStore>,
    settings: Arc<SettingsStore>,
    fetcher: Arc<dyn Fetcher>,
    remote: Arc<dyn RemoteStore>,
  ) -> (Arc<Self>, ServiceHandle) {
    let engine = FetchStrategyEngine::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      config.static_bucket(),
      config.runtime_bucket(),
      &config.static_manifest,
    );
    let lifecycle = CacheLifecycleManager::new(
      store,
      fetcher,
      config.static_bucket(),
      config.runtime_bucket(),
      config.static_manifest.clone(),
    );
    let monitor = Arc::new(ConnectivityMonitor::new());
    let queue = Arc::new(SyncQueue::new(
      Arc::clone(&settings),
      Arc::clone(&remote),
      config.max_replay_attempts,
    ));

    // Restore the last-chosen strategy from settings storage
    let mut active = config.cache.clone();
    if let Some(saved) = settings.get::<Strategy>(STRATEGY_KEY) {
      active.strategy = saved;
    }

    let service = Arc::new(Self {
      engine,
      lifecycle,
      monitor: Arc::clone(&monitor),
      queue: Arc::clone(&queue),
      settings,
      active: Mutex::new(active),
    });

    // Transition to online triggers a drain; offline only notifies
    let runtime = tokio::runtime::Handle::current();
    let drain_queue = Arc::clone(&queue);
    monitor.subscribe(move |online| {
      if online {
        let queue = Arc::clone(&drain_queue);
        runtime.spawn(async move { queue.drain().await });
      }
    });

    // Bridge the remote store's connectivity channel into the monitor
    let mut connectivity_rx = remote.subscribe_connectivity();
    let bridge_monitor = Arc::clone(&monitor);
    tokio::spawn(async move {
      while connectivity_rx.changed().await.is_ok() {
        let report = *connectivity_rx.borrow_and_update();
        if let Some(online) = report {
          bridge_monitor.remote_signal(online);
        }
      }
    });

    // Control loop
    let (tx, mut rx) = mpsc::unbounded_channel();
    let control = Arc::clone(&service);
    tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        control.handle(message);
      }
    });

    (service, ServiceHandle { tx })
  }

  fn handle(&self, message: ControlMessage) {
    match message {
      ControlMessage::UpdateStrategy { strategy, reply } => {
        self
          .active
          .lock()
          .unwrap_or_else(|e| e.into_inner())
          .strategy = strategy;

        if let Err(e) = self.settings.put(STRATEGY_KEY, &strategy) {
          warn!(error = %e, "Failed to persist chosen strategy");
        }

        // A dropped receiver means the caller already gave up on the ack
        let _ = reply.send(StrategyUpdated { strategy });
      }
    }
  }

  /// Resolve a read request under the strategy active at dispatch time.
  /// Later strategy switches do not affect this resolution.
  pub async fn resolve(&self, request: &Request) -> Response {
    let config = self.active_config();
    self.engine.resolve(request, &config).await
  }

  pub async fn install(&self) -> Result<()> {
    self.lifecycle.install().await
  }

  pub async fn activate(&self) -> Result<()> {
    self.lifecycle.activate().await
  }

  pub fn lifecycle_state(&self) -> LifecycleState {
    self.lifecycle.state()
  }

  pub fn active_config(&self) -> StrategyConfig {
    self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Platform network signal (the remote channel, once reporting, wins).
  pub fn platform_signal(&self, online: bool) {
    self.monitor.platform_signal(online);
  }

  pub fn monitor(&self) -> Arc<ConnectivityMonitor> {
    Arc::clone(&self.monitor)
  }

  pub fn queue(&self) -> Arc<SyncQueue> {
    Arc::clone(&self.queue)
  }
}
