//! holdfast: offline-capable caching and synchronization engine.
//!
//! Two halves share one connectivity signal:
//!
//! - A request interceptor that serves reads under a configurable strategy
//!   (cache-first, network-first, stale-while-revalidate), backed by
//!   versioned request/response buckets with install-time pre-population
//!   and activation-time cleanup.
//! - A durable offline queue that holds sync/delete mutations while the
//!   remote store is unreachable and replays them in FIFO order once
//!   connectivity is confirmed.
//!
//! Presentation concerns (dialogs, toasts, list UI) are external
//! collaborators: they call into the service and observe connectivity
//! through callbacks; the core never reaches into them.

pub mod cache;
pub mod config;
pub mod error;
pub mod lists;
pub mod net;
pub mod remote;
pub mod request;
pub mod service;
pub mod settings;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

/// Install a tracing subscriber reading RUST_LOG, for binaries and tests
/// that want engine logs. Safe to call more than once.
pub fn init_tracing() {
  use tracing_subscriber::EnvFilter;
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .try_init();
}

pub use cache::{CacheLifecycleManager, CacheStore, FetchStrategyEngine, LifecycleState};
pub use config::{Config, RemoteConfig, Strategy, StrategyConfig};
pub use error::{NetworkError, ProtocolError, RemoteError, StorageError};
pub use lists::{ListRecord, ListService, Provenance, SubmitOutcome};
pub use net::{Fetcher, HttpFetcher};
pub use remote::{verify_shared_password, HttpRemoteStore, RemoteStore};
pub use request::{Method, Request, Response};
pub use service::{ControlMessage, OfflineService, ServiceHandle, StrategyUpdated};
pub use settings::SettingsStore;
pub use sync::{ActionKind, ConnectivityMonitor, SyncAction, SyncQueue};
