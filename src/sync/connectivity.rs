//! Connectivity tracking from two independent signals.
//!
//! The platform network signal and the remote store's connectivity channel
//! are merged with an explicit precedence rule: once the remote channel has
//! reported at least once, its last value is authoritative; until then the
//! platform signal decides. Subscribers are notified exactly once per
//! effective-state change.

use std::sync::Mutex;
use tracing::debug;

type Subscriber = Box<dyn Fn(bool) + Send + Sync>;

/// Merge rule for the two connectivity signals.
pub fn effective_state(platform_online: bool, remote_reported: Option<bool>) -> bool {
  remote_reported.unwrap_or(platform_online)
}

struct SignalState {
  platform_online: bool,
  remote_reported: Option<bool>,
  effective: bool,
}

/// Tracks online/offline state and notifies subscribers on transitions.
/// Initial state is online until the first signal arrives.
pub struct ConnectivityMonitor {
  state: Mutex<SignalState>,
  subscribers: Mutex<Vec<Subscriber>>,
}

impl ConnectivityMonitor {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(SignalState {
        platform_online: true,
        remote_reported: None,
        effective: true,
      }),
      subscribers: Mutex::new(Vec::new()),
    }
  }

  pub fn is_online(&self) -> bool {
    self.state.lock().unwrap_or_else(|e| e.into_inner()).effective
  }

  /// Register an observer. It fires on every effective-state change, never
  /// on repeated identical signals.
  pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
    self
      .subscribers
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(Box::new(callback));
  }

  /// Platform network signal (navigator online/offline analogue).
  pub fn platform_signal(&self, online: bool) {
    self.apply(|state| state.platform_online = online);
  }

  /// Remote-store connectivity channel report. Authoritative from the first
  /// report onwards.
  pub fn remote_signal(&self, online: bool) {
    self.apply(|state| state.remote_reported = Some(online));
  }

  fn apply(&self, update: impl FnOnce(&mut SignalState)) {
    let changed = {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      update(&mut state);
      let next = effective_state(state.platform_online, state.remote_reported);
      if next != state.effective {
        state.effective = next;
        Some(next)
      } else {
        None
      }
    };

    // Notify outside the state lock so subscribers may read the monitor
    if let Some(online) = changed {
      debug!(online, "Connectivity changed");
      let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
      for subscriber in subscribers.iter() {
        subscriber(online);
      }
    }
  }
}

impl Default for ConnectivityMonitor {
  fn default() -> Self {
    Self::new()
  }
}
