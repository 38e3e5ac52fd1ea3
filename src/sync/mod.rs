//! Offline sync layer: connectivity tracking and the durable mutation queue.
//!
//! - The monitor merges the platform network signal with the remote store's
//!   own connectivity channel and notifies subscribers on effective changes
//! - The queue holds pending sync/delete actions in FIFO order and replays
//!   them against the remote store once connectivity is confirmed

mod connectivity;
mod queue;

pub use connectivity::{effective_state, ConnectivityMonitor};
pub use queue::{ActionKind, SyncAction, SyncQueue};
