//! Remote synchronization module
//!
//! The record shape stored remotely, the connector contract with its
//! implementations, and the bridge that keeps a local timer in step.

pub mod bridge;
pub mod firebase;
pub mod realtime;
pub mod snapshot;

// Re-export main types
pub use bridge::{RemoteSyncBridge, SyncConfig, SyncHandles};
pub use firebase::FirebaseRealtimeStore;
pub use realtime::{InMemoryRealtimeStore, RealtimeStore};
pub use snapshot::RemoteTimerSnapshot;
