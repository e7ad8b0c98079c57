//! Real-time store connector contract and an in-process implementation

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::snapshot::RemoteTimerSnapshot;
use crate::error::StoreError;

/// A remote store that keeps one timer record per path and pushes changes.
///
/// Notifications are best effort: they may be duplicated, reordered or
/// dropped, so consumers must not rely on arrival order.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Changes to the record at `path` from now on
    fn subscribe(&self, path: &str) -> BoxStream<'static, RemoteTimerSnapshot>;

    /// Replace the record at `path`
    async fn write(&self, path: &str, value: &RemoteTimerSnapshot) -> Result<(), StoreError>;

    /// Current record at `path`, if any
    async fn read_once(&self, path: &str) -> Result<Option<RemoteTimerSnapshot>, StoreError>;
}

const NOTIFY_CHANNEL_CAPACITY: usize = 256;

/// Real-time store living inside this process.
///
/// Clones share the same records, which lets several bridges in one process
/// talk to each other the way separate clients would through a hosted store.
#[derive(Debug, Clone)]
pub struct InMemoryRealtimeStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    records: Mutex<HashMap<String, RemoteTimerSnapshot>>,
    notify_tx: broadcast::Sender<(String, RemoteTimerSnapshot)>,
}

impl InMemoryRealtimeStore {
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                records: Mutex::new(HashMap::new()),
                notify_tx,
            }),
        }
    }
}

impl Default for InMemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeStore for InMemoryRealtimeStore {
    fn subscribe(&self, path: &str) -> BoxStream<'static, RemoteTimerSnapshot> {
        let rx = self.inner.notify_tx.subscribe();
        let path = path.to_string();

        stream::unfold((rx, path), |(mut rx, path)| async move {
            loop {
                match rx.recv().await {
                    Ok((changed, value)) if changed == path => return Some((value, (rx, path))),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Realtime subscriber lagged, {} notifications skipped", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    async fn write(&self, path: &str, value: &RemoteTimerSnapshot) -> Result<(), StoreError> {
        self.inner
            .records
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(path.to_string(), value.clone());

        debug!("Stored timer record at {}", path);
        // Nobody listening is not a failure
        let _ = self.inner.notify_tx.send((path.to_string(), value.clone()));
        Ok(())
    }

    async fn read_once(&self, path: &str) -> Result<Option<RemoteTimerSnapshot>, StoreError> {
        let records = self.inner.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(path).cloned())
    }
}
