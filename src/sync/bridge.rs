//! Bidirectional sync between a [`TimerStore`] and a [`RealtimeStore`]
//!
//! Outbound, local transitions are published according to the controller
//! gate and a throttle. Inbound, remote records are fed to
//! [`TimerStore::apply_remote`], which keeps only records newer than the last
//! applied one. After each write, incoming notifications are ignored for a
//! short window so a process does not re-apply its own echo over a newer
//! local tick.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use futures::StreamExt;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::{sleep, Instant},
};
use tracing::{debug, info, warn};

use super::{realtime::RealtimeStore, snapshot::RemoteTimerSnapshot};
use crate::state::{ChangeCause, ControllerGate, TimerChange, TimerState, TimerStore};

pub const DEFAULT_TIMER_PATH: &str = "timer";
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(5000);
pub const DEFAULT_SUPPRESS_WINDOW: Duration = Duration::from_millis(1500);
const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// Tuning for a [`RemoteSyncBridge`]
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identifies this process in written records
    pub client_id: String,
    /// Record path in the real-time store
    pub path: String,
    /// Minimum spacing of sampled tick writes
    pub throttle: Duration,
    /// How long incoming notifications are ignored after a write
    pub suppress_window: Duration,
    /// Pause before resubscribing after the change stream ends
    pub resubscribe_delay: Duration,
}

impl SyncConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            path: DEFAULT_TIMER_PATH.to_string(),
            throttle: DEFAULT_THROTTLE,
            suppress_window: DEFAULT_SUPPRESS_WINDOW,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }
}

/// Why a local change is being written out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteReason {
    Explicit,
    Finish,
    Sample,
    Resync,
}

#[derive(Debug, Default)]
struct Outbound {
    last_write: Option<Instant>,
    suppress_until: Option<Instant>,
}

pub struct RemoteSyncBridge {
    store: TimerStore,
    realtime: Arc<dyn RealtimeStore>,
    gate: ControllerGate,
    config: SyncConfig,
    outbound: Mutex<Outbound>,
}

/// Background tasks started by [`RemoteSyncBridge::spawn`]
#[derive(Debug)]
pub struct SyncHandles {
    pub outbound: JoinHandle<()>,
    pub inbound: JoinHandle<()>,
}

impl SyncHandles {
    pub fn abort(&self) {
        self.outbound.abort();
        self.inbound.abort();
    }
}

impl RemoteSyncBridge {
    pub fn new(
        store: TimerStore,
        realtime: Arc<dyn RealtimeStore>,
        gate: ControllerGate,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            realtime,
            gate,
            config,
            outbound: Mutex::new(Outbound::default()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start the outbound and inbound loops. The inbound loop begins with a
    /// cold-start read of the current remote record.
    pub fn spawn(self: Arc<Self>) -> SyncHandles {
        let changes = self.store.changes();
        let outbound = tokio::spawn(Arc::clone(&self).outbound_loop(changes));
        let inbound = tokio::spawn(self.inbound_loop());
        SyncHandles { outbound, inbound }
    }

    /// React to one local transition
    pub async fn on_local_state_change(&self, change: TimerChange) {
        if let Some(reason) = self.write_reason(&change) {
            self.publish(&change.state, reason).await;
        }
    }

    /// React to one remote notification. Returns whether it was applied.
    ///
    /// Records written by this client are never applied: ticks do not move
    /// the store's conflict watermark, so a late echo of a sampled tick would
    /// otherwise wind the clock back.
    pub fn on_remote_update(&self, snapshot: RemoteTimerSnapshot) -> bool {
        if snapshot.client_id.as_deref() == Some(self.config.client_id.as_str()) {
            debug!("Discarding echo of own record at {}", snapshot.updated_at);
            return false;
        }
        if self.is_suppressed() {
            debug!(
                "Discarding remote update at {} inside echo suppression window",
                snapshot.updated_at
            );
            return false;
        }
        self.store.apply_remote(snapshot.to_patch())
    }

    /// Catch up with the current remote record. Returns whether it was applied.
    pub async fn cold_start(&self) -> bool {
        match self.realtime.read_once(&self.config.path).await {
            Ok(Some(snapshot)) => {
                let applied = self.store.apply_remote(snapshot.to_patch());
                info!(
                    "Cold start read remote timer at {} ({})",
                    snapshot.updated_at,
                    if applied { "applied" } else { "not newer" }
                );
                applied
            }
            Ok(None) => {
                info!("No remote timer record at '{}' yet", self.config.path);
                false
            }
            Err(e) => {
                warn!("Cold start read failed, keeping local state: {}", e);
                false
            }
        }
    }

    fn write_reason(&self, change: &TimerChange) -> Option<WriteReason> {
        match change.cause {
            ChangeCause::Remote => None,
            cause if cause.is_explicit() => Some(WriteReason::Explicit),
            ChangeCause::Finish if self.gate.is_controller() => Some(WriteReason::Finish),
            ChangeCause::Tick
                if self.gate.is_controller()
                    && change.state.is_running()
                    && self.throttle_elapsed() =>
            {
                Some(WriteReason::Sample)
            }
            _ => None,
        }
    }

    async fn publish(&self, state: &TimerState, reason: WriteReason) {
        let snapshot = RemoteTimerSnapshot::from_state(state, &self.config.client_id);
        {
            let now = Instant::now();
            let mut outbound = self.outbound();
            outbound.last_write = Some(now);
            outbound.suppress_until = Some(now + self.config.suppress_window);
        }

        match self.realtime.write(&self.config.path, &snapshot).await {
            Ok(()) => debug!(
                "Published timer state ({:?}): {}:{:02} {}",
                reason,
                snapshot.min,
                snapshot.sec,
                state.status.as_str()
            ),
            // Local state stays authoritative; the next write retries
            Err(e) => warn!("Failed to publish timer state ({:?}): {}", reason, e),
        }
    }

    fn throttle_elapsed(&self) -> bool {
        self.outbound()
            .last_write
            .map_or(true, |at| at.elapsed() >= self.config.throttle)
    }

    fn is_suppressed(&self) -> bool {
        self.outbound()
            .suppress_until
            .map_or(false, |until| Instant::now() < until)
    }

    fn outbound(&self) -> MutexGuard<'_, Outbound> {
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn outbound_loop(self: Arc<Self>, mut changes: broadcast::Receiver<TimerChange>) {
        info!("Starting outbound timer sync for client {}", self.config.client_id);
        loop {
            match changes.recv().await {
                Ok(change) => self.on_local_state_change(change).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Outbound sync lagged, {} changes skipped", skipped);
                    if self.gate.is_controller() {
                        self.publish(&self.store.snapshot(), WriteReason::Resync).await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Outbound timer sync stopped");
    }

    async fn inbound_loop(self: Arc<Self>) {
        info!("Starting inbound timer sync on '{}'", self.config.path);
        loop {
            // Subscribe before reading so nothing between the two is lost
            let mut updates = self.realtime.subscribe(&self.config.path);
            self.cold_start().await;

            while let Some(snapshot) = updates.next().await {
                self.on_remote_update(snapshot);
            }

            warn!(
                "Remote timer subscription ended, resubscribing in {:?}",
                self.config.resubscribe_delay
            );
            sleep(self.config.resubscribe_delay).await;
        }
    }
}
