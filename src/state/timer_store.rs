//! Countdown engine
//!
//! [`TimerStore`] is the only writer of [`TimerState`]. Every transition is
//! published twice: the full state on a `watch` channel (late subscribers see
//! the current value) and a [`TimerChange`] carrying the cause on a
//! `broadcast` channel, which the sync bridge consumes.
//!
//! The 1-second tick loop is a tokio task whose handle the store owns. It is
//! always cancelled before a new one is scheduled, and every loop carries a
//! generation number so a tick from a cancelled loop can never mutate state.
//! Methods that start ticking must be called from within a Tokio runtime.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::timer_state::{ChangeCause, TimerChange, TimerState, TimerStatePatch, TimerStatus};
use crate::utils::now_ms;

/// Period of the local tick loop
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Time removed from the countdown on every tick
const TICK_STEP_MS: u64 = 1000;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Handle to a single countdown. Clones share the same countdown.
#[derive(Debug, Clone)]
pub struct TimerStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    state_tx: watch::Sender<TimerState>,
    change_tx: broadcast::Sender<TimerChange>,
    control: Mutex<Control>,
}

#[derive(Debug)]
struct Control {
    ticker: Option<Ticker>,
    generation: u64,
    /// Conflict watermark: timestamp of the last explicit or remote transition
    last_applied_ts: i64,
}

#[derive(Debug)]
struct Ticker {
    generation: u64,
    handle: JoinHandle<()>,
}

impl Control {
    fn cancel_ticker(&mut self) {
        self.generation += 1;
        if let Some(ticker) = self.ticker.take() {
            debug!("Cancelling tick loop generation {}", ticker.generation);
            ticker.handle.abort();
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Ok(control) = self.control.get_mut() {
            control.cancel_ticker();
        }
    }
}

impl TimerStore {
    /// Create an idle countdown of `duration_ms`
    pub fn new(duration_ms: u64) -> Self {
        let now = now_ms();
        let (state_tx, _) = watch::channel(TimerState::idle(duration_ms, now));
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(StoreInner {
                state_tx,
                change_tx,
                control: Mutex::new(Control {
                    ticker: None,
                    generation: 0,
                    last_applied_ts: now,
                }),
            }),
        }
    }

    /// Current state, without side effects
    pub fn snapshot(&self) -> TimerState {
        self.inner.state_tx.borrow().clone()
    }

    /// Live state stream; the receiver starts with the current value
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.inner.state_tx.subscribe()
    }

    /// Every transition from now on, tagged with its cause
    pub fn changes(&self) -> broadcast::Receiver<TimerChange> {
        self.inner.change_tx.subscribe()
    }

    /// Reconfigure the countdown. Negative input is clamped to zero.
    pub fn set_duration(&self, duration_ms: i64, origin: Option<&str>) {
        let duration_ms = duration_ms.max(0) as u64;
        let mut control = self.lock();
        control.cancel_ticker();

        let next = TimerState {
            duration_ms,
            remaining_ms: duration_ms,
            status: TimerStatus::Idle,
            updated_at: self.next_stamp(&control),
            controller_id: origin.map(str::to_owned),
        };
        info!("Duration set to {}ms", duration_ms);
        self.emit(&mut control, next, ChangeCause::Configure, true);
    }

    /// Begin counting down. No-op while already running.
    pub fn start(&self, origin: Option<&str>) {
        let mut control = self.lock();
        let current = self.snapshot();
        if current.is_running() {
            debug!("Start ignored, countdown already running");
            return;
        }
        control.cancel_ticker();

        let updated_at = self.next_stamp(&control);
        let controller_id = origin.map(str::to_owned);

        if current.remaining_ms == 0 {
            // Nothing left to count; settle immediately instead of waiting a tick
            let next = TimerState {
                status: TimerStatus::Finished,
                updated_at,
                controller_id,
                ..current
            };
            self.emit(&mut control, next, ChangeCause::Start, true);
            return;
        }

        let next = TimerState {
            status: TimerStatus::Running,
            updated_at,
            controller_id,
            ..current
        };
        info!("Countdown started with {}ms remaining", next.remaining_ms);
        self.emit(&mut control, next, ChangeCause::Start, true);
        self.spawn_ticker(&mut control);
    }

    /// Stop counting, keeping the remaining time. No-op unless running.
    pub fn pause(&self, origin: Option<&str>) {
        let mut control = self.lock();
        let current = self.snapshot();
        if !current.is_running() {
            debug!("Pause ignored, countdown is {}", current.status.as_str());
            return;
        }
        control.cancel_ticker();

        let next = TimerState {
            status: TimerStatus::Idle,
            updated_at: self.next_stamp(&control),
            controller_id: origin.map(str::to_owned),
            ..current
        };
        info!("Countdown paused with {}ms remaining", next.remaining_ms);
        self.emit(&mut control, next, ChangeCause::Pause, true);
    }

    /// Restore the full duration and go idle
    pub fn reset(&self, origin: Option<&str>) {
        let mut control = self.lock();
        control.cancel_ticker();
        let current = self.snapshot();

        let next = TimerState {
            remaining_ms: current.duration_ms,
            status: TimerStatus::Idle,
            updated_at: self.next_stamp(&control),
            controller_id: origin.map(str::to_owned),
            ..current
        };
        info!("Countdown reset to {}ms", next.duration_ms);
        self.emit(&mut control, next, ChangeCause::Reset, true);
    }

    /// Absorb a state produced elsewhere.
    ///
    /// Only a patch strictly newer than the last applied timestamp is taken;
    /// anything else is ignored. Returns whether the patch was applied.
    pub fn apply_remote(&self, patch: TimerStatePatch) -> bool {
        let remote_ts = patch.updated_at.unwrap_or(0);
        let mut control = self.lock();
        if remote_ts <= control.last_applied_ts {
            debug!(
                "Ignoring remote state at {} (last applied {})",
                remote_ts, control.last_applied_ts
            );
            return false;
        }
        control.cancel_ticker();

        let current = self.snapshot();
        let remaining_ms = patch.remaining_ms.unwrap_or(current.remaining_ms);
        let duration_ms = patch.duration_ms.unwrap_or(current.duration_ms).max(remaining_ms);
        let next = TimerState {
            duration_ms,
            remaining_ms,
            status: patch.status.unwrap_or(current.status),
            updated_at: remote_ts,
            controller_id: patch.controller_id.or(current.controller_id),
        };
        let running = next.is_running();
        debug!(
            "Applying remote state: status={}, remaining={}ms",
            next.status.as_str(),
            next.remaining_ms
        );
        self.emit(&mut control, next, ChangeCause::Remote, true);

        if running {
            self.spawn_ticker(&mut control);
        }
        true
    }

    /// Whether a tick loop is currently alive
    pub fn is_ticking(&self) -> bool {
        self.lock()
            .ticker
            .as_ref()
            .map_or(false, |ticker| !ticker.handle.is_finished())
    }

    /// Restart local ticking if the state says running but no loop is alive.
    /// Returns whether a loop was started.
    pub fn ensure_ticking(&self) -> bool {
        let mut control = self.lock();
        if !self.inner.state_tx.borrow().is_running() {
            return false;
        }
        let alive = control
            .ticker
            .as_ref()
            .map_or(false, |ticker| !ticker.handle.is_finished());
        if alive {
            return false;
        }
        warn!("Countdown is running without a tick loop, resuming local ticking");
        self.spawn_ticker(&mut control);
        true
    }

    /// Kill the tick loop without touching state, as a crash would
    #[cfg(test)]
    pub(crate) fn abort_ticker_for_test(&self) {
        if let Some(ticker) = self.lock().ticker.take() {
            ticker.handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        // No invariant spans a panic inside the critical section, so a
        // poisoned lock is still usable.
        self.inner
            .control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wall-clock stamp that never goes below the previous one and is
    /// strictly after the last applied transition, so two transitions made
    /// within the same millisecond still order for other processes.
    fn next_stamp(&self, control: &Control) -> i64 {
        now_ms()
            .max(self.inner.state_tx.borrow().updated_at)
            .max(control.last_applied_ts + 1)
    }

    fn emit(
        &self,
        control: &mut Control,
        state: TimerState,
        cause: ChangeCause,
        advance_watermark: bool,
    ) {
        if advance_watermark {
            control.last_applied_ts = state.updated_at;
        }
        self.inner.state_tx.send_replace(state.clone());
        // No subscribers is fine
        let _ = self.inner.change_tx.send(TimerChange { state, cause });
    }

    fn spawn_ticker(&self, control: &mut Control) {
        control.cancel_ticker();
        let generation = control.generation;
        let inner = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let store = TimerStore { inner };
                if !store.handle_tick(generation) {
                    break;
                }
            }
            debug!("Tick loop generation {} stopped", generation);
        });

        debug!("Tick loop generation {} scheduled", generation);
        control.ticker = Some(Ticker { generation, handle });
    }

    /// One tick of loop `generation`. Returns whether the loop should continue.
    fn handle_tick(&self, generation: u64) -> bool {
        let mut control = self.lock();
        if control.generation != generation {
            return false;
        }
        let current = self.snapshot();
        if !current.is_running() {
            control.ticker = None;
            return false;
        }

        let remaining_ms = current.remaining_ms.saturating_sub(TICK_STEP_MS);
        let finished = remaining_ms == 0;
        let next = TimerState {
            remaining_ms,
            status: if finished { TimerStatus::Finished } else { TimerStatus::Running },
            updated_at: self.next_stamp(&control),
            ..current
        };

        if finished {
            info!("Countdown finished");
            self.emit(&mut control, next, ChangeCause::Finish, false);
            control.ticker = None;
            false
        } else {
            self.emit(&mut control, next, ChangeCause::Tick, false);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    /// Slack added to waits so a tick due at the boundary has already fired
    const SLACK_MS: u64 = 50;

    async fn elapse(ms: u64) {
        sleep(Duration::from_millis(ms)).await;
    }

    fn fresh_ts() -> i64 {
        now_ms() + 60_000
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_to_finished() {
        let store = TimerStore::new(0);
        store.set_duration(10_000, None);
        store.start(Some("test"));

        elapse(1000 + SLACK_MS).await;
        assert_eq!(store.snapshot().remaining_ms, 9000);
        assert_eq!(store.snapshot().status, TimerStatus::Running);

        elapse(9000).await;
        let state = store.snapshot();
        assert_eq!(state.remaining_ms, 0);
        assert_eq!(state.status, TimerStatus::Finished);
        assert!(!store.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_keeps_remaining_time() {
        let store = TimerStore::new(0);
        store.set_duration(5000, None);
        store.start(Some("test"));

        elapse(2000 + SLACK_MS).await;
        store.pause(Some("test"));
        assert_eq!(store.snapshot().remaining_ms, 3000);

        elapse(3000).await;
        let state = store.snapshot();
        assert_eq!(state.remaining_ms, 3000);
        assert_eq!(state.status, TimerStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_duration() {
        let store = TimerStore::new(0);
        store.set_duration(8000, None);
        store.start(Some("test"));
        elapse(3000 + SLACK_MS).await;
        store.reset(Some("test"));

        let state = store.snapshot();
        assert_eq!(state.remaining_ms, 8000);
        assert_eq!(state.status, TimerStatus::Idle);

        elapse(2000).await;
        assert_eq!(store.snapshot().remaining_ms, 8000);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_start_keeps_a_single_loop() {
        let store = TimerStore::new(10_000);
        store.start(None);
        store.start(None);
        store.start(None);

        elapse(1000 + SLACK_MS).await;
        assert_eq!(store.snapshot().remaining_ms, 9000);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_duration_is_clamped() {
        let store = TimerStore::new(1000);
        store.set_duration(-500, Some("admin"));
        let state = store.snapshot();
        assert_eq!(state.duration_ms, 0);
        assert_eq!(state.remaining_ms, 0);
        assert_eq!(state.controller_id.as_deref(), Some("admin"));
    }

    #[tokio::test(start_paused = true)]
    async fn starting_with_nothing_left_finishes_at_once() {
        let store = TimerStore::new(0);
        store.start(None);
        assert_eq!(store.snapshot().status, TimerStatus::Finished);
        assert!(!store.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn stamps_never_go_backwards() {
        let store = TimerStore::new(5000);
        let mut previous = store.snapshot().updated_at;
        store.start(None);
        for _ in 0..3 {
            elapse(1000).await;
            let stamp = store.snapshot().updated_at;
            assert!(stamp >= previous);
            previous = stamp;
        }
        store.pause(None);
        assert!(store.snapshot().updated_at >= previous);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_running_state_starts_local_ticking() {
        let store = TimerStore::new(10_000);
        assert_eq!(store.snapshot().status, TimerStatus::Idle);

        let applied = store.apply_remote(TimerStatePatch {
            remaining_ms: Some(6000),
            status: Some(TimerStatus::Running),
            updated_at: Some(fresh_ts()),
            controller_id: Some("admin".into()),
            ..Default::default()
        });
        assert!(applied);
        assert_eq!(store.snapshot().status, TimerStatus::Running);
        assert!(store.is_ticking());

        elapse(1000 + SLACK_MS).await;
        assert_eq!(store.snapshot().remaining_ms, 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_idle_state_stops_local_ticking() {
        let store = TimerStore::new(10_000);
        store.start(None);
        elapse(1000 + SLACK_MS).await;

        store.apply_remote(TimerStatePatch {
            remaining_ms: Some(4000),
            status: Some(TimerStatus::Idle),
            updated_at: Some(fresh_ts()),
            ..Default::default()
        });
        assert!(!store.is_ticking());

        elapse(3000).await;
        assert_eq!(store.snapshot().remaining_ms, 4000);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_remote_state_is_ignored() {
        let store = TimerStore::new(10_000);
        store.start(None);
        let before = store.snapshot();

        let applied = store.apply_remote(TimerStatePatch {
            remaining_ms: Some(1000),
            status: Some(TimerStatus::Idle),
            updated_at: Some(before.updated_at),
            ..Default::default()
        });
        assert!(!applied);
        assert_eq!(store.snapshot(), before);

        let applied = store.apply_remote(TimerStatePatch {
            remaining_ms: Some(1000),
            ..Default::default()
        });
        assert!(!applied);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn applying_the_same_remote_state_twice_is_idempotent() {
        let store = TimerStore::new(10_000);
        let patch = TimerStatePatch {
            duration_ms: Some(20_000),
            remaining_ms: Some(12_000),
            status: Some(TimerStatus::Idle),
            updated_at: Some(fresh_ts()),
            controller_id: Some("admin".into()),
        };

        assert!(store.apply_remote(patch.clone()));
        let once = store.snapshot();
        assert!(!store.apply_remote(patch));
        assert_eq!(store.snapshot(), once);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_remote_fields_keep_local_values() {
        let store = TimerStore::new(10_000);
        store.apply_remote(TimerStatePatch {
            remaining_ms: Some(7000),
            updated_at: Some(fresh_ts()),
            ..Default::default()
        });
        let state = store.snapshot();
        assert_eq!(state.duration_ms, 10_000);
        assert_eq!(state.remaining_ms, 7000);
        assert_eq!(state.status, TimerStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_do_not_shadow_remote_transitions() {
        let store = TimerStore::new(10_000);
        store.start(None);
        let started_at = store.snapshot().updated_at;
        elapse(3000 + SLACK_MS).await;

        // A pause stamped just after the local start still wins over later ticks
        let applied = store.apply_remote(TimerStatePatch {
            remaining_ms: Some(8000),
            status: Some(TimerStatus::Idle),
            updated_at: Some(started_at + 1),
            ..Default::default()
        });
        assert!(applied);
        assert_eq!(store.snapshot().remaining_ms, 8000);
        assert!(!store.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_ticking_revives_a_dead_loop() {
        let store = TimerStore::new(10_000);
        store.start(None);
        store.abort_ticker_for_test();
        assert!(!store.is_ticking());

        assert!(store.ensure_ticking());
        assert!(store.is_ticking());
        assert!(!store.ensure_ticking());

        elapse(1000 + SLACK_MS).await;
        assert_eq!(store.snapshot().remaining_ms, 9000);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_ticking_leaves_idle_store_alone() {
        let store = TimerStore::new(10_000);
        assert!(!store.ensure_ticking());
        assert!(!store.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn changes_carry_their_cause_in_order() {
        let store = TimerStore::new(2000);
        let mut changes = store.changes();
        store.start(None);
        elapse(2000 + SLACK_MS).await;
        store.reset(None);

        let causes: Vec<ChangeCause> = std::iter::from_fn(|| changes.try_recv().ok())
            .map(|change| change.cause)
            .collect();
        assert_eq!(
            causes,
            vec![
                ChangeCause::Start,
                ChangeCause::Tick,
                ChangeCause::Finish,
                ChangeCause::Reset
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscribers_see_current_state() {
        let store = TimerStore::new(4000);
        store.start(None);
        elapse(1000 + SLACK_MS).await;

        let rx = store.subscribe();
        assert_eq!(rx.borrow().remaining_ms, 3000);
    }
}
