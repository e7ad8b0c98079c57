//! Main application state management

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ClockView, ControllerGate, TimerState, TimerStore};
use crate::{
    storage::{
        kv::{self, INITIAL_MINUTES_KEY, INITIAL_SECONDS_KEY, MINUTES_KEY, SECONDS_KEY},
        KeyValueStore, MarkType, SessionTimeEntry, SessionTimesLog, TimerMark, TimerMarksRecorder,
        TimerMode,
    },
    utils::{now_ms, time::format_mm_ss},
};

/// A clock value saved under a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTimer {
    pub name: String,
    pub status: bool,
    pub value: String,
}

/// Timer, controller flag and durable records of one process
pub struct AppState {
    /// The countdown owned by this process
    pub timer: TimerStore,
    pub gate: ControllerGate,
    /// Identifier stamped on every transition this process makes
    pub client_id: String,
    pub marks: TimerMarksRecorder,
    pub session_times: SessionTimesLog,
    kv: Arc<dyn KeyValueStore>,
    /// Admin-configured duration used when reseeding on reset
    initial_timer: Mutex<Option<ClockView>>,
    saved_timers: Mutex<Vec<SavedTimer>>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    last_action: Mutex<Option<(String, DateTime<Utc>)>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clock from a minutes/seconds pair of keys, seconds clamped to 59
fn clock_from_keys(store: &dyn KeyValueStore, min_key: &str, sec_key: &str) -> Option<ClockView> {
    let min = kv::get_u64(store, min_key)?;
    let sec = kv::get_u64(store, sec_key)?;
    Some(ClockView::new(min, sec.min(59)))
}

impl AppState {
    /// Build the state, seeding the countdown from the durable store.
    ///
    /// Each of `minutes`/`seconds` falls back to 3:30 independently when
    /// absent or unreadable.
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        gate: ControllerGate,
        client_id: impl Into<String>,
        port: u16,
        host: String,
    ) -> Self {
        let default = ClockView::default();
        let bootstrap = ClockView::new(
            kv::get_u64(kv.as_ref(), MINUTES_KEY).unwrap_or(default.min),
            kv::get_u64(kv.as_ref(), SECONDS_KEY)
                .unwrap_or(default.sec)
                .min(59),
        );
        let initial_timer = clock_from_keys(kv.as_ref(), INITIAL_MINUTES_KEY, INITIAL_SECONDS_KEY);
        info!(
            "Bootstrapping countdown at {} (initial timer: {})",
            format_mm_ss(bootstrap.min, bootstrap.sec),
            initial_timer
                .map(|c| format_mm_ss(c.min, c.sec))
                .unwrap_or_else(|| "unset".to_string())
        );

        Self {
            timer: TimerStore::new(bootstrap.to_ms()),
            gate,
            client_id: client_id.into(),
            marks: TimerMarksRecorder::new(Arc::clone(&kv)),
            session_times: SessionTimesLog::load(Arc::clone(&kv)),
            kv,
            initial_timer: Mutex::new(initial_timer),
            saved_timers: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
        }
    }

    fn origin(&self) -> Option<&str> {
        Some(self.client_id.as_str())
    }

    fn record_action(&self, action: &str) {
        *guard(&self.last_action) = Some((action.to_string(), Utc::now()));
    }

    pub fn start(&self) -> TimerState {
        self.record_action("start");
        self.timer.start(self.origin());
        self.timer.snapshot()
    }

    pub fn pause(&self) -> TimerState {
        self.record_action("pause");
        self.timer.pause(self.origin());
        self.timer.snapshot()
    }

    /// Reset the countdown. With `reseed`, the duration is first resolved
    /// from the configured initial timer, then the stored initial keys, then
    /// the stored current clock, then 3:30.
    pub fn reset(&self, reseed: bool) -> TimerState {
        self.record_action("reset");
        if reseed {
            let seed = self.reseed_clock();
            info!("Reseeding countdown to {}", format_mm_ss(seed.min, seed.sec));
            self.timer.set_duration(seed.to_duration_ms(), self.origin());
        } else {
            self.timer.reset(self.origin());
        }
        self.timer.snapshot()
    }

    fn reseed_clock(&self) -> ClockView {
        if let Some(initial) = *guard(&self.initial_timer) {
            return initial;
        }
        clock_from_keys(self.kv.as_ref(), INITIAL_MINUTES_KEY, INITIAL_SECONDS_KEY)
            .or_else(|| clock_from_keys(self.kv.as_ref(), MINUTES_KEY, SECONDS_KEY))
            .unwrap_or_default()
    }

    pub fn set_duration_ms(&self, duration_ms: i64) -> TimerState {
        self.record_action("set-duration");
        self.timer.set_duration(duration_ms, self.origin());
        self.timer.snapshot()
    }

    /// Configure the duration used by reseeding resets and apply it now
    pub fn set_initial_timer(&self, clock: ClockView) -> TimerState {
        let clock = ClockView::new(clock.min, clock.sec.min(59));
        *guard(&self.initial_timer) = Some(clock);

        for (key, value) in [(INITIAL_MINUTES_KEY, clock.min), (INITIAL_SECONDS_KEY, clock.sec)] {
            if let Err(e) = self.kv.set(key, &value.to_string()) {
                warn!("Failed to persist {}: {}", key, e);
            }
        }

        self.record_action("set-initial");
        self.timer.set_duration(clock.to_duration_ms(), self.origin());
        self.timer.snapshot()
    }

    pub fn initial_timer(&self) -> Option<ClockView> {
        *guard(&self.initial_timer)
    }

    pub fn set_controller(&self, enabled: bool) {
        self.record_action(if enabled { "claim-controller" } else { "release-controller" });
        self.gate.set_controller(enabled);
    }

    pub fn clock(&self) -> ClockView {
        self.timer.snapshot().clock()
    }

    /// Unpadded `M:S`, as stored by named timers
    pub fn format_timer(&self) -> String {
        let clock = self.clock();
        format!("{}:{}", clock.min, clock.sec)
    }

    /// Zero-padded `MM:SS`
    pub fn format_clock(&self) -> String {
        let clock = self.clock();
        format_mm_ss(clock.min, clock.sec)
    }

    /// Save the current clock under `name`, overwriting a previous value
    pub fn save_timer(&self, name: &str) -> SavedTimer {
        let value = self.format_timer();
        let mut timers = guard(&self.saved_timers);
        match timers.iter_mut().find(|t| t.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.clone()
            }
            None => {
                let saved = SavedTimer {
                    name: name.to_string(),
                    status: false,
                    value,
                };
                timers.push(saved.clone());
                saved
            }
        }
    }

    pub fn saved_timers(&self) -> Vec<SavedTimer> {
        guard(&self.saved_timers).clone()
    }

    /// Record the current clock as a mark for this scope
    pub fn save_mark(
        &self,
        mark_type: MarkType,
        session_id: Option<&str>,
        association_id: Option<&str>,
    ) -> TimerMark {
        self.marks
            .save_mark(mark_type, self.clock(), session_id, association_id)
    }

    pub fn get_mark(
        &self,
        mark_type: MarkType,
        session_id: Option<&str>,
        association_id: Option<&str>,
    ) -> Option<TimerMark> {
        self.marks.get_mark(mark_type, session_id, association_id)
    }

    /// Append the current clock to the session's time log
    pub fn record_session_time(
        &self,
        session_id: &str,
        association_id: &str,
        association_title: Option<String>,
        timer_mode: TimerMode,
    ) -> Vec<SessionTimeEntry> {
        let entry = SessionTimeEntry {
            association_id: association_id.to_string(),
            association_title,
            time: self.format_clock(),
            saved_at: now_ms(),
            timer_mode,
        };
        self.session_times.record(session_id, entry)
    }

    /// Persist the displayed clock so a restart resumes from it
    pub fn persist_clock(&self, clock: ClockView) {
        for (key, value) in [(MINUTES_KEY, clock.min), (SECONDS_KEY, clock.sec)] {
            if let Err(e) = self.kv.set(key, &value.to_string()) {
                warn!("Failed to persist {}: {}", key, e);
            }
        }
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        match guard(&self.last_action).clone() {
            Some((action, at)) => (Some(action), Some(at)),
            None => (None, None),
        }
    }
}
