//! Record shape held by the real-time store

use serde::{Deserialize, Serialize};

use crate::state::{ClockView, TimerState, TimerStatePatch, TimerStatus};

/// Flat timer record as written to and read from the remote store.
///
/// `min`, `sec` and `running` are always present so that simple readers can
/// show the clock; the remaining fields are optional because older writers
/// only stored the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTimerSnapshot {
    #[serde(default)]
    pub min: u64,
    #[serde(default)]
    pub sec: u64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TimerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
}

impl RemoteTimerSnapshot {
    /// Record for `state`, written by `client_id`
    pub fn from_state(state: &TimerState, client_id: &str) -> Self {
        let clock = state.clock();
        Self {
            min: clock.min,
            sec: clock.sec,
            updated_at: state.updated_at,
            running: state.is_running(),
            duration_ms: Some(state.duration_ms),
            remaining_ms: Some(state.remaining_ms),
            status: Some(state.status),
            client_id: Some(client_id.to_string()),
            controller_id: state.controller_id.clone(),
        }
    }

    /// Partial state for [`crate::state::TimerStore::apply_remote`]
    pub fn to_patch(&self) -> TimerStatePatch {
        let remaining_ms = self
            .remaining_ms
            .unwrap_or_else(|| ClockView::new(self.min, self.sec).to_ms());
        let status = self.status.unwrap_or(if self.running {
            TimerStatus::Running
        } else {
            TimerStatus::Idle
        });

        TimerStatePatch {
            duration_ms: self.duration_ms,
            remaining_ms: Some(remaining_ms),
            status: Some(status),
            updated_at: Some(self.updated_at),
            controller_id: self.controller_id.clone().or_else(|| self.client_id.clone()),
        }
    }
}
