//! Per-session log of times registered for associations

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::kv::KeyValueStore;

/// Key shared with existing browser data
pub const SESSION_TIMES_KEY: &str = "ffsj-session-times";

/// How a session uses the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    None,
    Simple,
    #[default]
    EntryExit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeEntry {
    pub association_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_title: Option<String>,
    /// Formatted clock value
    pub time: String,
    pub saved_at: i64,
    pub timer_mode: TimerMode,
}

type SessionTimes = BTreeMap<String, Vec<SessionTimeEntry>>;

/// Times registered per session, persisted as one JSON value
pub struct SessionTimesLog {
    store: Arc<dyn KeyValueStore>,
    sessions: Mutex<SessionTimes>,
}

impl SessionTimesLog {
    /// Load the log; an unreadable value starts empty
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let sessions = store
            .get(SESSION_TIMES_KEY)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(sessions) => Some(sessions),
                Err(e) => {
                    warn!("Discarding unreadable session times: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            store,
            sessions: Mutex::new(sessions),
        }
    }

    /// Add `entry` to the session, replacing one with the same association
    /// and time
    pub fn record(&self, session_id: &str, entry: SessionTimeEntry) -> Vec<SessionTimeEntry> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entries = sessions.entry(session_id.to_string()).or_default();
        match entries
            .iter_mut()
            .find(|e| e.association_id == entry.association_id && e.time == entry.time)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        let snapshot = entries.clone();

        match serde_json::to_string(&*sessions) {
            Ok(raw) => {
                if let Err(e) = self.store.set(SESSION_TIMES_KEY, &raw) {
                    warn!("Failed to persist session times: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode session times: {}", e),
        }
        snapshot
    }

    pub fn entries(&self, session_id: &str) -> Vec<SessionTimeEntry> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}
