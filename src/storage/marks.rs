//! Entry/exit time marks scoped by session and association

use std::{borrow::Cow, fmt, sync::Arc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::kv::KeyValueStore;
use crate::{
    error::StoreError,
    state::ClockView,
    utils::{now_ms, time::format_mm_ss},
};

const DEFAULT_SESSION: &str = "defaultSession";
const DEFAULT_ASSOCIATION: &str = "defaultAssociation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkType {
    Entry,
    Exit,
}

impl MarkType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "entry" => Some(MarkType::Entry),
            "exit" => Some(MarkType::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MarkType::Entry => "entry",
            MarkType::Exit => "exit",
        })
    }
}

/// Percent-encode the separator and the escape character so that distinct
/// `(session, association)` pairs never share a key. Ids without either
/// character are used as is.
fn escape_component(raw: &str) -> Cow<'_, str> {
    if !raw.contains([':', '%']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.replace('%', "%25").replace(':', "%3A"))
}

/// Remaining time captured at an entry or exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerMark {
    /// `MM:SS`
    pub value: String,
    pub saved_at: i64,
}

/// Saves and looks up marks in the durable store.
///
/// Each `(type, session, association)` holds at most one mark; saving again
/// overwrites it.
#[derive(Clone)]
pub struct TimerMarksRecorder {
    store: Arc<dyn KeyValueStore>,
}

impl TimerMarksRecorder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(mark_type: MarkType, session_id: Option<&str>, association_id: Option<&str>) -> String {
        let session = session_id.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SESSION);
        let association = association_id
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ASSOCIATION);
        format!(
            "timer-mark:{}:{}:{}",
            mark_type,
            escape_component(session),
            escape_component(association)
        )
    }

    /// Store `timer` as the mark for this scope. A storage failure is logged
    /// and the mark is still returned.
    pub fn save_mark(
        &self,
        mark_type: MarkType,
        timer: ClockView,
        session_id: Option<&str>,
        association_id: Option<&str>,
    ) -> TimerMark {
        let mark = TimerMark {
            value: format_mm_ss(timer.min, timer.sec),
            saved_at: now_ms(),
        };
        let key = Self::key(mark_type, session_id, association_id);

        let stored = serde_json::to_string(&mark)
            .map_err(StoreError::from)
            .and_then(|raw| self.store.set(&key, &raw));
        match stored {
            Ok(()) => debug!("Saved {} mark {} under {}", mark_type, mark.value, key),
            Err(e) => warn!("Failed to persist {} mark under {}: {}", mark_type, key, e),
        }
        mark
    }

    /// Mark for this scope; absent or unreadable data yields `None`
    pub fn get_mark(
        &self,
        mark_type: MarkType,
        session_id: Option<&str>,
        association_id: Option<&str>,
    ) -> Option<TimerMark> {
        let key = Self::key(mark_type, session_id, association_id);
        let raw = self.store.get(&key)?;
        serde_json::from_str(&raw).ok()
    }
}
