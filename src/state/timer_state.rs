//! Timer state structure and its projections

use serde::{Deserialize, Serialize};

/// Default countdown length: 3 minutes 30 seconds
pub const DEFAULT_DURATION_MS: u64 = (3 * 60 + 30) * 1000;

/// Lifecycle of a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Finished,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Idle => "idle",
            TimerStatus::Running => "running",
            TimerStatus::Finished => "finished",
        }
    }
}

/// Countdown configuration and progress at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub status: TimerStatus,
    /// Epoch milliseconds of the last transition
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
}

impl TimerState {
    /// Create an idle timer with the full duration remaining
    pub fn idle(duration_ms: u64, updated_at: i64) -> Self {
        Self {
            duration_ms,
            remaining_ms: duration_ms,
            status: TimerStatus::Idle,
            updated_at,
            controller_id: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn clock(&self) -> ClockView {
        ClockView::from_ms(self.remaining_ms)
    }
}

/// Partial state received from a remote source
///
/// Absent fields keep their current local value when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerStatePatch {
    pub duration_ms: Option<u64>,
    pub remaining_ms: Option<u64>,
    pub status: Option<TimerStatus>,
    pub updated_at: Option<i64>,
    pub controller_id: Option<String>,
}

/// What produced a state emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCause {
    Configure,
    Start,
    Pause,
    Reset,
    Tick,
    Finish,
    Remote,
}

impl ChangeCause {
    /// Transitions requested by a user of this process
    pub fn is_explicit(&self) -> bool {
        matches!(
            self,
            ChangeCause::Configure | ChangeCause::Start | ChangeCause::Pause | ChangeCause::Reset
        )
    }
}

/// A state emission together with its cause
#[derive(Debug, Clone)]
pub struct TimerChange {
    pub state: TimerState,
    pub cause: ChangeCause,
}

/// Minutes/seconds projection used for display and persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockView {
    pub min: u64,
    pub sec: u64,
}

impl ClockView {
    pub fn new(min: u64, sec: u64) -> Self {
        Self { min, sec }
    }

    /// Whole minutes and seconds left, dropping any sub-second remainder
    pub fn from_ms(ms: u64) -> Self {
        let total_secs = ms / 1000;
        Self {
            min: total_secs / 60,
            sec: total_secs % 60,
        }
    }

    /// Milliseconds for this clock, saturating at `u64::MAX`
    pub fn to_ms(&self) -> u64 {
        self.min
            .saturating_mul(60)
            .saturating_add(self.sec)
            .saturating_mul(1000)
    }

    /// [`Self::to_ms`] as the signed duration taken by the timer, saturating
    /// at `i64::MAX`
    pub fn to_duration_ms(&self) -> i64 {
        i64::try_from(self.to_ms()).unwrap_or(i64::MAX)
    }

    pub fn zone(&self) -> ClockZone {
        if self.min >= 2 {
            ClockZone::Good
        } else if self.min >= 1 {
            ClockZone::Warning
        } else {
            ClockZone::Danger
        }
    }
}

impl Default for ClockView {
    fn default() -> Self {
        Self::from_ms(DEFAULT_DURATION_MS)
    }
}

/// Urgency band of the remaining time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockZone {
    Good,
    Warning,
    Danger,
}
