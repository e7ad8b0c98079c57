//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    state::{AppState, ClockView, ClockZone, TimerState},
    storage::TimerMode,
    utils::time::format_mm_ss,
};

/// Current countdown with its display projections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerResponse {
    pub state: TimerState,
    pub clock: ClockView,
    pub formatted: String,
    pub zone: ClockZone,
    pub controller: bool,
    pub ticking: bool,
    pub client_id: String,
}

impl TimerResponse {
    pub fn from_state(state: &AppState) -> Self {
        let timer = state.timer.snapshot();
        let clock = timer.clock();
        Self {
            formatted: format_mm_ss(clock.min, clock.sec),
            zone: clock.zone(),
            clock,
            state: timer,
            controller: state.gate.is_controller(),
            ticking: state.timer.is_ticking(),
            client_id: state.client_id.clone(),
        }
    }
}

/// API response structure for state-changing endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: TimerResponse,
}

impl ApiResponse {
    pub fn new(status: &str, message: impl Into<String>, timer: TimerResponse) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            timer,
        }
    }

    pub fn ok(message: impl Into<String>, state: &AppState) -> Self {
        Self::new("ok", message, TimerResponse::from_state(state))
    }
}

/// Status response with server metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: TimerResponse,
    pub initial_timer: Option<ClockView>,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub reseed: bool,
}

/// Either a raw duration or a minutes/seconds pair
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationRequest {
    pub duration_ms: Option<i64>,
    pub min: Option<u64>,
    pub sec: Option<u64>,
}

impl DurationRequest {
    pub fn duration_ms(&self) -> Option<i64> {
        if let Some(ms) = self.duration_ms {
            return Some(ms);
        }
        if self.min.is_none() && self.sec.is_none() {
            return None;
        }
        let clock = ClockView::new(self.min.unwrap_or(0), self.sec.unwrap_or(0).min(59));
        Some(clock.to_duration_ms())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerRequest {
    pub enabled: bool,
}

/// Scope of a mark
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkScope {
    pub session_id: Option<String>,
    pub association_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeRequest {
    pub association_id: String,
    pub association_title: Option<String>,
    #[serde(default)]
    pub timer_mode: TimerMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duration_request_prefers_raw_milliseconds() {
        let request: DurationRequest =
            serde_json::from_value(json!({"durationMs": 1500, "min": 9})).unwrap();
        assert_eq!(request.duration_ms(), Some(1500));
    }

    #[test]
    fn duration_request_from_clock() {
        let request: DurationRequest = serde_json::from_value(json!({"min": 2, "sec": 90})).unwrap();
        assert_eq!(request.duration_ms(), Some(179_000));

        let empty: DurationRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.duration_ms(), None);
    }

    #[test]
    fn duration_request_with_huge_minutes_saturates() {
        let request: DurationRequest =
            serde_json::from_value(json!({"min": u64::MAX, "sec": 0})).unwrap();
        assert_eq!(request.duration_ms(), Some(i64::MAX));
    }
}
