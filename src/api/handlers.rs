//! HTTP endpoint handlers

use std::{convert::Infallible, sync::Arc};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::{stream, Stream};
use tracing::{info, warn};

use crate::{
    state::{AppState, ClockView, SavedTimer},
    storage::{MarkType, SessionTimeEntry, TimerMark},
};
use super::responses::{
    ApiResponse, ControllerRequest, DurationRequest, HealthResponse, MarkScope, ResetRequest,
    SessionTimeRequest, StatusResponse, TimerResponse,
};

/// Handle GET /timer - Current countdown
pub async fn timer_handler(State(state): State<Arc<AppState>>) -> Json<TimerResponse> {
    Json(TimerResponse::from_state(&state))
}

/// Handle GET /timer/stream - Server-sent feed of every published state
pub async fn timer_stream_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = state.timer.subscribe();

    // The first item is the current state, then one per change
    let events = stream::unfold((updates, true), |(mut updates, first)| async move {
        if !first && updates.changed().await.is_err() {
            return None;
        }
        let current = updates.borrow_and_update().clone();
        let event = match Event::default().event("timer").json_data(&current) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to encode timer event: {}", e);
                Event::default().comment("encode error")
            }
        };
        Some((Ok(event), (updates, false)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handle POST /timer/start
pub async fn start_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    let timer = state.start();
    info!("Start requested - countdown is {}", timer.status.as_str());
    Json(ApiResponse::ok("Countdown started", &state))
}

/// Handle POST /timer/pause
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    state.pause();
    info!("Pause requested at {}", state.format_clock());
    Json(ApiResponse::ok("Countdown paused", &state))
}

/// Handle POST /timer/reset - Optional body `{"reseed": true}`
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ResetRequest>>,
) -> Json<ApiResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    state.reset(request.reseed);
    info!("Reset requested (reseed: {}) - countdown at {}", request.reseed, state.format_clock());
    Json(ApiResponse::ok("Countdown reset", &state))
}

/// Handle POST /timer/duration
pub async fn duration_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DurationRequest>,
) -> Result<Json<ApiResponse>, StatusCode> {
    let Some(duration_ms) = request.duration_ms() else {
        warn!("Duration request without durationMs or min/sec");
        return Err(StatusCode::BAD_REQUEST);
    };
    state.set_duration_ms(duration_ms);
    info!("Duration set to {}", state.format_clock());
    Ok(Json(ApiResponse::ok("Duration updated", &state)))
}

/// Handle POST /timer/initial - Configure the reseed duration
pub async fn initial_timer_handler(
    State(state): State<Arc<AppState>>,
    Json(clock): Json<ClockView>,
) -> Json<ApiResponse> {
    state.set_initial_timer(clock);
    info!("Initial timer set to {}", state.format_clock());
    Json(ApiResponse::ok("Initial timer updated", &state))
}

/// Handle POST /controller - Claim or release the controller role
pub async fn controller_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControllerRequest>,
) -> Json<ApiResponse> {
    state.set_controller(request.enabled);
    let message = if request.enabled {
        "Controller role claimed"
    } else {
        "Controller role released"
    };
    Json(ApiResponse::ok(message, &state))
}

/// Handle POST /timers/:name - Save the current clock under a name
pub async fn save_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<SavedTimer> {
    let saved = state.save_timer(&name);
    info!("Saved timer {} = {}", saved.name, saved.value);
    Json(saved)
}

/// Handle GET /timers
pub async fn list_timers_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SavedTimer>> {
    Json(state.saved_timers())
}

fn parse_mark_type(raw: &str) -> Result<MarkType, StatusCode> {
    MarkType::parse(raw).ok_or_else(|| {
        warn!("Unknown mark type: {}", raw);
        StatusCode::BAD_REQUEST
    })
}

/// Handle POST /marks/:type - Record the current clock as an entry or exit mark
pub async fn save_mark_handler(
    State(state): State<Arc<AppState>>,
    Path(mark_type): Path<String>,
    Query(scope): Query<MarkScope>,
) -> Result<Json<TimerMark>, StatusCode> {
    let mark_type = parse_mark_type(&mark_type)?;
    let mark = state.save_mark(
        mark_type,
        scope.session_id.as_deref(),
        scope.association_id.as_deref(),
    );
    Ok(Json(mark))
}

/// Handle GET /marks/:type
pub async fn get_mark_handler(
    State(state): State<Arc<AppState>>,
    Path(mark_type): Path<String>,
    Query(scope): Query<MarkScope>,
) -> Result<Json<TimerMark>, StatusCode> {
    let mark_type = parse_mark_type(&mark_type)?;
    state
        .get_mark(
            mark_type,
            scope.session_id.as_deref(),
            scope.association_id.as_deref(),
        )
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Handle POST /sessions/:session_id/times
pub async fn record_session_time_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<SessionTimeRequest>,
) -> Json<Vec<SessionTimeEntry>> {
    let entries = state.record_session_time(
        &session_id,
        &request.association_id,
        request.association_title,
        request.timer_mode,
    );
    info!("Session {} now has {} recorded times", session_id, entries.len());
    Json(entries)
}

/// Handle GET /sessions/:session_id/times
pub async fn session_times_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Vec<SessionTimeEntry>> {
    Json(state.session_times.entries(&session_id))
}

/// Handle GET /status - Countdown plus server metadata
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timer: TimerResponse::from_state(&state),
        initial_timer: state.initial_timer(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
