//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timer", get(timer_handler))
        .route("/timer/stream", get(timer_stream_handler))
        .route("/timer/start", post(start_handler))
        .route("/timer/pause", post(pause_handler))
        .route("/timer/reset", post(reset_handler))
        .route("/timer/duration", post(duration_handler))
        .route("/timer/initial", post(initial_timer_handler))
        .route("/controller", post(controller_handler))
        .route("/timers", get(list_timers_handler))
        .route("/timers/:name", post(save_timer_handler))
        .route("/marks/:mark_type", get(get_mark_handler).post(save_mark_handler))
        .route(
            "/sessions/:session_id/times",
            get(session_times_handler).post(record_session_time_handler),
        )
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
