use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use countdown_sync::{
    create_router,
    state::{AppState, ControllerGate},
    storage::MemoryKeyValueStore,
};

fn app() -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Arc::new(MemoryKeyValueStore::new()),
        ControllerGate::new(false),
        "client-test",
        0,
        "127.0.0.1".to_string(),
    ));
    (create_router(Arc::clone(&state)), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn timer_starts_at_default_clock() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/timer", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], "idle");
    assert_eq!(body["state"]["remainingMs"], 210_000);
    assert_eq!(body["clock"], json!({"min": 3, "sec": 30}));
    assert_eq!(body["formatted"], "03:30");
    assert_eq!(body["zone"], "good");
    assert_eq!(body["controller"], false);
    assert_eq!(body["clientId"], "client-test");
}

#[tokio::test]
async fn start_then_pause() {
    let (app, state) = app();
    let (status, body) = send(&app, Method::POST, "/timer/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["timer"]["state"]["status"], "running");
    assert_eq!(body["timer"]["state"]["controllerId"], "client-test");
    assert!(state.timer.is_ticking());

    let (status, body) = send(&app, Method::POST, "/timer/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["state"]["status"], "idle");
    assert!(!state.timer.is_ticking());
}

#[tokio::test]
async fn duration_accepts_clock_or_milliseconds() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/timer/duration",
        Some(json!({"min": 1, "sec": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["state"]["remainingMs"], 65_000);
    assert_eq!(body["timer"]["zone"], "warning");

    let (_, body) = send(
        &app,
        Method::POST,
        "/timer/duration",
        Some(json!({"durationMs": 30_000})),
    )
    .await;
    assert_eq!(body["timer"]["state"]["durationMs"], 30_000);
    assert_eq!(body["timer"]["zone"], "danger");

    let (status, _) = send(&app, Method::POST, "/timer/duration", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_with_and_without_reseed() {
    let (app, _) = app();
    send(&app, Method::POST, "/timer/initial", Some(json!({"min": 5, "sec": 0}))).await;
    send(&app, Method::POST, "/timer/duration", Some(json!({"durationMs": 4000}))).await;

    let (status, body) = send(&app, Method::POST, "/timer/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["state"]["remainingMs"], 4000);

    let (_, body) = send(&app, Method::POST, "/timer/reset", Some(json!({"reseed": true}))).await;
    assert_eq!(body["timer"]["state"]["durationMs"], 300_000);
    assert_eq!(body["timer"]["state"]["status"], "idle");
}

#[tokio::test]
async fn controller_role_can_be_claimed() {
    let (app, state) = app();
    let (status, body) = send(&app, Method::POST, "/controller", Some(json!({"enabled": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["controller"], true);
    assert!(state.gate.is_controller());
}

#[tokio::test]
async fn named_timers_are_listed() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::POST, "/timers/entryTime", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "entryTime", "status": false, "value": "3:30"}));

    let (_, body) = send(&app, Method::GET, "/timers", None).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn marks_round_trip_per_scope() {
    let (app, _) = app();
    let uri = "/marks/entry?sessionId=s1&associationId=a1";

    let (status, _) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, saved) = send(&app, Method::POST, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["value"], "03:30");

    let (status, body) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, saved);

    let (status, _) = send(&app, Method::GET, "/marks/exit?sessionId=s1&associationId=a1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_mark_type_is_rejected() {
    let (app, _) = app();
    let (status, _) = send(&app, Method::POST, "/marks/lap", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_times_are_recorded() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions/s1/times",
        Some(json!({"associationId": "a1", "associationTitle": "Falla"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["time"], "03:30");
    assert_eq!(body[0]["timerMode"], "entry_exit");

    let (_, body) = send(&app, Method::GET, "/sessions/s1/times", None).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    let (_, body) = send(&app, Method::GET, "/sessions/other/times", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn status_includes_last_action() {
    let (app, _) = app();
    send(&app, Method::POST, "/timer/start", None).await;
    let (status, body) = send(&app, Method::GET, "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["last_action"], "start");
    assert_eq!(body["timer"]["state"]["status"], "running");
}
