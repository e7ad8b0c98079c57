//! Countdown Sync - A shared countdown clock kept in step across processes
//!
//! This is the main entry point for the countdown-sync application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use countdown_sync::{
    config::Config,
    state::{AppState, ControllerGate},
    api::create_router,
    storage::{JsonFileStore, KeyValueStore},
    sync::{FirebaseRealtimeStore, InMemoryRealtimeStore, RealtimeStore, RemoteSyncBridge},
    tasks::{clock_persistence_task, tick_watchdog_task},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("countdown_sync={},tower_http=info", config.log_level()))
        .init();

    info!("Starting countdown-sync server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, client={}, controller={}, path={}",
        config.host, config.port, config.client_id, config.controller, config.timer_path
    );

    let file_store = JsonFileStore::open(&config.data_file);
    info!("Durable store at {}", file_store.path().display());
    let kv: Arc<dyn KeyValueStore> = Arc::new(file_store);
    let gate = ControllerGate::new(config.controller);

    // Create application state
    let state = Arc::new(AppState::new(
        kv,
        gate.clone(),
        config.client_id.clone(),
        config.port,
        config.host.clone(),
    ));

    let realtime: Arc<dyn RealtimeStore> = match &config.firebase_url {
        Some(url) => {
            info!("Syncing through Firebase at {}", url);
            Arc::new(FirebaseRealtimeStore::new(url.clone(), config.firebase_auth.clone()))
        }
        None => {
            info!("No realtime store configured, syncing in-process only");
            Arc::new(InMemoryRealtimeStore::new())
        }
    };

    // Start the sync bridge and background tasks
    let bridge = Arc::new(RemoteSyncBridge::new(
        state.timer.clone(),
        realtime,
        gate,
        config.sync_config(),
    ));
    let sync_handles = bridge.spawn();

    let watchdog_timer = state.timer.clone();
    let watchdog_period = config.watchdog_period();
    tokio::spawn(async move {
        tick_watchdog_task(watchdog_timer, watchdog_period).await;
    });

    let persistence_state = Arc::clone(&state);
    tokio::spawn(async move {
        clock_persistence_task(persistence_state).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /timer               - Current countdown");
    info!("  GET  /timer/stream        - Countdown updates (SSE)");
    info!("  POST /timer/start         - Start the countdown");
    info!("  POST /timer/pause         - Pause the countdown");
    info!("  POST /timer/reset         - Reset, optionally reseeding the duration");
    info!("  POST /timer/duration      - Set the duration");
    info!("  POST /timer/initial       - Set the initial timer");
    info!("  POST /controller          - Claim or release the controller role");
    info!("  POST /timers/:name        - Save the clock under a name");
    info!("  GET  /marks/:type         - Entry/exit marks");
    info!("  GET  /sessions/:id/times  - Session time log");
    info!("  GET  /status              - Server status");
    info!("  GET  /health              - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    sync_handles.abort();
    info!("Server shutdown complete");
    Ok(())
}
