//! Clock persistence background task

use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};

use crate::state::{AppState, ClockView};

/// Write `minutes`/`seconds` to the durable store whenever the displayed
/// clock changes, so a restart picks up where the countdown was
pub async fn clock_persistence_task(state: Arc<AppState>) {
    info!("Starting clock persistence task");

    let mut updates = state.timer.subscribe();
    let mut last: Option<ClockView> = None;

    loop {
        let clock = updates.borrow_and_update().clock();
        if last != Some(clock) {
            debug!("Persisting clock {}:{:02}", clock.min, clock.sec);
            // The file store rewrites its file on every set
            let writer = Arc::clone(&state);
            if let Err(e) = task::spawn_blocking(move || writer.persist_clock(clock)).await {
                warn!("Clock persistence write did not complete: {}", e);
            }
            last = Some(clock);
        }

        if updates.changed().await.is_err() {
            break;
        }
    }
}
