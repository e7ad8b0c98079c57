//! Tick watchdog background task

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::TimerStore;

/// Default spacing of watchdog checks
pub const DEFAULT_WATCHDOG_PERIOD: Duration = Duration::from_secs(3);

/// Periodically make sure a countdown that claims to be running is ticking
pub async fn tick_watchdog_task(timer: TimerStore, period: Duration) {
    info!("Starting tick watchdog task (every {:?})", period);

    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if timer.ensure_ticking() {
            info!("Watchdog resumed local ticking");
        } else {
            debug!("Watchdog check passed");
        }
    }
}
