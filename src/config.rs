//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};
use clap::Parser;

use crate::{
    sync::{
        bridge::{DEFAULT_SUPPRESS_WINDOW, DEFAULT_THROTTLE, DEFAULT_TIMER_PATH},
        SyncConfig,
    },
    tasks::tick_watchdog::DEFAULT_WATCHDOG_PERIOD,
};

fn default_client_id() -> String {
    format!("client-{}", std::process::id())
}

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "countdown-sync")]
#[command(about = "A countdown timer kept in step across processes through a real-time store")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20553")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Identifier stamped on transitions made by this process
    #[arg(long, default_value_t = default_client_id())]
    pub client_id: String,

    /// Start as the controller, the one process that publishes ticks
    #[arg(short, long)]
    pub controller: bool,

    /// Firebase Realtime Database URL; an in-process store is used when unset
    #[arg(long, env = "FIREBASE_URL")]
    pub firebase_url: Option<String>,

    /// Firebase auth token or database secret
    #[arg(long, env = "FIREBASE_AUTH", hide_env_values = true)]
    pub firebase_auth: Option<String>,

    /// Record path of the shared timer
    #[arg(long, default_value = DEFAULT_TIMER_PATH)]
    pub timer_path: String,

    /// File backing the durable key/value store
    #[arg(long, default_value = "countdown-sync.json")]
    pub data_file: PathBuf,

    /// Minimum milliseconds between published ticks
    #[arg(long, default_value_t = DEFAULT_THROTTLE.as_millis() as u64)]
    pub throttle_ms: u64,

    /// Milliseconds to ignore remote updates after a write
    #[arg(long, default_value_t = DEFAULT_SUPPRESS_WINDOW.as_millis() as u64)]
    pub suppress_ms: u64,

    /// Seconds between tick watchdog checks
    #[arg(long, default_value_t = DEFAULT_WATCHDOG_PERIOD.as_secs())]
    pub watchdog_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            path: self.timer_path.clone(),
            throttle: Duration::from_millis(self.throttle_ms),
            suppress_window: Duration::from_millis(self.suppress_ms),
            ..SyncConfig::new(self.client_id.clone())
        }
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["countdown-sync"]).unwrap();
        assert_eq!(config.address(), "0.0.0.0:20553");
        assert_eq!(config.log_level(), "info");
        assert!(!config.controller);
        assert!(config.client_id.starts_with("client-"));

        let sync = config.sync_config();
        assert_eq!(sync.path, "timer");
        assert_eq!(sync.throttle, Duration::from_millis(5000));
        assert_eq!(sync.suppress_window, Duration::from_millis(1500));
        assert_eq!(config.watchdog_period(), Duration::from_secs(3));
    }

    #[test]
    fn overrides() {
        let config = Config::try_parse_from([
            "countdown-sync",
            "--controller",
            "--client-id",
            "stage-left",
            "--timer-path",
            "rooms/a/timer",
            "--throttle-ms",
            "2000",
            "-v",
        ])
        .unwrap();
        assert!(config.controller);
        assert_eq!(config.log_level(), "debug");

        let sync = config.sync_config();
        assert_eq!(sync.client_id, "stage-left");
        assert_eq!(sync.path, "rooms/a/timer");
        assert_eq!(sync.throttle, Duration::from_millis(2000));
    }
}
