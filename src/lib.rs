//! Countdown Sync - A shared countdown clock kept in step across processes
//!
//! Each process owns a ticking countdown. One process, the controller,
//! publishes its state to a real-time store and the others follow it, with
//! explicit actions from any process winning by timestamp.

pub mod config;
pub mod error;
pub mod state;
pub mod sync;
pub mod storage;
pub mod api;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::StoreError;
pub use state::{AppState, TimerStore};
pub use sync::RemoteSyncBridge;
pub use api::create_router;
pub use utils::signals::shutdown_signal;
