//! Utility functions module
//!
//! Signal handling and wall-clock helpers shared by the rest of the crate.

pub mod signals;
pub mod time;

// Re-export main functions
pub use signals::shutdown_signal;
pub use time::now_ms;
