//! Background tasks module
//!
//! Long-running tasks spawned next to the HTTP server.

pub mod clock_persistence;
pub mod tick_watchdog;

// Re-export main functions
pub use clock_persistence::clock_persistence_task;
pub use tick_watchdog::tick_watchdog_task;
