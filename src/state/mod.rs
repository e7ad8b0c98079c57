//! State management module
//!
//! The timer value type, the engine that owns it, the controller flag, and
//! the process-level state that ties them to durable storage.

pub mod app_state;
pub mod controller_gate;
pub mod timer_state;
pub mod timer_store;

// Re-export main types
pub use app_state::{AppState, SavedTimer};
pub use controller_gate::ControllerGate;
pub use timer_state::{
    ChangeCause, ClockView, ClockZone, TimerChange, TimerState, TimerStatePatch, TimerStatus,
    DEFAULT_DURATION_MS,
};
pub use timer_store::TimerStore;
