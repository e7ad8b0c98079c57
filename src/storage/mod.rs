//! Durable storage module
//!
//! The small key/value store plus the records kept in it: time marks and
//! per-session time logs.

pub mod kv;
pub mod marks;
pub mod session_times;

// Re-export main types
pub use kv::{JsonFileStore, KeyValueStore, MemoryKeyValueStore};
pub use marks::{MarkType, TimerMark, TimerMarksRecorder};
pub use session_times::{SessionTimeEntry, SessionTimesLog, TimerMode};
