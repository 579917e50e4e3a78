//! Shared core of fieldclock: the elapsed-time tracker used by work days and
//! tasks, duration formatting, and the IPC protocol spoken between fieldclock
//! and fieldclockctl.

pub mod error;
pub mod format;
pub mod ipc;
pub mod tracker;

pub use error::{IpcError, TrackerError};
pub use format::{format_hm, format_hms};
pub use ipc::{
    Command, DaySummary, Response, StatusReport, Target, TaskSummary, DEFAULT_SOCKET_PATH,
};
/// Configuration file read by both binaries from the platform config dir.
pub const CONFIG_FILE: &str = "fieldclock.toml";

pub use tracker::{
    aggregate_display_duration, next_status, SessionRecord, TimerEvent, TimerState, TimerStatus,
};
