use thiserror::Error;

use crate::tracker::{TimerEvent, TimerStatus};

/// Errors raised by the elapsed-time tracker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The event is not legal from the tracker's current status. The tracker
    /// is left untouched.
    #[error("cannot {event} a timer that is {from}")]
    InvalidStateTransition { from: TimerStatus, event: TimerEvent },

    /// A persisted timer state breaks one of the tracker invariants.
    #[error("corrupt timer state: {0}")]
    Corrupt(String),
}

/// Errors on the IPC channel between fieldclock and fieldclockctl.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed before a message was received")]
    Closed,

    #[error("Connection refused - is fieldclock running?")]
    ConnectionRefused,
}
