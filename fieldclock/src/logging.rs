//! Tracing setup. The terminal belongs to the TUI, so events go to a log file
//! in the data directory instead of stdout.

use crate::config::project_dirs;
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "FIELDCLOCK_LOG";
pub const LOG_FILE: &str = "fieldclock.log";

/// Installs the global subscriber. Logging is optional: if the data
/// directory or log file cannot be opened, nothing is installed.
pub fn init_tracing() {
    let Some(dirs) = project_dirs() else {
        return;
    };
    let data_dir = dirs.data_dir();
    if fs::create_dir_all(data_dir).is_err() {
        return;
    }
    let Ok(file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE))
    else {
        return;
    };

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init();
}
