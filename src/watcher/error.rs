//! Error types for the watch coordinator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("None of the watch targets could be watched: {}", display_targets(.targets))]
    SetupFailed { targets: Vec<PathBuf> },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("No active watchers, change detection is impossible")]
    NoWatchers,

    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl WatchError {
    /// Whether the coordinator can keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::NoWatchers | WatchError::InitFailed { .. })
    }
}

fn display_targets(targets: &[PathBuf]) -> String {
    targets
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
