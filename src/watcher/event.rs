//! Raw filesystem events as seen by the coordinator.

use std::path::{Path, PathBuf};

use notify::EventKind;

/// Closed set of event kinds the coordinator distinguishes.
///
/// Renames arrive from `notify` as modifications and are treated as such;
/// the existence check at classification time decides what actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Created,
    Modified,
    Removed,
    Accessed,
    Other,
}

impl RawEventKind {
    /// Whether an event of this kind can change build output.
    ///
    /// Access events (reads, close-after-read) never do.
    pub fn is_qualifying(self) -> bool {
        match self {
            RawEventKind::Created
            | RawEventKind::Modified
            | RawEventKind::Removed
            | RawEventKind::Other => true,
            RawEventKind::Accessed => false,
        }
    }
}

impl From<&EventKind> for RawEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => RawEventKind::Created,
            EventKind::Modify(_) => RawEventKind::Modified,
            EventKind::Remove(_) => RawEventKind::Removed,
            EventKind::Access(_) => RawEventKind::Accessed,
            EventKind::Any | EventKind::Other => RawEventKind::Other,
        }
    }
}

/// One filesystem notification: a kind plus the absolute paths it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub paths: Vec<PathBuf>,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            kind,
            paths: paths.into_iter().collect(),
        }
    }

    /// Whether any of the event's paths is exactly `path`.
    pub fn touches(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}

impl From<notify::Event> for RawEvent {
    fn from(event: notify::Event) -> Self {
        Self {
            kind: RawEventKind::from(&event.kind),
            paths: event.paths,
        }
    }
}
