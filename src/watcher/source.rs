//! A single OS-level subscription over one or more paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher as NotifyWatcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::WatchError;
use super::event::RawEvent;

/// Capacity of the channel between the notify thread and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Ordered, non-empty set of paths one [`Watcher`] subscribes to.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    paths: Vec<PathBuf>,
}

impl WatchTarget {
    /// Build a target from an ordered list of paths, dropping repeats.
    pub fn new<I, P>(paths: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut seen = HashSet::new();
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(Into::into)
            .filter(|p| seen.insert(p.clone()))
            .collect();

        if paths.is_empty() {
            return Err(WatchError::SetupFailed { targets: paths });
        }
        Ok(Self { paths })
    }

    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Exact set equality, ignoring order.
    pub fn same_set(&self, other: &WatchTarget) -> bool {
        let ours: HashSet<&PathBuf> = self.paths.iter().collect();
        let theirs: HashSet<&PathBuf> = other.paths.iter().collect();
        ours == theirs
    }

    pub fn display(&self) -> String {
        self.paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Canonical path that will actually be watched, or `None` when nothing
/// exists at `path`.
pub fn resolve_target(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path).ok()
}

/// Live subscription to filesystem events under a [`WatchTarget`].
///
/// Dropping the watcher, or calling [`Watcher::stop`], closes the OS handle
/// and ends the associated [`EventStream`].
pub struct Watcher {
    targets: WatchTarget,
    watched: Vec<PathBuf>,
    inner: Option<notify::RecommendedWatcher>,
    events: Option<mpsc::Receiver<notify::Result<notify::Event>>>,
    cancel: CancellationToken,
}

impl Watcher {
    /// Subscribe to every target that exists.
    ///
    /// Missing targets are skipped with a warning as long as at least one
    /// other target could be watched. Directories are watched recursively.
    pub fn new(targets: WatchTarget) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut inner = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.blocking_send(res);
        })?;

        let mut watched = Vec::new();
        for target in targets.paths() {
            let Some(resolved) = resolve_target(target) else {
                tracing::warn!("[watcher] {} not found, skipping", target.display());
                continue;
            };

            let mode = if resolved.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };

            match inner.watch(&resolved, mode) {
                Ok(()) => {
                    crate::debug_event!("watcher", "watching", "{}", resolved.display());
                    watched.push(resolved);
                }
                Err(e) => {
                    let err = WatchError::PathWatchFailed {
                        path: resolved,
                        reason: e.to_string(),
                    };
                    tracing::warn!("[watcher] {err}");
                }
            }
        }

        if watched.is_empty() {
            return Err(WatchError::SetupFailed {
                targets: targets.paths().to_vec(),
            });
        }

        crate::log_event!("watcher", "client", "{}", targets.display());

        Ok(Self {
            targets,
            watched,
            inner: Some(inner),
            events: Some(rx),
            cancel: CancellationToken::new(),
        })
    }

    pub fn targets(&self) -> &WatchTarget {
        &self.targets
    }

    /// Canonical paths that were successfully subscribed.
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Hand out the event sequence. Only the first call gets it.
    pub fn events(&mut self) -> Option<EventStream> {
        if self.is_stopped() {
            return None;
        }
        self.events.take().map(|rx| EventStream {
            rx,
            cancel: self.cancel.clone(),
        })
    }

    /// Close the OS handle and end the event sequence. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.inner = None;
        self.events = None;
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("targets", &self.targets)
            .field("watched", &self.watched)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Infinite sequence of raw events from one [`Watcher`].
///
/// Ends only when the owning watcher is stopped or dropped.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<notify::Result<notify::Event>>,
    cancel: CancellationToken,
}

impl EventStream {
    /// Wait for the next event. `None` means the watcher was stopped.
    pub async fn next(&mut self) -> Option<RawEvent> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                msg = self.rx.recv() => match msg {
                    Some(Ok(event)) => return Some(RawEvent::from(event)),
                    Some(Err(e)) => {
                        let err = WatchError::EventError { details: e.to_string() };
                        tracing::warn!("[watcher] {err}");
                    }
                    None => return None,
                },
            }
        }
    }
}
