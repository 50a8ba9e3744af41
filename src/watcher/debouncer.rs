//! Trailing-edge debouncing of change bursts.
//!
//! Changed paths accumulate in a [`ChangeSet`] while events keep arriving.
//! Each time the set grows the pending timer is replaced, so a burst of
//! saves (auto-save, formatters, `git checkout`) collapses into one batch
//! once the tree has been quiet for the configured period.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexSet;
use tokio::task::AbortHandle;

use super::classify::{ChangeKind, classify};

/// Default quiet period before a batch is processed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Deduplicated, insertion-ordered set of source-relative changed paths.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    paths: IndexSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert paths not already present. Returns whether the set grew.
    pub fn extend<I, S>(&mut self, paths: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.paths.len();
        for path in paths {
            self.paths.insert(path.into());
        }
        self.paths.len() > before
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Drain the set, returning members in insertion order.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.paths).into_iter().collect()
    }
}

/// Decision delivered to the build orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Run the full pipeline, then re-initialize the watchers.
    Rebuild,
    /// A layout changed; every page using it must be re-evaluated.
    LayoutChanged(String),
    /// A content page was added or modified.
    PageChanged(String),
    /// A static asset was added or modified.
    StaticChanged(String),
}

impl WatchSignal {
    /// Status name used in logs and by the orchestrator's path lists.
    pub fn status(&self) -> &'static str {
        match self {
            WatchSignal::Rebuild => "rebuild",
            WatchSignal::LayoutChanged(_) => "layoutPaths",
            WatchSignal::PageChanged(_) => "pagePaths",
            WatchSignal::StaticChanged(_) => "staticPaths",
        }
    }

    /// The changed relative path, for incremental signals.
    pub fn path(&self) -> Option<&str> {
        match self {
            WatchSignal::Rebuild => None,
            WatchSignal::LayoutChanged(p)
            | WatchSignal::PageChanged(p)
            | WatchSignal::StaticChanged(p) => Some(p),
        }
    }

    pub fn is_rebuild(&self) -> bool {
        matches!(self, WatchSignal::Rebuild)
    }
}

/// Everything accumulated during one quiet period.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    pub paths: Vec<String>,
    pub config_changed: bool,
}

impl Batch {
    /// Turn the batch into signals.
    ///
    /// A config change, or any member that is removed, is the config file, or
    /// is a directory, yields exactly one [`WatchSignal::Rebuild`] and nothing
    /// else. Otherwise members are signalled in insertion order; a layout ends
    /// the batch.
    pub fn resolve(&self, src_dir: &Path, config_file: &Path) -> Vec<WatchSignal> {
        if self.config_changed {
            crate::warn_event!(
                "watcher",
                "config changed",
                "{}, start rebuild",
                config_file.display()
            );
            return vec![WatchSignal::Rebuild];
        }

        let classified: Vec<(&str, ChangeKind)> = self
            .paths
            .iter()
            .map(|p| (p.as_str(), classify(&src_dir.join(p), config_file)))
            .collect();

        if let Some((path, kind)) = classified.iter().find(|(_, k)| k.requires_rebuild()) {
            match kind {
                ChangeKind::Removed => {
                    crate::warn_event!("watcher", "removed", "{path}, start rebuild")
                }
                ChangeKind::ConfigFile => {
                    crate::warn_event!("watcher", "config changed", "{path}, start rebuild")
                }
                _ => crate::warn_event!("watcher", "directory changed", "{path}, start rebuild"),
            }
            return vec![WatchSignal::Rebuild];
        }

        let mut signals = Vec::with_capacity(classified.len());
        for (path, kind) in classified {
            crate::log_event!("watcher", kind, "{path}");
            match kind {
                ChangeKind::Layout => {
                    signals.push(WatchSignal::LayoutChanged(path.to_string()));
                    break;
                }
                ChangeKind::Page => signals.push(WatchSignal::PageChanged(path.to_string())),
                ChangeKind::Static => signals.push(WatchSignal::StaticChanged(path.to_string())),
                // handled above
                ChangeKind::Removed | ChangeKind::ConfigFile | ChangeKind::Directory => {}
            }
        }

        signals
    }
}

/// Debounce state owned by one watcher factory.
///
/// At most one timer is pending. Every re-arm bumps a generation counter so a
/// timer that already woke up before being aborted cannot flush a batch that
/// belongs to a newer window.
///
/// [`Debouncer::reset`] also bumps the teardown epoch. Event producers hold
/// the epoch they were started in and are ignored once it has moved on.
#[derive(Debug)]
pub struct Debouncer {
    changes: ChangeSet,
    config_changed: bool,
    quiet_period: Duration,
    generation: u64,
    epoch: u64,
    timer: Option<AbortHandle>,
}

impl Debouncer {
    /// Create a new debouncer with the given quiet period in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            changes: ChangeSet::new(),
            config_changed: false,
            quiet_period: Duration::from_millis(debounce_ms),
            generation: 0,
            epoch: 0,
            timer: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    pub fn set_quiet_period(&mut self, debounce_ms: u64) {
        self.quiet_period = Duration::from_millis(debounce_ms);
    }

    /// Current teardown epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Record filtered, relative paths. Returns whether the set grew.
    pub fn record<I, S>(&mut self, paths: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changes.extend(paths)
    }

    /// Flag the project config file as changed.
    pub fn record_config_change(&mut self) {
        self.config_changed = true;
    }

    /// Cancel the pending timer and open a new window.
    ///
    /// Returns the generation the replacement timer must present to
    /// [`Debouncer::take_ready`].
    pub fn rearm(&mut self) -> u64 {
        self.abort_timer();
        self.generation += 1;
        self.generation
    }

    /// Remember the replacement timer so it can be aborted later.
    pub fn set_timer(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    /// Take the batch if `generation` is still current.
    ///
    /// The change set is cleared atomically here, before classification, so
    /// each change is delivered at most once.
    pub fn take_ready(&mut self, generation: u64) -> Option<Batch> {
        if generation != self.generation {
            return None;
        }
        self.timer = None;

        let batch = Batch {
            paths: self.changes.take(),
            config_changed: std::mem::take(&mut self.config_changed),
        };

        if batch.paths.is_empty() && !batch.config_changed {
            return None;
        }
        Some(batch)
    }

    /// Abort the pending timer and forget everything accumulated so far.
    pub fn reset(&mut self) {
        self.abort_timer();
        self.generation += 1;
        self.epoch += 1;
        self.changes = ChangeSet::new();
        self.config_changed = false;
    }

    pub fn has_pending(&self) -> bool {
        !self.changes.is_empty() || self.config_changed
    }

    pub fn pending_count(&self) -> usize {
        self.changes.len()
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS)
    }
}
