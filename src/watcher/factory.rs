//! Watcher factory: owns the watch set and routes events to the debouncer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::Settings;

use super::debouncer::{Debouncer, WatchSignal};
use super::event::RawEvent;
use super::filter::{FilterRule, filter_paths, relative_path};
use super::source::{WatchTarget, Watcher};
use super::WatchError;

/// Delegate receiving every signal the factory emits.
pub type WatchCallback = Arc<dyn Fn(WatchSignal) + Send + Sync>;

/// Opaque identifier of a watcher record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolved inputs the event path needs: where the source tree is, which
/// file is the project config, and which paths to ignore.
#[derive(Debug, Clone)]
pub struct WatchContext {
    pub src_dir: PathBuf,
    pub config_file: PathBuf,
    pub filter: FilterRule,
}

impl WatchContext {
    pub fn new(src_dir: &Path, config_file: &Path, filter: FilterRule) -> Self {
        Self {
            src_dir: resolve(src_dir),
            config_file: resolve(config_file),
            filter,
        }
    }

    fn from_settings(settings: &Settings, config_file: &Path) -> Result<Self, WatchError> {
        Ok(Self::new(
            &settings.src_dir,
            config_file,
            settings.watch_filter()?,
        ))
    }
}

/// Canonical form when the path exists, absolute form otherwise.
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// One owned watcher and its consumption task.
#[derive(Debug)]
pub struct WatcherRecord {
    id: WatcherId,
    watcher: Watcher,
    task: Option<JoinHandle<()>>,
}

impl WatcherRecord {
    pub fn id(&self) -> WatcherId {
        self.id
    }

    pub fn targets(&self) -> &WatchTarget {
        self.watcher.targets()
    }
}

/// State shared between the factory, its consumption tasks and the timer.
struct Shared {
    context: RwLock<Arc<WatchContext>>,
    debouncer: Mutex<Debouncer>,
    callback: RwLock<Option<WatchCallback>>,
}

impl Shared {
    /// Record a raw event and (re)arm the debounce timer when it matters.
    ///
    /// `epoch` is the teardown epoch the producer was started in. Events from
    /// an earlier epoch arrived after [`WatcherFactory::remove_watchers`] and
    /// are dropped.
    fn handle_event(self: &Arc<Self>, event: RawEvent, epoch: u64) {
        if !event.kind.is_qualifying() {
            return;
        }

        let context = self.context.read().clone();
        let config_touched = event.touches(&context.config_file);

        let relative = event
            .paths
            .iter()
            .map(|p| relative_path(&context.src_dir, p))
            .filter(|p| !p.is_empty());
        let survivors = filter_paths(relative, &context.filter);

        let mut debouncer = self.debouncer.lock();
        if debouncer.epoch() != epoch {
            crate::debug_event!("watcher", "stale event", "epoch {epoch}");
            return;
        }

        let grew = debouncer.record(survivors);
        if config_touched {
            debouncer.record_config_change();
        }

        if grew || config_touched {
            self.schedule(&mut debouncer);
        }
    }

    /// Replace the pending timer with a fresh one.
    ///
    /// Called with the debouncer locked, so the new timer cannot flush before
    /// its abort handle has been stored.
    fn schedule(self: &Arc<Self>, debouncer: &mut Debouncer) {
        let generation = debouncer.rearm();
        let quiet_period = debouncer.quiet_period();
        let shared = Arc::clone(self);

        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            shared.flush(generation);
        });
        debouncer.set_timer(timer.abort_handle());
    }

    /// Timer fired: classify the batch and deliver its signals.
    fn flush(&self, generation: u64) {
        let Some(batch) = self.debouncer.lock().take_ready(generation) else {
            return;
        };

        let context = self.context.read().clone();
        let signals = batch.resolve(&context.src_dir, &context.config_file);

        let Some(callback) = self.callback.read().clone() else {
            crate::debug_event!("watcher", "no callback", "{} signals dropped", signals.len());
            return;
        };

        for signal in signals {
            callback(signal);
        }
    }
}

/// Owns the watchers for one build session.
///
/// A factory always watches the source directory together with the project
/// config file, plus the theme directory when the theme lives on disk rather
/// than being bundled. Events from every watcher feed one shared debouncer.
///
/// The orchestrator tears the watch set down with
/// [`WatcherFactory::remove_watchers`] before a full rebuild and brings it
/// back with [`WatcherFactory::init`] afterwards, so output written by the
/// rebuild is never mistaken for a source change.
pub struct WatcherFactory {
    records: Vec<WatcherRecord>,
    shared: Arc<Shared>,
    next_id: u64,
    /// Epoch events are accepted in; `None` between teardown and `init`.
    epoch: Option<u64>,
}

impl WatcherFactory {
    /// Create a factory and initialize its watch set from `settings`.
    pub fn new(settings: &Settings, config_file: &Path) -> Result<Self, WatchError> {
        let context = WatchContext::from_settings(settings, config_file)?;
        let mut factory = Self::with_context(context, settings.watch.debounce_ms);
        factory.init(settings, config_file)?;
        Ok(factory)
    }

    /// Create a factory with no watchers.
    ///
    /// Events can still be fed through [`WatcherFactory::handle_event`].
    pub fn with_context(context: WatchContext, debounce_ms: u64) -> Self {
        Self {
            records: Vec::new(),
            shared: Arc::new(Shared {
                context: RwLock::new(Arc::new(context)),
                debouncer: Mutex::new(Debouncer::new(debounce_ms)),
                callback: RwLock::new(None),
            }),
            next_id: 0,
            epoch: Some(0),
        }
    }

    /// (Re)build the watch set from a fresh settings snapshot.
    ///
    /// Watchers that fail to start are logged and skipped. Ending up with no
    /// watcher at all is fatal, since no change could ever be detected.
    pub fn init(&mut self, settings: &Settings, config_file: &Path) -> Result<(), WatchError> {
        let context = WatchContext::from_settings(settings, config_file)?;
        let src_dir = context.src_dir.clone();
        let config_file = context.config_file.clone();

        *self.shared.context.write() = Arc::new(context);
        {
            let mut debouncer = self.shared.debouncer.lock();
            debouncer.set_quiet_period(settings.watch.debounce_ms);
            self.epoch = Some(debouncer.epoch());
        }

        crate::log_event!(
            "watcher",
            "factory init",
            "{} | {}",
            src_dir.display(),
            config_file.display()
        );

        let source_target = WatchTarget::new([src_dir, config_file.clone()])?;
        if let Err(e) = self.add_watcher(source_target) {
            tracing::warn!("[watcher] source watcher failed: {e}");
        }

        let project_root = config_file.parent().unwrap_or(Path::new("."));
        if let Some(theme_dir) = settings.theme_dir(project_root) {
            let theme_target = PathBuf::from(format!("{}/.", resolve(&theme_dir).display()));
            crate::log_event!("watcher", "factory init theme", "{}", theme_target.display());

            if let Err(e) = self.add_watcher(WatchTarget::single(theme_target)) {
                tracing::warn!("[watcher] theme watcher failed: {e}");
            }
        }

        if self.records.is_empty() {
            return Err(WatchError::NoWatchers);
        }

        self.start_pending();
        Ok(())
    }

    /// Add a watcher over `target`.
    ///
    /// Returns `Ok(None)` when a watcher over exactly the same set of paths
    /// is already owned.
    pub fn add_watcher(&mut self, target: WatchTarget) -> Result<Option<WatcherId>, WatchError> {
        if self.records.iter().any(|r| r.targets().same_set(&target)) {
            crate::debug_event!("watcher", "duplicate", "{}", target.display());
            return Ok(None);
        }

        let watcher = Watcher::new(target)?;
        let id = WatcherId(self.next_id);
        self.next_id += 1;

        self.records.push(WatcherRecord {
            id,
            watcher,
            task: None,
        });

        Ok(Some(id))
    }

    /// Start delivering signals to `callback`.
    ///
    /// Every owned watcher gets its own consumption task; watchers added by a
    /// later [`WatcherFactory::init`] are started automatically. Must be
    /// called from within a Tokio runtime.
    pub fn watch<F>(&mut self, callback: F)
    where
        F: Fn(WatchSignal) + Send + Sync + 'static,
    {
        *self.shared.callback.write() = Some(Arc::new(callback));
        self.start_pending();
    }

    /// Stop every watcher, cancel the pending timer and drop the watch set.
    ///
    /// Events still in flight are discarded until the next
    /// [`WatcherFactory::init`]. Safe to call repeatedly.
    pub fn remove_watchers(&mut self) {
        if !self.records.is_empty() {
            crate::debug_event!("watcher", "removing", "{} watchers", self.records.len());
        }

        for mut record in self.records.drain(..) {
            record.watcher.stop();
            if let Some(task) = record.task.take() {
                task.abort();
            }
        }

        self.shared.debouncer.lock().reset();
        self.epoch = None;
    }

    /// Feed one raw event through filtering and debouncing.
    ///
    /// Ignored while the factory is torn down.
    pub fn handle_event(&self, event: RawEvent) {
        match self.epoch {
            Some(epoch) => self.shared.handle_event(event, epoch),
            None => crate::debug_event!("watcher", "torn down", "event dropped"),
        }
    }

    /// Whether events are currently accepted.
    pub fn is_live(&self) -> bool {
        self.epoch.is_some()
    }

    pub fn watcher_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &WatcherRecord> {
        self.records.iter()
    }

    pub fn context(&self) -> Arc<WatchContext> {
        self.shared.context.read().clone()
    }

    /// Number of changed paths waiting for the timer.
    pub fn pending_count(&self) -> usize {
        self.shared.debouncer.lock().pending_count()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.debouncer.lock().is_armed()
    }

    /// Spawn consumption tasks for records that have none, if watching.
    fn start_pending(&mut self) {
        let Some(epoch) = self.epoch else {
            return;
        };
        if self.shared.callback.read().is_none() {
            return;
        }

        for record in &mut self.records {
            if record.task.is_some() {
                continue;
            }
            let Some(mut events) = record.watcher.events() else {
                continue;
            };

            let shared = Arc::clone(&self.shared);
            let id = record.id;
            record.task = Some(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    shared.handle_event(event, epoch);
                }
                crate::debug_event!("watcher", "stopped", "{id}");
            }));
        }
    }
}

impl Drop for WatcherFactory {
    fn drop(&mut self) {
        self.remove_watchers();
    }
}

impl fmt::Debug for WatcherFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherFactory")
            .field("records", &self.records)
            .field("context", &self.shared.context.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::RawEventKind;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Site {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Site {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = fs::canonicalize(dir.path()).unwrap();
            fs::write(root.join("folio.toml"), "").unwrap();
            fs::create_dir_all(root.join("blog")).unwrap();
            fs::create_dir_all(root.join("dist")).unwrap();
            Self { _dir: dir, root }
        }

        fn write(&self, rel: &str) -> PathBuf {
            let path = self.root.join(rel);
            fs::write(&path, "x").unwrap();
            path
        }

        fn factory(&self, exclude: &[&str]) -> WatcherFactory {
            let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
            let filter = FilterRule::new(None, Some(exclude.as_slice())).unwrap();
            let context = WatchContext::new(&self.root, &self.root.join("folio.toml"), filter);
            WatcherFactory::with_context(context, 100)
        }
    }

    fn capture(factory: &mut WatcherFactory) -> mpsc::UnboundedReceiver<WatchSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        factory.watch(move |signal| {
            let _ = tx.send(signal);
        });
        rx
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WatchSignal>) -> Vec<WatchSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    #[tokio::test]
    async fn test_excluded_output_is_ignored() {
        let site = Site::new();
        let mut factory = site.factory(&["dist"]);
        let mut rx = capture(&mut factory);

        let html = site.write("dist/index.html");
        let post = site.write("blog/post1.md");
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [html]));
        factory.handle_event(RawEvent::new(RawEventKind::Created, [post]));

        settle().await;
        assert_eq!(
            drain(&mut rx),
            vec![WatchSignal::PageChanged("blog/post1.md".into())]
        );
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_batch() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);

        for i in 0..5 {
            let path = site.write(&format!("asset{i}.css"));
            factory.handle_event(RawEvent::new(RawEventKind::Modified, [path]));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(factory.pending_count(), 5);

        settle().await;
        let expected: Vec<WatchSignal> = (0..5)
            .map(|i| WatchSignal::StaticChanged(format!("asset{i}.css")))
            .collect();
        assert_eq!(drain(&mut rx), expected);
        assert_eq!(factory.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_removed_file_yields_single_rebuild() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);

        let css = site.write("style.css");
        let gone = site.root.join("old.md");
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [css]));
        factory.handle_event(RawEvent::new(RawEventKind::Removed, [gone]));

        settle().await;
        assert_eq!(drain(&mut rx), vec![WatchSignal::Rebuild]);
    }

    #[tokio::test]
    async fn test_config_change_always_rebuilds() {
        let site = Site::new();
        // the config file itself is excluded, like the defaults do
        let mut factory = site.factory(&["folio.toml"]);
        let mut rx = capture(&mut factory);

        let page = site.write("index.md");
        factory.handle_event(RawEvent::new(
            RawEventKind::Modified,
            [page, site.root.join("folio.toml")],
        ));

        settle().await;
        assert_eq!(drain(&mut rx), vec![WatchSignal::Rebuild]);
    }

    #[tokio::test]
    async fn test_removed_directory_yields_single_rebuild() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);

        let page = site.write("blog/post1.md");
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [page]));
        fs::remove_dir_all(site.root.join("blog")).unwrap();
        factory.handle_event(RawEvent::new(
            RawEventKind::Removed,
            [site.root.join("blog")],
        ));

        settle().await;
        assert_eq!(drain(&mut rx), vec![WatchSignal::Rebuild]);
    }

    #[tokio::test]
    async fn test_same_input_same_output() {
        let site = Site::new();
        site.write("index.md");
        site.write("_layout.tsx");
        site.write("logo.png");

        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut factory = site.factory(&[]);
            let mut rx = capture(&mut factory);
            for rel in ["logo.png", "index.md", "_layout.tsx"] {
                factory.handle_event(RawEvent::new(RawEventKind::Modified, [site.root.join(rel)]));
            }
            settle().await;
            runs.push(drain(&mut rx));
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(
            runs[0],
            vec![
                WatchSignal::StaticChanged("logo.png".into()),
                WatchSignal::PageChanged("index.md".into()),
                WatchSignal::LayoutChanged("_layout.tsx".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_access_events_are_ignored() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let _rx = capture(&mut factory);

        let page = site.write("index.md");
        factory.handle_event(RawEvent::new(RawEventKind::Accessed, [page]));
        assert_eq!(factory.pending_count(), 0);
        assert!(!factory.is_armed());
    }

    #[tokio::test]
    async fn test_repeat_event_does_not_rearm() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);

        let page = site.write("index.md");
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [page.clone()]));
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [page]));
        assert_eq!(factory.pending_count(), 1);

        settle().await;
        assert_eq!(
            drain(&mut rx),
            vec![WatchSignal::PageChanged("index.md".into())]
        );
    }

    #[tokio::test]
    async fn test_remove_watchers_cancels_pending_timer() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);

        let page = site.write("index.md");
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [page]));
        assert!(factory.is_armed());

        factory.remove_watchers();
        factory.remove_watchers();

        settle().await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(factory.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_event_after_teardown_is_dropped() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);

        factory.remove_watchers();
        assert!(!factory.is_live());

        let page = site.write("index.md");
        factory.handle_event(RawEvent::new(RawEventKind::Modified, [page]));
        assert!(!factory.is_armed());
        assert_eq!(factory.pending_count(), 0);

        settle().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_stale_producer_is_dropped_after_teardown() {
        let site = Site::new();
        let mut factory = site.factory(&[]);
        let mut rx = capture(&mut factory);
        let started_in = factory.shared.debouncer.lock().epoch();

        factory.remove_watchers();

        // A consumption task that pulled its event just before teardown
        let page = site.write("index.md");
        factory
            .shared
            .handle_event(RawEvent::new(RawEventKind::Modified, [page]), started_in);
        assert!(!factory.is_armed());

        settle().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_watch_is_suppressed() {
        let site = Site::new();
        let mut factory = site.factory(&[]);

        let first = factory
            .add_watcher(WatchTarget::new([site.root.clone(), site.root.join("folio.toml")]).unwrap())
            .unwrap();
        let second = factory
            .add_watcher(WatchTarget::new([site.root.join("folio.toml"), site.root.clone()]).unwrap())
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(factory.watcher_count(), 1);
    }
}
