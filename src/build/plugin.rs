//! Plugin chain and the built-in plugins.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BuildError, SitePaths, SitePipeline};
use crate::config::Settings;
use crate::watcher::WatchSignal;

/// What triggered a plugin run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMode {
    Full,
    Incremental(WatchSignal),
}

/// State handed from plugin to plugin during one run.
#[derive(Debug)]
pub struct BuildContext<'a> {
    pub settings: &'a Settings,
    pub paths: &'a SitePaths,
    pub mode: BuildMode,
    /// Output files written so far, relative to the output directory.
    pub written: Vec<String>,
}

impl<'a> BuildContext<'a> {
    pub fn new(settings: &'a Settings, paths: &'a SitePaths, mode: BuildMode) -> Self {
        Self {
            settings,
            paths,
            mode,
            written: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.mode == BuildMode::Full
    }
}

/// One step of the build.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in the `plugins` setting.
    fn name(&self) -> &str;

    /// Placement relative to another plugin: `before:<name>` or `after:<name>`.
    fn insert(&self) -> Option<&str> {
        None
    }

    async fn run(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError>;
}

/// Removes the output directory before a full build.
#[derive(Debug, Default)]
pub struct CleanPlugin;

#[async_trait]
impl Plugin for CleanPlugin {
    fn name(&self) -> &str {
        "clean"
    }

    async fn run(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        if !ctx.is_full() {
            return Ok(());
        }

        let out_dir = &ctx.settings.out_dir;
        if !tokio::fs::try_exists(out_dir).await? {
            return Ok(());
        }

        let out_abs = tokio::fs::canonicalize(out_dir).await?;
        let src_abs = tokio::fs::canonicalize(&ctx.settings.src_dir).await?;
        if src_abs.starts_with(&out_abs) {
            return Err(BuildError::UnsafeOutDir(out_dir.clone()));
        }

        tokio::fs::remove_dir_all(out_dir).await?;
        crate::debug_event!("build", "cleaned", "{}", out_dir.display());
        Ok(())
    }
}

/// Copies tracked pages and static files into the output directory.
///
/// Full builds copy the whole inventory; an incremental run copies only the
/// changed file, or every page when a layout changed.
#[derive(Debug, Default)]
pub struct OutPlugin;

impl OutPlugin {
    async fn copy(settings: &Settings, rel: &str) -> Result<bool, BuildError> {
        if escapes_out_dir(rel) {
            return Ok(false);
        }

        let from = settings.src_dir.join(rel);
        let to = settings.out_dir.join(rel);
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&from, &to).await?;
        Ok(true)
    }
}

#[async_trait]
impl Plugin for OutPlugin {
    fn name(&self) -> &str {
        "out"
    }

    async fn run(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let (settings, paths) = (ctx.settings, ctx.paths);
        let tracked = paths.page_paths.iter().chain(paths.static_paths.iter());

        let targets: Vec<&String> = match &ctx.mode {
            BuildMode::Full => tracked.collect(),
            BuildMode::Incremental(WatchSignal::LayoutChanged(_)) => {
                paths.page_paths.iter().collect()
            }
            BuildMode::Incremental(WatchSignal::PageChanged(p))
            | BuildMode::Incremental(WatchSignal::StaticChanged(p)) => {
                tracked.filter(|t| *t == p).collect()
            }
            BuildMode::Incremental(WatchSignal::Rebuild) => Vec::new(),
        };

        let mut written = Vec::with_capacity(targets.len());
        for rel in targets {
            if Self::copy(settings, rel).await? {
                written.push(rel.clone());
            }
        }

        crate::debug_event!("build", "out", "{} files", written.len());
        ctx.written.extend(written);
        Ok(())
    }
}

/// Every plugin shipped with the binary, in default order.
pub fn builtin_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(CleanPlugin), Arc::new(OutPlugin)]
}

/// Reorder `items` according to their insert directives.
///
/// Items without a directive keep their relative order. An item with
/// `before:x` / `after:x` lands right before / after `x`; when several items
/// target the same anchor, earlier items end up closer to it. Directives
/// naming an unknown anchor are ignored.
pub fn sort_by_insert<T>(
    items: Vec<T>,
    name: impl Fn(&T) -> &str,
    insert: impl Fn(&T) -> Option<&str>,
) -> Result<Vec<T>, BuildError> {
    let mut index: Vec<f64> = (0..items.len()).map(|i| i as f64).collect();
    let mut pending: Vec<usize> = (0..items.len())
        .filter(|&i| insert(&items[i]).is_some())
        .collect();

    let mut delta = 1.0_f64;
    while !pending.is_empty() {
        delta /= 2.0;
        let before = pending.len();

        let snapshot = pending.clone();
        for i in snapshot {
            let directive = insert(&items[i]).unwrap_or_default();
            let (cond, anchor) = directive.split_once(':').unwrap_or((directive, ""));
            let offset = match cond {
                "before" => -delta,
                "after" => delta,
                _ => 0.0,
            };

            match items.iter().position(|item| name(item) == anchor) {
                None => {
                    tracing::warn!("[build] plugin {} ignores insert '{directive}'", name(&items[i]));
                    pending.retain(|&p| p != i);
                }
                Some(a) if !pending.contains(&a) => {
                    index[i] = index[a] + offset;
                    pending.retain(|&p| p != i);
                }
                Some(_) => {}
            }
        }

        if pending.len() == before {
            let names = pending.iter().map(|&i| name(&items[i]).to_string()).collect();
            return Err(BuildError::InsertCycle(names));
        }
    }

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| index[a].total_cmp(&index[b]));

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Ordered plugins for one build.
#[derive(Clone)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    /// Build the chain from configured names.
    ///
    /// A `-name` entry removes that plugin; every other entry must name one
    /// of `available`.
    pub fn resolve(names: &[String], available: &[Arc<dyn Plugin>]) -> Result<Self, BuildError> {
        let lookup = |name: &str| {
            available
                .iter()
                .find(|p| p.name() == name)
                .cloned()
                .ok_or_else(|| BuildError::UnknownPlugin(name.to_string()))
        };

        let mut removed = Vec::new();
        for name in names {
            if let Some(stripped) = name.strip_prefix('-') {
                lookup(stripped)?;
                removed.push(stripped);
            }
        }

        let mut selected: Vec<Arc<dyn Plugin>> = Vec::new();
        for name in names.iter().filter(|n| !n.starts_with('-')) {
            if removed.contains(&name.as_str()) || selected.iter().any(|p| p.name() == name.as_str()) {
                continue;
            }
            selected.push(lookup(name)?);
        }

        let plugins = sort_by_insert(selected, |p| p.name(), |p| p.insert())?;
        Ok(Self { plugins })
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every plugin in order, stopping at the first failure.
    pub async fn run(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        for plugin in &self.plugins {
            crate::debug_event!("build", "plugin", "{}", plugin.name());
            plugin.run(ctx).await.map_err(|e| match e {
                BuildError::PluginFailed { .. } => e,
                other => BuildError::PluginFailed {
                    plugin: plugin.name().to_string(),
                    reason: other.to_string(),
                },
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain").field("plugins", &self.names()).finish()
    }
}

/// [`SitePipeline`] running a [`PluginChain`] resolved from the settings.
pub struct PluginPipeline {
    available: Vec<Arc<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::with_plugins(builtin_plugins())
    }

    pub fn with_plugins(available: Vec<Arc<dyn Plugin>>) -> Self {
        Self { available }
    }

    async fn run_chain(
        &self,
        settings: &Settings,
        paths: &SitePaths,
        mode: BuildMode,
    ) -> Result<Vec<String>, BuildError> {
        let chain = PluginChain::resolve(&settings.plugins, &self.available)?;
        let mut ctx = BuildContext::new(settings, paths, mode);
        chain.run(&mut ctx).await?;
        Ok(ctx.written)
    }
}

impl Default for PluginPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SitePipeline for PluginPipeline {
    async fn rebuild(&mut self, settings: &Settings, paths: &SitePaths) -> Result<(), BuildError> {
        let written = self.run_chain(settings, paths, BuildMode::Full).await?;
        crate::log_event!("build", "done", "{} files in {}", written.len(), settings.out_dir.display());
        Ok(())
    }

    async fn run_plugins(
        &mut self,
        settings: &Settings,
        paths: &SitePaths,
        signal: &WatchSignal,
    ) -> Result<(), BuildError> {
        let written = self
            .run_chain(settings, paths, BuildMode::Incremental(signal.clone()))
            .await?;
        crate::log_event!("build", signal.status(), "{} files updated", written.len());
        Ok(())
    }
}

/// Whether `rel` would be written outside the output directory.
fn escapes_out_dir(rel: &str) -> bool {
    Path::new(rel).components().any(|c| matches!(c, std::path::Component::ParentDir))
}
