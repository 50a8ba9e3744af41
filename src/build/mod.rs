//! Build side of the watch loop: path inventory, plugin chain and the
//! orchestrator reacting to watch signals.

mod orchestrator;
mod paths;
mod plugin;

pub use orchestrator::BuildOrchestrator;
pub use paths::SitePaths;
pub use plugin::{
    BuildContext, BuildMode, CleanPlugin, OutPlugin, Plugin, PluginChain, PluginPipeline,
    builtin_plugins, sort_by_insert,
};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ConfigError, Settings};
use crate::watcher::{WatchError, WatchSignal};

/// Errors from building the site.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("Plugins {0:?} reference each other in their insert directives")]
    InsertCycle(Vec<String>),

    #[error("Plugin '{plugin}' failed: {reason}")]
    PluginFailed { plugin: String, reason: String },

    #[error("Cannot scan source directory {}: {reason}", path.display())]
    ScanFailed { path: PathBuf, reason: String },

    #[error("Refusing to clean {}: it contains the source directory", .0.display())]
    UnsafeOutDir(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The build the orchestrator drives.
///
/// Implementations receive the current settings and path inventory; they
/// never see raw filesystem events.
#[async_trait]
pub trait SitePipeline: Send {
    /// Full build from a freshly scanned inventory.
    async fn rebuild(&mut self, settings: &Settings, paths: &SitePaths) -> Result<(), BuildError>;

    /// Incremental build after one watch signal.
    async fn run_plugins(
        &mut self,
        settings: &Settings,
        paths: &SitePaths,
        signal: &WatchSignal,
    ) -> Result<(), BuildError>;
}
