pub mod build;
pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use build::{BuildError, BuildOrchestrator, PluginPipeline, SitePaths, SitePipeline};
pub use config::{CliOverrides, ConfigError, Settings};
pub use watcher::{WatchError, WatchSignal, WatcherFactory};
