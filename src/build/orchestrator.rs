//! Drives the build from watch signals.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{BuildError, SitePaths, SitePipeline};
use crate::config::{CliOverrides, Settings};
use crate::watcher::{WatchError, WatchSignal, WatcherFactory};

/// Owns the pipeline, the path inventory and the watcher factory.
///
/// A `Rebuild` signal tears the watchers down first, so files the rebuild
/// writes or deletes are never seen as source changes, then re-reads the
/// settings and brings the watchers back with them.
pub struct BuildOrchestrator<P: SitePipeline> {
    pipeline: P,
    overrides: CliOverrides,
    config_file: PathBuf,
    settings: Settings,
    paths: SitePaths,
    factory: Option<WatcherFactory>,
}

impl<P: SitePipeline> BuildOrchestrator<P> {
    pub fn new(pipeline: P, settings: Settings, overrides: CliOverrides) -> Self {
        let config_file = Settings::config_path(&overrides);
        Self {
            pipeline,
            overrides,
            config_file,
            settings,
            paths: SitePaths::default(),
            factory: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &SitePaths {
        &self.paths
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn factory(&self) -> Option<&WatcherFactory> {
        self.factory.as_ref()
    }

    /// Scan the source tree and run the full pipeline once.
    pub async fn build(&mut self) -> Result<(), BuildError> {
        self.paths = SitePaths::scan(&self.settings)?;
        self.pipeline.rebuild(&self.settings, &self.paths).await
    }

    /// Build, then rebuild on change until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), BuildError> {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                crate::log_event!("build", "interrupted");
                trigger.cancel();
            }
        });

        self.run_until(shutdown).await
    }

    /// Build, then rebuild on change until `shutdown` is cancelled.
    pub async fn run_until(&mut self, shutdown: CancellationToken) -> Result<(), BuildError> {
        self.build().await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut factory = WatcherFactory::new(&self.settings, &self.config_file)?;
        factory.watch(move |signal| {
            if tx.send(signal).is_err() {
                crate::debug_event!("build", "signal dropped", "orchestrator gone");
            }
        });
        self.factory = Some(factory);

        crate::log_event!("build", "watching", "{}", self.settings.src_dir.display());

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                signal = rx.recv() => match signal {
                    Some(signal) => {
                        if let Err(e) = self.handle_signal(signal).await {
                            break Err(e);
                        }
                    }
                    None => break Err(WatchError::ChannelClosed.into()),
                },
            }
        };

        if let Some(mut factory) = self.factory.take() {
            factory.remove_watchers();
        }
        result
    }

    /// React to one signal.
    ///
    /// Build failures are logged and the loop keeps going; only losing every
    /// watcher is returned as an error.
    pub async fn handle_signal(&mut self, signal: WatchSignal) -> Result<(), BuildError> {
        if signal.is_rebuild() {
            return self.rebuild().await;
        }

        self.paths.merge(&signal);
        if !self.paths.has_content() {
            crate::debug_event!("build", "skipped", "nothing to build");
            return Ok(());
        }

        if let Err(e) = self
            .pipeline
            .run_plugins(&self.settings, &self.paths, &signal)
            .await
        {
            crate::warn_event!("build", "failed", "{e}");
        }
        Ok(())
    }

    async fn rebuild(&mut self) -> Result<(), BuildError> {
        if let Some(factory) = self.factory.as_mut() {
            factory.remove_watchers();
        }

        match Settings::load_from(&self.config_file, &self.overrides) {
            Ok(settings) => self.settings = settings,
            Err(e) => crate::warn_event!("build", "config reload failed", "{e}, keeping previous settings"),
        }

        if let Err(e) = self.build().await {
            crate::warn_event!("build", "rebuild failed", "{e}");
        }

        if let Some(factory) = self.factory.as_mut() {
            factory.init(&self.settings, &self.config_file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recording {
        rebuilds: usize,
        incremental: Vec<WatchSignal>,
    }

    #[async_trait]
    impl SitePipeline for Recording {
        async fn rebuild(&mut self, _settings: &Settings, _paths: &SitePaths) -> Result<(), BuildError> {
            self.rebuilds += 1;
            Ok(())
        }

        async fn run_plugins(
            &mut self,
            _settings: &Settings,
            _paths: &SitePaths,
            signal: &WatchSignal,
        ) -> Result<(), BuildError> {
            self.incremental.push(signal.clone());
            Ok(())
        }
    }

    fn site() -> (TempDir, Settings) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("folio.toml"), "").unwrap();
        fs::write(root.join("index.md"), "# home").unwrap();

        let mut settings = Settings::default();
        settings.src_dir = root.to_path_buf();
        settings.out_dir = root.join("dist");
        (temp_dir, settings)
    }

    fn orchestrator(settings: &Settings) -> BuildOrchestrator<Recording> {
        let overrides = CliOverrides {
            src_dir: Some(settings.src_dir.clone()),
            out_dir: Some(settings.out_dir.clone()),
            ..Default::default()
        };
        BuildOrchestrator::new(Recording::default(), settings.clone(), overrides)
    }

    #[tokio::test]
    async fn test_initial_build_scans_paths() {
        let (_dir, settings) = site();
        let mut orchestrator = orchestrator(&settings);

        orchestrator.build().await.unwrap();
        assert_eq!(orchestrator.pipeline().rebuilds, 1);
        assert_eq!(orchestrator.paths().page_paths, vec!["index.md"]);
    }

    #[tokio::test]
    async fn test_incremental_signal_merges_path() {
        let (_dir, settings) = site();
        let mut orchestrator = orchestrator(&settings);
        orchestrator.build().await.unwrap();

        let signal = WatchSignal::StaticChanged("logo.png".into());
        orchestrator.handle_signal(signal.clone()).await.unwrap();

        assert_eq!(orchestrator.paths().static_paths, vec!["logo.png"]);
        assert_eq!(orchestrator.pipeline().incremental, vec![signal]);
    }

    #[tokio::test]
    async fn test_layout_only_inventory_skips_plugins() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.src_dir = temp_dir.path().to_path_buf();
        let mut orchestrator = orchestrator(&settings);

        orchestrator
            .handle_signal(WatchSignal::LayoutChanged("_layout.tsx".into()))
            .await
            .unwrap();
        assert!(orchestrator.pipeline().incremental.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_restores_watchers() {
        let (_dir, settings) = site();
        let mut orchestrator = orchestrator(&settings);
        orchestrator.build().await.unwrap();
        orchestrator.factory = Some(WatcherFactory::new(&settings, &settings.config_file()).unwrap());

        orchestrator.handle_signal(WatchSignal::Rebuild).await.unwrap();

        assert_eq!(orchestrator.pipeline().rebuilds, 2);
        assert_eq!(orchestrator.factory().map(|f| f.watcher_count()), Some(1));
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let (_dir, settings) = site();
        let mut orchestrator = orchestrator(&settings);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        orchestrator.run_until(shutdown).await.unwrap();

        assert_eq!(orchestrator.pipeline().rebuilds, 1);
        assert!(orchestrator.factory().is_none());
    }
}
