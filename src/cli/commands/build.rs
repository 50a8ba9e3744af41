//! Build command, one-shot or watching.

use anyhow::Context;

use crate::build::{BuildOrchestrator, PluginPipeline};
use crate::config::{CliOverrides, Settings};

/// Run build command.
///
/// With `watch`, keeps rebuilding on change until Ctrl-C.
pub async fn run_build(settings: Settings, overrides: CliOverrides, watch: bool) -> anyhow::Result<()> {
    let src_dir = settings.src_dir.clone();
    let mut orchestrator = BuildOrchestrator::new(PluginPipeline::new(), settings, overrides);

    if watch {
        orchestrator
            .run()
            .await
            .with_context(|| format!("watching {} failed", src_dir.display()))
    } else {
        orchestrator
            .build()
            .await
            .with_context(|| format!("building {} failed", src_dir.display()))
    }
}
