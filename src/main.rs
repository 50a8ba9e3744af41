use anyhow::Context;
use clap::Parser;

use folio::cli::commands::{build, init};
use folio::cli::{Cli, Commands};
use folio::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = cli.overrides();

    if let Commands::Init { force } = &cli.command {
        folio::logging::init();
        let src_dir = Settings::config_path(&overrides)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        return init::run_init(&src_dir, *force);
    }

    let settings = Settings::load(&overrides).context("cannot load configuration")?;
    folio::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Build { watch } => build::run_build(settings, overrides, watch).await,
        Commands::Config => init::run_config(&settings),
        Commands::Init { .. } => Ok(()),
    }
}
