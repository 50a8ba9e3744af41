//! Init and Config commands.

use std::path::Path;

use anyhow::Context;

use crate::config::Settings;

/// Run init command - create `folio.toml` in the source directory.
pub fn run_init(src_dir: &Path, force: bool) -> anyhow::Result<()> {
    let path = Settings::init_config_file(src_dir, force)
        .with_context(|| format!("cannot initialize {}", src_dir.display()))?;

    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", config.to_toml().context("cannot render configuration")?);
    Ok(())
}
