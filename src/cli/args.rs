//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::CliOverrides;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Static site builder
#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version = env!("CARGO_PKG_VERSION"),
    about = "Static site builder",
    long_about = "Build a static site and rebuild it incrementally as sources change.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  folio init\n  folio build\n  folio build --watch\n  folio --src-dir site --theme ../my-theme build --watch"
)]
pub struct Cli {
    /// Source directory holding folio.toml
    #[arg(long, global = true, value_name = "DIR")]
    pub src_dir: Option<PathBuf>,

    /// Theme name or theme directory
    #[arg(long, global = true, value_name = "NAME")]
    pub theme: Option<String>,

    /// Output directory
    #[arg(long, global = true, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The command-line layer of the settings.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            src_dir: self.src_dir.clone(),
            out_dir: self.out_dir.clone(),
            theme: self.theme.clone(),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the site
    #[command(about = "Build the site, optionally rebuilding on change")]
    Build {
        /// Keep running and rebuild incrementally on change
        #[arg(short, long)]
        watch: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display the resolved settings")]
    Config,

    /// Initialize project
    #[command(about = "Create folio.toml with default settings")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
