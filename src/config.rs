//! Configuration for the site build and watch loop.
//!
//! Settings are layered, later layers winning:
//! - Default values
//! - `folio.toml` in the source directory
//! - Environment variables
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FOLIO_` and use double
//! underscores to separate nested levels:
//! - `FOLIO_SRC_DIR=site` sets `src_dir` (and where `folio.toml` is looked up)
//! - `FOLIO_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `FOLIO_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::watcher::{DEFAULT_DEBOUNCE_MS, FilterRule, WatchError, relative_path};

/// Name of the project config file inside the source directory.
pub const CONFIG_FILE_NAME: &str = "folio.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "FOLIO_";

/// Themes shipped with the binary. Anything else is a directory on disk.
pub const BUNDLED_THEMES: &[&str] = &["docs", "default", "blog"];

/// Errors from loading or writing settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Configuration file already exists at {}. Use --force to overwrite", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding the site sources and `folio.toml`
    #[serde(default = "default_src_dir")]
    pub src_dir: PathBuf,

    /// Directory the build writes to
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Bundled theme name, or a theme directory relative to the source dir
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Globs a changed path must match; absent or empty means everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    /// Globs of paths that never trigger a build
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Ordered plugin names; `-name` removes a plugin
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Quiet period before a batch of changes is processed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level applied to every module without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module levels, e.g. `"folio::watcher" = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

// Default value functions
fn default_src_dir() -> PathBuf { PathBuf::from(".") }
fn default_out_dir() -> PathBuf { PathBuf::from("dist") }
fn default_theme() -> String { "default".to_string() }
fn default_debounce_ms() -> u64 { DEFAULT_DEBOUNCE_MS }
fn default_log_level() -> String { "info".to_string() }
fn default_plugins() -> Vec<String> { vec!["clean".to_string(), "out".to_string()] }

fn default_exclude() -> Vec<String> {
    [
        // Dot files
        "**/.*",
        "**/package.json",
        "**/package-lock.json",
        "**/node_modules",
        CONFIG_FILE_NAME,
        // https://docs.npmjs.com/using-npm/developers.html#keeping-files-out-of-your-package
        "**/config.gypi",
        "**/CVS",
        "**/npm-debug.log",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            src_dir: default_src_dir(),
            out_dir: default_out_dir(),
            theme: default_theme(),
            include: None,
            exclude: default_exclude(),
            plugins: default_plugins(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// `folio.toml` is looked up in the source directory named by the CLI,
    /// else by `FOLIO_SRC_DIR`, else in the current directory.
    pub fn load(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path(overrides), overrides)
    }

    /// Load configuration with `path` as the project file.
    pub fn load_from(path: impl AsRef<Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore becomes dot, single underscore stays
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(Box::new)?;

        Ok(settings)
    }

    /// Where the project file lives for the given overrides.
    pub fn config_path(overrides: &CliOverrides) -> PathBuf {
        let src_dir = overrides
            .src_dir
            .clone()
            .or_else(|| std::env::var_os(format!("{ENV_PREFIX}SRC_DIR")).map(PathBuf::from))
            .unwrap_or_else(default_src_dir);

        src_dir.join(CONFIG_FILE_NAME)
    }

    /// Path of the project file for these settings.
    pub fn config_file(&self) -> PathBuf {
        self.src_dir.join(CONFIG_FILE_NAME)
    }

    pub fn is_bundled_theme(&self) -> bool {
        BUNDLED_THEMES.contains(&self.theme.as_str())
    }

    /// Theme directory on disk, or `None` for a bundled theme.
    ///
    /// Relative theme paths resolve against `project_root`, the directory
    /// holding the project file.
    pub fn theme_dir(&self, project_root: &Path) -> Option<PathBuf> {
        if self.is_bundled_theme() {
            return None;
        }

        let theme = Path::new(&self.theme);
        if theme.is_absolute() {
            Some(theme.to_path_buf())
        } else {
            Some(project_root.join(theme))
        }
    }

    /// Compile the include/exclude globs, with the output directory excluded.
    ///
    /// Without this, every write into the output directory would be seen as a
    /// source change and trigger another build.
    pub fn watch_filter(&self) -> Result<FilterRule, WatchError> {
        let mut exclude = self.exclude.clone();

        let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
        let out_dir = relative_path(&absolute(&self.src_dir), &absolute(&self.out_dir));
        if !out_dir.is_empty() && !exclude.contains(&out_dir) {
            exclude.push(out_dir);
        }

        FilterRule::new(self.include.as_deref(), Some(exclude.as_slice()))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Create a default `folio.toml` in `dir`.
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists(config_path));
        }

        Settings::default().save(&config_path)?;
        crate::log_event!("config", "created", "{}", config_path.display());

        Ok(config_path)
    }
}
