//! Logging setup for the build and watch loop.
//!
//! Compact timestamped output with per-module levels taken from the
//! `[logging]` section of `folio.toml`:
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! "folio::watcher" = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence over the config file:
//! ```bash
//! RUST_LOG=debug folio build --watch
//! RUST_LOG=folio::watcher=trace folio build --watch
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from the config section.
fn directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Only the first call takes effect, so the watch loop can reload settings
/// without re-installing the subscriber.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with the default `info` level.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("watcher", "page", "{}", path);
/// log_event!("build", "done");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Warning-level event logging.
///
/// # Examples
/// ```ignore
/// warn_event!("watcher", "removed", "{path}, start rebuild");
/// ```
#[macro_export]
macro_rules! warn_event {
    ($component:expr, $event:expr) => {
        tracing::warn!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::warn!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("watcher", "duplicate", "{}", target.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_directives_from_config() {
        let mut modules = HashMap::new();
        modules.insert("folio::watcher".to_string(), "debug".to_string());
        let config = LoggingConfig {
            default: "warn".to_string(),
            modules,
        };

        assert_eq!(directives(&config), "warn,folio::watcher=debug");
        assert_eq!(directives(&LoggingConfig::default()), "info");
    }
}
