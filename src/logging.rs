//! Logging setup and component-tagged event macros.
//!
//! Log lines carry a compact `HH:MM:SS.mmm` timestamp and the emitting
//! target. Levels come from the `[logging]` settings section unless
//! `RUST_LOG` is set, which wins.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "fsindex::watcher" = "debug"
//! ```
//!
//! ```bash
//! RUST_LOG=fsindex=debug fsindex watch
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string for a logging config.
///
/// `verbose` raises the default level to `info` without touching per-module
/// overrides.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let mut directives = if verbose && is_quieter_than_info(&config.default) {
        "info".to_string()
    } else {
        config.default.clone()
    };
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

fn is_quieter_than_info(level: &str) -> bool {
    matches!(level.to_ascii_lowercase().as_str(), "off" | "error" | "warn")
}

/// Initialize logging. Only the first call takes effect.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_with_config(config: &LoggingConfig, verbose: bool) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config, verbose))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with `LoggingConfig::default()` (quiet, `warn`).
pub fn init() {
    init_with_config(&LoggingConfig::default(), false);
}

/// Log an event tagged with the emitting component.
///
/// # Examples
/// ```ignore
/// log_event!("crawler", "root done", "{}", root.display());
/// log_event!("watcher", "started");
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

/// Debug-level variant of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
