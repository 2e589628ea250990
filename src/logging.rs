//! Unified logging for debug output.
//!
//! Provides compact timestamped logging with per-module level configuration.
//! Supports `RUST_LOG` environment variable for runtime overrides.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"  # quiet by default
//!
//! [logging.modules]
//! file_events = "debug"
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug file-events /tmp/project
//! ```

use std::sync::{Once, OnceLock};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();
static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter: `RUST_LOG` if set, otherwise the config levels.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    EnvFilter::new(&filter_str)
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
///
/// Log levels control visibility:
/// - `error` - errors only (quietest)
/// - `warn` - errors + warnings (default, quiet operation)
/// - `info` - lifecycle logs (server started, shutdown requested)
/// - `debug` - every registration and delivered event
/// - `trace` - everything
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let (filter, handle) = reload::Layer::new(build_filter(config));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true);

        // Another subscriber may already be installed (e.g. by a test harness)
        if tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .is_ok()
        {
            let _ = FILTER.set(handle);
        }
    });
}

/// Initialize logging with default configuration.
///
/// Uses `LoggingConfig::default()` which sets `default = "warn"` for quiet operation.
/// Use `RUST_LOG=debug` environment variable for verbose output.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Drop the active log levels and apply `config` (or `RUST_LOG`) again.
///
/// Returns `false` when logging was not initialized by this module.
pub fn reload(config: &LoggingConfig) -> bool {
    let Some(handle) = FILTER.get() else {
        return false;
    };

    match handle.reload(build_filter(config)) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("failed to reload log filter: {e}");
            false
        }
    }
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("server", "started");
/// log_event!("server", "watching", "{}", path.display());
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

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("reporter", "modified", "{}", path.display());
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
