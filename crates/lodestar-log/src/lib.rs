//! Structured logging for Lodestar.
//!
//! Wraps `tracing-subscriber` so binaries get console output with uptime
//! timestamps and module paths, plus JSON file logging in debug builds.
//! The log level comes from `RUST_LOG` first, then from the config.

use lodestar_config::Config;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config provide one.
const DEFAULT_FILTER: &str = "info,lodestar_lod=info";

const LOG_FILE: &str = "lodestar.log";

/// Initialize the tracing subscriber.
///
/// * `log_dir` - directory for `lodestar.log` (JSON)
/// * `debug_build` - debug builds always log to the file
/// * `config` - optional configuration providing the log level and the
///   `log_to_file` switch for release builds
///
/// # Examples
///
/// ```no_run
/// use lodestar_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_from_config(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging_enabled(debug_build, config)
        && let Some((log_file, path)) = log_dir.and_then(open_log_file)
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        // A second init (e.g. from tests) is not an error worth surfacing.
        if subscriber.with(file_layer).try_init().is_ok() {
            tracing::debug!("Writing JSON log to {}", path.display());
        }
        return;
    }

    let _ = subscriber.try_init();
}

/// Whether the JSON file layer should be installed.
fn file_logging_enabled(debug_build: bool, config: Option<&Config>) -> bool {
    debug_build || config.is_some_and(|c| c.debug.log_to_file)
}

/// Create `log_dir` if needed and truncate the log file inside it.
fn open_log_file(log_dir: &Path) -> Option<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir).ok()?;
    let path = log_dir.join(LOG_FILE);
    let file = File::create(&path).ok()?;
    Some((file, path))
}

/// Resolve the filter string from the config's debug section.
fn filter_from_config(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => config.debug.log_level.clone(),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
