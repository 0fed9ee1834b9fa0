//! Logging infrastructure for ecotrace.
//!
//! Structured logging on top of the `tracing` ecosystem:
//!
//! - JSON lines written to `~/.ecotrace/logs/ecotrace.log` (rolled daily)
//! - Compact human-readable output on stderr
//! - `-v` raises the default level to DEBUG; `RUST_LOG` overrides both
//!
//! ## Example
//!
//! ```no_run
//! use ecotrace_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("ecotrace started");
//! tracing::debug!(region = "Europe (Sweden)", "region selected");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{EcoError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the ecotrace logging system.
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.ecotrace/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| EcoError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "ecotrace.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ecotrace={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Get the default log directory path.
///
/// Returns `~/.ecotrace/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".ecotrace").join("logs"))
}

/// Get the user's home directory from `HOME`.
pub fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| EcoError::HomeNotSet)?;

    Ok(PathBuf::from(home))
}

/// Log the outcome of one aggregation pass.
///
/// # Example
///
/// ```ignore
/// log_impact_event!(records = 120, energy_kwh = 0.42, carbon_g = 199.5);
/// ```
#[macro_export]
macro_rules! log_impact_event {
    ($($field:tt)*) => {
        tracing::info!(
            target: "ecotrace::impact",
            $($field)*,
            "impact pass"
        )
    };
}
