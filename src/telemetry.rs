//! Process-wide log output for the CLI and long-running snapshot watcher.
//!
//! Events from both `tracing` and the `log` facade end up in one formatter on
//! stderr, leaving stdout to the JSON documents the commands print.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("another tracing subscriber is already installed: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    #[error("`log` records cannot be forwarded, a logger is already registered: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the stderr subscriber described by `config.log_level` and
/// `config.log_format`. `RUST_LOG` overrides the level when set.
///
/// Calls after the first successful one are no-ops. A failed call can be retried.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    install(config).inspect_err(|_| INSTALLED.store(false, Ordering::SeqCst))
}

fn install(config: &AppConfig) -> Result<(), TelemetryInitError> {
    let level = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let output = if config.log_format == "pretty" {
        fmt::layer().pretty().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(level).with(output))?;
    // Seeding logs through `log`; the level filter above still applies.
    LogTracer::init_with_filter(LevelFilter::Trace)?;
    Ok(())
}
