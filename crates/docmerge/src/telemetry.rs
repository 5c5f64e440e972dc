//! Process-wide diagnostics setup for embedding applications.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records into tracing: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a global subscriber filtered by `RUST_LOG` (default `info`) and
/// routes `log` records from the scanners through it.
pub fn init_tracing(format: LogFormat) -> Result<(), TelemetryError> {
    let registry = Registry::default().with(env_filter());
    match format {
        LogFormat::Plain => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(false)))?
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        )?,
    }
    tracing_log::LogTracer::init()?;
    Ok(())
}
