//! Structured logging/tracing initialization.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initializes the global tracing subscriber based on configuration.
///
/// The `RUST_LOG` environment variable, when set, always wins over
/// `config.level`.
///
/// # Errors
/// Returns an error if `config.level` is not a valid filter directive.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config_with_source(format!("invalid log level '{}'", config.level), e))?;

    if config.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    tracing::info!(level = %config.level, format = %config.format, "tracing initialized");
    Ok(())
}
