//! Structured telemetry initialisation for the daemon.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use bastion_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Offending filter.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// Installing the global subscriber failed.
    #[error("failed to install telemetry subscriber: {source}")]
    Subscriber {
        /// Underlying registration failure.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the global subscriber on first use.
///
/// Later calls return a fresh handle without touching global state, so a
/// daemon bootstrapped twice in one process (as the tests do) keeps the
/// first configuration.
///
/// # Errors
///
/// Fails when the filter does not parse or another subscriber is already
/// installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|()| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| {
        TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            message: error.to_string(),
        }
    })?;

    let builder = |env_filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|source| TelemetryError::Subscriber { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_idempotent() {
        let config = Config::default();
        assert!(initialise(&config).is_ok());
        assert!(initialise(&config).is_ok());
    }
}
