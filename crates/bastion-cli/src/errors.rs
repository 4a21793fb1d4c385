//! Error types for the CLI runtime.

use std::io;

use bastion_config::ConfigError;
use bastion_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to load configuration: {source}")]
    LoadConfiguration {
        #[source]
        source: ConfigError,
    },
    #[error("--timeout must be -1 or a non-negative number of seconds, got {value}")]
    Timeout { value: i64 },
    #[error("invalid command parameters: {source}")]
    Params {
        #[source]
        source: CoreError,
    },
    #[error("{}: {}", .source.kind(), .source.message())]
    Command {
        #[source]
        source: CoreError,
    },
    #[error("failed to write the command result: {source}")]
    Output {
        #[source]
        source: io::Error,
    },
}
