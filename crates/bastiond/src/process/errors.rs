use thiserror::Error;

use bastion_config::ConfigError;

use super::shutdown::ShutdownError;
use crate::bootstrap::BootstrapError;

/// Errors surfaced while running the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl LaunchError {
    /// Configuration failure, if that is what stopped the daemon.
    #[must_use]
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            Self::Bootstrap { source } => source.config_error(),
            Self::Shutdown { .. } => None,
        }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
