//! Runs the daemon from bootstrap to shutdown.

use std::sync::Arc;

use tracing::info;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails or signal handlers cannot be
/// installed.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal::new(),
    )
}

/// Runs the daemon with injected collaborators.
///
/// Blocks in `shutdown.wait()` while the daemon is active. The shutdown
/// sequence runs even when waiting fails.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails or waiting for shutdown
/// fails.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(loader, reporter)?;
    let waited = shutdown.wait();
    daemon.shutdown();
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
