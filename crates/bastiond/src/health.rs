//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use bastion_config::Config;
use bastion_core::CoreError;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before a startup service is started.
    fn service_starting(&self, name: &str);

    /// Invoked after a startup service started.
    fn service_started(&self, name: &str);

    /// Invoked when a startup service fails to start.
    fn service_failed(&self, name: &str, error: &CoreError);

    /// Invoked when the shutdown sequence begins.
    fn shutdown_started(&self);

    /// Invoked once every service has been shut down.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn service_starting(&self, name: &str) {
        (**self).service_starting(name);
    }

    fn service_started(&self, name: &str) {
        (**self).service_started(name);
    }

    fn service_failed(&self, name: &str, error: &CoreError) {
        (**self).service_failed(name, error);
    }

    fn shutdown_started(&self) {
        (**self).shutdown_started();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            rpc_endpoint = %config.rpc_endpoint(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn service_starting(&self, name: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_starting",
            service = name,
            "starting service"
        );
    }

    fn service_started(&self, name: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_started",
            service = name,
            "service started"
        );
    }

    fn service_failed(&self, name: &str, error: &CoreError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "service_failed",
            service = name,
            kind = %error.kind(),
            error = %error,
            "service failed to start"
        );
    }

    fn shutdown_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_started",
            "daemon shutdown started"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "daemon shutdown completed"
        );
    }
}
