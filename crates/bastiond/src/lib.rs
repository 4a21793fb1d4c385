//! The bastion agent daemon.
//!
//! The daemon loads layered configuration from [`bastion_config`], installs
//! structured telemetry, and builds the runtime context: the catalog seeded
//! with the `app` subtree and the application configuration, the object
//! manager with every built-in class registered, and the service manager
//! owning the declared services. Services listed under
//! `app.config.startupServices` are started during bootstrap.
//!
//! Health reporting hooks emit structured telemetry at each stage so
//! operators can follow bootstrap, service startup and shutdown. Shutdown is
//! driven by SIGTERM, SIGINT, SIGQUIT or SIGHUP and walks the application
//! through the `finishing` and `finished` stages before every service is
//! shut down.

mod bootstrap;
mod health;
mod process;
mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, RPC_SERVER_NAME, SERVICE_MANAGER_NAME, Stage,
    StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
