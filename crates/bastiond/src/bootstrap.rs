//! Daemon bootstrap orchestration.
//!
//! Bootstrap loads configuration, installs telemetry, seeds the catalog with
//! the `app` subtree, creates the service manager and starts the startup
//! services. When the application configuration declares no JSON-RPC
//! server, a default one exposing the service manager is started on the
//! configured endpoint.

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use bastion_config::{Config, ConfigError};
use bastion_core::{
    APP_CONFIG_PATH, CLSID_SERVICE_MANAGER, ClassId, CommandProcessor, Context, CoreError,
    Dictionary, OBJECTS_PATH, ObjectHandle, ServiceRegistry, Variant,
};
use bastion_rpc::CLSID_JSON_RPC_SERVER;

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Named object under which the service manager is registered.
pub const SERVICE_MANAGER_NAME: &str = "serviceManager";
/// Named object under which the default JSON-RPC server is registered.
pub const RPC_SERVER_NAME: &str = "rpcServer";

const APP_NAME_PATH: &str = "app.name";
const APP_STAGE_PATH: &str = "app.stage";
const APP_IMAGE_PATH: &str = "app.imageFile";
const STARTUP_SERVICES_PATH: &str = "app.config.startupServices";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<ConfigError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<ConfigError>> {
        Config::load().map_err(Arc::new)
    }
}

/// Loader returning a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<ConfigError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<ConfigError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The application configuration file could not be read.
    #[error("failed to read application configuration '{path}': {source}")]
    AppConfigRead {
        /// File that failed.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The application configuration file is not a usable JSON document.
    #[error("invalid application configuration '{path}': {source}")]
    AppConfig {
        /// File that failed.
        path: Utf8PathBuf,
        /// Conversion failure.
        #[source]
        source: CoreError,
    },
    /// Building the runtime failed.
    #[error("failed to {action}: {source}")]
    Runtime {
        /// What bootstrap was doing.
        action: &'static str,
        /// Underlying failure.
        #[source]
        source: CoreError,
    },
    /// A startup service failed to start.
    #[error("failed to start service '{name}': {source}")]
    Service {
        /// Service name.
        name: String,
        /// Underlying failure.
        #[source]
        source: CoreError,
    },
    /// The default JSON-RPC server could not be started.
    #[error("failed to expose the service manager on {endpoint}: {source}")]
    RpcServer {
        /// Configured endpoint.
        endpoint: String,
        /// Underlying failure.
        #[source]
        source: CoreError,
    },
}

impl BootstrapError {
    /// Configuration failure, if that is what stopped bootstrap.
    #[must_use]
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            Self::Configuration { source } => Some(source.as_ref()),
            _ => None,
        }
    }

    fn runtime(action: &'static str) -> impl FnOnce(CoreError) -> Self {
        move |source| Self::Runtime { action, source }
    }
}

/// Value of `app.stage` as the daemon moves through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Bootstrap is in progress.
    Initializing,
    /// Startup services are running.
    Active,
    /// Shutdown was requested; services are being stopped.
    Finishing,
    /// Services are stopped and about to be shut down.
    Finished,
}

impl Stage {
    /// Catalog representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Finishing => "finishing",
            Self::Finished => "finished",
        }
    }
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    context: Context,
    manager: ObjectHandle,
    registry: Arc<dyn ServiceRegistry>,
    rpc_server: Option<Arc<dyn CommandProcessor>>,
    rpc_address: Option<SocketAddr>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .field("rpc_address", &self.rpc_address)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Catalog and object manager of the running daemon.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// The service manager.
    #[must_use]
    pub fn registry(&self) -> &dyn ServiceRegistry {
        self.registry.as_ref()
    }

    /// Address of the default JSON-RPC server, when the daemon started one.
    #[must_use]
    pub const fn rpc_address(&self) -> Option<SocketAddr> {
        self.rpc_address
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Current `app.stage` value.
    #[must_use]
    pub fn stage(&self) -> Option<String> {
        self.context
            .catalog()
            .get_safe(APP_STAGE_PATH)
            .ok()
            .flatten()
            .and_then(|stage| stage.as_str().map(ToOwned::to_owned))
    }

    /// Runs the shutdown sequence: stop the default server, stop every
    /// service, then shut them all down.
    ///
    /// Failures are logged and do not interrupt the sequence.
    pub fn shutdown(self) {
        self.reporter.shutdown_started();
        set_stage(&self.context, Stage::Finishing);
        if let Some(server) = &self.rpc_server
            && let Err(error) = server.execute("stop", &Variant::Null)
        {
            warn!(
                target: BOOTSTRAP_TARGET,
                error = %error,
                "failed to stop the JSON-RPC server"
            );
        }
        self.registry.stop_all();
        set_stage(&self.context, Stage::Finished);
        self.registry.shutdown_all();
        self.reporter.shutdown_completed();
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first step that fails. Services
/// already created are shut down again before returning.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match bootstrap_steps(loader, &reporter) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(&daemon.config);
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn bootstrap_steps(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let context = Context::new();
    seed_app(&context, &config)?;
    bastion_core::register_classes(context.objects())
        .map_err(BootstrapError::runtime("register core classes"))?;
    bastion_rpc::register_classes(context.objects())
        .map_err(BootstrapError::runtime("register transport classes"))?;

    let mut manager_config = Dictionary::new();
    manager_config.insert(
        "strictLifecycle".into(),
        Variant::Bool(config.strict_lifecycle()),
    );
    let manager = context
        .create_object(CLSID_SERVICE_MANAGER, &manager_config)
        .map_err(BootstrapError::runtime("create the service manager"))?;
    let registry = manager
        .query_interface::<dyn ServiceRegistry>()
        .map_err(BootstrapError::runtime("create the service manager"))?;

    let mut daemon = Daemon {
        config,
        context,
        manager: manager.clone(),
        registry,
        rpc_server: None,
        rpc_address: None,
        telemetry,
        reporter: Arc::clone(reporter),
    };
    if let Err(error) = daemon.activate(manager) {
        daemon.registry.shutdown_all();
        return Err(error);
    }
    Ok(daemon)
}

impl Daemon {
    fn activate(&mut self, manager: ObjectHandle) -> Result<(), BootstrapError> {
        self.registry
            .put_named_object(SERVICE_MANAGER_NAME, Variant::Object(manager))
            .map_err(BootstrapError::runtime("register the service manager"))?;

        for name in startup_services(&self.context)? {
            self.reporter.service_starting(&name);
            match self.registry.start_service(&name) {
                Ok(()) => self.reporter.service_started(&name),
                Err(source) => {
                    self.reporter.service_failed(&name, &source);
                    return Err(BootstrapError::Service { name, source });
                }
            }
        }

        if !declares_rpc_server(&self.context) {
            self.start_default_server()?;
        }
        set_stage(&self.context, Stage::Active);
        Ok(())
    }

    fn start_default_server(&mut self) -> Result<(), BootstrapError> {
        let endpoint = self.config.rpc_endpoint();
        let failed = |source| BootstrapError::RpcServer {
            endpoint: endpoint.to_string(),
            source,
        };
        let mut server_config = Dictionary::new();
        server_config.insert("host".into(), Variant::from(endpoint.host()));
        server_config.insert("port".into(), Variant::from(endpoint.port()));
        server_config.insert("processor".into(), Variant::from(SERVICE_MANAGER_NAME));
        let handle = self
            .context
            .create_object(CLSID_JSON_RPC_SERVER, &server_config)
            .map_err(failed)?;
        let server = handle
            .query_interface::<dyn CommandProcessor>()
            .map_err(failed)?;
        let bound = server.execute("start", &Variant::Null).map_err(failed)?;
        self.registry
            .put_named_object(RPC_SERVER_NAME, Variant::Object(handle))
            .map_err(failed)?;
        self.rpc_address = bound_address(&bound);
        info!(
            target: BOOTSTRAP_TARGET,
            address = ?self.rpc_address,
            "service manager exposed over JSON-RPC"
        );
        self.rpc_server = Some(server);
        Ok(())
    }
}

fn seed_app(context: &Context, config: &Config) -> Result<(), BootstrapError> {
    let catalog = context.catalog();
    let seed = || -> bastion_core::Result<()> {
        catalog.put(APP_NAME_PATH, env!("CARGO_PKG_NAME"))?;
        catalog.put(APP_STAGE_PATH, Stage::Initializing.as_str())?;
        catalog.put(APP_IMAGE_PATH, image_file())?;
        Ok(())
    };
    seed().map_err(BootstrapError::runtime("seed the catalog"))?;

    let Some(path) = config.app_config() else {
        return Ok(());
    };
    let app_config = load_app_config(path)?;
    catalog
        .put(APP_CONFIG_PATH, app_config)
        .map_err(BootstrapError::runtime("store the application configuration"))
}

fn load_app_config(path: &Utf8Path) -> Result<Variant, BootstrapError> {
    let text = fs::read_to_string(path).map_err(|source| BootstrapError::AppConfigRead {
        path: path.to_owned(),
        source,
    })?;
    let invalid = |source| BootstrapError::AppConfig {
        path: path.to_owned(),
        source,
    };
    match Variant::parse_json(&text).map_err(invalid)? {
        dict @ Variant::Dictionary(_) => Ok(dict),
        other => Err(invalid(CoreError::type_error(format!(
            "application configuration must be a JSON object, not a {} value",
            other.type_name()
        )))),
    }
}

fn image_file() -> Variant {
    std::env::current_exe()
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map_or(Variant::Null, |path| Variant::from(path.into_string()))
}

fn startup_services(context: &Context) -> Result<Vec<String>, BootstrapError> {
    let invalid = BootstrapError::runtime("read the startup services");
    let declared = context
        .catalog()
        .get_or(STARTUP_SERVICES_PATH, Variant::Null)
        .map_err(BootstrapError::runtime("read the startup services"))?;
    match declared {
        Variant::Null => Ok(Vec::new()),
        Variant::Sequence(names) => names
            .iter()
            .map(|name| {
                name.as_str().map(ToOwned::to_owned).ok_or_else(|| {
                    CoreError::type_error(format!(
                        "startup service names must be strings, not {} values",
                        name.type_name()
                    ))
                })
            })
            .collect::<bastion_core::Result<Vec<_>>>()
            .map_err(invalid),
        other => Err(invalid(CoreError::type_error(format!(
            "<startupServices> must be a sequence, not a {} value",
            other.type_name()
        )))),
    }
}

fn declares_rpc_server(context: &Context) -> bool {
    let declared = context
        .catalog()
        .get_safe(&format!("{APP_CONFIG_PATH}.{OBJECTS_PATH}"))
        .ok()
        .flatten();
    let Some(Variant::Dictionary(services)) = declared else {
        return false;
    };
    services.values().any(|descriptor| {
        descriptor
            .get("clsid")
            .and_then(|clsid| ClassId::from_variant(clsid).ok())
            == Some(CLSID_JSON_RPC_SERVER)
    })
}

fn bound_address(bound: &Variant) -> Option<SocketAddr> {
    let host: IpAddr = bound.get("host")?.as_str()?.parse().ok()?;
    let port = u16::try_from(bound.get("port")?.as_integer()?).ok()?;
    Some(SocketAddr::new(host, port))
}

fn set_stage(context: &Context, stage: Stage) {
    if let Err(error) = context.catalog().put(APP_STAGE_PATH, stage.as_str()) {
        warn!(
            target: BOOTSTRAP_TARGET,
            stage = stage.as_str(),
            error = %error,
            "failed to record the application stage"
        );
    }
    info!(target: BOOTSTRAP_TARGET, stage = stage.as_str(), "application stage changed");
}
