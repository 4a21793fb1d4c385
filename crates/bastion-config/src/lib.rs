//! Layered configuration shared by the bastion daemon and CLI.
//!
//! Values resolve in increasing precedence: built-in defaults, an optional
//! TOML file, `BASTION_*` environment variables and finally command-line
//! flags. The file is named by `--config-path` or `BASTION_CONFIG_PATH`.

mod defaults;
mod endpoint;
mod logging;

use std::ffi::OsString;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use serde::Deserialize;
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_RPC_HOST, DEFAULT_RPC_PORT, ENV_PREFIX, default_log_filter,
    default_log_format, default_rpc_endpoint,
};
pub use endpoint::{EndpointParseError, RpcEndpoint};
pub use logging::{LogFormat, LogFormatParseError};

/// Command-line flags understood by [`Config`].
///
/// Binaries with their own argument surface flatten this struct into it.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config_path: Option<Utf8PathBuf>,
    /// JSON-RPC endpoint as `tcp://host:port`.
    #[arg(long, value_name = "URL")]
    pub rpc_endpoint: Option<String>,
    /// Tracing filter expression.
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
    /// Log output format: `json` or `compact`.
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,
    /// JSON document loaded into the catalog as `app.config`.
    #[arg(long, value_name = "PATH")]
    pub app_config: Option<Utf8PathBuf>,
    /// Rejects out-of-order service lifecycle requests.
    #[arg(long)]
    pub strict_lifecycle: bool,
}

#[derive(Debug, Parser)]
#[command(name = "bastiond", about = "bastion agent daemon", version)]
struct DaemonArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLayer {
    rpc_endpoint: Option<String>,
    log_filter: Option<String>,
    log_format: Option<String>,
    app_config: Option<Utf8PathBuf>,
    strict_lifecycle: Option<bool>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    config_path: Option<Utf8PathBuf>,
    rpc_endpoint: RpcEndpoint,
    log_filter: String,
    log_format: LogFormat,
    app_config: Option<Utf8PathBuf>,
    strict_lifecycle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            rpc_endpoint: default_rpc_endpoint(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            app_config: None,
            strict_lifecycle: false,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from `args` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer is malformed.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::load_with_env(args, |key| std::env::var(key).ok())
    }

    /// Loads configuration from `args`, reading variables through `env`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer is malformed.
    pub fn load_with_env<I, T, E>(args: I, env: E) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
        E: Fn(&str) -> Option<String>,
    {
        let parsed = DaemonArgs::try_parse_from(args).map_err(ConfigError::Cli)?;
        Self::from_layers(&parsed.config, env)
    }

    /// Resolves configuration from already parsed flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer is malformed.
    pub fn from_layers<E>(args: &ConfigArgs, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(&format!("{ENV_PREFIX}{name}"));
        let config_path = args
            .config_path
            .clone()
            .or_else(|| lookup("CONFIG_PATH").map(Utf8PathBuf::from));
        let mut config = Self {
            config_path,
            ..Self::default()
        };
        if let Some(path) = config.config_path.clone() {
            config.apply_file(read_file_layer(&path)?)?;
        }

        config.apply_env(&lookup)?;
        config.apply_args(args)?;
        Ok(config)
    }

    fn apply_file(&mut self, layer: FileLayer) -> Result<(), ConfigError> {
        if let Some(endpoint) = layer.rpc_endpoint {
            self.rpc_endpoint = parse_endpoint(&endpoint)?;
        }
        if let Some(filter) = layer.log_filter {
            self.log_filter = filter;
        }
        if let Some(format) = layer.log_format {
            self.log_format = parse_log_format(&format)?;
        }
        if let Some(path) = layer.app_config {
            self.app_config = Some(path);
        }
        if let Some(strict) = layer.strict_lifecycle {
            self.strict_lifecycle = strict;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(endpoint) = lookup("RPC_ENDPOINT") {
            self.rpc_endpoint = parse_endpoint(&endpoint)?;
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            self.log_filter = filter;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = parse_log_format(&format)?;
        }
        if let Some(path) = lookup("APP_CONFIG") {
            self.app_config = Some(Utf8PathBuf::from(path));
        }
        if let Some(strict) = lookup("STRICT_LIFECYCLE") {
            self.strict_lifecycle = parse_bool("STRICT_LIFECYCLE", &strict)?;
        }
        Ok(())
    }

    fn apply_args(&mut self, args: &ConfigArgs) -> Result<(), ConfigError> {
        if let Some(endpoint) = &args.rpc_endpoint {
            self.rpc_endpoint = parse_endpoint(endpoint)?;
        }
        if let Some(filter) = &args.log_filter {
            self.log_filter.clone_from(filter);
        }
        if let Some(format) = &args.log_format {
            self.log_format = parse_log_format(format)?;
        }
        if let Some(path) = &args.app_config {
            self.app_config = Some(path.clone());
        }
        if args.strict_lifecycle {
            self.strict_lifecycle = true;
        }
        Ok(())
    }

    /// Configuration file that was read, if any.
    #[must_use]
    pub fn config_path(&self) -> Option<&Utf8Path> {
        self.config_path.as_deref()
    }

    /// JSON-RPC endpoint.
    #[must_use]
    pub const fn rpc_endpoint(&self) -> &RpcEndpoint {
        &self.rpc_endpoint
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// JSON application configuration document.
    #[must_use]
    pub fn app_config(&self) -> Option<&Utf8Path> {
        self.app_config.as_deref()
    }

    /// Whether out-of-order lifecycle requests are rejected.
    #[must_use]
    pub const fn strict_lifecycle(&self) -> bool {
        self.strict_lifecycle
    }

    /// Replaces the JSON-RPC endpoint.
    #[must_use]
    pub fn with_rpc_endpoint(mut self, endpoint: RpcEndpoint) -> Self {
        self.rpc_endpoint = endpoint;
        self
    }

    /// Replaces the application configuration path.
    #[must_use]
    pub fn with_app_config(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.app_config = Some(path.into());
        self
    }

    /// Replaces the lifecycle strictness.
    #[must_use]
    pub const fn with_strict_lifecycle(mut self, strict: bool) -> Self {
        self.strict_lifecycle = strict;
        self
    }
}

fn read_file_layer(path: &Utf8Path) -> Result<FileLayer, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn parse_endpoint(value: &str) -> Result<RpcEndpoint, ConfigError> {
    value.parse().map_err(|source| ConfigError::Endpoint {
        value: value.to_owned(),
        source,
    })
}

fn parse_log_format(value: &str) -> Result<LogFormat, ConfigError> {
    value.parse().map_err(|source| ConfigError::LogFormat {
        value: value.to_owned(),
        source,
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Bool {
            name,
            value: value.to_owned(),
        }),
    }
}

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line flags were rejected.
    #[error(transparent)]
    Cli(clap::Error),
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    ReadFile {
        /// File that failed.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration file '{path}': {source}")]
    ParseFile {
        /// File that failed.
        path: Utf8PathBuf,
        /// Underlying parse failure.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// An endpoint value is malformed.
    #[error("invalid JSON-RPC endpoint '{value}': {source}")]
    Endpoint {
        /// Offending value.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: EndpointParseError,
    },
    /// A log format value is unknown.
    #[error("invalid log format '{value}': {source}")]
    LogFormat {
        /// Offending value.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: LogFormatParseError,
    },
    /// A boolean environment variable is malformed.
    #[error("{ENV_PREFIX}{name} must be a boolean, got '{value}'")]
    Bool {
        /// Variable name without the prefix.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

impl ConfigError {
    /// Returns true when the error is clap's help or version output.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Self::Cli(error) if matches!(
                error.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            )
        )
    }
}
