use crate::endpoint::RpcEndpoint;
use crate::logging::LogFormat;

/// Default host the JSON-RPC endpoint binds to and dials.
pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

/// Default TCP port of the JSON-RPC endpoint.
pub const DEFAULT_RPC_PORT: u16 = 9780;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix of the environment variables read by [`crate::Config`].
pub const ENV_PREFIX: &str = "BASTION_";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Endpoint the daemon listens on when nothing overrides it.
#[must_use]
pub fn default_rpc_endpoint() -> RpcEndpoint {
    RpcEndpoint::new(DEFAULT_RPC_HOST, DEFAULT_RPC_PORT)
}
