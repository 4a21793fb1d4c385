//! Command-line argument definitions.

use camino::Utf8PathBuf;
use clap::Parser;

/// Sends one command to the bastion daemon and prints the JSON result.
#[derive(Parser, Debug)]
#[command(name = "bastion", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// TOML configuration file shared with the daemon.
    #[arg(long, value_name = "PATH")]
    pub(crate) config_path: Option<Utf8PathBuf>,
    /// JSON-RPC endpoint of the daemon as `tcp://host:port`.
    #[arg(long, value_name = "URL")]
    pub(crate) rpc_endpoint: Option<String>,
    /// Seconds to keep retrying the connection; `-1` waits forever.
    #[arg(long, value_name = "SECONDS", default_value_t = 10, allow_negative_numbers = true)]
    pub(crate) timeout: i64,
    /// Prints the result on a single line.
    #[arg(long)]
    pub(crate) compact: bool,
    /// Command executed by the daemon's service manager.
    #[arg(value_name = "COMMAND")]
    pub(crate) command: String,
    /// Command parameters as a JSON object or array.
    #[arg(value_name = "PARAMS_JSON")]
    pub(crate) params: Option<String>,
}
