//! Command-line interface for the bastion agent.
//!
//! `bastion [--rpc-endpoint tcp://host:port] <COMMAND> [PARAMS_JSON]` sends
//! one JSON-RPC request to the daemon and prints the JSON result. Failures
//! are reported on stderr with the error kind and description, and the
//! process exits non-zero.
//!
//! The endpoint is layered the same way as the daemon's: the flag wins over
//! `BASTION_RPC_ENDPOINT`, which wins over the TOML file and the default.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use bastion_config::{Config, ConfigArgs};
use bastion_core::{CoreError, Variant};
use bastion_rpc::JsonRpcClient;
use clap::Parser;

mod cli;
mod errors;

use cli::Cli;
use errors::AppError;

const USAGE_EXIT_CODE: u8 = 2;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_env(args, |key| std::env::var(key).ok(), stdout, stderr)
}

/// Runs the CLI, reading environment variables through `env`.
#[must_use]
pub fn run_with_env<I, F, W, E>(args: I, env: F, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    F: Fn(&str) -> Option<String>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            return match write!(stdout, "{}", error.render()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };
    match execute(&cli, &env).and_then(|result| print_result(stdout, &result, cli.compact)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(stderr, &error),
    }
}

fn execute<F>(cli: &Cli, env: &F) -> Result<Variant, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let layers = ConfigArgs {
        config_path: cli.config_path.clone(),
        rpc_endpoint: cli.rpc_endpoint.clone(),
        ..ConfigArgs::default()
    };
    let config = Config::from_layers(&layers, env)
        .map_err(|source| AppError::LoadConfiguration { source })?;
    let timeout = timeout(cli.timeout)?;
    let params = match cli.params.as_deref() {
        None => Variant::Null,
        Some(text) => Variant::parse_json(text).map_err(|source| AppError::Params { source })?,
    };
    let endpoint = config.rpc_endpoint();
    JsonRpcClient::new(endpoint.host(), endpoint.port(), timeout)
        .call(&cli.command, &params)
        .map_err(|source: CoreError| AppError::Command { source })
}

fn timeout(seconds: i64) -> Result<Option<Duration>, AppError> {
    if seconds == -1 {
        return Ok(None);
    }
    u64::try_from(seconds)
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| AppError::Timeout { value: seconds })
}

fn print_result<W: Write>(stdout: &mut W, result: &Variant, compact: bool) -> Result<(), AppError> {
    let json = result.to_json();
    let written = if compact {
        serde_json::to_writer(&mut *stdout, &json)
    } else {
        serde_json::to_writer_pretty(&mut *stdout, &json)
    };
    written
        .map_err(std::io::Error::from)
        .and_then(|()| writeln!(stdout))
        .map_err(|source| AppError::Output { source })
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    let code = match error {
        AppError::CliUsage(_) => ExitCode::from(USAGE_EXIT_CODE),
        _ => ExitCode::FAILURE,
    };
    if writeln!(stderr, "bastion: {error}").is_err() {
        return ExitCode::FAILURE;
    }
    code
}
