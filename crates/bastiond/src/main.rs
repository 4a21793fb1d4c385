//! Entry point for the `bastiond` binary.

use std::io::{self, Write};
use std::process::ExitCode;

use bastion_config::ConfigError;
use bastiond::{LaunchError, run_daemon};

fn main() -> ExitCode {
    match run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_failure(&error),
    }
}

fn report_failure(error: &LaunchError) -> ExitCode {
    if let Some(config_error @ ConfigError::Cli(cli)) = error.config_error() {
        if cli.print().is_err() {
            return ExitCode::FAILURE;
        }
        return if config_error.is_informational() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(2)
        };
    }
    let mut stderr = io::stderr().lock();
    if writeln!(stderr, "bastiond: {error}").is_err() {
        return ExitCode::FAILURE;
    }
    ExitCode::FAILURE
}
