//! CLI entrypoint for the bastion agent.
//!
//! The binary delegates to [`bastion_cli::run`], which resolves the daemon
//! endpoint, sends one command and prints its result.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    bastion_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
