//! CLI entrypoint for the Ramona console.
//!
//! The binary delegates to [`ramona_cli::run`], which loads configuration,
//! parses the command, performs calls against the supervisor daemon and
//! reports the outcome through the exit code.

use std::io::{self, StderrLock, StdinLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin: StdinLock<'static> = io::stdin().lock();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    ramona_cli::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
