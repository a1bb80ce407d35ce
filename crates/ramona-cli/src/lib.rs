//! Console client for the Ramona process supervisor.
//!
//! The crate owns the call protocol's client half: a [`Client`] that opens
//! the daemon connection lazily (launching the daemon on demand), sends one
//! framed request and resolves the framed response into a result or a
//! classified [`ClientError`]. The [`run`] entry point wraps it in a command
//! line and maps every failure onto a process exit code. Without a command it
//! starts an interactive console that reuses one connection for every line.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::debug;

mod cli;
mod client;
mod config;
mod console;
mod errors;
mod launcher;
mod telemetry;

pub use client::{
    AutoStartSettings, Client, ClientError, ConnectPolicy, Connection, ConnectionManager,
    Connector, EndpointConnector, ErrorKind, Transport,
};
pub use launcher::{DaemonLauncher, LaunchError, ProcessLauncher};

use cli::{Cli, CliCommand, DaemonCommand};
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use errors::AppError;

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: This list must be kept in sync with the fields of
/// `ramona_config::Config`. When adding new configuration options, update
/// this array accordingly.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--server-uri",
    "--log-filter",
    "--log-format",
    "--daemon-binary",
    "--call-timeout-ms",
    "--poll-interval-ms",
    "--poll-attempts",
];

/// Console flags that take their value as the following token.
const CONSOLE_VALUE_FLAGS: &[&str] = &["--timeout-ms"];

/// Bundles the IO streams provided to the console runtime.
pub(crate) struct IoStreams<'a, R: BufRead, W: Write, E: Write> {
    pub(crate) stdin: &'a mut R,
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, R: BufRead, W: Write, E: Write> IoStreams<'a, R, W, E> {
    pub(crate) fn new(stdin: &'a mut R, stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
        }
    }
}

/// Runs the console using the provided arguments and IO handles.
///
/// Call results are written to `stdout`; diagnostics and failures go to
/// `stderr`. Console lines are read from `stdin` when no command is given.
/// The returned exit code classifies the outcome.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdin, stdout, stderr);
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, R, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, R, W, E>,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    match execute(&args, io, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if error.is_informational() => {
            let _ = write!(io.stdout, "{error}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(io.stderr, "{error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn execute<R, W, E, L>(
    args: &[OsString],
    io: &mut IoStreams<'_, R, W, E>,
    loader: &L,
) -> Result<(), AppError>
where
    R: BufRead,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let split = split_config_arguments(args);
    let cli = Cli::try_parse_from(&split.command_arguments).map_err(AppError::CliUsage)?;
    let config = loader.load(&split.config_arguments)?;
    telemetry::initialise(&config, cli.verbosity())?;

    let endpoint = config.server_uri().clone();
    let launcher = ProcessLauncher::new(config.daemon_binary.clone(), endpoint.clone());
    let client = Client::for_endpoint(endpoint, launcher)
        .with_auto_start(AutoStartSettings::from(&config))
        .with_default_timeout(config.call_timeout());
    let timeout = cli.timeout_ms.map(Duration::from_millis);

    match cli.command {
        None | Some(CliCommand::Console) => console::run_session(
            &client,
            &mut *io.stdin,
            &mut *io.stdout,
            &mut *io.stderr,
            timeout,
        ),
        Some(CliCommand::Daemon(command)) => call_once(&client, &command, &mut *io.stdout, timeout),
    }
}

fn call_once<C, L, W>(
    client: &Client<C, L>,
    command: &DaemonCommand,
    stdout: &mut W,
    timeout: Option<Duration>,
) -> Result<(), AppError>
where
    C: Connector,
    L: DaemonLauncher,
    W: Write,
{
    let invocation = command.invocation()?;
    debug!(
        call_id = invocation.call_id,
        policy = ?invocation.policy,
        endpoint = %client.endpoint(),
        "issuing call"
    );
    let result = client.invoke(
        invocation.call_id,
        &invocation.payload,
        invocation.policy,
        timeout,
    )?;
    write_result(stdout, &result).map_err(AppError::WriteOutput)
}

/// Writes the call result verbatim, terminated by a newline.
fn write_result<W: Write>(stdout: &mut W, result: &[u8]) -> std::io::Result<()> {
    if !result.is_empty() {
        stdout.write_all(result)?;
        if !result.ends_with(b"\n") {
            stdout.write_all(b"\n")?;
        }
    }
    stdout.flush()
}

#[cfg(test)]
mod tests;
