//! Interactive console session.
//!
//! The session opens one connection up front and sends every command typed
//! afterwards over it with [`ConnectPolicy::Manual`]. A lost connection ends
//! the session; the daemon reporting an error for one command does not.

use std::io::{BufRead, Write};
use std::time::Duration;

use clap::Parser;
use tracing::debug;

use crate::cli::{ConsoleCommand, ConsoleLine};
use crate::client::{Client, ClientError, ConnectPolicy, Connector};
use crate::errors::{AppError, is_display_request};
use crate::launcher::DaemonLauncher;
use crate::write_result;

pub(crate) const PROMPT: &str = "ramona> ";

/// Runs the console until end of input, `exit`, or a lost connection.
pub(crate) fn run_session<C, L, R, W, E>(
    client: &Client<C, L>,
    input: &mut R,
    stdout: &mut W,
    stderr: &mut E,
    timeout: Option<Duration>,
) -> Result<(), AppError>
where
    C: Connector,
    L: DaemonLauncher,
    R: BufRead,
    W: Write,
    E: Write,
{
    if !client.connect()? {
        return Err(ClientError::ServerAbsent {
            endpoint: client.endpoint(),
        }
        .into());
    }
    debug!(endpoint = %client.endpoint(), "console session started");

    let mut line = String::new();
    loop {
        stdout
            .write_all(PROMPT.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(AppError::WriteOutput)?;
        line.clear();
        if input.read_line(&mut line).map_err(AppError::ReadInput)? == 0 {
            writeln!(stdout).map_err(AppError::WriteOutput)?;
            break;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        let command = match ConsoleLine::try_parse_from(words.iter().copied()) {
            Ok(parsed) => parsed.command,
            Err(error) if is_display_request(&error) => {
                write!(stdout, "{error}").map_err(AppError::WriteOutput)?;
                continue;
            }
            Err(error) => {
                let _ = write!(stderr, "{error}");
                continue;
            }
        };
        let ConsoleCommand::Daemon(command) = command else {
            break;
        };

        let invocation = command.invocation()?;
        match client.invoke(
            invocation.call_id,
            &invocation.payload,
            ConnectPolicy::Manual,
            timeout,
        ) {
            Ok(result) => write_result(stdout, &result).map_err(AppError::WriteOutput)?,
            Err(error) if client.is_connected() => {
                let _ = writeln!(stderr, "{error}");
            }
            Err(error) => return Err(error.into()),
        }
    }
    debug!("console session ended");
    Ok(())
}
