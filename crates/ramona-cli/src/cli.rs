//! Command-line surface of the console.

use clap::{Args, Parser, Subcommand, ValueEnum};
use ramona_protocol::CallId;
use serde::Serialize;

use crate::AppError;
use crate::client::ConnectPolicy;
use crate::telemetry::Verbosity;

#[derive(Parser, Debug)]
#[command(
    name = "ramona",
    version,
    about = "Control programs managed by the Ramona supervisor daemon"
)]
pub(crate) struct Cli {
    /// Only report errors.
    #[arg(short = 'S', long, conflicts_with = "debug")]
    pub(crate) silent: bool,
    /// Enable debug diagnostics.
    #[arg(short = 'd', long)]
    pub(crate) debug: bool,
    /// Give up on the call after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub(crate) timeout_ms: Option<u64>,
    /// Command to run; an interactive console when omitted.
    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

impl Cli {
    pub(crate) const fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.silent {
            Verbosity::Silent
        } else {
            Verbosity::Configured
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Read commands line by line over a single daemon connection.
    Console,
    #[command(flatten)]
    Daemon(DaemonCommand),
}

/// One line typed into the console.
#[derive(Parser, Debug)]
#[command(name = "ramona", no_binary_name = true, disable_version_flag = true)]
pub(crate) struct ConsoleLine {
    #[command(subcommand)]
    pub(crate) command: ConsoleCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConsoleCommand {
    /// Leave the console.
    #[command(visible_alias = "quit")]
    Exit,
    #[command(flatten)]
    Daemon(DaemonCommand),
}

/// Commands that become a single call to the daemon.
#[derive(Subcommand, Debug)]
pub(crate) enum DaemonCommand {
    /// Start programs, launching the daemon first if it is not running.
    Start(ProgramArgs),
    /// Stop programs.
    Stop(ProgramArgs),
    /// Restart programs.
    Restart(ProgramArgs),
    /// Show the state of programs.
    Status(StatusArgs),
    /// Send a raw call to the daemon.
    Call(CallArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ProgramArgs {
    /// Programs to act on; all programs when omitted.
    pub(crate) programs: Vec<String>,
    /// Act even when the program is in an unexpected state.
    #[arg(short, long)]
    pub(crate) force: bool,
}

#[derive(Args, Debug)]
pub(crate) struct StatusArgs {
    /// Programs to report; all programs when omitted.
    pub(crate) programs: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct CallArgs {
    /// Numeric call selector.
    pub(crate) call_id: u32,
    /// Payload sent verbatim.
    pub(crate) payload: Option<String>,
    /// How to reach the daemon.
    #[arg(long, value_enum, default_value_t = PolicyArg::AutoConnect)]
    pub(crate) policy: PolicyArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PolicyArg {
    /// Fail if the daemon is not running.
    AutoConnect,
    /// Launch the daemon if it is not running.
    AutoStart,
}

impl From<PolicyArg> for ConnectPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::AutoConnect => Self::AutoConnect,
            PolicyArg::AutoStart => Self::AutoStart,
        }
    }
}

/// Parameters carried by the program-management calls.
#[derive(Serialize, Debug)]
struct ProgramsPayload<'a> {
    programs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    force: Option<bool>,
}

/// A call ready to be sent.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub(crate) call_id: u32,
    pub(crate) payload: Vec<u8>,
    pub(crate) policy: ConnectPolicy,
}

impl DaemonCommand {
    pub(crate) fn invocation(&self) -> Result<Invocation, AppError> {
        match self {
            Self::Start(args) => programs_call(CallId::Start, args, ConnectPolicy::AutoStart),
            Self::Stop(args) => programs_call(CallId::Stop, args, ConnectPolicy::AutoConnect),
            Self::Restart(args) => programs_call(CallId::Restart, args, ConnectPolicy::AutoConnect),
            Self::Status(args) => Ok(Invocation {
                call_id: CallId::Status.code(),
                payload: encode_payload(&ProgramsPayload {
                    programs: &args.programs,
                    force: None,
                })?,
                policy: ConnectPolicy::AutoConnect,
            }),
            Self::Call(args) => Ok(Invocation {
                call_id: args.call_id,
                payload: args
                    .payload
                    .as_deref()
                    .map(str::as_bytes)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
                policy: args.policy.into(),
            }),
        }
    }
}

fn programs_call(
    call: CallId,
    args: &ProgramArgs,
    policy: ConnectPolicy,
) -> Result<Invocation, AppError> {
    Ok(Invocation {
        call_id: call.code(),
        payload: encode_payload(&ProgramsPayload {
            programs: &args.programs,
            force: Some(args.force),
        })?,
        policy,
    })
}

fn encode_payload(payload: &ProgramsPayload<'_>) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(payload).map_err(AppError::SerialisePayload)
}
