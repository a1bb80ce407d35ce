//! Error types and exit codes for the console entry point.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::client::ClientError;
use crate::telemetry::TelemetryError;

/// Command line usage error (`EX_USAGE`).
pub(crate) const EXIT_USAGE: u8 = 64;
/// Configuration error (`EX_CONFIG`).
pub(crate) const EXIT_CONFIG: u8 = 78;
/// Anything without a more specific code.
pub(crate) const EXIT_GENERIC: u8 = 100;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise diagnostics: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to serialise call parameters: {0}")]
    SerialisePayload(#[source] serde_json::Error),
    #[error("failed to write call result: {0}")]
    WriteOutput(#[source] io::Error),
    #[error("failed to read console input: {0}")]
    ReadInput(#[source] io::Error),
    #[error(transparent)]
    Call(#[from] ClientError),
}

impl AppError {
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::Call(error) => error.kind().exit_code(),
            Self::CliUsage(_) => EXIT_USAGE,
            Self::LoadConfiguration(_) | Self::Telemetry(_) => EXIT_CONFIG,
            Self::SerialisePayload(_) | Self::WriteOutput(_) | Self::ReadInput(_) => EXIT_GENERIC,
        }
    }

    /// Whether the error is clap asking to print help or version text.
    pub(crate) fn is_informational(&self) -> bool {
        matches!(self, Self::CliUsage(error) if is_display_request(error))
    }
}

/// Whether clap stopped parsing to show help or version text.
pub(crate) fn is_display_request(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
    )
}
