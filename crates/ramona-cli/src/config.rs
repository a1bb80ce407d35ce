//! Configuration loading helpers for the console.
//!
//! Configuration flags are split off the front of the command line before the
//! remaining tokens are parsed as a command, so `ortho_config` only ever sees
//! the flags it understands.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use ramona_config::Config;

use crate::{AppError, CONFIG_CLI_FLAGS, CONSOLE_VALUE_FLAGS};

pub(crate) trait ConfigLoader {
    /// Loads configuration for the console.
    ///
    /// # Flag Ordering
    ///
    /// Configuration flags (listed in `CONFIG_CLI_FLAGS`) must appear before
    /// the command name. Anything after it belongs to the command.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Loads defaults, the configuration file, environment and flags.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Keep { needs_value: bool },
    Stop,
}

fn process_config_flag(argument: &OsStr) -> FlagAction {
    let argument_text = argument.to_string_lossy();
    if argument_text == "--" || !argument_text.starts_with('-') {
        return FlagAction::Stop;
    }

    let (flag, has_inline_value) = match argument_text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (argument_text.as_ref(), false),
    };

    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Keep {
            needs_value: !has_inline_value && CONSOLE_VALUE_FLAGS.contains(&flag),
        }
    }
}

/// Command-line tokens separated by destination. Both halves keep the
/// program name as their first element.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut tokens = args.iter();
    let Some(program) = tokens.next() else {
        return ConfigArgumentSplit::default();
    };

    let mut split = ConfigArgumentSplit {
        config_arguments: vec![program.clone()],
        command_arguments: vec![program.clone()],
    };

    while let Some(argument) = tokens.next() {
        match process_config_flag(argument) {
            FlagAction::Include { needs_value } => {
                split.config_arguments.push(argument.clone());
                if needs_value && let Some(value) = tokens.next() {
                    split.config_arguments.push(value.clone());
                }
            }
            FlagAction::Keep { needs_value } => {
                split.command_arguments.push(argument.clone());
                if needs_value && let Some(value) = tokens.next() {
                    split.command_arguments.push(value.clone());
                }
            }
            FlagAction::Stop => {
                split.command_arguments.push(argument.clone());
                split.command_arguments.extend(tokens.cloned());
                break;
            }
        }
    }

    split
}
