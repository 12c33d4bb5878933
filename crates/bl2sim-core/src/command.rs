//! Macro command parsing.
//!
//! Macros are plain text, one command per line. Blank lines and lines
//! starting with `#` are skipped. Commands the simulation does not know are
//! returned as [`Command::Unknown`] so the session can log them and carry
//! on.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed arguments to a known command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: String,
        argument: &'static str,
    },

    #[error("{command}: '{value}' is not a valid {expected}")]
    InvalidArgument {
        command: String,
        value: String,
        expected: &'static str,
    },
}

/// A parsed macro command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/run/setFileName <name>`
    SetFileName(String),
    /// `/run/numberOfThreads <n>`
    NumberOfThreads(usize),
    /// `/run/initialize`
    Initialize,
    /// `/run/beamOn <n>`
    BeamOn(u64),
    /// `/geometry/<module>/<option> <value>`
    Configure {
        module: String,
        option: String,
        value: String,
    },
    /// `/control/execute <file>`
    Execute(PathBuf),
    /// `exit`
    Exit,
    /// Visualisation and verbosity commands, accepted and ignored.
    Ignored(String),
    Unknown(String),
}

const IGNORED_PREFIXES: &[&str] = &[
    "/vis/",
    "/tracking/",
    "/control/verbose",
    "/control/saveHistory",
    "/run/verbose",
    "/run/printProgress",
    "/event/verbose",
];

/// Parse one macro line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (path, args) = match line.split_once(char::is_whitespace) {
        Some((path, args)) => (path, args.trim()),
        None => (line, ""),
    };

    let command = match path {
        "exit" => Command::Exit,
        "/run/setFileName" => Command::SetFileName(required(path, args, "file name")?.to_string()),
        "/run/numberOfThreads" => {
            Command::NumberOfThreads(parse_number(path, required(path, args, "threads")?)?)
        }
        "/run/initialize" => Command::Initialize,
        "/run/beamOn" => Command::BeamOn(parse_number(path, required(path, args, "events")?)?),
        "/control/execute" => Command::Execute(PathBuf::from(required(path, args, "macro file")?)),
        _ => {
            if let Some(rest) = path.strip_prefix("/geometry/") {
                match rest.split_once('/') {
                    Some((module, option)) if !module.is_empty() && !option.is_empty() => {
                        Command::Configure {
                            module: module.to_string(),
                            option: option.to_string(),
                            value: required(path, args, "value")?.to_string(),
                        }
                    }
                    _ => Command::Unknown(line.to_string()),
                }
            } else if IGNORED_PREFIXES.iter().any(|p| path.starts_with(p)) {
                Command::Ignored(line.to_string())
            } else {
                Command::Unknown(line.to_string())
            }
        }
    };
    Ok(Some(command))
}

fn required<'a>(command: &str, args: &'a str, argument: &'static str) -> Result<&'a str, CommandError> {
    let first = args.split_whitespace().next();
    first.ok_or_else(|| CommandError::MissingArgument {
        command: command.to_string(),
        argument,
    })
}

fn parse_number<T: std::str::FromStr>(command: &str, value: &str) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidArgument {
        command: command.to_string(),
        value: value.to_string(),
        expected: "non-negative integer",
    })
}
