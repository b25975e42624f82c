//! CLI command implementations for Swarm.

pub(crate) mod determinism;
pub(crate) mod eval;
pub(crate) mod requirements;
pub(crate) mod run;

mod output;

use clap::ValueEnum;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use swarm::{Program, Term};

/// Output format shared by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {e}"))
    }
}

impl From<swarm::SessionError> for CliError {
    fn from(e: swarm::SessionError) -> Self {
        Self::new(e.to_string())
    }
}

/// Read an elaborated program term from a JSON file.
fn read_program(path: &Path) -> Result<Program, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::new(format!("Failed to read {}: {e}", path.display())))?;
    let term: Term = serde_json::from_str(&text)
        .map_err(|e| CliError::new(format!("Failed to parse {}: {e}", path.display())))?;
    Ok(Program::new(term))
}

/// Print a value as pretty JSON.
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
    println!("{json}");
    Ok(())
}
