//! Domain errors for the dependency resolution loop.
//!
//! Configuration and collaborator errors are the only hard stops; test-level
//! and runner-level failures are data carried by `ValidationOutcome`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::models::requirement::RequirementParseError;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown validation strategy: {0}. Must be one of: script, pytest, pytest_with_smoke_test")]
    UnknownValidationStrategy(String),

    #[error("Unknown pass strategy: {0}. Must be one of: carry_over, reset, widen")]
    UnknownPassStrategy(String),

    #[error("Invalid max_run_passes: {0}. Must be at least 1")]
    InvalidMaxRunPasses(u32),

    #[error("Validation target cannot be empty")]
    EmptyValidationTarget,

    #[error("Invalid timeout: {0} must be greater than 0")]
    InvalidTimeout(&'static str),

    #[error("Path option {0} cannot be empty")]
    EmptyPath(&'static str),

    #[error("Path options {first} and {second} both point to {path}")]
    PathCollision {
        first: &'static str,
        second: &'static str,
        path: PathBuf,
    },

    #[error("Python executable cannot be empty")]
    EmptyPythonExecutable,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Invalid primary requirements in {path}: {source}")]
    InvalidPrimaryRequirements {
        path: PathBuf,
        #[source]
        source: RequirementParseError,
    },

    #[error("Failed to read requirements file {path}: {source}")]
    ReadRequirements {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract configuration: {0}")]
    Extract(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

/// Failures of the external-process primitive itself
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to collect output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Environment mutator failures (installer unreachable or crashed)
#[derive(Error, Debug)]
pub enum MutatorError {
    #[error("Failed to write requirements file {path}: {source}")]
    WriteRequirements {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Installer could not run: {0}")]
    Process(#[from] ProcessError),

    #[error("Installer exited with code {code}: {output}")]
    InstallFailed { code: i32, output: String },

    #[error("Installer terminated by signal: {output}")]
    Terminated { output: String },

    #[error("Installer timed out after {0:?}")]
    TimedOut(Duration),
}

/// Repair oracle failures
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Request(String),

    #[error("Oracle returned no usable text")]
    EmptyResponse,

    #[error("Oracle proposal could not be parsed: {0}")]
    MalformedProposal(String),
}

/// Validation harness failures that prevent producing an outcome at all
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Validation process could not run: {0}")]
    Launch(#[from] ProcessError),

    #[error("Could not resolve smoke test script {path}: {source}")]
    ScriptPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run artifact persistence failures
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize run history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Unrecoverable collaborator failure that ends a run in the fatal state
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Environment mutation failed: {0}")]
    Mutator(#[from] MutatorError),

    #[error("Repair oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Validation could not run: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_messages_nest() {
        let err: CollaboratorError = OracleError::EmptyResponse.into();
        assert_eq!(
            err.to_string(),
            "Repair oracle failed: Oracle returned no usable text"
        );

        let err: CollaboratorError = MutatorError::InstallFailed {
            code: 1,
            output: "No matching distribution".to_string(),
        }
        .into();
        assert!(err.to_string().contains("exited with code 1"));
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let err = ConfigError::MissingCredential("ANTHROPIC_API_KEY".to_string());
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
