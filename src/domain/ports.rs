use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::errors::{MutatorError, OracleError, ProcessError, RecorderError, ValidationError};
use super::models::{
    RequirementSet, ResolutionConfig, RunHistory, RunReport, ValidationOutcome,
};

/// One external process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Command line as it would be typed, for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited normally with a status code
    Code(i32),
    /// Killed by a signal before reporting a status code
    Terminated,
    /// Killed after exceeding the configured timeout
    TimedOut(Duration),
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: ProcessExit,
}

impl CommandOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }

    pub const fn success(&self) -> bool {
        matches!(self.exit, ProcessExit::Code(0))
    }
}

/// Runs one external process and waits for it to finish
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or timeout; only launch/IO failures are errors
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// Installs a requirement set into the execution environment
#[async_trait]
pub trait EnvironmentMutator: Send + Sync {
    async fn apply(&self, requirements: &RequirementSet) -> Result<(), MutatorError>;
}

/// Judges the currently installed environment
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, config: &ResolutionConfig)
        -> Result<ValidationOutcome, ValidationError>;
}

/// Failure information handed to the repair oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub reason: String,
    pub output_excerpt: String,
    pub pinned: RequirementSet,
    pub pass_index: u32,
    pub backtrack_index: u32,
}

/// Proposes a revised requirement set from failure context
#[async_trait]
pub trait RepairOracle: Send + Sync {
    async fn propose(
        &self,
        previous: &RequirementSet,
        context: &FailureContext,
    ) -> Result<RequirementSet, OracleError>;
}

/// Persists run artifacts
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Called after every appended attempt
    async fn checkpoint(&self, history: &RunHistory) -> Result<(), RecorderError>;

    /// Called once with the terminal report
    async fn finish(&self, report: &RunReport) -> Result<(), RecorderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder_and_display() {
        let spec = CommandSpec::new("python", Duration::from_secs(5))
            .args(["-m", "pytest"])
            .arg("tests")
            .current_dir("/tmp");
        assert_eq!(spec.display(), "python -m pytest tests");
        assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_combined_output_order() {
        let output = CommandOutput {
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            exit: ProcessExit::Code(0),
        };
        assert_eq!(output.combined(), "out\nerr\n");
        assert!(output.success());
    }
}
