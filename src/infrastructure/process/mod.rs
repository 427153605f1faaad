//! External process execution on tokio.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::domain::errors::ProcessError;
use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec, ProcessExit};

/// [`CommandRunner`] that spawns real child processes
///
/// The child is killed when its timeout elapses; output produced before the
/// kill is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip_all, fields(command = %command.display()))]
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        debug!(
            program = %command.program,
            args = ?command.args,
            cwd = ?command.cwd,
            timeout_secs = command.timeout.as_secs(),
            "Launching process"
        );

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(command.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ProcessError::Io {
                program: command.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(timeout_secs = command.timeout.as_secs(), "Process timed out, killed");
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit: ProcessExit::TimedOut(command.timeout),
                });
            }
        };

        let exit = output
            .status
            .code()
            .map_or(ProcessExit::Terminated, ProcessExit::Code);
        debug!(exit = ?exit, "Process finished");

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit,
        })
    }
}
