//! pip-backed environment mutation.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::domain::errors::MutatorError;
use crate::domain::models::{Config, RequirementSet};
use crate::domain::ports::{CommandRunner, CommandSpec, EnvironmentMutator, ProcessExit};
use crate::infrastructure::artifacts::write_replace;

/// Characters of installer output kept in error messages
const ERROR_OUTPUT_CHARS: usize = 2000;

/// Writes the generated requirements file and installs it with pip
pub struct PipEnvironmentMutator {
    runner: Arc<dyn CommandRunner>,
    requirements_file: PathBuf,
    python_executable: String,
    pip_args: Vec<String>,
    install_timeout: Duration,
}

impl PipEnvironmentMutator {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            requirements_file: config.requirements_file.clone(),
            python_executable: config.environment.python_executable.clone(),
            pip_args: config.environment.pip_args.clone(),
            install_timeout: Duration::from_secs(config.environment.install_timeout_secs),
        }
    }

    fn install_command(&self) -> CommandSpec {
        CommandSpec::new(&self.python_executable, self.install_timeout)
            .args(["-m", "pip", "install", "-r"])
            .arg(self.requirements_file.to_string_lossy())
            .args(self.pip_args.iter().cloned())
    }
}

#[async_trait]
impl EnvironmentMutator for PipEnvironmentMutator {
    #[instrument(skip_all, fields(file = %self.requirements_file.display(), requirements = requirements.len()))]
    async fn apply(&self, requirements: &RequirementSet) -> Result<(), MutatorError> {
        write_replace(&self.requirements_file, requirements.to_file_contents().as_bytes())
            .await
            .map_err(|source| MutatorError::WriteRequirements {
                path: self.requirements_file.clone(),
                source,
            })?;

        let output = self.runner.run(&self.install_command()).await?;

        match output.exit {
            ProcessExit::Code(0) => {
                info!("Requirements installed");
                Ok(())
            }
            ProcessExit::Code(code) => {
                warn!(exit_code = code, "pip install failed");
                Err(MutatorError::InstallFailed {
                    code,
                    output: tail_chars(&output.combined(), ERROR_OUTPUT_CHARS),
                })
            }
            ProcessExit::Terminated => Err(MutatorError::Terminated {
                output: tail_chars(&output.combined(), ERROR_OUTPUT_CHARS),
            }),
            ProcessExit::TimedOut(limit) => Err(MutatorError::TimedOut(limit)),
        }
    }
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(max_chars)).collect()
}
