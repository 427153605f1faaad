//! Validation Harness
//!
//! Runs the configured validation strategy against the installed environment
//! and reduces it to a [`ValidationOutcome`]:
//! - `script`: a single smoke-test process, judged by exit code
//! - `pytest`: the full suite, judged by the failure threshold
//! - `pytest_with_smoke_test`: the smoke test as a fail-fast gate, then the suite

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::errors::ValidationError;
use crate::domain::models::{
    EnvironmentConfig, FailureKind, ResolutionConfig, ValidationOutcome, ValidationStrategy,
};
use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec, ProcessExit, Validator};
use crate::infrastructure::logging::CiGroup;
use crate::services::failure_summarizer::{find_summary_line, summarize};

/// Where validation processes run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    /// Interpreter of the environment under test
    pub python_executable: String,
    /// Project root; pytest runs here and the smoke target is resolved against it
    pub working_dir: PathBuf,
}

impl ExecutionEnvironment {
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        Self {
            python_executable: config.python_executable.clone(),
            working_dir: config.working_dir.clone(),
        }
    }
}

/// Strategy dispatcher producing uniform validation outcomes
pub struct ValidationHarness {
    runner: Arc<dyn CommandRunner>,
    env: ExecutionEnvironment,
    ci_groups: bool,
}

impl ValidationHarness {
    pub fn new(runner: Arc<dyn CommandRunner>, env: ExecutionEnvironment) -> Self {
        Self {
            runner,
            env,
            ci_groups: false,
        }
    }

    /// Wrap each validation in `::group::` markers
    #[must_use]
    pub const fn with_ci_groups(mut self, enabled: bool) -> Self {
        self.ci_groups = enabled;
        self
    }

    /// Run the configured strategy once
    #[instrument(skip(self, config), fields(strategy = %config.validation_strategy))]
    pub async fn validate(
        &self,
        config: &ResolutionConfig,
    ) -> Result<ValidationOutcome, ValidationError> {
        let _group = CiGroup::open(self.ci_groups, "Running Validation");

        match config.validation_strategy {
            ValidationStrategy::Script => self.run_smoke_test(config).await,
            ValidationStrategy::Pytest => self.run_pytest_suite(config).await,
            ValidationStrategy::PytestWithSmokeTest => {
                let smoke = self.run_smoke_test(config).await?;
                if !smoke.success() {
                    return Ok(smoke);
                }
                self.run_pytest_suite(config).await
            }
        }
    }

    async fn run_smoke_test(
        &self,
        config: &ResolutionConfig,
    ) -> Result<ValidationOutcome, ValidationError> {
        info!("Running smoke test");

        let script = self.env.working_dir.join(&config.smoke_test_script);
        let script = std::path::absolute(&script)
            .map_err(|source| ValidationError::ScriptPath { path: script, source })?;

        let command = CommandSpec::new(&self.env.python_executable, config.validation_timeout)
            .arg(script.to_string_lossy())
            .current_dir(self.env.working_dir.join(&config.validation_target));

        let output = self.runner.run(&command).await?;
        let outcome = match output.exit {
            ProcessExit::Code(0) => {
                ValidationOutcome::passed("Smoke test passed.", output.combined(), None)
            }
            ProcessExit::Code(code) => ValidationOutcome::failed(
                FailureKind::ScriptFailed,
                format!("process failed with exit code {code}"),
                output.combined(),
                None,
            ),
            _ => abnormal_exit(&output),
        };

        if outcome.success() {
            info!("Smoke test passed");
        } else {
            warn!(reason = %outcome.reason(), stderr = %output.stderr, "Smoke test failed");
        }

        Ok(outcome)
    }

    async fn run_pytest_suite(
        &self,
        config: &ResolutionConfig,
    ) -> Result<ValidationOutcome, ValidationError> {
        info!(validation_target = %config.validation_target, "Running full pytest suite");

        let command = CommandSpec::new(&self.env.python_executable, config.validation_timeout)
            .args(["-m", "pytest"])
            .arg(&config.validation_target)
            .current_dir(&self.env.working_dir);

        let output = self.runner.run(&command).await?;
        let full_output = output.combined();

        let code = match output.exit {
            ProcessExit::Code(code) if (0..=1).contains(&code) => code,
            ProcessExit::Code(code) => {
                warn!(exit_code = code, "pytest itself failed");
                return Ok(ValidationOutcome::failed(
                    FailureKind::CriticalRunnerError,
                    format!("Critical pytest error (exit code {code})"),
                    full_output,
                    None,
                ));
            }
            _ => return Ok(abnormal_exit(&output)),
        };

        if code == 1 && find_summary_line(&full_output).is_none() {
            warn!("pytest reported failure without a summary line");
            return Ok(ValidationOutcome::failed(
                FailureKind::CriticalRunnerError,
                "Critical pytest error: exited with code 1 but printed no summary",
                full_output,
                None,
            ));
        }

        let summary = summarize(&full_output);
        let total_failures = summary.total_failures();

        if total_failures > config.acceptable_failure_threshold {
            warn!(
                total_failures,
                threshold = config.acceptable_failure_threshold,
                "Test failures exceeded threshold"
            );
            return Ok(ValidationOutcome::failed(
                FailureKind::ThresholdExceeded,
                format!("{total_failures} failures exceeded threshold"),
                full_output,
                Some(summary),
            ));
        }

        info!(%summary, "pytest suite accepted");
        Ok(ValidationOutcome::passed(
            summary.metrics_line(),
            full_output,
            Some(summary),
        ))
    }
}

/// Outcome for a process that never reported an exit code
fn abnormal_exit(output: &CommandOutput) -> ValidationOutcome {
    match output.exit {
        ProcessExit::TimedOut(limit) => ValidationOutcome::failed(
            FailureKind::TimedOut,
            format!("process timed out after {}s", limit.as_secs()),
            output.combined(),
            None,
        ),
        _ => ValidationOutcome::failed(
            FailureKind::CriticalRunnerError,
            "process terminated by signal",
            output.combined(),
            None,
        ),
    }
}

#[async_trait]
impl Validator for ValidationHarness {
    async fn validate(
        &self,
        config: &ResolutionConfig,
    ) -> Result<ValidationOutcome, ValidationError> {
        Self::validate(self, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ProcessError;
    use crate::domain::models::{Config, Count};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Runner that replays canned outputs and records every command
    struct ScriptedRunner {
        outputs: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<CommandOutput>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
            self.calls.lock().unwrap().push(command.clone());
            Ok(self
                .outputs
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra command"))
        }
    }

    fn exited(code: i32, stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit: ProcessExit::Code(code),
        }
    }

    fn resolution(strategy: &str, threshold: u32) -> ResolutionConfig {
        let mut config = Config::default();
        config.validation_config.kind = strategy.to_string();
        config.validation_config.target = "tests".to_string();
        config.acceptable_failure_threshold = threshold;
        ResolutionConfig::from_config(&config).unwrap()
    }

    fn harness(runner: Arc<ScriptedRunner>) -> ValidationHarness {
        ValidationHarness::new(
            runner,
            ExecutionEnvironment {
                python_executable: "python3".to_string(),
                working_dir: PathBuf::from("/work"),
            },
        )
    }

    #[tokio::test]
    async fn test_script_success() {
        let runner = ScriptedRunner::new(vec![exited(0, "ALL TESTS PASSED\n")]);
        let outcome = harness(runner.clone())
            .validate(&resolution("script", 0))
            .await
            .unwrap();

        assert!(outcome.success());
        assert!(outcome.metrics().is_none());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "python3");
        assert_eq!(calls[0].args, vec!["/work/validation_smoke.py".to_string()]);
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/work/tests")));
    }

    #[tokio::test]
    async fn test_script_failure_reports_exit_code() {
        let runner = ScriptedRunner::new(vec![CommandOutput {
            stdout: "Running Basic Test\n".to_string(),
            stderr: "ImportError: cannot import name 'pyplot'\n".to_string(),
            exit: ProcessExit::Code(1),
        }]);
        let outcome = harness(runner)
            .validate(&resolution("script", 0))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.reason(), "process failed with exit code 1");
        assert_eq!(outcome.failure(), Some(FailureKind::ScriptFailed));
        assert_eq!(
            outcome.raw_output(),
            "Running Basic Test\nImportError: cannot import name 'pyplot'\n"
        );
    }

    #[tokio::test]
    async fn test_pytest_critical_exit_ignores_summary() {
        let runner = ScriptedRunner::new(vec![exited(2, "== 10 passed in 1.0s ==\n")]);
        let outcome = harness(runner.clone())
            .validate(&resolution("pytest", 100))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert!(outcome.reason().contains("Critical pytest error"));
        assert_eq!(outcome.failure(), Some(FailureKind::CriticalRunnerError));

        let calls = runner.calls();
        assert_eq!(calls[0].args, vec!["-m", "pytest", "tests"]);
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/work")));
    }

    #[tokio::test]
    async fn test_pytest_threshold_exceeded() {
        let runner = ScriptedRunner::new(vec![exited(
            1,
            "== 3 failed, 40 passed, 2 errors in 9.1s ==\n",
        )]);
        let outcome = harness(runner)
            .validate(&resolution("pytest", 4))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert!(outcome.reason().contains('5'));
        assert_eq!(outcome.reason(), "5 failures exceeded threshold");
        assert_eq!(outcome.failure(), Some(FailureKind::ThresholdExceeded));
        assert_eq!(outcome.metrics().unwrap().failed, Count::Known(3));
    }

    #[tokio::test]
    async fn test_pytest_within_threshold_passes() {
        let runner = ScriptedRunner::new(vec![exited(1, "== 2 failed, 98 passed in 9.1s ==\n")]);
        let outcome = harness(runner)
            .validate(&resolution("pytest", 5))
            .await
            .unwrap();

        assert!(outcome.success());
        assert!(outcome.reason().contains("Tests Passed: 98"));
        assert_eq!(outcome.metrics().unwrap().passed, Count::Known(98));
    }

    #[tokio::test]
    async fn test_pytest_exit_one_without_summary_is_critical() {
        let runner = ScriptedRunner::new(vec![exited(1, "ImportError while loading conftest\n")]);
        let outcome = harness(runner)
            .validate(&resolution("pytest", 5))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.failure(), Some(FailureKind::CriticalRunnerError));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_critical_failure() {
        let runner = ScriptedRunner::new(vec![CommandOutput {
            stdout: "collecting ...".to_string(),
            stderr: String::new(),
            exit: ProcessExit::TimedOut(Duration::from_secs(30)),
        }]);
        let outcome = harness(runner)
            .validate(&resolution("pytest", 5))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.reason(), "process timed out after 30s");
        assert!(outcome.failure().unwrap().is_critical());
    }

    #[tokio::test]
    async fn test_smoke_gate_skips_suite_on_failure() {
        let runner = ScriptedRunner::new(vec![exited(1, "smoke broke\n")]);
        let outcome = harness(runner.clone())
            .validate(&resolution("pytest_with_smoke_test", 5))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.reason(), "process failed with exit code 1");
        assert_eq!(runner.calls().len(), 1, "full suite must not run");
    }

    #[tokio::test]
    async fn test_smoke_gate_runs_suite_after_success() {
        let runner = ScriptedRunner::new(vec![
            exited(0, "smoke ok\n"),
            exited(0, "== 12 passed in 0.3s ==\n"),
        ]);
        let outcome = harness(runner.clone())
            .validate(&resolution("pytest_with_smoke_test", 0))
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.metrics().unwrap().passed, Count::Known(12));
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args[..2], ["-m".to_string(), "pytest".to_string()]);
    }
}
