//! Resolution Controller
//!
//! Drives the install → validate → repair loop as an explicit state machine:
//! - up to `max_run_passes` outer passes
//! - up to `max_backtrack_attempts` oracle repairs inside each pass
//! - one [`AttemptRecord`] per validation call, checkpointed as it is recorded
//!
//! Test-level and runner-level failures are data that drive backtracking.
//! Only collaborator failures (installer, oracle, validation launch) end the
//! run early, in [`ResolutionState::Fatal`].

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{
    AttemptRecord, PassStrategy, RequirementSet, ResolutionConfig, ResolutionState, RunHistory,
    RunReport,
};
use crate::domain::ports::{
    EnvironmentMutator, FailureContext, RepairOracle, RunRecorder, Validator,
};

/// Bounded search for a requirement set that passes validation
pub struct ResolutionController {
    config: ResolutionConfig,
    mutator: Arc<dyn EnvironmentMutator>,
    validator: Arc<dyn Validator>,
    oracle: Arc<dyn RepairOracle>,
    recorder: Option<Arc<dyn RunRecorder>>,
    pins: RequirementSet,
}

impl ResolutionController {
    pub fn new(
        config: ResolutionConfig,
        mutator: Arc<dyn EnvironmentMutator>,
        validator: Arc<dyn Validator>,
        oracle: Arc<dyn RepairOracle>,
    ) -> Self {
        Self {
            config,
            mutator,
            validator,
            oracle,
            recorder: None,
            pins: RequirementSet::default(),
        }
    }

    /// Persist history and the final report through `recorder`
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Specifiers that every installed set must contain verbatim
    #[must_use]
    pub fn with_pins(mut self, pins: RequirementSet) -> Self {
        self.pins = pins;
        self
    }

    pub const fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Run the loop to a terminal state
    ///
    /// Never returns an error: collaborator failures are reported through
    /// [`RunReport::fatal_error`] with the history recorded up to that point.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, initial: RequirementSet) -> RunReport {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let initial = initial.enforce_pins(&self.pins);
        let mut history = RunHistory::new(run_id);
        let mut current = initial.clone();
        let mut pass_index: u32 = 0;
        let mut backtrack_index: u32 = 0;
        let mut fatal_error: Option<String> = None;
        let mut state = ResolutionState::Init;

        info!(
            max_run_passes = self.config.max_run_passes,
            max_backtrack_attempts = self.config.max_backtrack_attempts,
            strategy = %self.config.validation_strategy,
            requirements = current.len(),
            "Starting dependency resolution"
        );

        while !state.is_terminal() {
            let next = match state {
                ResolutionState::Init => ResolutionState::Install,

                ResolutionState::Install => {
                    info!(pass_index, backtrack_index, requirements = %current, "Installing requirements");
                    match self.mutator.apply(&current).await {
                        Ok(()) => ResolutionState::Validate,
                        Err(err) => {
                            fatal_error = Some(fatal(err.into()));
                            ResolutionState::Fatal
                        }
                    }
                }

                ResolutionState::Validate => match self.validator.validate(&self.config).await {
                    Ok(outcome) => {
                        let success = outcome.success();
                        info!(
                            pass_index,
                            backtrack_index,
                            success,
                            reason = %outcome.reason(),
                            "Validation finished"
                        );
                        history.push(AttemptRecord::new(
                            pass_index,
                            backtrack_index,
                            current.clone(),
                            outcome,
                        ));
                        self.checkpoint(&history).await;

                        if success {
                            ResolutionState::Succeeded
                        } else if backtrack_index < self.config.max_backtrack_attempts {
                            ResolutionState::Repair
                        } else if pass_index + 1 < self.config.max_run_passes {
                            pass_index += 1;
                            backtrack_index = 0;
                            current = self.next_pass_requirements(&initial, current);
                            warn!(
                                pass_index,
                                pass_strategy = ?self.config.pass_strategy,
                                "Backtrack budget spent, starting next pass"
                            );
                            ResolutionState::Install
                        } else {
                            ResolutionState::Exhausted
                        }
                    }
                    Err(err) => {
                        fatal_error = Some(fatal(err.into()));
                        ResolutionState::Fatal
                    }
                },

                ResolutionState::Repair => {
                    let context = self.failure_context(&history, pass_index, backtrack_index);
                    info!(pass_index, backtrack_index, "Requesting repair proposal");
                    match self.oracle.propose(&current, &context).await {
                        Ok(proposal) => {
                            current = proposal.enforce_pins(&self.pins);
                            backtrack_index += 1;
                            debug!(requirements = %current, "Accepted repair proposal");
                            ResolutionState::Install
                        }
                        Err(err) => {
                            fatal_error = Some(fatal(err.into()));
                            ResolutionState::Fatal
                        }
                    }
                }

                terminal => terminal,
            };

            debug!(from = %state, to = %next, "State transition");
            state = next;
        }

        let report = RunReport {
            run_id,
            state,
            started_at: history.started_at,
            history,
            final_requirements: current,
            fatal_error,
            finished_at: Utc::now(),
        };

        match report.state {
            ResolutionState::Succeeded => info!(
                attempts = report.history.len(),
                passes_used = report.history.passes_used(),
                "Resolution succeeded"
            ),
            ResolutionState::Exhausted => warn!(
                attempts = report.history.len(),
                reason = %report.final_reason(),
                "Resolution exhausted all passes"
            ),
            _ => error!(
                attempts = report.history.len(),
                error = report.fatal_error.as_deref().unwrap_or_default(),
                "Resolution aborted"
            ),
        }

        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.finish(&report).await {
                warn!(error = %err, "Failed to write run report");
            }
        }

        report
    }

    fn next_pass_requirements(
        &self,
        initial: &RequirementSet,
        last: RequirementSet,
    ) -> RequirementSet {
        match self.config.pass_strategy {
            PassStrategy::CarryOver => last,
            PassStrategy::Reset => initial.clone(),
            PassStrategy::Widen => initial.widened(&self.pins),
        }
    }

    fn failure_context(
        &self,
        history: &RunHistory,
        pass_index: u32,
        backtrack_index: u32,
    ) -> FailureContext {
        let (reason, output_excerpt) = history.last().map_or_else(
            || (String::new(), String::new()),
            |record| {
                (
                    record.outcome.reason().to_string(),
                    record
                        .outcome
                        .output_excerpt(self.config.output_excerpt_chars)
                        .to_string(),
                )
            },
        );
        FailureContext {
            reason,
            output_excerpt,
            pinned: self.pins.clone(),
            pass_index,
            backtrack_index,
        }
    }

    async fn checkpoint(&self, history: &RunHistory) {
        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.checkpoint(history).await {
                warn!(error = %err, "Failed to checkpoint run history");
            }
        }
    }
}

fn fatal(err: CollaboratorError) -> String {
    error!(error = %err, "Collaborator failure");
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{MutatorError, OracleError, RecorderError, ValidationError};
    use crate::domain::models::{Config, FailureKind, ValidationOutcome};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMutator {
        applied: Mutex<Vec<RequirementSet>>,
        fail: bool,
    }

    #[async_trait]
    impl EnvironmentMutator for RecordingMutator {
        async fn apply(&self, requirements: &RequirementSet) -> Result<(), MutatorError> {
            self.applied.lock().unwrap().push(requirements.clone());
            if self.fail {
                return Err(MutatorError::InstallFailed {
                    code: 1,
                    output: "ResolutionImpossible".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Replays outcomes; fails forever once the script runs out
    struct ScriptedValidator {
        outcomes: Mutex<VecDeque<ValidationOutcome>>,
    }

    impl ScriptedValidator {
        fn new(outcomes: Vec<ValidationOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl Validator for ScriptedValidator {
        async fn validate(
            &self,
            _config: &ResolutionConfig,
        ) -> Result<ValidationOutcome, ValidationError> {
            Ok(self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(failing))
        }
    }

    /// Proposes `pkg==<n>` with an increasing counter
    #[derive(Default)]
    struct CountingOracle {
        contexts: Mutex<Vec<FailureContext>>,
        fail: bool,
    }

    #[async_trait]
    impl RepairOracle for CountingOracle {
        async fn propose(
            &self,
            _previous: &RequirementSet,
            context: &FailureContext,
        ) -> Result<RequirementSet, OracleError> {
            if self.fail {
                return Err(OracleError::Request("connection refused".to_string()));
            }
            let mut contexts = self.contexts.lock().unwrap();
            contexts.push(context.clone());
            Ok(RequirementSet::parse(&format!("pkg=={}\n", contexts.len())).unwrap())
        }
    }

    #[derive(Default)]
    struct MemoryRecorder {
        checkpoints: Mutex<Vec<usize>>,
        finished: Mutex<Option<ResolutionState>>,
    }

    #[async_trait]
    impl RunRecorder for MemoryRecorder {
        async fn checkpoint(&self, history: &RunHistory) -> Result<(), RecorderError> {
            self.checkpoints.lock().unwrap().push(history.len());
            Ok(())
        }

        async fn finish(&self, report: &RunReport) -> Result<(), RecorderError> {
            *self.finished.lock().unwrap() = Some(report.state);
            Ok(())
        }
    }

    fn failing() -> ValidationOutcome {
        ValidationOutcome::failed(
            FailureKind::ThresholdExceeded,
            "7 failures exceeded threshold",
            "== 7 failed, 3 passed ==\n",
            None,
        )
    }

    fn passing() -> ValidationOutcome {
        ValidationOutcome::passed("Smoke test passed.", "ok\n", None)
    }

    fn config(passes: u32, backtracks: u32, pass_strategy: &str) -> ResolutionConfig {
        let config = Config {
            max_run_passes: passes,
            max_llm_backtrack_attempts: backtracks,
            pass_strategy: pass_strategy.to_string(),
            ..Default::default()
        };
        ResolutionConfig::from_config(&config).unwrap()
    }

    fn set(text: &str) -> RequirementSet {
        RequirementSet::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_fail_fail_pass_succeeds_in_first_pass() {
        let oracle = Arc::new(CountingOracle::default());
        let recorder = Arc::new(MemoryRecorder::default());
        let controller = ResolutionController::new(
            config(5, 3, "carry_over"),
            Arc::new(RecordingMutator::default()),
            Arc::new(ScriptedValidator::new(vec![failing(), failing(), passing()])),
            oracle.clone(),
        )
        .with_recorder(recorder.clone());

        let report = controller.run(set("pkg==0\n")).await;

        assert_eq!(report.state, ResolutionState::Succeeded);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.history.len(), 3);
        assert_eq!(report.history.attempts_in_pass(0).count(), 3);
        let backtracks: Vec<u32> = report
            .history
            .attempts()
            .iter()
            .map(|r| r.backtrack_index)
            .collect();
        assert_eq!(backtracks, vec![0, 1, 2]);
        assert_eq!(report.final_requirements, set("pkg==2\n"));

        assert_eq!(*recorder.checkpoints.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(
            *recorder.finished.lock().unwrap(),
            Some(ResolutionState::Succeeded)
        );

        let contexts = oracle.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].reason, "7 failures exceeded threshold");
        assert_eq!(contexts[0].backtrack_index, 0);
        assert_eq!(contexts[1].backtrack_index, 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_exhausts_budget() {
        let controller = ResolutionController::new(
            config(2, 3, "carry_over"),
            Arc::new(RecordingMutator::default()),
            Arc::new(ScriptedValidator::new(vec![])),
            Arc::new(CountingOracle::default()),
        );

        let report = controller.run(set("pkg==0\n")).await;

        assert_eq!(report.state, ResolutionState::Exhausted);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.history.len(), 8);
        assert_eq!(report.history.passes_used(), 2);
        assert!(report.fatal_error.is_none());
        assert_eq!(report.final_reason(), "7 failures exceeded threshold");
    }

    #[tokio::test]
    async fn test_zero_backtracks_never_calls_oracle() {
        let oracle = Arc::new(CountingOracle::default());
        let controller = ResolutionController::new(
            config(3, 0, "carry_over"),
            Arc::new(RecordingMutator::default()),
            Arc::new(ScriptedValidator::new(vec![])),
            oracle.clone(),
        );

        let report = controller.run(set("pkg==0\n")).await;

        assert_eq!(report.state, ResolutionState::Exhausted);
        assert_eq!(report.history.len(), 3);
        assert!(oracle.contexts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutator_failure_is_fatal() {
        let validator = Arc::new(ScriptedValidator::new(vec![passing()]));
        let controller = ResolutionController::new(
            config(5, 3, "carry_over"),
            Arc::new(RecordingMutator {
                fail: true,
                ..Default::default()
            }),
            validator,
            Arc::new(CountingOracle::default()),
        );

        let report = controller.run(set("pkg==0\n")).await;

        assert_eq!(report.state, ResolutionState::Fatal);
        assert_eq!(report.exit_code(), 1);
        assert!(report.history.is_empty());
        assert!(report
            .fatal_error
            .as_deref()
            .unwrap()
            .contains("Environment mutation failed"));
    }

    #[tokio::test]
    async fn test_oracle_failure_is_fatal_after_recording_attempt() {
        let controller = ResolutionController::new(
            config(5, 3, "carry_over"),
            Arc::new(RecordingMutator::default()),
            Arc::new(ScriptedValidator::new(vec![])),
            Arc::new(CountingOracle {
                fail: true,
                ..Default::default()
            }),
        );

        let report = controller.run(set("pkg==0\n")).await;

        assert_eq!(report.state, ResolutionState::Fatal);
        assert_eq!(report.history.len(), 1);
        assert!(report
            .fatal_error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_pins_enforced_on_every_install() {
        let mutator = Arc::new(RecordingMutator::default());
        let controller = ResolutionController::new(
            config(1, 2, "carry_over"),
            mutator.clone(),
            Arc::new(ScriptedValidator::new(vec![])),
            Arc::new(CountingOracle::default()),
        )
        .with_pins(set("numpy==1.26.4\n"));

        controller.run(set("pkg==0\nnumpy>=2\n")).await;

        let applied = mutator.applied.lock().unwrap();
        assert_eq!(applied.len(), 3);
        for requirements in applied.iter() {
            assert_eq!(requirements.get("numpy").unwrap().constraint, "==1.26.4");
        }
    }

    #[tokio::test]
    async fn test_reset_strategy_restarts_from_initial_set() {
        let mutator = Arc::new(RecordingMutator::default());
        let controller = ResolutionController::new(
            config(2, 1, "reset"),
            mutator.clone(),
            Arc::new(ScriptedValidator::new(vec![])),
            Arc::new(CountingOracle::default()),
        );

        controller.run(set("pkg==0\n")).await;

        let applied = mutator.applied.lock().unwrap();
        let rendered: Vec<String> = applied.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["[pkg==0]", "[pkg==1]", "[pkg==0]", "[pkg==2]"]);
    }

    #[tokio::test]
    async fn test_carry_over_strategy_keeps_last_proposal() {
        let mutator = Arc::new(RecordingMutator::default());
        let controller = ResolutionController::new(
            config(2, 1, "carry_over"),
            mutator.clone(),
            Arc::new(ScriptedValidator::new(vec![])),
            Arc::new(CountingOracle::default()),
        );

        controller.run(set("pkg==0\n")).await;

        let applied = mutator.applied.lock().unwrap();
        let rendered: Vec<String> = applied.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["[pkg==0]", "[pkg==1]", "[pkg==1]", "[pkg==2]"]);
    }

    #[tokio::test]
    async fn test_widen_strategy_drops_unpinned_constraints() {
        let mutator = Arc::new(RecordingMutator::default());
        let controller = ResolutionController::new(
            config(2, 0, "widen"),
            mutator.clone(),
            Arc::new(ScriptedValidator::new(vec![])),
            Arc::new(CountingOracle::default()),
        )
        .with_pins(set("numpy==1.26.4\n"));

        controller.run(set("pkg==0\nnumpy==1.26.4\n")).await;

        let applied = mutator.applied.lock().unwrap();
        assert_eq!(applied[1].to_string(), "[pkg, numpy==1.26.4]");
    }
}
