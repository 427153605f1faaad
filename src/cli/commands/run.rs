//! `depagent run`

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::cli::{ci_groups_enabled, load_config};
use crate::cli::output::{output, table_with_header, truncate, verdict_cell, CommandOutput};
use crate::domain::models::{Config, ResolutionConfig, RunReport};
use crate::domain::ports::CommandRunner;
use crate::infrastructure::artifacts::{load_requirement_sources, FileRunRecorder};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::credentials::load_api_key;
use crate::infrastructure::environment::PipEnvironmentMutator;
use crate::infrastructure::logging::LoggerImpl;
use crate::infrastructure::oracle::ClaudeRepairOracle;
use crate::infrastructure::process::TokioCommandRunner;
use crate::services::{ExecutionEnvironment, ResolutionController, ValidationHarness};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Override max_run_passes
    #[arg(long, value_name = "N")]
    pub max_run_passes: Option<u32>,

    /// Override max_llm_backtrack_attempts
    #[arg(long, value_name = "N")]
    pub max_backtracks: Option<u32>,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(passes) = self.max_run_passes {
            config.max_run_passes = passes;
        }
        if let Some(backtracks) = self.max_backtracks {
            config.max_llm_backtrack_attempts = backtracks;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptRow {
    pub pass_index: u32,
    pub backtrack_index: u32,
    pub success: bool,
    pub reason: String,
    pub requirements: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub run_id: String,
    pub status: String,
    pub exit_code: i32,
    pub passes_used: u32,
    pub total_attempts: usize,
    pub final_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    pub final_requirements: Vec<String>,
    pub attempts: Vec<AttemptRow>,
}

impl From<&RunReport> for RunOutput {
    fn from(report: &RunReport) -> Self {
        Self {
            run_id: report.run_id.to_string(),
            status: report.state.to_string(),
            exit_code: report.exit_code(),
            passes_used: report.history.passes_used(),
            total_attempts: report.history.len(),
            final_reason: report.final_reason().to_string(),
            fatal_error: report.fatal_error.clone(),
            final_requirements: report
                .final_requirements
                .specs()
                .iter()
                .map(ToString::to_string)
                .collect(),
            attempts: report
                .history
                .attempts()
                .iter()
                .map(|record| AttemptRow {
                    pass_index: record.pass_index,
                    backtrack_index: record.backtrack_index,
                    success: record.outcome.success(),
                    reason: record.outcome.reason().to_string(),
                    requirements: record
                        .requirements
                        .specs()
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                })
                .collect(),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Run {}: {}", self.run_id, self.status)];

        if !self.attempts.is_empty() {
            let mut table =
                table_with_header(&["Pass", "Backtrack", "Result", "Reason", "Requirements"]);
            for row in &self.attempts {
                table.add_row(vec![
                    Cell::new(row.pass_index),
                    Cell::new(row.backtrack_index),
                    verdict_cell(row.success),
                    Cell::new(truncate(&row.reason, 60)),
                    Cell::new(row.requirements.join("\n")),
                ]);
            }
            lines.push(table.to_string());
        }

        lines.push(format!(
            "Passes used: {}, attempts: {}",
            self.passes_used, self.total_attempts
        ));
        lines.push(format!("Final reason: {}", self.final_reason));
        if let Some(error) = &self.fatal_error {
            lines.push(format!("Fatal error: {error}"));
        }
        if !self.final_requirements.is_empty() {
            lines.push("Final requirements:".to_string());
            for spec in &self.final_requirements {
                lines.push(format!("  {spec}"));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<i32> {
    let mut config = load_config(config_path).context("Failed to load configuration")?;
    args.apply(&mut config);
    ConfigLoader::validate(&config)?;

    let _logger = LoggerImpl::init(&config.logging)?;

    let resolution = ResolutionConfig::from_config(&config)?;
    let api_key = load_api_key(&config.oracle)?;
    let sources = load_requirement_sources(&config).await?;

    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let mutator = Arc::new(PipEnvironmentMutator::new(Arc::clone(&runner), &config));
    let harness = Arc::new(
        ValidationHarness::new(runner, ExecutionEnvironment::from_config(&config.environment))
            .with_ci_groups(ci_groups_enabled(&config.logging, json_mode)),
    );
    let oracle = Arc::new(
        ClaudeRepairOracle::from_config(api_key, &config.oracle, &config.retry)
            .context("Failed to build the repair oracle")?,
    );

    let controller = ResolutionController::new(resolution, mutator, harness, oracle)
        .with_recorder(Arc::new(FileRunRecorder::from_config(&config)))
        .with_pins(sources.pins);

    let report = controller.run(sources.initial).await;
    output(&RunOutput::from(&report), json_mode);
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AttemptRecord, FailureKind, RequirementSet, ResolutionState, RunHistory, ValidationOutcome,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> RunReport {
        let mut history = RunHistory::new(Uuid::new_v4());
        let first = RequirementSet::parse("numpy>=2\n").unwrap();
        let second = RequirementSet::parse("numpy==1.26.4\n").unwrap();
        history.push(AttemptRecord::new(
            0,
            0,
            first,
            ValidationOutcome::failed(FailureKind::ScriptFailed, "process failed with exit code 1", "", None),
        ));
        history.push(AttemptRecord::new(
            0,
            1,
            second.clone(),
            ValidationOutcome::passed("Smoke test passed.", "", None),
        ));
        RunReport {
            run_id: history.run_id,
            state: ResolutionState::Succeeded,
            started_at: history.started_at,
            history,
            final_requirements: second,
            fatal_error: None,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_run_output_from_report() {
        let out = RunOutput::from(&report());
        assert_eq!(out.status, "succeeded");
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.total_attempts, 2);
        assert_eq!(out.attempts[1].backtrack_index, 1);
        assert_eq!(out.final_requirements, vec!["numpy==1.26.4".to_string()]);
    }

    #[test]
    fn test_run_output_human() {
        let human = RunOutput::from(&report()).to_human();
        assert!(human.contains("succeeded"));
        assert!(human.contains("Final reason: Smoke test passed."));
        assert!(human.contains("  numpy==1.26.4"));
    }

    #[test]
    fn test_run_output_json_omits_missing_fatal_error() {
        let json = RunOutput::from(&report()).to_json();
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("fatal_error").is_none());
    }

    #[test]
    fn test_args_override_budgets() {
        let mut config = Config::default();
        RunArgs {
            max_run_passes: Some(1),
            max_backtracks: Some(0),
        }
        .apply(&mut config);
        assert_eq!(config.max_run_passes, 1);
        assert_eq!(config.max_llm_backtrack_attempts, 0);
    }
}
