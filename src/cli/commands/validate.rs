//! `depagent validate`

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::cli::{ci_groups_enabled, load_config};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{ResolutionConfig, StructuredSummary, ValidationOutcome};
use crate::infrastructure::logging::LoggerImpl;
use crate::infrastructure::process::TokioCommandRunner;
use crate::services::{ExecutionEnvironment, ValidationHarness};

/// Exit code when validation ran and failed
const VALIDATION_FAILED_EXIT: i32 = 2;

#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    /// Print the last N characters of the runner output
    #[arg(long, value_name = "N")]
    pub show_output: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub success: bool,
    pub strategy: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub metrics: Option<StructuredSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ValidateOutput {
    fn new(strategy: String, outcome: &ValidationOutcome, show_output: Option<usize>) -> Self {
        Self {
            success: outcome.success(),
            strategy,
            reason: outcome.reason().to_string(),
            failure: outcome.failure().map(|kind| kind.to_string()),
            metrics: outcome.metrics().copied(),
            output: show_output.map(|n| outcome.output_excerpt(n).to_string()),
        }
    }
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let verdict = if self.success { "PASSED" } else { "FAILED" };
        let mut lines = vec![
            format!("Validation {verdict} ({})", self.strategy),
            format!("Reason: {}", self.reason),
        ];
        if let Some(failure) = &self.failure {
            lines.push(format!("Failure kind: {failure}"));
        }
        if let Some(metrics) = &self.metrics {
            lines.push(format!("Metrics: {}", metrics.metrics_line()));
        }
        if let Some(out) = &self.output {
            lines.push(String::new());
            lines.push(out.clone());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ValidateArgs, config_path: Option<&Path>, json_mode: bool) -> Result<i32> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    let _logger = LoggerImpl::init(&config.logging)?;
    let resolution = ResolutionConfig::from_config(&config)?;

    let harness = ValidationHarness::new(
        Arc::new(TokioCommandRunner::new()),
        ExecutionEnvironment::from_config(&config.environment),
    )
    .with_ci_groups(ci_groups_enabled(&config.logging, json_mode));

    let outcome = harness.validate(&resolution).await?;
    output(
        &ValidateOutput::new(
            resolution.validation_strategy.to_string(),
            &outcome,
            args.show_output,
        ),
        json_mode,
    );

    Ok(if outcome.success() { 0 } else { VALIDATION_FAILED_EXIT })
}
