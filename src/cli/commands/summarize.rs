//! `depagent summarize`

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::StructuredSummary;
use crate::services::{find_summary_line, summarize};

/// Exit code when failures exceed `--threshold`
const THRESHOLD_EXCEEDED_EXIT: i32 = 2;

#[derive(Args, Debug, Default)]
pub struct SummarizeArgs {
    /// File holding test-runner output (stdin when omitted)
    pub file: Option<PathBuf>,

    /// Exit with status 2 when failed plus errors exceed N
    #[arg(long, value_name = "N")]
    pub threshold: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeOutput {
    pub summary_line: Option<String>,
    pub summary: StructuredSummary,
    pub total_failures: u32,
    pub metrics: String,
}

impl SummarizeOutput {
    pub fn from_output(raw: &str) -> Self {
        let summary = summarize(raw);
        Self {
            summary_line: find_summary_line(raw).map(str::to_string),
            total_failures: summary.total_failures(),
            metrics: summary.metrics_line(),
            summary,
        }
    }
}

impl CommandOutput for SummarizeOutput {
    fn to_human(&self) -> String {
        let line = self
            .summary_line
            .as_deref()
            .unwrap_or("(no summary line found)");
        [
            format!("Summary line: {line}"),
            self.metrics.clone(),
            format!(
                "xfailed: {}, xpassed: {}",
                self.summary.xfailed, self.summary.xpassed
            ),
            format!("Total failures: {}", self.total_failures),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: SummarizeArgs, json_mode: bool) -> Result<i32> {
    let raw = match &args.file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };

    let out = SummarizeOutput::from_output(&raw);
    output(&out, json_mode);

    Ok(match args.threshold {
        Some(limit) if out.total_failures > limit => THRESHOLD_EXCEEDED_EXIT,
        _ => 0,
    })
}
