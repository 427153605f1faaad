//! Run artifacts on disk
//!
//! - requirement sources read at startup (generated and primary files)
//! - JSON run history rewritten after every attempt
//! - plain-text metrics summary written once at completion

use async_trait::async_trait;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::errors::{ConfigError, RecorderError};
use crate::domain::models::{Config, RequirementSet, RunHistory, RunReport};
use crate::domain::ports::RunRecorder;

/// Requirement sets a run starts from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSources {
    /// First set to install
    pub initial: RequirementSet,
    /// Must-keep specifiers from the primary file
    pub pins: RequirementSet,
}

/// Read the primary and generated requirements files
///
/// The generated file wins when it exists and holds at least one specifier;
/// otherwise the run starts from the primary set. A missing primary file
/// means no pins. A primary file that does not parse is a configuration error,
/// while an unparsable generated file is ignored with a warning.
pub async fn load_requirement_sources(config: &Config) -> Result<RequirementSources, ConfigError> {
    let pins = match read_optional(&config.primary_requirements_file).await? {
        Some(contents) => RequirementSet::parse(&contents).map_err(|source| {
            ConfigError::InvalidPrimaryRequirements {
                path: config.primary_requirements_file.clone(),
                source,
            }
        })?,
        None => {
            debug!(path = %config.primary_requirements_file.display(), "No primary requirements file");
            RequirementSet::default()
        }
    };

    let generated = match read_optional(&config.requirements_file).await? {
        Some(contents) => match RequirementSet::parse(&contents) {
            Ok(set) => Some(set),
            Err(err) => {
                warn!(
                    path = %config.requirements_file.display(),
                    error = %err,
                    "Ignoring unparsable generated requirements"
                );
                None
            }
        },
        None => None,
    };

    let initial = match generated {
        Some(set) if !set.is_empty() => {
            info!(path = %config.requirements_file.display(), requirements = set.len(), "Starting from generated requirements");
            set
        }
        _ => {
            info!(requirements = pins.len(), "Starting from primary requirements");
            pins.clone()
        }
    };

    Ok(RequirementSources { initial, pins })
}

async fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::ReadRequirements {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// [`RunRecorder`] writing the history JSON and the metrics summary
#[derive(Debug, Clone)]
pub struct FileRunRecorder {
    history_path: PathBuf,
    metrics_path: PathBuf,
}

impl FileRunRecorder {
    pub fn new(history_path: impl Into<PathBuf>, metrics_path: impl Into<PathBuf>) -> Self {
        Self {
            history_path: history_path.into(),
            metrics_path: metrics_path.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.history_output_file, &config.metrics_output_file)
    }

    async fn write_history(&self, history: &RunHistory) -> Result<(), RecorderError> {
        let json = serde_json::to_string_pretty(history)?;
        write_replace(&self.history_path, json.as_bytes())
            .await
            .map_err(|source| RecorderError::Write {
                path: self.history_path.clone(),
                source,
            })
    }
}

#[async_trait]
impl RunRecorder for FileRunRecorder {
    async fn checkpoint(&self, history: &RunHistory) -> Result<(), RecorderError> {
        self.write_history(history).await?;
        debug!(path = %self.history_path.display(), attempts = history.len(), "History checkpointed");
        Ok(())
    }

    async fn finish(&self, report: &RunReport) -> Result<(), RecorderError> {
        self.write_history(&report.history).await?;
        write_replace(&self.metrics_path, render_metrics(report).as_bytes())
            .await
            .map_err(|source| RecorderError::Write {
                path: self.metrics_path.clone(),
                source,
            })?;
        info!(path = %self.metrics_path.display(), "Metrics written");
        Ok(())
    }
}

/// Write to a sibling `<name>.tmp` file, then rename it over `path`
///
/// Readers see either the previous contents or the new contents, never a
/// partial file. The temp file is removed when the rename fails.
pub async fn write_replace(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

/// Plain-text summary of a finished run
pub fn render_metrics(report: &RunReport) -> String {
    let final_metrics = report
        .history
        .last()
        .and_then(|record| record.outcome.metrics())
        .map_or_else(|| "N/A".to_string(), |summary| summary.metrics_line());

    let mut out = String::new();
    let _ = writeln!(out, "status: {}", report.state);
    let _ = writeln!(out, "run_id: {}", report.run_id);
    let _ = writeln!(out, "passes_used: {}", report.history.passes_used());
    let _ = writeln!(out, "total_attempts: {}", report.history.len());
    let _ = writeln!(out, "final_reason: {}", report.final_reason());
    let _ = writeln!(out, "final_metrics: {final_metrics}");
    if let Some(error) = &report.fatal_error {
        let _ = writeln!(out, "fatal_error: {error}");
    }
    out.push_str("final_requirements:\n");
    for spec in report.final_requirements.specs() {
        let _ = writeln!(out, "  {spec}");
    }
    out
}
