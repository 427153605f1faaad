use serde::{Deserialize, Serialize};
use std::fmt;

use super::summary::StructuredSummary;

/// Why a validation did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Validation script exited nonzero
    ScriptFailed,
    /// The test runner itself crashed (pytest exit code > 1, signal, no summary)
    CriticalRunnerError,
    /// The validation process was killed after exceeding its timeout
    TimedOut,
    /// Test-level failures plus errors exceeded the acceptable threshold
    ThresholdExceeded,
}

impl FailureKind {
    /// True when the runner did not complete, as opposed to tests failing
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::CriticalRunnerError | Self::TimedOut)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScriptFailed => "script_failed",
            Self::CriticalRunnerError => "critical_runner_error",
            Self::TimedOut => "timed_out",
            Self::ThresholdExceeded => "threshold_exceeded",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one validation call
///
/// Built through [`ValidationOutcome::passed`] or [`ValidationOutcome::failed`]
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    success: bool,
    reason: String,
    raw_output: String,
    metrics: Option<StructuredSummary>,
    failure: Option<FailureKind>,
}

impl ValidationOutcome {
    pub fn passed(
        reason: impl Into<String>,
        raw_output: impl Into<String>,
        metrics: Option<StructuredSummary>,
    ) -> Self {
        Self {
            success: true,
            reason: reason.into(),
            raw_output: raw_output.into(),
            metrics,
            failure: None,
        }
    }

    pub fn failed(
        kind: FailureKind,
        reason: impl Into<String>,
        raw_output: impl Into<String>,
        metrics: Option<StructuredSummary>,
    ) -> Self {
        Self {
            success: false,
            reason: reason.into(),
            raw_output: raw_output.into(),
            metrics,
            failure: Some(kind),
        }
    }

    pub const fn success(&self) -> bool {
        self.success
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn raw_output(&self) -> &str {
        &self.raw_output
    }

    pub const fn metrics(&self) -> Option<&StructuredSummary> {
        self.metrics.as_ref()
    }

    pub const fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// Last `max_chars` characters of the raw output, cut on a char boundary
    pub fn output_excerpt(&self, max_chars: usize) -> &str {
        let total = self.raw_output.chars().count();
        if total <= max_chars {
            return &self.raw_output;
        }
        let skip = total - max_chars;
        let start = self
            .raw_output
            .char_indices()
            .nth(skip)
            .map_or(self.raw_output.len(), |(idx, _)| idx);
        &self.raw_output[start..]
    }
}
