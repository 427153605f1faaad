use serde::{Deserialize, Serialize};
use std::fmt;

/// A test count that may never have been reported
///
/// `Unknown` is distinct from `Known(0)`: it means the runner output carried no
/// information about that status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum Count {
    Known(u32),
    #[default]
    Unknown,
}

impl Count {
    /// Value for arithmetic where an unreported count contributes nothing
    pub const fn or_zero(self) -> u32 {
        match self {
            Self::Known(n) => n,
            Self::Unknown => 0,
        }
    }

    pub const fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<Option<u32>> for Count {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl From<Count> for Option<u32> {
    fn from(value: Count) -> Self {
        match value {
            Count::Known(n) => Some(n),
            Count::Unknown => None,
        }
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(n) => write!(f, "{n}"),
            Self::Unknown => f.write_str("N/A"),
        }
    }
}

/// Structured pass/fail counts extracted from a test-runner summary line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub passed: Count,
    pub failed: Count,
    pub errors: Count,
    pub skipped: Count,
    pub xfailed: Count,
    pub xpassed: Count,
}

impl Default for StructuredSummary {
    /// Absence of `failed`/`errors` means "no failures observed"; the rest stay unknown.
    fn default() -> Self {
        Self {
            passed: Count::Unknown,
            failed: Count::Known(0),
            errors: Count::Known(0),
            skipped: Count::Unknown,
            xfailed: Count::Unknown,
            xpassed: Count::Unknown,
        }
    }
}

impl StructuredSummary {
    /// Failed plus errored tests, unknown counted as zero
    pub const fn total_failures(&self) -> u32 {
        self.failed.or_zero().saturating_add(self.errors.or_zero())
    }

    /// Human-readable metrics string used as the success reason
    pub fn metrics_line(&self) -> String {
        format!(
            "Tests Passed: {}, Failed: {}, Errors: {}, Skipped: {}",
            self.passed, self.failed, self.errors, self.skipped
        )
    }
}

impl fmt::Display for StructuredSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "passed={} failed={} errors={} skipped={} xfailed={} xpassed={}",
            self.passed, self.failed, self.errors, self.skipped, self.xfailed, self.xpassed
        )
    }
}
