use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::outcome::ValidationOutcome;
use super::requirement::RequirementSet;

/// One validation call and the requirement set it judged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub pass_index: u32,
    pub backtrack_index: u32,
    pub requirements: RequirementSet,
    pub outcome: ValidationOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(
        pass_index: u32,
        backtrack_index: u32,
        requirements: RequirementSet,
        outcome: ValidationOutcome,
    ) -> Self {
        Self {
            pass_index,
            backtrack_index,
            requirements,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only audit trail of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHistory {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    attempts: Vec<AttemptRecord>,
}

impl RunHistory {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            attempts: Vec::new(),
        }
    }

    pub fn push(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Number of distinct passes that produced at least one attempt
    pub fn passes_used(&self) -> u32 {
        self.attempts
            .last()
            .map_or(0, |record| record.pass_index + 1)
    }

    /// Attempts recorded for a single pass
    pub fn attempts_in_pass(&self, pass_index: u32) -> impl Iterator<Item = &AttemptRecord> {
        self.attempts
            .iter()
            .filter(move |record| record.pass_index == pass_index)
    }
}

/// States of the resolution state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Init,
    Install,
    Validate,
    Repair,
    Succeeded,
    Exhausted,
    Fatal,
}

impl ResolutionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted | Self::Fatal)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Install => "install",
            Self::Validate => "validate",
            Self::Repair => "repair",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final report of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: ResolutionState,
    pub history: RunHistory,
    pub final_requirements: RequirementSet,
    /// Set only when the run ended in [`ResolutionState::Fatal`]
    pub fatal_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == ResolutionState::Succeeded
    }

    /// Process exit code for the terminal state
    pub const fn exit_code(&self) -> i32 {
        match self.state {
            ResolutionState::Succeeded => 0,
            ResolutionState::Exhausted => 2,
            _ => 1,
        }
    }

    /// Reason string of the last recorded validation
    pub fn final_reason(&self) -> &str {
        self.history
            .last()
            .map_or("no validation recorded", |record| record.outcome.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pass_index: u32, backtrack_index: u32) -> AttemptRecord {
        AttemptRecord::new(
            pass_index,
            backtrack_index,
            RequirementSet::default(),
            ValidationOutcome::passed("ok", "", None),
        )
    }

    #[test]
    fn test_history_counts_passes() {
        let mut history = RunHistory::new(Uuid::new_v4());
        assert_eq!(history.passes_used(), 0);

        history.push(record(0, 0));
        history.push(record(0, 1));
        history.push(record(1, 0));

        assert_eq!(history.len(), 3);
        assert_eq!(history.passes_used(), 2);
        assert_eq!(history.attempts_in_pass(0).count(), 2);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ResolutionState::Succeeded.is_terminal());
        assert!(ResolutionState::Exhausted.is_terminal());
        assert!(ResolutionState::Fatal.is_terminal());
        assert!(!ResolutionState::Repair.is_terminal());
    }

    #[test]
    fn test_exit_codes() {
        let history = RunHistory::new(Uuid::new_v4());
        let mut report = RunReport {
            run_id: history.run_id,
            state: ResolutionState::Succeeded,
            history,
            final_requirements: RequirementSet::default(),
            fatal_error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(report.exit_code(), 0);
        report.state = ResolutionState::Exhausted;
        assert_eq!(report.exit_code(), 2);
        report.state = ResolutionState::Fatal;
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.final_reason(), "no validation recorded");
    }
}
