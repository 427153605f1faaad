//! depagent - Oracle-guided dependency resolution
//!
//! depagent searches for a set of Python package requirements that makes a
//! project's validation pass. Each attempt installs a candidate set, runs a
//! smoke script and/or the pytest suite, and on failure asks a language-model
//! repair oracle for a revised set. Search is bounded by a number of passes and
//! a number of backtracks per pass.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and port traits
//! - **Service Layer** (`services`): Failure summarizer, validation harness and
//!   the resolution controller state machine
//! - **Infrastructure Layer** (`infrastructure`): Processes, pip, the Claude
//!   client, artifacts, configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use depagent::{ResolutionController, RequirementSet};
//!
//! let controller = ResolutionController::new(config, mutator, validator, oracle);
//! let report = controller.run(RequirementSet::parse("numpy>=2\n")?).await;
//! std::process::exit(report.exit_code());
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AttemptRecord, Config, Count, FailureKind, PassStrategy, RequirementSet, RequirementSpec,
    ResolutionConfig, ResolutionState, RunHistory, RunReport, StructuredSummary,
    ValidationOutcome, ValidationStrategy,
};
pub use domain::ports::{
    CommandRunner, EnvironmentMutator, FailureContext, RepairOracle, RunRecorder, Validator,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{summarize, ResolutionController, ValidationHarness};
