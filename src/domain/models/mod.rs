pub mod config;
pub mod history;
pub mod outcome;
pub mod requirement;
pub mod summary;

pub use config::{
    Config, EnvironmentConfig, LoggingConfig, OracleConfig, PassStrategy, ResolutionConfig,
    RetryConfig, ValidationConfig, ValidationStrategy,
};
pub use history::{AttemptRecord, ResolutionState, RunHistory, RunReport};
pub use outcome::{FailureKind, ValidationOutcome};
pub use requirement::{RequirementParseError, RequirementSet, RequirementSpec};
pub use summary::{Count, StructuredSummary};
