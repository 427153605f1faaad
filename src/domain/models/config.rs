use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::errors::ConfigError;

/// Main configuration structure for a resolution run
///
/// The upper-case aliases accept older configuration files that spell
/// option names in capitals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Generated requirements file, rewritten before every install
    #[serde(default = "default_requirements_file", alias = "REQUIREMENTS_FILE")]
    pub requirements_file: PathBuf,

    /// Must-keep specifiers; never written by the run
    #[serde(
        default = "default_primary_requirements_file",
        alias = "PRIMARY_REQUIREMENTS_FILE"
    )]
    pub primary_requirements_file: PathBuf,

    /// Plain-text summary written once at completion
    #[serde(default = "default_metrics_output_file", alias = "METRICS_OUTPUT_FILE")]
    pub metrics_output_file: PathBuf,

    /// JSON attempt history, rewritten after every attempt
    #[serde(default = "default_history_output_file")]
    pub history_output_file: PathBuf,

    /// Oracle repairs allowed per pass
    #[serde(
        default = "default_max_backtrack_attempts",
        alias = "MAX_LLM_BACKTRACK_ATTEMPTS"
    )]
    pub max_llm_backtrack_attempts: u32,

    /// Outer passes (must be at least 1)
    #[serde(default = "default_max_run_passes", alias = "MAX_RUN_PASSES")]
    pub max_run_passes: u32,

    /// Maximum failed + errored tests still counted as a pass
    #[serde(
        default = "default_acceptable_failure_threshold",
        alias = "ACCEPTABLE_FAILURE_THRESHOLD"
    )]
    pub acceptable_failure_threshold: u32,

    /// What the next pass starts from: carry_over, reset or widen
    #[serde(default = "default_pass_strategy")]
    pub pass_strategy: String,

    /// Validation strategy configuration
    #[serde(default, alias = "VALIDATION_CONFIG")]
    pub validation_config: ValidationConfig,

    /// Execution environment used for installs and validation
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Repair oracle configuration
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Retry policy for oracle requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_requirements_file() -> PathBuf {
    PathBuf::from("generated-requirements.txt")
}

fn default_primary_requirements_file() -> PathBuf {
    PathBuf::from("primary_requirements.txt")
}

fn default_metrics_output_file() -> PathBuf {
    PathBuf::from("metrics_output.txt")
}

fn default_history_output_file() -> PathBuf {
    PathBuf::from("run_history.json")
}

const fn default_max_backtrack_attempts() -> u32 {
    3
}

const fn default_max_run_passes() -> u32 {
    5
}

const fn default_acceptable_failure_threshold() -> u32 {
    5
}

fn default_pass_strategy() -> String {
    "carry_over".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            requirements_file: default_requirements_file(),
            primary_requirements_file: default_primary_requirements_file(),
            metrics_output_file: default_metrics_output_file(),
            history_output_file: default_history_output_file(),
            max_llm_backtrack_attempts: default_max_backtrack_attempts(),
            max_run_passes: default_max_run_passes(),
            acceptable_failure_threshold: default_acceptable_failure_threshold(),
            pass_strategy: default_pass_strategy(),
            validation_config: ValidationConfig::default(),
            environment: EnvironmentConfig::default(),
            oracle: OracleConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Strategy name: script, pytest or pytest_with_smoke_test
    #[serde(rename = "type", default = "default_validation_type")]
    pub kind: String,

    /// Test path/module for pytest, working directory for the smoke script
    #[serde(default = "default_validation_target")]
    pub target: String,

    /// Smoke test script (script strategies only)
    #[serde(default)]
    pub smoke_test_script: Option<PathBuf>,

    /// Per-process timeout in seconds
    #[serde(default = "default_validation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_validation_type() -> String {
    "pytest".to_string()
}

fn default_validation_target() -> String {
    ".".to_string()
}

const fn default_validation_timeout_secs() -> u64 {
    3600
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            kind: default_validation_type(),
            target: default_validation_target(),
            smoke_test_script: None,
            timeout_secs: default_validation_timeout_secs(),
        }
    }
}

/// Execution environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EnvironmentConfig {
    /// Interpreter used for pip installs and test runs
    #[serde(default = "default_python_executable")]
    pub python_executable: String,

    /// Directory the full test suite runs from
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Installer timeout in seconds
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,

    /// Extra arguments appended to `pip install -r <file>`
    #[serde(default)]
    pub pip_args: Vec<String>,
}

fn default_python_executable() -> String {
    "python".to_string()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_install_timeout_secs() -> u64 {
    1800
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            python_executable: default_python_executable(),
            working_dir: default_working_dir(),
            install_timeout_secs: default_install_timeout_secs(),
            pip_args: Vec::new(),
        }
    }
}

/// Repair oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL (overridable for proxies and tests)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum tokens in a proposal
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,

    /// Characters of validation output forwarded with each repair request
    #[serde(default = "default_output_excerpt_chars")]
    pub output_excerpt_chars: usize,
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_oracle_timeout_secs() -> u64 {
    300
}

const fn default_output_excerpt_chars() -> usize {
    4000
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_oracle_timeout_secs(),
            output_excerpt_chars: default_output_excerpt_chars(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    10000
}

const fn default_max_backoff_ms() -> u64 {
    300_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Wrap validation output in `::group::` markers for CI log folding
    #[serde(default)]
    pub ci_groups: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "never".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            ci_groups: false,
        }
    }
}

/// Closed set of validation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
    /// Single smoke-test process; exit code decides
    Script,
    /// Full pytest suite judged against the failure threshold
    Pytest,
    /// Smoke test as a fail-fast gate, then the full suite
    PytestWithSmokeTest,
}

impl ValidationStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Pytest => "pytest",
            Self::PytestWithSmokeTest => "pytest_with_smoke_test",
        }
    }

    /// Whether the strategy runs the smoke-test script
    pub const fn uses_script(self) -> bool {
        matches!(self, Self::Script | Self::PytestWithSmokeTest)
    }
}

impl FromStr for ValidationStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(Self::Script),
            "pytest" => Ok(Self::Pytest),
            "pytest_with_smoke_test" => Ok(Self::PytestWithSmokeTest),
            other => Err(ConfigError::UnknownValidationStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for ValidationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requirement set a new pass starts from once the backtrack budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStrategy {
    /// Keep the last proposal
    #[default]
    CarryOver,
    /// Go back to the initial set
    Reset,
    /// Initial set with every non-pinned version constraint dropped
    Widen,
}

impl FromStr for PassStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "carry_over" => Ok(Self::CarryOver),
            "reset" => Ok(Self::Reset),
            "widen" => Ok(Self::Widen),
            other => Err(ConfigError::UnknownPassStrategy(other.to_string())),
        }
    }
}

const DEFAULT_SMOKE_TEST_SCRIPT: &str = "validation_smoke.py";

/// Immutable, validated parameters of one resolution run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionConfig {
    pub max_backtrack_attempts: u32,
    pub max_run_passes: u32,
    pub acceptable_failure_threshold: u32,
    pub validation_strategy: ValidationStrategy,
    pub validation_target: String,
    pub smoke_test_script: PathBuf,
    pub validation_timeout: Duration,
    pub pass_strategy: PassStrategy,
    pub output_excerpt_chars: usize,
}

impl ResolutionConfig {
    /// Build the run record, rejecting anything the loop cannot execute
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let validation_strategy: ValidationStrategy = config.validation_config.kind.parse()?;
        let pass_strategy: PassStrategy = config.pass_strategy.parse()?;

        if config.max_run_passes == 0 {
            return Err(ConfigError::InvalidMaxRunPasses(config.max_run_passes));
        }

        if config.validation_config.target.trim().is_empty() {
            return Err(ConfigError::EmptyValidationTarget);
        }

        if config.validation_config.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("validation_config.timeout_secs"));
        }

        Ok(Self {
            max_backtrack_attempts: config.max_llm_backtrack_attempts,
            max_run_passes: config.max_run_passes,
            acceptable_failure_threshold: config.acceptable_failure_threshold,
            validation_strategy,
            validation_target: config.validation_config.target.clone(),
            smoke_test_script: config
                .validation_config
                .smoke_test_script
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SMOKE_TEST_SCRIPT)),
            validation_timeout: Duration::from_secs(config.validation_config.timeout_secs),
            pass_strategy,
            output_excerpt_chars: config.oracle.output_excerpt_chars,
        })
    }

    /// Upper bound on validation calls in one run
    pub const fn attempt_budget(&self) -> u32 {
        self.max_run_passes
            .saturating_mul(self.max_backtrack_attempts.saturating_add(1))
    }
}
