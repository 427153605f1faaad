use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::errors::ConfigError;
use crate::domain::models::LoggingConfig;

const LOG_FILE_NAME: &str = "depagent.log";

/// Logger implementation using tracing
///
/// Console output always goes to stderr so stdout stays free for command
/// output and CI workflow commands.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Initialize the global subscriber
    ///
    /// Returns a logger holding the file writer guard; drop it only at exit or
    /// buffered file lines are lost. `RUST_LOG` overrides the configured level.
    pub fn init(config: &LoggingConfig) -> Result<Self, ConfigError> {
        let default_level = parse_log_level(&config.level)?;

        let env_filter = EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy();

        let console_layer = match config.format.as_str() {
            "json" => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .boxed(),
            "pretty" => tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .boxed(),
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        let (file_layer, guard) = match &config.log_dir {
            Some(log_dir) => {
                let appender = match config.rotation.as_str() {
                    "daily" => rolling::daily(log_dir, LOG_FILE_NAME),
                    "hourly" => rolling::hourly(log_dir, LOG_FILE_NAME),
                    "never" => rolling::never(log_dir, LOG_FILE_NAME),
                    other => return Err(ConfigError::InvalidRotation(other.to_string())),
                };
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                // Files are always JSON for structured search
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        // A second init in the same process (tests) keeps the first subscriber
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();

        tracing::debug!(
            level = %config.level,
            format = %config.format,
            file_output = config.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

/// Parse log level string to Level
fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}
