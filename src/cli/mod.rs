//! Command-line interface
//!
//! Every command returns the process exit code on success; errors bubble up
//! as `anyhow::Error` and are reported by [`handle_error`].

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::domain::models::{Config, LoggingConfig};
use crate::infrastructure::config::ConfigLoader;

pub use commands::{
    init::InitArgs, run::RunArgs, summarize::SummarizeArgs, validate::ValidateArgs,
};

#[derive(Parser, Debug)]
#[command(name = "depagent")]
#[command(about = "Iteratively repair a Python dependency set until validation passes", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to use instead of .depagent/config.yaml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default .depagent/config.yaml
    Init(InitArgs),

    /// Run the install, validate and repair loop
    Run(RunArgs),

    /// Validate the current environment once with the configured strategy
    Validate(ValidateArgs),

    /// Summarize test-runner output from a file or stdin
    Summarize(SummarizeArgs),
}

/// Load configuration from `path` when given, otherwise from `.depagent/`
pub fn load_config(path: Option<&Path>) -> Result<Config, crate::domain::errors::ConfigError> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// CI group markers go to stdout, which `--json` reserves for the payload
pub const fn ci_groups_enabled(logging: &LoggingConfig, json_mode: bool) -> bool {
    logging.ci_groups && !json_mode
}

/// Report a command error and exit with status 1
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let payload = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
