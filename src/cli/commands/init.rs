//! Implementation of the `depagent init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing .depagent/config.yaml
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub files_created: Vec<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.files_created.is_empty() {
            lines.push("\nCreated files:".to_string());
            for file in &self.files_created {
                lines.push(format!("  - {file}"));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Render the default configuration as YAML
pub fn default_config_yaml() -> Result<String> {
    let yaml = serde_yaml::to_string(&Config::default())
        .context("Failed to serialize default configuration")?;
    Ok(format!(
        "# depagent configuration\n# Environment variables DEPAGENT_<KEY> (nested keys joined with __) override these values.\n{yaml}"
    ))
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<i32> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };

    let config_dir = target_path.join(".depagent");
    let config_file = config_dir.join("config.yaml");

    if config_file.exists() && !args.force {
        let out = InitOutput {
            success: false,
            message: "Project already initialized. Use --force to overwrite the configuration."
                .to_string(),
            initialized_path: target_path,
            files_created: vec![],
        };
        output(&out, json_mode);
        return Ok(1);
    }

    let mut files_created = Vec::new();

    fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    fs::write(&config_file, default_config_yaml()?)
        .await
        .with_context(|| format!("Failed to write {}", config_file.display()))?;
    files_created.push(".depagent/config.yaml".to_string());

    let primary = target_path.join(Config::default().primary_requirements_file);
    if !primary.exists() {
        fs::write(
            &primary,
            "# Requirements that every resolved set must keep verbatim\n",
        )
        .await
        .with_context(|| format!("Failed to write {}", primary.display()))?;
        files_created.push(primary.display().to_string());
    }

    // The file must load back through the normal path
    ConfigLoader::load_from_dir(&target_path).context("Generated configuration is invalid")?;

    let out = InitOutput {
        success: true,
        message: format!("Initialized depagent in {}", target_path.display()),
        initialized_path: target_path,
        files_created,
    };
    output(&out, json_mode);
    Ok(0)
}
