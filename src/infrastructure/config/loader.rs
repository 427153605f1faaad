use figment::providers::{Env, Format, Yaml};
use figment::value::{Dict, Map, Value};
use figment::{Figment, Metadata, Profile, Provider};
use std::path::{Path, PathBuf};

use crate::domain::errors::ConfigError;
use crate::domain::models::config::{Config, ResolutionConfig};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["json", "pretty"];
const VALID_ROTATIONS: [&str; 3] = ["daily", "hourly", "never"];

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging from the current directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Defaults declared on the config structs
    /// 2. .depagent/config.yaml (project config)
    /// 3. .depagent/local.yaml (local overrides, optional)
    /// 4. Environment variables (DEPAGENT_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`] with the `.depagent/` directory under `root`
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let dir = root.as_ref().join(".depagent");

        // Defaults come from serde rather than a serialized provider; file keys
        // are lowercased so they merge with the lowercased env keys.
        let config: Config = Figment::new()
            .merge(LowercaseKeys(Yaml::file(dir.join("config.yaml"))))
            .merge(LowercaseKeys(Yaml::file(dir.join("local.yaml"))))
            .merge(Env::prefixed("DEPAGENT_").split("__"))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(LowercaseKeys(Yaml::file(path.as_ref())))
            .merge(Env::prefixed("DEPAGENT_").split("__"))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Strategy names, pass budget, target and validation timeout
        ResolutionConfig::from_config(config)?;

        let paths = [
            ("requirements_file", &config.requirements_file),
            ("primary_requirements_file", &config.primary_requirements_file),
            ("metrics_output_file", &config.metrics_output_file),
            ("history_output_file", &config.history_output_file),
        ];
        for (name, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath(name));
            }
        }

        // Every artifact needs its own file; the primary file is read-only
        let resolved: Vec<(&'static str, PathBuf)> = paths
            .iter()
            .map(|(name, path)| (*name, std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())))
            .collect();
        for (i, (first, first_path)) in resolved.iter().enumerate() {
            if let Some((second, _)) = resolved[i + 1..]
                .iter()
                .find(|(_, other)| other == first_path)
            {
                return Err(ConfigError::PathCollision {
                    first: *first,
                    second: *second,
                    path: first_path.clone(),
                });
            }
        }

        if config.environment.python_executable.trim().is_empty() {
            return Err(ConfigError::EmptyPythonExecutable);
        }

        if config.environment.install_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("environment.install_timeout_secs"));
        }

        if config.oracle.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("oracle.timeout_secs"));
        }

        if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if !VALID_LOG_FORMATS.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if !VALID_ROTATIONS.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

/// Provider adapter that lowercases every key of the wrapped provider
///
/// The env provider always yields lowercase keys, so a file using the
/// upper-case option names would otherwise produce two keys for one field.
struct LowercaseKeys<P>(P);

impl<P: Provider> Provider for LowercaseKeys<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Ok(self
            .0
            .data()?
            .into_iter()
            .map(|(profile, dict)| (profile, lowercase_keys(dict)))
            .collect())
    }
}

fn lowercase_keys(dict: Dict) -> Dict {
    dict.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Dict(tag, inner) => Value::Dict(tag, lowercase_keys(inner)),
                other => other,
            };
            (key.to_lowercase(), value)
        })
        .collect()
}
