//! Credential lookup
//!
//! The oracle API key is read from the environment variable named in
//! `oracle.api_key_env`. It is never stored in config files or logged.

use tracing::debug;

use crate::domain::errors::ConfigError;
use crate::domain::models::OracleConfig;

/// Read the oracle API key
///
/// Fails with [`ConfigError::MissingCredential`] when the variable is unset
/// or blank, so the run stops before any install happens.
pub fn load_api_key(config: &OracleConfig) -> Result<String, ConfigError> {
    match std::env::var(&config.api_key_env) {
        Ok(value) if !value.trim().is_empty() => {
            debug!(variable = %config.api_key_env, "API key loaded from environment");
            Ok(value.trim().to_string())
        }
        _ => Err(ConfigError::MissingCredential(config.api_key_env.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(var: &str) -> OracleConfig {
        OracleConfig {
            api_key_env: var.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_api_key_from_env() {
        let key = temp_env::with_var("DEPAGENT_TEST_KEY_SET", Some(" sk-ant-test \n"), || {
            load_api_key(&config("DEPAGENT_TEST_KEY_SET"))
        })
        .unwrap();
        assert_eq!(key, "sk-ant-test");
    }

    #[test]
    fn test_missing_api_key() {
        let result = temp_env::with_var_unset("DEPAGENT_TEST_KEY_UNSET", || {
            load_api_key(&config("DEPAGENT_TEST_KEY_UNSET"))
        });
        match result {
            Err(ConfigError::MissingCredential(name)) => {
                assert_eq!(name, "DEPAGENT_TEST_KEY_UNSET");
            }
            other => panic!("Expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let result = temp_env::with_var("DEPAGENT_TEST_KEY_BLANK", Some("   "), || {
            load_api_key(&config("DEPAGENT_TEST_KEY_BLANK"))
        });
        assert!(matches!(result, Err(ConfigError::MissingCredential(_))));
    }
}
