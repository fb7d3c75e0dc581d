//! Engine configuration
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, and `CADENCE_*` environment variables (nested keys separated by
//! `__`). A `.env` file in the working directory is loaded first if present.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides, e.g. `CADENCE_MAX_CALL_DEPTH`
pub const ENV_PREFIX: &str = "CADENCE";

/// Environment variable naming the config file when none is given
pub const CONFIG_PATH_ENV: &str = "CADENCE_CONFIG_PATH";

const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine name used in logs; a random one is generated when unset
    pub name: Option<String>,
    /// Guest call depth at which a RangeError is thrown
    pub max_call_depth: usize,
    /// Maximum number of positions captured per suspension
    pub stack_trace_limit: usize,
    /// Install the standard library on new engines
    pub install_stdlib: bool,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_call_depth: 200,
            stack_trace_limit: 100,
            install_stdlib: true,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`], applying explicit overrides last
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    name: Option<String>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Config file to read (overrides `CADENCE_CONFIG_PATH` and the default)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Ignore `.env` and `CADENCE_*` variables
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        if !self.skip_env {
            dotenvy::dotenv().ok();
        }

        // An explicitly named file must exist; the default one is optional
        let (path, required) = match self.config_path {
            Some(path) => (path, true),
            None => match std::env::var(CONFIG_PATH_ENV).ok().filter(|_| !self.skip_env) {
                Some(path) => (PathBuf::from(path), true),
                None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let mut builder = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(required));
        if !self.skip_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut engine: EngineConfig = builder.build()?.try_deserialize()?;
        if let Some(name) = self.name {
            engine.name = Some(name);
        }
        engine.validate()?;

        tracing::debug!(path = %path.display(), "Loaded engine configuration");
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_call_depth, 200);
        assert_eq!(config.stack_trace_limit, 100);
        assert!(config.install_stdlib);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let config = EngineConfig::builder()
            .skip_env(true)
            .name(Some("sample".to_string()))
            .build()
            .unwrap();
        assert_eq!(config.name.as_deref(), Some("sample"));
        assert_eq!(config.max_call_depth, 200);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("cadence-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max_call_depth = 12\ninstall_stdlib = false").unwrap();

        let config = EngineConfig::builder()
            .skip_env(true)
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.max_call_depth, 12);
        assert!(!config.install_stdlib);
        assert_eq!(config.stack_trace_limit, 100);
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let result = EngineConfig::builder()
            .skip_env(true)
            .config_path(Some(PathBuf::from("/nonexistent/cadence.toml")))
            .build();
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_zero_call_depth_is_invalid() {
        let config = EngineConfig {
            max_call_depth: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
