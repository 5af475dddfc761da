//! Configuration management for Warden
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (`WARDEN_*` prefix, `__` between sections)
//! 3. warden.local.toml (gitignored, local overrides)
//! 4. warden.toml (git-tracked, project config)
//! 5. ~/.config/warden/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use warden_abac::EngineConfig;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Main Warden configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string. `RUST_LOG` wins
    /// when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON dataset loaded into the in-memory store.
    pub dataset: Option<PathBuf>,
}

impl WardenConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if let Some(dataset) = self.store.dataset.as_mut() {
            if dataset.is_relative() {
                *dataset = base.join(&*dataset);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WardenConfig::default();
        assert!(config.engine.fail_safe);
        assert!(config.engine.audit);
        assert_eq!(config.logging.filter, "warn");
        assert!(config.store.dataset.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = WardenConfig {
            store: StoreConfig {
                dataset: Some(PathBuf::from("policies/dataset.json")),
            },
            ..Default::default()
        };
        config.resolve_paths("/srv/warden");

        assert_eq!(
            config.store.dataset,
            Some(PathBuf::from("/srv/warden/policies/dataset.json"))
        );
    }

    #[test]
    fn test_absolute_paths_untouched() {
        let mut config = WardenConfig {
            store: StoreConfig {
                dataset: Some(PathBuf::from("/data/dataset.json")),
            },
            ..Default::default()
        };
        config.resolve_paths("/srv/warden");
        assert_eq!(
            config.store.dataset,
            Some(PathBuf::from("/data/dataset.json"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_engine() {
        let mut config = WardenConfig::default();
        config.engine.business_hours.start_hour = 20;
        assert!(matches!(config.validate(), Err(ConfigError::Engine(_))));

        let mut config = WardenConfig::default();
        config.logging.filter = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_toml_rendering() {
        let rendered = WardenConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[engine]"));
        assert!(rendered.contains("fail_safe = true"));
        assert!(rendered.contains("[logging]"));
    }
}
