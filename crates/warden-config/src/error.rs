//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found at {path}")]
    MissingFile { path: PathBuf },

    #[error("Invalid engine configuration: {0}")]
    Engine(#[from] warden_abac::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("XDG directory error: {0}")]
    XdgError(String),

    #[error("Failed to render configuration as TOML: {0}")]
    Render(#[from] toml::ser::Error),
}
