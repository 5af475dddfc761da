//! Configuration commands.

use anyhow::{Context, Result};
use warden_config::WardenConfig;

use crate::ConfigFormat;

/// Show the effective configuration.
pub fn show(config: &WardenConfig, format: ConfigFormat) -> Result<()> {
    match format {
        ConfigFormat::Json => {
            let json = serde_json::to_string_pretty(config)?;
            println!("{json}");
        }
        ConfigFormat::Toml => {
            let rendered = config.to_toml().context("Failed to render configuration")?;
            println!("{rendered}");
        }
    }
    Ok(())
}
