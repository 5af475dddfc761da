//! Engine configuration.
//!
//! Everything here is plain serde data so that `warden-config` can layer it
//! from files and environment variables.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{InternalNetworks, RFC1918_NETWORKS};

/// Error type for invalid engine configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("business hours must satisfy start_hour < end_hour <= 24 (got {start}..{end})")]
    InvalidBusinessHours { start: u32, end: u32 },

    #[error("business hours must include at least one weekday")]
    NoBusinessDays,

    #[error("invalid internal network '{network}'")]
    InvalidNetwork { network: String },
}

/// Decision engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Collapse storage failures, timeouts and cancellations into a deny
    /// decision instead of returning the error.
    pub fail_safe: bool,
    /// Emit an audit record for every decision.
    pub audit: bool,
    /// Window used to derive `is_business_hours`.
    pub business_hours: BusinessHours,
    /// CIDR ranges classified as internal, in addition to loopback.
    pub internal_networks: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_safe: true,
            audit: true,
            business_hours: BusinessHours::default(),
            internal_networks: RFC1918_NETWORKS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl EngineConfig {
    /// Configuration for policy authoring and tests: errors are surfaced
    /// rather than collapsed into denials.
    pub fn strict() -> Self {
        Self {
            fail_safe: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.business_hours.validate()?;
        InternalNetworks::parse(self.internal_networks.as_slice())?;
        Ok(())
    }
}

/// Weekday set and half-open hour range `[start_hour, end_hour)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    pub weekdays: Vec<Weekday>,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for BusinessHours {
    /// Monday to Friday, 08:00 to 18:00.
    fn default() -> Self {
        Self {
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_hour: 8,
            end_hour: 18,
        }
    }
}

impl BusinessHours {
    pub fn contains(&self, weekday: Weekday, hour: u32) -> bool {
        self.weekdays.contains(&weekday) && (self.start_hour..self.end_hour).contains(&hour)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weekdays.is_empty() {
            return Err(ConfigError::NoBusinessDays);
        }
        if self.start_hour >= self.end_hour || self.end_hour > 24 {
            return Err(ConfigError::InvalidBusinessHours {
                start: self.start_hour,
                end: self.end_hour,
            });
        }
        Ok(())
    }
}
