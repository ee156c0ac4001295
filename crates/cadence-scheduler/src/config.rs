use std::time::Duration;

use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

pub const DEFAULT_PROCESSING_RATE_SECS: u64 = 60;
pub const DEFAULT_LOCATION: &str = "UTC";

/// Scheduler settings (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between processing passes. 0 falls back to the default.
    #[serde(default = "default_processing_rate")]
    pub processing_rate_secs: u64,
    /// IANA timezone used for "now" and for local-time schedules.
    #[serde(default = "default_location")]
    pub location: String,
    /// Delete jobs that reach DONE instead of keeping them.
    #[serde(default)]
    pub delete_on_done: bool,
    /// Delete jobs on cancel instead of keeping them as CANCELED.
    #[serde(default)]
    pub delete_on_cancel: bool,
    /// SQLite database file. When unset jobs live in memory only.
    #[serde(default)]
    pub database_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            processing_rate_secs: DEFAULT_PROCESSING_RATE_SECS,
            location: DEFAULT_LOCATION.to_string(),
            delete_on_done: false,
            delete_on_cancel: false,
            database_path: None,
        }
    }
}

fn default_processing_rate() -> u64 {
    DEFAULT_PROCESSING_RATE_SECS
}
fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

impl SchedulerConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Uses `config_path` when given, else ~/.cadence/cadence.toml. A missing
    /// file leaves every field at its default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("CADENCE_")),
        )
    }

    /// Extract from an already-assembled figment, layered over the defaults.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        Figment::from(Serialized::defaults(SchedulerConfig::default()))
            .merge(figment)
            .extract()
            .map_err(|e| SchedulerError::Config(e.to_string()))
    }

    pub fn processing_rate(&self) -> Duration {
        match self.processing_rate_secs {
            0 => Duration::from_secs(DEFAULT_PROCESSING_RATE_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.location
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(self.location.clone()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}
