// Engine configuration

use crate::constants;
use crate::error::EngineError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageSettings,
    pub scheduler: SchedulerSettings,
    pub renewal: RenewalDefaults,
    pub api: ApiSettings,
}

/// Storage layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory holding one subdirectory per certificate
    pub root: PathBuf,

    /// Archived versions kept per certificate before pruning
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,

    /// Watch the storage root for external changes
    #[serde(default = "default_true")]
    pub watch_filesystem: bool,
}

/// Renewal sweep scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Five-field cron expression (minute hour day-of-month month day-of-week)
    pub schedule: String,

    /// Whether the scheduled sweep is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Renewal worker pool size
    #[serde(default = "default_renewal_workers")]
    pub max_concurrent_renewals: usize,

    /// Concurrent per-certificate dispatch limit
    #[serde(default = "default_dispatch_workers")]
    pub max_concurrent_dispatches: usize,
}

/// Global renewal policy defaults; per-certificate policy fields that are
/// null inherit from here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenewalDefaults {
    pub auto_renew: bool,
    pub validity_days: u32,
    pub renew_before_days: u32,
    pub key_size: u32,
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_history_retention() -> usize {
    constants::DEFAULT_HISTORY_RETENTION
}

fn default_renewal_workers() -> usize {
    constants::DEFAULT_RENEWAL_WORKERS
}

fn default_dispatch_workers() -> usize {
    constants::DEFAULT_DISPATCH_WORKERS
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./certs"),
            history_retention: constants::DEFAULT_HISTORY_RETENTION,
            watch_filesystem: true,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            schedule: constants::DEFAULT_SWEEP_SCHEDULE.to_string(),
            enabled: true,
            max_concurrent_renewals: constants::DEFAULT_RENEWAL_WORKERS,
            max_concurrent_dispatches: constants::DEFAULT_DISPATCH_WORKERS,
        }
    }
}

impl Default for RenewalDefaults {
    fn default() -> Self {
        Self {
            auto_renew: true,
            validity_days: constants::DEFAULT_VALIDITY_DAYS,
            renew_before_days: constants::DEFAULT_RENEW_BEFORE_DAYS,
            key_size: constants::DEFAULT_KEY_SIZE,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            scheduler: SchedulerSettings::default(),
            renewal: RenewalDefaults::default(),
            api: ApiSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::invalid(format!(
                "Failed to read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| EngineError::invalid(format!("Failed to parse TOML config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Internal(format!("Failed to serialize config: {}", e)))?;

        fs::write(path.as_ref(), toml_str).map_err(|e| {
            EngineError::Internal(format!(
                "Failed to write config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        crate::renewal::schedule::validate_expression(&self.scheduler.schedule)?;

        if self.scheduler.max_concurrent_renewals == 0 {
            return Err(EngineError::invalid("max_concurrent_renewals must be > 0"));
        }
        if self.renewal.validity_days == 0 {
            return Err(EngineError::invalid("validity_days must be > 0"));
        }
        if self.renewal.renew_before_days >= self.renewal.validity_days {
            return Err(EngineError::invalid(
                "renew_before_days must be smaller than validity_days",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renewal.validity_days, 365);
        assert_eq!(config.renewal.renew_before_days, 30);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scheduler.schedule, config.scheduler.schedule);
        assert_eq!(parsed.storage.history_retention, 10);
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut config = EngineConfig::default();
        config.scheduler.schedule = "not a cron".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn test_renew_before_must_be_below_validity() {
        let mut config = EngineConfig::default();
        config.renewal.renew_before_days = 400;
        assert!(config.validate().is_err());
    }
}
