// System configuration - schedule settings plus scan-loop tuning
// Stored as JSON next to the database, load-or-default on startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::matcher::DEFAULT_THRESHOLD;
use crate::scanner::ScanConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Expected workday start, "HH:MM"
    pub entry_time: String,

    /// Expected workday end, "HH:MM"
    pub exit_time: String,

    pub break_duration_minutes: u32,

    /// Matcher acceptance threshold (0-100)
    pub match_threshold: f64,

    /// Seconds captures stay suppressed after a verification
    pub cooldown_seconds: u64,

    /// Scan loop tick cadence
    pub tick_millis: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            entry_time: "08:00".to_string(),
            exit_time: "17:00".to_string(),
            break_duration_minutes: 60,
            match_threshold: DEFAULT_THRESHOLD,
            cooldown_seconds: 3,
            tick_millis: 500,
        }
    }
}

impl AppConfig {
    /// Read the config file; a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config at {}", path.display()))?;
        Ok(())
    }

    /// Scan-loop tuning derived from this config.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            threshold: self.match_threshold,
            cooldown: Duration::from_secs(self.cooldown_seconds),
            tick: Duration::from_millis(self.tick_millis),
            ..ScanConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("no-config-{}.json", uuid::Uuid::new_v4()));
        let config = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let path = std::env::temp_dir().join(format!("config-{}.json", uuid::Uuid::new_v4()));

        let config = AppConfig {
            entry_time: "07:30".to_string(),
            cooldown_seconds: 5,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_scan_config_carries_tuning() {
        let config = AppConfig {
            match_threshold: 90.0,
            cooldown_seconds: 10,
            tick_millis: 250,
            ..AppConfig::default()
        };

        let scan = config.scan_config();
        assert_eq!(scan.threshold, 90.0);
        assert_eq!(scan.cooldown, Duration::from_secs(10));
        assert_eq!(scan.tick, Duration::from_millis(250));
    }
}
