//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VENDO_DATABASE_PATH=/var/lib/vendo/vendo.db                        │
//! │     VENDO_PAYMENT_TTL_MINUTES=30                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vendo/vendo.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.vendo.vendo/vendo.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/vendo/vendo.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//! busy_timeout_ms = 5000
//!
//! [sales]
//! payment_ttl_minutes = 60
//! pickup_code_attempts = 8
//!
//! [sweeper]
//! enabled = true
//! interval_secs = 60
//! archive_after_days = 30
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use vendo_core::validation::validate_ttl_minutes;
use vendo_core::DEFAULT_PAYMENT_TTL_MINUTES;
use vendo_db::DbConfig;

use crate::error::{EngineError, EngineResult};

const CONFIG_FILE_NAME: &str = "vendo.toml";
const DATABASE_FILE_NAME: &str = "vendo.db";

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`. Defaults to the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a statement waits on a locked database file.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Sales Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSettings {
    /// Pickup window after payment when the caller gives no TTL.
    #[serde(default = "default_payment_ttl")]
    pub payment_ttl_minutes: i64,

    /// How many fresh codes to draw before giving up on a collision streak.
    #[serde(default = "default_pickup_code_attempts")]
    pub pickup_code_attempts: u32,
}

fn default_payment_ttl() -> i64 {
    DEFAULT_PAYMENT_TTL_MINUTES
}

fn default_pickup_code_attempts() -> u32 {
    8
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            payment_ttl_minutes: default_payment_ttl(),
            pickup_code_attempts: default_pickup_code_attempts(),
        }
    }
}

// =============================================================================
// Sweeper Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Archive terminal sales older than this many days after each sweep.
    /// Archival is off when unset.
    #[serde(default)]
    pub archive_after_days: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    60
}

impl Default for SweeperSettings {
    fn default() -> Self {
        SweeperSettings {
            enabled: true,
            interval_secs: default_interval(),
            archive_after_days: None,
        }
    }
}

impl SweeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn archive_after(&self) -> Option<chrono::Duration> {
        self.archive_after_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_level(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub sweeper: SweeperSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`vendo.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        validate_ttl_minutes(self.sales.payment_ttl_minutes).map_err(|e| {
            EngineError::InvalidConfig(format!("sales.payment_ttl_minutes: {}", e))
        })?;

        if self.sales.pickup_code_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "sales.pickup_code_attempts must be greater than 0".into(),
            ));
        }

        if self.sweeper.interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "sweeper.interval_secs must be greater than 0".into(),
            ));
        }

        if self.sweeper.archive_after_days == Some(0) {
            return Err(EngineError::InvalidConfig(
                "sweeper.archive_after_days must be greater than 0".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(EngineError::InvalidConfig("logging.level is empty".into()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `VENDO_*` overrides read through `lookup`. Unparseable
    /// values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("VENDO_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(v) = lookup("VENDO_DATABASE_MAX_CONNECTIONS") {
            match v.parse() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %v, "Ignoring invalid VENDO_DATABASE_MAX_CONNECTIONS"),
            }
        }

        if let Some(v) = lookup("VENDO_PAYMENT_TTL_MINUTES") {
            match v.parse() {
                Ok(n) => self.sales.payment_ttl_minutes = n,
                Err(_) => warn!(value = %v, "Ignoring invalid VENDO_PAYMENT_TTL_MINUTES"),
            }
        }

        if let Some(v) = lookup("VENDO_PICKUP_CODE_ATTEMPTS") {
            match v.parse() {
                Ok(n) => self.sales.pickup_code_attempts = n,
                Err(_) => warn!(value = %v, "Ignoring invalid VENDO_PICKUP_CODE_ATTEMPTS"),
            }
        }

        if let Some(v) = lookup("VENDO_SWEEPER_ENABLED") {
            match v.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sweeper.enabled = true,
                "0" | "false" | "no" | "off" => self.sweeper.enabled = false,
                _ => warn!(value = %v, "Ignoring invalid VENDO_SWEEPER_ENABLED"),
            }
        }

        if let Some(v) = lookup("VENDO_SWEEPER_INTERVAL_SECS") {
            match v.parse() {
                Ok(n) => self.sweeper.interval_secs = n,
                Err(_) => warn!(value = %v, "Ignoring invalid VENDO_SWEEPER_INTERVAL_SECS"),
            }
        }

        if let Some(v) = lookup("VENDO_ARCHIVE_AFTER_DAYS") {
            match v.parse() {
                Ok(n) => self.sweeper.archive_after_days = Some(n),
                Err(_) => warn!(value = %v, "Ignoring invalid VENDO_ARCHIVE_AFTER_DAYS"),
            }
        }

        if let Some(level) = lookup("VENDO_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "vendo", "vendo")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Configured database path, else the platform data dir, else the
    /// working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME)))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
    }

    /// Pool configuration for [`vendo_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        let path = self.database_path();
        if path.as_os_str() == vendo_db::pool::IN_MEMORY_PATH {
            return DbConfig::in_memory();
        }

        DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sales.payment_ttl_minutes, 60);
        assert_eq!(config.sales.pickup_code_attempts, 8);
        assert!(config.sweeper.enabled);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.sweeper.archive_after(), None);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [sales]
            payment_ttl_minutes = 15

            [sweeper]
            archive_after_days = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.sales.payment_ttl_minutes, 15);
        assert_eq!(config.sales.pickup_code_attempts, 8);
        assert_eq!(config.sweeper.archive_after(), Some(chrono::Duration::days(30)));
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("VENDO_DATABASE_PATH", ":memory:"),
            ("VENDO_PAYMENT_TTL_MINUTES", "30"),
            ("VENDO_SWEEPER_ENABLED", "off"),
            ("VENDO_SWEEPER_INTERVAL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.sales.payment_ttl_minutes, 30);
        assert!(!config.sweeper.enabled);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert!(config.db_config().is_in_memory());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.sales.payment_ttl_minutes = 0;
        assert!(config.validate().is_err());

        config.sales.payment_ttl_minutes = 60;
        config.sales.pickup_code_attempts = 0;
        assert!(config.validate().is_err());

        config.sales.pickup_code_attempts = 1;
        config.sweeper.archive_after_days = Some(0);
        assert!(config.validate().is_err());

        config.sweeper.archive_after_days = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join(CONFIG_FILE_NAME);

        let mut config = EngineConfig::default();
        config.sales.payment_ttl_minutes = 20;
        config.database.busy_timeout_ms = 750;
        config.sweeper.archive_after_days = Some(7);
        config.save(Some(path.clone())).unwrap();
        assert!(path.exists());

        let loaded = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.sales.payment_ttl_minutes, 20);
        assert_eq!(loaded.sweeper.archive_after_days, Some(7));
        assert_eq!(
            loaded.db_config().busy_timeout,
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[sales]"));
        assert!(toml_str.contains("[sweeper]"));

        let back: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }
}
