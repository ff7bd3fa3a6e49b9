//! Configuration infrastructure
//!
//! Settings are read from an optional JSON file in the user config directory,
//! then overridden by `DATASYNC__<SECTION>__<KEY>` environment variables.
//! Every section falls back to the values in [`defaults`].

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::application::batch_executor::BatchRunConfig;
use crate::application::engine::EngineOptions;
use crate::domain::finding::FindingKind;

const APP_DIR_NAME: &str = "datasync-console";
const CONFIG_FILE_NAME: &str = "datasync_config.json";
const ENV_PREFIX: &str = "DATASYNC";
const ENV_SEPARATOR: &str = "__";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub batch: BatchConfig,
    pub detection: DetectionConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Remediation batch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Fixes dispatched concurrently per chunk
    pub batch_size: usize,

    /// Pause between chunks in milliseconds
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Shop-local offset from UTC, used for delivery slot suggestions
    pub utc_offset_hours: i32,

    /// Rule names to run (`phone-format`, `duplicate-customer`, ...); empty runs all
    pub enabled_rules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file; defaults to the app data directory
    pub database_path: Option<PathBuf>,

    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Log directory; defaults to the app data directory
    pub log_dir: Option<PathBuf>,

    /// Rolled log files to keep
    pub max_files: usize,

    /// Per-target levels, e.g. `"sqlx": "warn"`
    pub module_filters: HashMap<String, String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            batch_delay_ms: defaults::BATCH_DELAY_MS,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: defaults::UTC_OFFSET_HOURS,
            enabled_rules: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("datasync_console_lib".to_string(), defaults::LOG_LEVEL.to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.batch_size == 0 {
            return Err(ConfigError::Validation {
                message: "batch.batch_size must be greater than 0".to_string(),
            });
        }

        if self.detection.utc_offset_hours.abs() > defaults::MAX_UTC_OFFSET_HOURS {
            return Err(ConfigError::Validation {
                message: format!(
                    "detection.utc_offset_hours must be within ±{} (got {})",
                    defaults::MAX_UTC_OFFSET_HOURS,
                    self.detection.utc_offset_hours
                ),
            });
        }

        if let Some(unknown) = self
            .detection
            .enabled_rules
            .iter()
            .find(|name| FindingKind::parse(name).is_none())
        {
            return Err(ConfigError::Validation {
                message: format!("detection.enabled_rules contains unknown rule '{}'", unknown),
            });
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "logging.level must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn batch_run_config(&self) -> BatchRunConfig {
        BatchRunConfig {
            batch_size: self.batch.batch_size,
            inter_batch_delay_ms: self.batch.batch_delay_ms,
            confirmation_token: None,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            enabled_kinds: self
                .detection
                .enabled_rules
                .iter()
                .filter_map(|name| FindingKind::parse(name))
                .collect(),
            utc_offset_hours: self.detection.utc_offset_hours,
            batch_defaults: self.batch_run_config(),
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);

        Ok(data_dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load the config file (if any) plus environment overrides, then validate.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(self.config_path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        info!("Loaded configuration (file: {:?})", self.config_path);
        Ok(config)
    }

    /// Write the default configuration on first run and create data directories.
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            return Ok(self.load_config()?);
        }

        info!("🎉 First run detected - writing default configuration");
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;

        let app_data_dir = Self::get_app_data_dir()?;
        for dir in [app_data_dir.join("database"), app_data_dir.join("logs")] {
            if !dir.exists() {
                fs::create_dir_all(&dir)
                    .await
                    .with_context(|| format!("Failed to create directory: {:?}", dir))?;
                info!("📁 Created directory: {:?}", dir);
            }
        }

        Ok(default_config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl StoreConfig {
    /// Configured database file, or `<data dir>/database/datasync.db`
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(ConfigManager::get_app_data_dir()?
                .join("database")
                .join(defaults::DATABASE_FILE_NAME)),
        }
    }
}

pub mod defaults {
    /// Fixes per chunk
    pub const BATCH_SIZE: usize = 10;

    /// Pause between chunks
    pub const BATCH_DELAY_MS: u64 = 100;

    /// Indochina Time
    pub const UTC_OFFSET_HOURS: i32 = 7;

    pub const MAX_UTC_OFFSET_HOURS: i32 = 14;

    pub const DATABASE_FILE_NAME: &str = "datasync.db";

    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_MAX_FILES: usize = 5;
}
