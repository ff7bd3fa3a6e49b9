//! Logging system configuration and initialization
//!
//! - Console output with shop-local timestamps
//! - Daily rolling log files (optionally JSON)
//! - `RUST_LOG` overrides the configured level

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::{FixedOffset, Offset, Utc};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::{ConfigManager, defaults};

const LOG_FILE_PREFIX: &str = "datasync.log";

// Keeps the non-blocking file writers alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Timestamps in a fixed UTC offset
struct OffsetTimeFormatter {
    offset: FixedOffset,
}

impl OffsetTimeFormatter {
    fn new(utc_offset_hours: i32) -> Self {
        let offset = utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl FormatTime for OffsetTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.offset);
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Log directory: configured, else `<data dir>/logs`, else next to the executable
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()))
                .unwrap_or_default()
                .join("logs")
        })
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default(), defaults::UTC_OFFSET_HOURS)
}

/// Filter from `RUST_LOG` when set, otherwise the configured level with
/// per-module overrides. `sqlx` statement logging stays quiet below trace.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let tracing_everything = config.level.to_lowercase().contains("trace");
    for (target, level) in &config.module_filters {
        if tracing_everything && target.starts_with("sqlx") {
            continue;
        }
        let directive = format!("{}={}", target, level)
            .parse()
            .map_err(|e| anyhow!("Invalid module filter {}={}: {}", target, level, e))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

pub fn init_logging_with_config(config: LoggingConfig, utc_offset_hours: i32) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(&config)?;
    let log_dir = get_log_directory(&config);

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_timer(OffsetTimeFormatter::new(utc_offset_hours))
            .with_target(false)
    });

    let file_writer = if config.file_output {
        Some(create_file_writer(&log_dir, &config)?)
    } else {
        None
    };
    let plain_file_layer = file_writer.clone().filter(|_| !config.json_format).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_timer(OffsetTimeFormatter::new(utc_offset_hours))
            .with_target(false)
            .with_ansi(false)
    });
    let json_file_layer = file_writer.filter(|_| config.json_format).map(|writer| {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_timer(OffsetTimeFormatter::new(utc_offset_hours))
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
    });

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(plain_file_layer)
        .with(json_file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    } else {
        warn!("File logging disabled; logs go to the console only");
    }
    Ok(())
}

/// Daily rolling appender behind a non-blocking writer
fn create_file_writer(log_dir: &PathBuf, config: &LoggingConfig) -> Result<NonBlocking> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .map_err(|e| anyhow!("Failed to create log file appender: {}", e))?;
    let (writer, guard) = non_blocking(appender);

    LOG_GUARDS
        .lock()
        .map_err(|_| anyhow!("Log guard registry is poisoned"))?
        .push(guard);
    Ok(writer)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== datasync-console {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
}
