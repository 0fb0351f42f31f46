//! Configuration validation
//!
//! Worker counts are clamped by the scheduler itself, so only values that
//! cannot be corrected are rejected here.

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Log levels accepted by `logging.level`
pub const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_scheduler(config)?;
    validate_cache(config)?;
    validate_logging(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<()> {
    if config.scheduler.max_queue_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.max_queue_size".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config.cache.max_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "cache.max_size".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if let Some(path) = &config.cache.persist_path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache.persist_path".to_string(),
                message: "cannot be empty".to_string(),
            }
            .into());
        }
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            message: format!("must be one of: {}", LOG_LEVELS.join(", ")),
        }
        .into());
    }
    Ok(())
}
