//! Tracing subscriber setup

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{DriftError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global tracing subscriber.
///
/// Console output is filtered by `RUST_LOG`, falling back to the configured
/// level. When file logging is enabled, debug-level JSON is also written to a
/// daily-rolling file; keep the returned guard alive to flush it.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console: BoxedLayer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let mut layers = vec![console];
    let mut guard = None;

    if let Some(log_dir) = log_directory(config) {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "drift.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_filter(EnvFilter::new("debug"))
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| DriftError::Logging(e.to_string()))?;

    Ok(guard)
}

/// Returns the log directory path, creating it if needed.
fn log_directory(config: &LoggingConfig) -> Option<PathBuf> {
    if !config.file {
        return None;
    }
    let log_dir = match &config.directory {
        Some(dir) => dir.clone(),
        None => dirs::home_dir()?.join(".drift").join("logs"),
    };
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_log_directory_without_file_logging() {
        let config = LoggingConfig::default();
        assert!(log_directory(&config).is_none());
    }

    #[test]
    fn test_configured_log_directory_is_created() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("logs");
        let config = LoggingConfig {
            file: true,
            directory: Some(dir.clone()),
            ..Default::default()
        };

        assert_eq!(log_directory(&config), Some(dir.clone()));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(DriftError::Logging(_))));
    }
}
