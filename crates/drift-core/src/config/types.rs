//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for Drift
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool configuration
    pub scheduler: SchedulerConfig,

    /// Result cache configuration
    pub cache: CacheConfig,

    /// Module graph configuration
    pub graph: GraphConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lower bound on worker slots
    pub min_workers: usize,

    /// Maximum number of tasks in flight
    pub max_workers: usize,

    /// Maximum number of pending tasks
    pub max_queue_size: usize,

    /// Per-attempt timeout in milliseconds (0 disables)
    pub task_timeout_ms: u64,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Whether results are cached by input
    pub enable_caching: bool,

    /// How long shutdown waits before cancelling pending tasks
    pub shutdown_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: available_parallelism(),
            max_queue_size: 10_000,
            task_timeout_ms: 30_000,
            max_retries: 2,
            enable_caching: true,
            shutdown_grace_ms: 5_000,
        }
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_size: usize,

    /// Entry time-to-live in milliseconds (0 disables expiry)
    pub ttl_ms: u64,

    /// File the cache is persisted to
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_ms: 0,
            persist_path: None,
        }
    }
}

/// Module graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Record type-only imports as edges
    pub track_type_imports: bool,

    /// Record imports resolving into node_modules
    pub include_node_modules: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            track_type_imports: true,
            include_node_modules: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console level used when RUST_LOG is unset
    pub level: String,

    /// Write daily-rolling JSON log files
    pub file: bool,

    /// Directory for log files (defaults to ~/.drift/logs)
    pub directory: Option<PathBuf>,

    /// Emit console logs as JSON
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: false,
            directory: None,
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.min_workers, 1);
        assert!(config.scheduler.max_workers >= 1);
        assert_eq!(config.scheduler.max_retries, 2);
        assert!(config.scheduler.enable_caching);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.ttl_ms, 0);
        assert!(config.graph.track_type_imports);
        assert!(!config.graph.include_node_modules);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "scheduler:\n  max_workers: 3\ncache:\n  ttl_ms: 500\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scheduler.max_workers, 3);
        assert_eq!(config.scheduler.max_queue_size, 10_000);
        assert_eq!(config.cache.ttl_ms, 500);
        assert_eq!(config.cache.max_size, 1000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scheduler.max_queue_size, config.scheduler.max_queue_size);
        assert_eq!(parsed.logging.level, config.logging.level);
    }
}
