//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "drift.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "drift.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".drift.toml",
        ".drift.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Drift Configuration

[scheduler]
min_workers = 1
max_workers = 4
max_queue_size = 10000
task_timeout_ms = 30000
max_retries = 2
enable_caching = true
shutdown_grace_ms = 5000

[cache]
max_size = 1000
ttl_ms = 0

[graph]
track_type_imports = true
include_node_modules = false

[logging]
level = "warn"
json = false
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.scheduler.max_workers, 4);
        assert_eq!(config.cache.max_size, 1000);
    }

    #[test]
    fn test_default_config_toml_parses() {
        let text = default_config_toml();
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.scheduler.enable_caching);
    }

    #[test]
    fn test_toml_searched_first() {
        assert_eq!(config_file_names()[0], "drift.toml");
    }
}
