//! Reading `drift.toml` / `drift.yaml` from disk

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Serialization used by a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// `.toml` files are TOML; anything else is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }

    fn parse(self, content: &str) -> Result<Config> {
        let config: Config = match self {
            Self::Toml => toml::from_str(content).map_err(ConfigError::TomlError)?,
            Self::Yaml => serde_yaml::from_str(content).map_err(ConfigError::YamlError)?,
        };
        Ok(config)
    }
}

/// Parse and validate the file at `path`
pub fn load_config(path: &Path) -> Result<Config> {
    let format = ConfigFormat::from_path(path);
    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config = format.parse(&content)?;
    validate_config(&config)?;

    info!(path = %path.display(), ?format, "config loaded");
    Ok(config)
}

/// Nearest config file at or above `start_dir`.
///
/// Within one directory, names are tried in [`config_file_names`] order.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let found = start_dir.ancestors().find_map(|dir| {
        config_file_names()
            .into_iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    });

    match &found {
        Some(path) => debug!(path = %path.display(), "config file found"),
        None => debug!(start_dir = %start_dir.display(), "no config file above directory"),
    }
    found
}

/// Locate and load the config governing `dir`, returning where it came from
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;
    let config = load_config(&path)?;
    Ok((config, path))
}

/// Like [`load_config_from_dir`], falling back to defaults on any failure
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    load_config_from_dir(dir)
        .map(|(config, path)| (config, Some(path)))
        .unwrap_or_else(|err| {
            warn!(dir = %dir.display(), error = %err, "falling back to default config");
            (Config::default(), None)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("drift.toml");
        std::fs::write(&config_path, "[scheduler]\nmax_workers = 2").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("drift.toml");
        let yaml_path = temp.path().join("drift.yaml");
        std::fs::write(&toml_path, "[scheduler]\nmax_workers = 2").unwrap();
        std::fs::write(&yaml_path, "scheduler:\n  max_workers: 2").unwrap();

        let found = find_config(temp.path()).unwrap();
        assert_eq!(found, toml_path);
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("src").join("lib");
        std::fs::create_dir_all(&nested).unwrap();
        let config_path = temp.path().join(".drift.yaml");
        std::fs::write(&config_path, "cache:\n  max_size: 10").unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, config_path);
    }

    #[test]
    fn test_load_yaml_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("drift.yaml");
        std::fs::write(
            &path,
            "scheduler:\n  max_workers: 8\n  max_retries: 0\ngraph:\n  include_node_modules: true\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.scheduler.max_workers, 8);
        assert_eq!(config.scheduler.max_retries, 0);
        assert!(config.graph.include_node_modules);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("drift.toml");
        std::fs::write(&path, "[cache]\nmax_size = 0\n").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("drift.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("DRIFT.TOML")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new(".drift.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("drift")), ConfigFormat::Yaml);
    }

    #[test]
    fn test_directory_named_like_config_is_skipped() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("drift.toml")).unwrap();
        let yaml_path = temp.path().join("drift.yaml");
        std::fs::write(&yaml_path, "cache:\n  max_size: 10").unwrap();

        assert_eq!(find_config(temp.path()), Some(yaml_path));
    }

    #[test]
    fn test_load_config_or_default_without_file() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path());
        assert!(path.is_none());
        assert_eq!(config.cache.max_size, 1000);
    }
}
