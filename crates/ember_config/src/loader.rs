//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{EmberConfig, MIN_CACHE_SIZE};
use std::path::Path;

/// Name of the configuration file looked up in a workspace root.
pub const CONFIG_FILE: &str = "ember.toml";

/// Loads and validates `ember.toml` from a workspace directory.
pub fn load_config(workspace_dir: &Path) -> Result<EmberConfig, ConfigError> {
    let config_path = workspace_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates an `ember.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<EmberConfig, ConfigError> {
    let config: EmberConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &EmberConfig) -> Result<(), ConfigError> {
    if config.analysis.cache_size < MIN_CACHE_SIZE {
        return Err(ConfigError::CacheTooSmall(config.analysis.cache_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert!(config.analysis.incremental);
        assert_eq!(config.analysis.cache_size, 64);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[analysis]
incremental = false
incremental_validation = false
cache_size = 128
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(!config.analysis.incremental);
        assert!(!config.analysis.incremental_validation);
        assert_eq!(config.analysis.cache_size, 128);
    }

    #[test]
    fn partial_table_fills_defaults() {
        let config = load_config_from_str("[analysis]\ncache_size = 16\n").unwrap();
        assert!(config.analysis.incremental);
        assert_eq!(config.analysis.cache_size, 16);
    }

    #[test]
    fn tiny_cache_rejected() {
        let err = load_config_from_str("[analysis]\ncache_size = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::CacheTooSmall(2)));
    }

    #[test]
    fn zero_cache_rejected() {
        let err = load_config_from_str("[analysis]\ncache_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::CacheTooSmall(0)));
    }

    #[test]
    fn smallest_cache_accepted() {
        let config = load_config_from_str("[analysis]\ncache_size = 8\n").unwrap();
        assert_eq!(config.analysis.max_priority_sources(), 4);
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn wrong_type_errors() {
        let err = load_config_from_str("[analysis]\nincremental = \"yes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[analysis]\ncache_size = 32\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.analysis.cache_size, 32);
    }

    #[test]
    fn io_error_from_missing_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { ref path, .. } if path.ends_with(CONFIG_FILE)));
    }
}
