//! Global Configuration (~/.ember/config.toml)
//!
//! Handles user-level engine defaults stored in `~/.ember/config.toml`.
//! The file uses the same schema as a project's `ember.toml`.

use crate::engine::EngineConfig;
use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.ember/config.toml
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobalConfig {
    /// Engine settings applied beneath every project
    pub engine: EngineConfig,

    /// File the settings came from, if any
    pub source: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let engine = EngineConfig::load_from_file(path)?;
        Ok(Self {
            engine,
            source: Some(path.to_path_buf()),
        })
    }

    /// Get the global configuration directory (~/.ember)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".ember"))
    }

    /// Get the global config file path (~/.ember/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        Ok(Self::global_config_dir()?.join("config.toml"))
    }

    /// Ensure the global configuration directory exists
    pub fn ensure_global_config_dir() -> ConfigResult<PathBuf> {
        let dir = Self::global_config_dir()?;
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_global_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[debug]\ndebug_mode = true\n").unwrap();

        let global = GlobalConfig::load_from_file(&path).unwrap();
        assert!(global.engine.debug_mode());
        assert_eq!(global.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_global_config_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        match GlobalConfig::load_from_file(&path) {
            Err(ConfigError::NotFound(p)) => assert_eq!(p, path),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_global_config_path_ends_with_ember() {
        if let Ok(path) = GlobalConfig::global_config_path() {
            assert!(path.ends_with(".ember/config.toml"));
        }
    }
}
