//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::engine::EngineConfig;
use crate::global::GlobalConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the per-project engine configuration file
pub const PROJECT_CONFIG_FILE: &str = "ember.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.ember/config.toml) - lowest priority
/// 2. Project config (./ember.toml) - overrides global
/// 3. Environment variables (EMBER_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective engine configuration after merging all sources
    pub engine: EngineConfig,

    /// Global configuration as loaded (before project overrides)
    pub global: GlobalConfig,

    /// Project root directory (where ember.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads global settings from an explicit path
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find ember.toml, then merges it over
    /// the global config if one exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        self.assemble(project_root, project_config)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = EngineConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project_root, project_config)
    }

    fn assemble(
        &mut self,
        project_root: Option<PathBuf>,
        project_config: EngineConfig,
    ) -> ConfigResult<Config> {
        // Global config is optional
        let global = self.load_global_config().unwrap_or_default();

        let mut engine = global.engine.clone();
        engine.merge(&project_config);
        let engine = self.apply_env_overrides(engine)?;
        engine.validate()?;

        Ok(Config {
            engine,
            global,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); defaults when none is found
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, EngineConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = EngineConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, EngineConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.ember/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognized: EMBER_SLOW_CALL_LIMIT, EMBER_GC_THRESHOLD,
    /// EMBER_DEBUG_MODE, EMBER_LOG
    fn apply_env_overrides(&self, mut config: EngineConfig) -> ConfigResult<EngineConfig> {
        if let Ok(limit) = env::var("EMBER_SLOW_CALL_LIMIT") {
            let limit = parse_env_number("EMBER_SLOW_CALL_LIMIT", &limit)?;
            config
                .jit
                .get_or_insert_with(Default::default)
                .slow_call_limit = Some(limit);
        }

        if let Ok(threshold) = env::var("EMBER_GC_THRESHOLD") {
            let threshold = parse_env_number("EMBER_GC_THRESHOLD", &threshold)?;
            config
                .gc
                .get_or_insert_with(Default::default)
                .allocation_threshold = Some(threshold);
        }

        if let Ok(debug) = env::var("EMBER_DEBUG_MODE") {
            let debug_bool = matches!(debug.to_lowercase().as_str(), "true" | "1" | "yes");
            config
                .debug
                .get_or_insert_with(Default::default)
                .debug_mode = Some(debug_bool);
        }

        if let Ok(filter) = env::var("EMBER_LOG") {
            config.log.get_or_insert_with(Default::default).filter = Some(filter);
        }

        Ok(config)
    }
}

fn parse_env_number(var: &str, raw: &str) -> ConfigResult<u32> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: var.to_string(),
        reason: format!("expected an unsigned integer, got '{}'", raw),
    })
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has ember.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
