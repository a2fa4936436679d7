//! Ember Engine Configuration
//!
//! Provides configuration management for the Ember JIT runtime:
//! - Project engine configuration (ember.toml)
//! - Global user configuration (~/.ember/config.toml)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.ember/config.toml)
//! 3. Project config (./ember.toml)
//! 4. Environment variables (EMBER_*)
//!
//! # Example
//!
//! ```no_run
//! use ember_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("slow call limit: {}", config.engine.slow_call_limit());
//! ```

pub mod engine;
pub mod global;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use engine::{DebugSection, EngineConfig, GcSection, JitSection, LogSection, StackSection};
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
