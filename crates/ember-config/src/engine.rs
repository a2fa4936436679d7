//! Engine Configuration (ember.toml)
//!
//! Tunables for the JIT runtime: slow-call disqualification, native stack
//! sizing, allocation pacing, debugger mode and log filtering. Every field is
//! optional in the file; accessors fall back to built-in defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of slow calls from compiled code into uncompilable callees
/// before the caller is disqualified.
pub const DEFAULT_SLOW_CALL_LIMIT: u32 = 512;
/// Default use-count bump applied to an uncompiled callee on a slow call.
pub const DEFAULT_SLOW_CALL_INC_USE_COUNT: u32 = 5;
/// Default simulated native stack size in bytes.
pub const DEFAULT_STACK_CAPACITY: usize = 1024 * 1024;
/// Default recursion quota in bytes.
pub const DEFAULT_RECURSION_QUOTA: usize = 512 * 1024;
/// Default allocations between collections.
pub const DEFAULT_ALLOCATION_THRESHOLD: u32 = 4096;
/// Default maximum profiler pseudo-stack depth.
pub const DEFAULT_MAX_PROFILER_DEPTH: usize = 1024;
/// Default log filter.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Engine configuration, as read from ember.toml or ~/.ember/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Compiled-code policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jit: Option<JitSection>,

    /// Native stack sizing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackSection>,

    /// Garbage collector pacing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc: Option<GcSection>,

    /// Debugger and profiler settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugSection>,

    /// Log filtering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogSection>,
}

/// `[jit]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct JitSection {
    /// Slow calls tolerated before a caller is forbidden from compiling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_call_limit: Option<u32>,

    /// Use-count increment applied to uncompiled callees on each slow call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_call_inc_use_count: Option<u32>,
}

/// `[stack]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StackSection {
    /// Bytes reserved for the native stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,

    /// Bytes of stack usable before the over-recursion check fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursion_quota: Option<usize>,
}

/// `[gc]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GcSection {
    /// Allocations between collections (1 collects on every allocation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_threshold: Option<u32>,
}

/// `[debug]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DebugSection {
    /// Compile and run with debugger hooks enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<bool>,

    /// Maximum depth of the profiler pseudo-stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_profiler_depth: Option<usize>,
}

/// `[log]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Filter directive, e.g. "ember_jit=debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl EngineConfig {
    /// Load engine configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(jit) = &self.jit {
            if jit.slow_call_limit == Some(0) {
                return Err(invalid("jit.slow_call_limit", "must be at least 1"));
            }
        }

        if let Some(stack) = &self.stack {
            if stack.capacity == Some(0) {
                return Err(invalid("stack.capacity", "must be non-zero"));
            }
            if stack.recursion_quota == Some(0) {
                return Err(invalid("stack.recursion_quota", "must be non-zero"));
            }
        }

        if self.recursion_quota() > self.stack_capacity() {
            return Err(ConfigError::InvalidValue {
                field: "stack.recursion_quota".to_string(),
                reason: format!(
                    "quota {} exceeds stack capacity {}",
                    self.recursion_quota(),
                    self.stack_capacity()
                ),
            });
        }

        if let Some(gc) = &self.gc {
            if gc.allocation_threshold == Some(0) {
                return Err(invalid("gc.allocation_threshold", "must be at least 1"));
            }
        }

        if let Some(log) = &self.log {
            if let Some(filter) = &log.filter {
                if filter.trim().is_empty() {
                    return Err(invalid("log.filter", "filter cannot be empty"));
                }
            }
        }

        Ok(())
    }

    /// Merge another engine config into this one.
    /// Fields set in `other` take precedence, field by field.
    pub fn merge(&mut self, other: &EngineConfig) {
        if let Some(o) = &other.jit {
            let jit = self.jit.get_or_insert_with(Default::default);
            overlay(&mut jit.slow_call_limit, &o.slow_call_limit);
            overlay(&mut jit.slow_call_inc_use_count, &o.slow_call_inc_use_count);
        }
        if let Some(o) = &other.stack {
            let stack = self.stack.get_or_insert_with(Default::default);
            overlay(&mut stack.capacity, &o.capacity);
            overlay(&mut stack.recursion_quota, &o.recursion_quota);
        }
        if let Some(o) = &other.gc {
            let gc = self.gc.get_or_insert_with(Default::default);
            overlay(&mut gc.allocation_threshold, &o.allocation_threshold);
        }
        if let Some(o) = &other.debug {
            let debug = self.debug.get_or_insert_with(Default::default);
            overlay(&mut debug.debug_mode, &o.debug_mode);
            overlay(&mut debug.max_profiler_depth, &o.max_profiler_depth);
        }
        if let Some(o) = &other.log {
            let log = self.log.get_or_insert_with(Default::default);
            overlay(&mut log.filter, &o.filter);
        }
    }

    /// Effective slow call limit
    pub fn slow_call_limit(&self) -> u32 {
        self.jit
            .as_ref()
            .and_then(|j| j.slow_call_limit)
            .unwrap_or(DEFAULT_SLOW_CALL_LIMIT)
    }

    /// Effective slow call use-count increment
    pub fn slow_call_inc_use_count(&self) -> u32 {
        self.jit
            .as_ref()
            .and_then(|j| j.slow_call_inc_use_count)
            .unwrap_or(DEFAULT_SLOW_CALL_INC_USE_COUNT)
    }

    /// Effective native stack capacity in bytes
    pub fn stack_capacity(&self) -> usize {
        self.stack
            .as_ref()
            .and_then(|s| s.capacity)
            .unwrap_or(DEFAULT_STACK_CAPACITY)
    }

    /// Effective recursion quota in bytes
    pub fn recursion_quota(&self) -> usize {
        self.stack
            .as_ref()
            .and_then(|s| s.recursion_quota)
            .unwrap_or(DEFAULT_RECURSION_QUOTA)
    }

    /// Effective allocation threshold
    pub fn allocation_threshold(&self) -> u32 {
        self.gc
            .as_ref()
            .and_then(|g| g.allocation_threshold)
            .unwrap_or(DEFAULT_ALLOCATION_THRESHOLD)
    }

    /// Whether debugger hooks are enabled
    pub fn debug_mode(&self) -> bool {
        self.debug
            .as_ref()
            .and_then(|d| d.debug_mode)
            .unwrap_or(false)
    }

    /// Effective profiler depth limit
    pub fn max_profiler_depth(&self) -> usize {
        self.debug
            .as_ref()
            .and_then(|d| d.max_profiler_depth)
            .unwrap_or(DEFAULT_MAX_PROFILER_DEPTH)
    }

    /// Effective log filter directive
    pub fn log_filter(&self) -> &str {
        self.log
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }
}

fn overlay<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *slot = value.clone();
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
