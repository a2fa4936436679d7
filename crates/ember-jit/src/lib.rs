//! Ember JIT Runtime Support
//!
//! The machinery compiled code needs to coexist with the interpreter and
//! the garbage collector: walking the native stack it builds, recovering
//! the logical frames an inlining compiler folded together, and calling
//! back into runtime routines through exit frames.
//!
//! # Layout
//!
//! - [`frames`]: stack layout, the physical [`FrameWalker`], the
//!   [`InlineFrameWalker`], activations and backtraces
//! - [`bridge`]: native call descriptors, the registry, the trampoline,
//!   exception unwinding and the runtime routines themselves
//! - [`debugger`]: debug frames and the prologue/epilogue state machine
//! - [`runtime`]: the [`Runtime`] and its [`ExecutionContext`]s
//!
//! The heap, scripts and type monitoring modules are the minimum surface of
//! the surrounding engine that the walkers and routines touch.
//!
//! # Example
//!
//! ```
//! use ember_jit::bridge::{call_by_name, NativeOutcome};
//! use ember_jit::frames::{enter_jit, leave_jit, InlineTable};
//! use ember_jit::script::{CodeSpec, Script};
//! use ember_jit::{JitOptions, Runtime};
//!
//! let mut rt = Runtime::new(JitOptions::for_testing()).unwrap();
//! let script = rt.add_script(Script::new("main"));
//! let code = rt.install_code(script, CodeSpec::new(64, InlineTable::default())).unwrap();
//! let id = rt.new_context();
//! let mut cx = rt.context(id).unwrap();
//!
//! let activation = enter_jit(&mut cx).unwrap();
//! let fp = cx.push_js_frame(code, 0, 0).unwrap();
//! let ret = cx.code_address(code, 8).unwrap();
//! let outcome = call_by_name(&mut cx, "InterruptCheck", ret, vec![]).unwrap();
//! assert!(matches!(outcome, NativeOutcome::Returned(None)));
//! cx.pop_frame(fp).unwrap();
//! leave_jit(&mut cx, activation).unwrap();
//! ```

pub mod bridge;
pub mod debugger;
pub mod error;
pub mod frames;
pub mod heap;
pub mod ops;
pub mod profiler;
pub mod runtime;
pub mod script;
pub mod types;
pub mod value;

use ember_config::EngineConfig;
use thiserror::Error;

pub use error::{IntegrityError, IntegrityResult, JsResult, RoutineError, RoutineResult, Thrown};
pub use frames::{ActivationWalker, FrameWalker, InlineFrameWalker};
pub use runtime::{ContextId, ExecutionContext, InterruptHandle, NullHost, Runtime, ScriptHost};
pub use value::Value;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum JitError {
    #[error("configuration error: {0}")]
    Config(#[from] ember_config::ConfigError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Result type for engine operations
pub type JitResult<T> = Result<T, JitError>;

/// Resolved runtime options
#[derive(Debug, Clone)]
pub struct JitOptions {
    /// Slow calls from one compiled script before it is disqualified
    pub slow_call_limit: u32,
    /// Use count added to a callee on every slow call
    pub slow_call_inc_use_count: u32,
    /// Bytes of native stack
    pub stack_capacity: usize,
    /// Bytes of stack in use before the recursion check fails
    pub recursion_quota: usize,
    /// Allocations between collections
    pub gc_threshold: u32,
    /// Gates the debugger hooks compiled code calls
    pub debug_mode: bool,
    pub max_profiler_depth: usize,
    /// Filter directive for embedders that install a subscriber
    pub log_filter: String,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            slow_call_limit: 512,
            slow_call_inc_use_count: 5,
            stack_capacity: 1024 * 1024, // 1 MiB
            recursion_quota: 512 * 1024, // 512 KiB
            gc_threshold: 4096,
            debug_mode: false,
            max_profiler_depth: 1024,
            log_filter: "warn".to_string(),
        }
    }
}

impl JitOptions {
    /// Resolve options from a validated engine configuration
    pub fn from_config(config: &EngineConfig) -> JitResult<Self> {
        config.validate()?;
        Ok(Self {
            slow_call_limit: config.slow_call_limit(),
            slow_call_inc_use_count: config.slow_call_inc_use_count(),
            stack_capacity: config.stack_capacity(),
            recursion_quota: config.recursion_quota(),
            gc_threshold: config.allocation_threshold(),
            debug_mode: config.debug_mode(),
            max_profiler_depth: config.max_profiler_depth(),
            log_filter: config.log_filter().to_string(),
        })
    }

    /// Options suitable for testing (small stack, low limits)
    pub fn for_testing() -> Self {
        Self {
            slow_call_limit: 4,
            slow_call_inc_use_count: 5,
            stack_capacity: 64 * 1024,
            recursion_quota: 32 * 1024,
            gc_threshold: 1024,
            debug_mode: false,
            max_profiler_depth: 64,
            log_filter: "debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_config::{EngineConfig, JitSection, StackSection};

    #[test]
    fn test_default_options_match_config_defaults() {
        let options = JitOptions::from_config(&EngineConfig::default()).unwrap();
        let defaults = JitOptions::default();
        assert_eq!(options.slow_call_limit, defaults.slow_call_limit);
        assert_eq!(options.stack_capacity, defaults.stack_capacity);
        assert_eq!(options.recursion_quota, defaults.recursion_quota);
        assert_eq!(options.gc_threshold, defaults.gc_threshold);
        assert_eq!(options.log_filter, defaults.log_filter);
    }

    #[test]
    fn test_from_config_reads_sections() {
        let config = EngineConfig {
            jit: Some(JitSection {
                slow_call_limit: Some(8),
                slow_call_inc_use_count: None,
            }),
            stack: Some(StackSection {
                capacity: Some(4096),
                recursion_quota: Some(2048),
            }),
            ..Default::default()
        };
        let options = JitOptions::from_config(&config).unwrap();
        assert_eq!(options.slow_call_limit, 8);
        assert_eq!(options.slow_call_inc_use_count, 5);
        assert_eq!(options.stack_capacity, 4096);
        assert_eq!(options.recursion_quota, 2048);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = EngineConfig {
            stack: Some(StackSection {
                capacity: Some(1024),
                recursion_quota: Some(4096),
            }),
            ..Default::default()
        };
        assert!(matches!(
            JitOptions::from_config(&config),
            Err(JitError::Config(_))
        ));
    }

    #[test]
    fn test_testing_options_fit_stack() {
        let options = JitOptions::for_testing();
        assert!(options.recursion_quota < options.stack_capacity);
    }
}
