//! Debugger collaborator interface.
//!
//! The debugger itself (breakpoint bookkeeping, step mode, UI) lives
//! elsewhere. Compiled code reaches it through the debug routines of the
//! call bridge, which report frames entering, leaving, stepping and hitting
//! traps, and act on the verdict the debugger returns.

mod frame;

pub use frame::{debug_epilogue, debug_prologue, DebugFrame, EpilogueState};

use crate::frames::StackAddr;
use crate::runtime::ExecutionContext;
use crate::script::{Pc, ScriptId};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// What the debugger wants done with the frame it was consulted about
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrapStatus {
    /// Carry on executing
    Continue,
    /// Return from the frame immediately with this value
    Return(Value),
    /// Throw this value from the current location
    Throw(Value),
    /// Terminate without a catchable exception
    Error,
}

/// The compiled frame a debugger event concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugTarget {
    pub fp: StackAddr,
    pub script: ScriptId,
    pub pc: Pc,
}

pub trait Debugger {
    fn on_enter_frame(&self, cx: &mut ExecutionContext<'_>, target: DebugTarget) -> TrapStatus {
        let _ = (cx, target);
        TrapStatus::Continue
    }

    /// `ok` is false when the frame is being left by an exception
    fn on_leave_frame(
        &self,
        cx: &mut ExecutionContext<'_>,
        target: DebugTarget,
        ok: bool,
    ) -> TrapStatus {
        let _ = (cx, target, ok);
        TrapStatus::Continue
    }

    fn on_single_step(&self, cx: &mut ExecutionContext<'_>, target: DebugTarget) -> TrapStatus {
        let _ = (cx, target);
        TrapStatus::Continue
    }

    fn on_trap(&self, cx: &mut ExecutionContext<'_>, target: DebugTarget) -> TrapStatus {
        let _ = (cx, target);
        TrapStatus::Continue
    }

    fn on_debugger_statement(
        &self,
        cx: &mut ExecutionContext<'_>,
        target: DebugTarget,
    ) -> TrapStatus {
        let _ = (cx, target);
        TrapStatus::Continue
    }
}

/// Embedder callback consulted before the debugger
pub type TrapHook = Rc<dyn Fn(&mut ExecutionContext<'_>, ScriptId, Pc) -> TrapStatus>;

/// Runtime-wide hooks that take precedence over the attached debugger
#[derive(Clone, Default)]
pub struct DebugHooks {
    /// Called on every trap while set, and on every step
    pub interrupt_hook: Option<TrapHook>,
    /// Called on `debugger` statements
    pub debugger_handler: Option<TrapHook>,
}

impl fmt::Debug for DebugHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugHooks")
            .field("interrupt_hook", &self.interrupt_hook.is_some())
            .field("debugger_handler", &self.debugger_handler.is_some())
            .finish()
    }
}
