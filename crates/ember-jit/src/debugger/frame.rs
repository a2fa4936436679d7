//! Per-frame debug state and the prologue/epilogue protocol.
//!
//! A "return now" verdict from the prologue has to run the epilogue before
//! the frame returns, and the epilogue may be reached again from the frame's
//! own return path or from exception unwinding. The state machine below
//! makes the epilogue's effects happen exactly once per frame:
//!
//! ```text
//! Running --Return verdict in prologue--> ReturnPending --epilogue--> Done
//! Running --epilogue--> Done
//! Done --epilogue--> Done (no effects)
//! ```

use super::{DebugTarget, TrapStatus};
use crate::error::{IntegrityError, RoutineError, RoutineResult};
use crate::runtime::ExecutionContext;
use crate::script::ScriptId;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpilogueState {
    Running,
    ReturnPending,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugFrame {
    pub script: ScriptId,
    /// Set when the debugger forced the frame's result
    pub return_value: Option<Value>,
    pub state: EpilogueState,
    /// Number of times the frame's debug scope state was released
    pub scope_releases: u32,
}

impl DebugFrame {
    pub fn new(script: ScriptId) -> Self {
        Self {
            script,
            return_value: None,
            state: EpilogueState::Running,
            scope_releases: 0,
        }
    }
}

/// Register the frame and consult the debugger.
///
/// Returns whether the frame must return immediately; in that case the
/// epilogue has already run.
pub fn debug_prologue(cx: &mut ExecutionContext<'_>, target: DebugTarget) -> RoutineResult<bool> {
    cx.debug_frames
        .insert(target.fp, DebugFrame::new(target.script));

    let Some(debugger) = cx.debugger.clone() else {
        return Ok(false);
    };
    let status = debugger.on_enter_frame(cx, target);
    tracing::debug!(fp = %target.fp, ?status, "debug prologue verdict");

    match status {
        TrapStatus::Continue => Ok(false),
        TrapStatus::Return(value) => {
            let frame = cx
                .debug_frames
                .get_mut(&target.fp)
                .ok_or(IntegrityError::NoDebugFrame(target.fp))?;
            frame.return_value = Some(value);
            frame.state = EpilogueState::ReturnPending;
            if debug_epilogue(cx, target, true)? {
                Ok(true)
            } else {
                Err(RoutineError::Thrown)
            }
        }
        TrapStatus::Throw(value) => Err(cx.throw_value(value)),
        TrapStatus::Error => {
            cx.request_abort();
            Err(RoutineError::Thrown)
        }
    }
}

/// Run the frame's epilogue. `ok` is false while an exception propagates.
///
/// Returns the possibly changed `ok`: a forced return turns a failing
/// frame into a returning one, and a throw does the opposite.
pub fn debug_epilogue(
    cx: &mut ExecutionContext<'_>,
    target: DebugTarget,
    ok: bool,
) -> RoutineResult<bool> {
    let frame = cx
        .debug_frames
        .get_mut(&target.fp)
        .ok_or(IntegrityError::NoDebugFrame(target.fp))?;
    if frame.state == EpilogueState::Done {
        return Ok(ok);
    }
    frame.state = EpilogueState::Done;

    let mut ok = ok;
    if let Some(debugger) = cx.debugger.clone() {
        let status = debugger.on_leave_frame(cx, target, ok);
        tracing::debug!(fp = %target.fp, ok, ?status, "debug epilogue verdict");
        match status {
            TrapStatus::Continue => {}
            TrapStatus::Return(value) => {
                cx.clear_pending_exception();
                if let Some(frame) = cx.debug_frames.get_mut(&target.fp) {
                    frame.return_value = Some(value);
                }
                ok = true;
            }
            TrapStatus::Throw(value) => {
                cx.set_pending_exception(value);
                ok = false;
            }
            TrapStatus::Error => {
                cx.clear_pending_exception();
                cx.request_abort();
                ok = false;
            }
        }
    }

    let frame = cx
        .debug_frames
        .get_mut(&target.fp)
        .ok_or(IntegrityError::NoDebugFrame(target.fp))?;
    frame.scope_releases += 1;
    Ok(ok)
}
