//! Debugger hooks called from compiled code in debug mode.
//!
//! All four act on the calling JS frame. A `Return` verdict runs the
//! frame's epilogue before reporting `must_return` to compiled code, whose
//! own return path then finds the epilogue already done. With debug mode
//! off every hook is a no-op that lets the frame continue.

use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, OutKind, OutValue, ReturnKind};
use crate::debugger::{debug_epilogue, debug_prologue, DebugTarget, EpilogueState, TrapStatus};
use crate::error::{IntegrityError, RoutineError, RoutineResult};
use crate::frames::{FrameWalker, InlineFrameWalker};
use crate::runtime::ExecutionContext;

const MUST_RETURN: &[ArgKind] = &[ArgKind::OutParam(OutKind::Bool)];

pub(super) const DEBUG_PROLOGUE: NativeFunction = NativeFunction {
    name: "DebugPrologue",
    target: debug_prologue_routine,
    args: MUST_RETURN,
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const DEBUG_EPILOGUE: NativeFunction = NativeFunction {
    name: "DebugEpilogue",
    target: debug_epilogue_routine,
    args: &[ArgKind::Word],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const HANDLE_DEBUG_TRAP: NativeFunction = NativeFunction {
    name: "HandleDebugTrap",
    target: handle_debug_trap,
    args: MUST_RETURN,
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const ON_DEBUGGER_STATEMENT: NativeFunction = NativeFunction {
    name: "OnDebuggerStatement",
    target: on_debugger_statement,
    args: MUST_RETURN,
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

fn debug_mode(cx: &ExecutionContext<'_>) -> bool {
    cx.options().debug_mode
}

/// The JS frame that made the current call
fn calling_target(cx: &ExecutionContext<'_>) -> RoutineResult<DebugTarget> {
    let top = cx.stack.top().ok_or(IntegrityError::NoExitFrame)?;
    let mut frames = FrameWalker::from_top(&cx.stack, top)?;
    frames.advance()?;
    let (script, pc) = InlineFrameWalker::outermost(&frames, &cx.code)?;
    Ok(DebugTarget {
        fp: frames.fp(),
        script,
        pc,
    })
}

fn apply_verdict(
    cx: &mut ExecutionContext<'_>,
    target: DebugTarget,
    status: TrapStatus,
    args: &mut NativeArgs,
) -> RoutineResult<()> {
    tracing::debug!(fp = %target.fp, script = ?target.script, pc = target.pc, ?status, "trap verdict");
    match status {
        TrapStatus::Continue => {
            args.set_out(OutValue::Bool(false));
            Ok(())
        }
        TrapStatus::Return(value) => {
            let frame = cx
                .debug_frames
                .get_mut(&target.fp)
                .ok_or(IntegrityError::NoDebugFrame(target.fp))?;
            // A frame whose epilogue already ran keeps its first return value.
            if frame.state != EpilogueState::Done {
                frame.return_value = Some(value);
                frame.state = EpilogueState::ReturnPending;
                if !debug_epilogue(cx, target, true)? {
                    return Err(RoutineError::Thrown);
                }
            }
            args.set_out(OutValue::Bool(true));
            Ok(())
        }
        TrapStatus::Throw(value) => Err(cx.throw_value(value)),
        TrapStatus::Error => {
            cx.request_abort();
            Err(RoutineError::Thrown)
        }
    }
}

fn debug_prologue_routine(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    if !debug_mode(cx) {
        args.set_out(OutValue::Bool(false));
        return Ok(());
    }
    let target = calling_target(cx)?;
    let must_return = debug_prologue(cx, target)?;
    args.set_out(OutValue::Bool(must_return));
    Ok(())
}

fn debug_epilogue_routine(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    if !debug_mode(cx) {
        return Ok(());
    }
    let target = calling_target(cx)?;
    let ok = args.word(0)? != 0;
    if debug_epilogue(cx, target, ok)? {
        Ok(())
    } else {
        Err(RoutineError::Thrown)
    }
}

/// Breakpoint or single-step trap. The interrupt hook goes first, then
/// stepping, then breakpoints, stopping at the first verdict that is not
/// `Continue`.
fn handle_debug_trap(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    if !debug_mode(cx) {
        args.set_out(OutValue::Bool(false));
        return Ok(());
    }
    let target = calling_target(cx)?;
    let (stepping, breakpoint) = {
        let script = cx.scripts().get(target.script)?;
        (script.step_mode, script.has_breakpoint_at(target.pc))
    };
    let hook = cx.debug_hooks.interrupt_hook.clone();
    let debugger = cx.debugger.clone();

    let mut status = TrapStatus::Continue;
    if let Some(hook) = hook {
        status = (*hook)(cx, target.script, target.pc);
    }
    if let (TrapStatus::Continue, true, Some(debugger)) = (status, stepping, &debugger) {
        status = debugger.on_single_step(cx, target);
    }
    if let (TrapStatus::Continue, true, Some(debugger)) = (status, breakpoint, &debugger) {
        status = debugger.on_trap(cx, target);
    }
    apply_verdict(cx, target, status, args)
}

fn on_debugger_statement(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    if !debug_mode(cx) {
        args.set_out(OutValue::Bool(false));
        return Ok(());
    }
    let target = calling_target(cx)?;
    let handler = cx.debug_hooks.debugger_handler.clone();
    let debugger = cx.debugger.clone();

    let mut status = TrapStatus::Continue;
    if let Some(handler) = handler {
        status = (*handler)(cx, target.script, target.pc);
    }
    if let (TrapStatus::Continue, Some(debugger)) = (status, &debugger) {
        status = debugger.on_debugger_statement(cx, target);
    }
    apply_verdict(cx, target, status, args)
}
