//! Safe-point checks for stack exhaustion and pending interrupts.

use crate::bridge::descriptor::{NativeArgs, NativeFunction, ReturnKind};
use crate::error::{RoutineError, RoutineResult};
use crate::heap::ErrorKind;
use crate::runtime::ExecutionContext;

pub(super) const CHECK_OVER_RECURSED: NativeFunction = NativeFunction {
    name: "CheckOverRecursed",
    target: check_over_recursed,
    args: &[],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const INTERRUPT_CHECK: NativeFunction = NativeFunction {
    name: "InterruptCheck",
    target: interrupt_check,
    args: &[],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

/// Deliver a raised interrupt to the host.
///
/// Clears the flag. If the host declines to continue, the context gets an
/// abort request and the call fails.
pub fn handle_interrupt(cx: &mut ExecutionContext<'_>) -> RoutineResult<()> {
    if !cx.interrupt.take() {
        return Ok(());
    }
    let host = cx.host.clone();
    let proceed = host.handle_interrupt(cx);
    tracing::debug!(context = ?cx.id(), proceed, "interrupt delivered");
    if proceed {
        Ok(())
    } else {
        cx.request_abort();
        Err(RoutineError::Thrown)
    }
}

fn check_over_recursed(cx: &mut ExecutionContext<'_>, _args: &mut NativeArgs) -> RoutineResult<()> {
    let used = cx.stack.used();
    if used > cx.options.recursion_quota {
        tracing::debug!(context = ?cx.id(), used, quota = cx.options.recursion_quota, "over-recursed");
        return Err(cx.throw_error(ErrorKind::InternalError, "too much recursion"));
    }
    if cx.interrupt.is_triggered() {
        return handle_interrupt(cx);
    }
    Ok(())
}

fn interrupt_check(cx: &mut ExecutionContext<'_>, _args: &mut NativeArgs) -> RoutineResult<()> {
    handle_interrupt(cx)
}
