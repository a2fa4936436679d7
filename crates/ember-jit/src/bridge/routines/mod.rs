//! Runtime routines callable from compiled code.
//!
//! Each routine is a plain function over the execution context plus a
//! `NativeFunction` constant describing how compiled code calls it. The
//! [`BUILTINS`] table is what the process-wide registry is built from.

mod alloc;
mod array;
mod compare;
mod debug;
mod interrupt;
mod invoke;
mod profiler;
mod property;
mod string;

use super::descriptor::NativeFunction;
use crate::error::RoutineResult;
use crate::frames::pc_script;
use crate::runtime::ExecutionContext;
use crate::types::{MonitorSite, TypeTag};
use crate::value::Value;

pub use alloc::NO_TYPE;
pub use interrupt::handle_interrupt;

/// Every routine the runtime provides, in registration order
pub static BUILTINS: &[NativeFunction] = &[
    invoke::INVOKE_FUNCTION,
    invoke::CREATE_THIS,
    compare::LOOSE_EQ,
    compare::LOOSE_NE,
    compare::STRICT_EQ,
    compare::STRICT_NE,
    compare::LESS_THAN,
    compare::LESS_THAN_OR_EQUAL,
    compare::GREATER_THAN,
    compare::GREATER_THAN_OR_EQUAL,
    compare::STRINGS_EQUAL,
    compare::STRINGS_NOT_EQUAL,
    property::GET_PROPERTY,
    property::SET_PROPERTY,
    property::GET_ELEMENT,
    property::SET_ELEMENT,
    property::INIT_PROP,
    property::OPERATOR_IN,
    property::OBJECT_EMULATES_UNDEFINED,
    array::ARRAY_POP_DENSE,
    array::ARRAY_PUSH_DENSE,
    array::ARRAY_SHIFT_DENSE,
    array::ARRAY_CONCAT_DENSE,
    alloc::NEW_INIT_ARRAY,
    alloc::NEW_INIT_OBJECT,
    alloc::NEW_CALL_OBJECT,
    alloc::NEW_STRING_OBJECT,
    string::CHAR_CODE_AT,
    string::STRING_FROM_CHAR_CODE,
    interrupt::CHECK_OVER_RECURSED,
    interrupt::INTERRUPT_CHECK,
    debug::DEBUG_PROLOGUE,
    debug::DEBUG_EPILOGUE,
    debug::HANDLE_DEBUG_TRAP,
    debug::ON_DEBUGGER_STATEMENT,
    profiler::PROFILER_ENTER,
    profiler::PROFILER_EXIT,
];

/// Report `value` to type monitoring at the calling site unless the
/// compiled code there is already guarded for its type
pub(crate) fn monitor_result(cx: &mut ExecutionContext<'_>, value: Value) -> RoutineResult<()> {
    let (script, pc) = pc_script(cx)?;
    let site = MonitorSite::new(script, pc);
    let tag = TypeTag::of(&value, cx.heap())?;
    if !cx.monitor.is_proven(site, tag) {
        cx.monitor.monitor(site, tag);
    }
    Ok(())
}
