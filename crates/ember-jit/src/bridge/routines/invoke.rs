use super::monitor_result;
use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, OutKind, OutValue, ReturnKind};
use crate::error::RoutineResult;
use crate::frames::top_script;
use crate::heap::{ErrorKind, ObjectKind};
use crate::ops::is_constructing;
use crate::runtime::ExecutionContext;
use crate::value::{MagicKind, Value};

pub(super) const INVOKE_FUNCTION: NativeFunction = NativeFunction {
    name: "InvokeFunction",
    target: invoke_function,
    args: &[ArgKind::Pointer, ArgKind::Values, ArgKind::OutParam(OutKind::Value)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const CREATE_THIS: NativeFunction = NativeFunction {
    name: "CreateThis",
    target: create_this,
    args: &[ArgKind::Pointer, ArgKind::OutParam(OutKind::Value)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

/// Count a slow call against the innermost compiled script, disqualifying
/// it once the configured limit is reached
fn note_slow_call(cx: &mut ExecutionContext<'_>) -> RoutineResult<()> {
    let script = top_script(cx)?;
    let Some(code) = cx.scripts.get(script)?.ion else {
        return Ok(());
    };
    let limit = cx.options.slow_call_limit;
    let compiled = cx.code.get_mut(code)?;
    compiled.slow_call_count += 1;
    let count = compiled.slow_call_count;
    tracing::trace!(?script, count, limit, "slow call from compiled code");
    if count >= limit {
        cx.forbid_compilation(script)?;
    }
    Ok(())
}

/// Call a function that compiled code could not call directly.
///
/// The second argument is the JIT-style argument vector: `this` followed by
/// the actual arguments. A `this` of `IsConstructing` selects `new`.
fn invoke_function(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let callee = args.pointer(0)?;
    let (this, call_args) = match args.values(1)? {
        [this, rest @ ..] => (*this, rest.to_vec()),
        [] => (Value::Undefined, Vec::new()),
    };

    let script = match cx.heap().object(callee)?.kind {
        ObjectKind::Function(script) => Some(script),
        _ => None,
    };
    let Some(script) = script else {
        return Err(cx.throw_error(ErrorKind::TypeError, "callee is not a function"));
    };

    if cx.scripts.get(script)?.lazy {
        let host = cx.host.clone();
        host.delazify(cx, script)?;
        cx.scripts.get_mut(script)?.lazy = false;
    }
    if !cx.scripts.get(script)?.can_ion_compile {
        note_slow_call(cx)?;
    }
    let inc = cx.options.slow_call_inc_use_count;
    cx.scripts.get_mut(script)?.inc_use_count(inc);

    let host = cx.host.clone();
    let result = if is_constructing(this) {
        host.construct(cx, callee, &call_args)?
    } else {
        host.call(cx, callee, this, &call_args)?
    };

    monitor_result(cx, result)?;
    args.set_out(OutValue::Value(result));
    Ok(())
}

/// Create `this` for a constructing call, or leave that to the callee
fn create_this(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let callee = args.pointer(0)?;
    let interpreted = matches!(cx.heap().object(callee)?.kind, ObjectKind::Function(_));
    let this = if interpreted {
        Value::Object(cx.new_object(ObjectKind::Plain))
    } else {
        Value::Magic(MagicKind::IsConstructing)
    };
    args.set_out(OutValue::Value(this));
    Ok(())
}
