use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, ReturnKind};
use crate::error::RoutineResult;
use crate::runtime::ExecutionContext;
use crate::script::ScriptId;

pub(super) const PROFILER_ENTER: NativeFunction = NativeFunction {
    name: "ProfilerEnter",
    target: profiler_enter,
    args: &[ArgKind::Word],
    ret: ReturnKind::Bool,
    may_gc: false,
    exit_frame: true,
};

pub(super) const PROFILER_EXIT: NativeFunction = NativeFunction {
    name: "ProfilerExit",
    target: profiler_exit,
    args: &[ArgKind::Word],
    ret: ReturnKind::Bool,
    may_gc: false,
    exit_frame: true,
};

fn script_arg(cx: &ExecutionContext<'_>, args: &NativeArgs) -> RoutineResult<ScriptId> {
    let script = ScriptId(args.word_u32(0)?);
    cx.scripts().get(script)?;
    Ok(script)
}

fn profiler_enter(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let script = script_arg(cx, args)?;
    cx.profiler.enter(script);
    Ok(())
}

fn profiler_exit(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let script = script_arg(cx, args)?;
    if !cx.profiler.exit(script) {
        tracing::warn!(?script, depth = cx.profiler.depth(), "unbalanced profiler exit");
    }
    Ok(())
}
