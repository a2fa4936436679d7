//! The call trampoline: exit frames, rooting, result collection and
//! unwinding

mod common;

use common::*;
use common::{assert_eq, assert_ne};
use ember_jit::bridge::{
    call_by_name, call_native, Arg, ArgKind, NativeAddress, NativeArgs, NativeFunction, NativeOutcome, OutKind,
    OutValue, RegistryBuilder, ResumeTarget, ReturnKind,
};
use ember_jit::frames::{enter_jit, exit_frame_roots, leave_jit, FrameWalker, InlineTableBuilder};
use ember_jit::heap::{ErrorKind, ObjectKind};
use ember_jit::script::{CodeSpec, Script, TryNote};
use ember_jit::{
    ExecutionContext, IntegrityError, JitOptions, RoutineError, RoutineResult, Runtime, Value,
};
use rstest::rstest;
use std::sync::Arc;

// ============================================================================
// Test routines
// ============================================================================

/// Collect, then report whether both arguments survived and were visible
/// as exit frame roots
fn collect_now(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let pointer = args.pointer(0)?;
    let value = args.value(1)?;
    cx.collect_garbage();
    let live = cx.heap().is_live(pointer) && value.gc_ref().map_or(true, |r| cx.heap().is_live(r));
    let roots = exit_frame_roots(cx)?;
    let rooted = roots.contains(&pointer) && value.gc_ref().map_or(true, |r| roots.contains(&r));
    args.set_out(OutValue::Bool(live && rooted));
    Ok(())
}

fn fail_silently(_cx: &mut ExecutionContext<'_>, _args: &mut NativeArgs) -> RoutineResult<()> {
    Err(RoutineError::Thrown)
}

fn throw_and_succeed(cx: &mut ExecutionContext<'_>, _args: &mut NativeArgs) -> RoutineResult<()> {
    cx.set_pending_exception(Value::Int32(7));
    Ok(())
}

/// Resolve the Exit frame on top of the stack back to its descriptor
fn inspect(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let top = cx.stack().top().ok_or(IntegrityError::NoExitFrame)?;
    let walker = FrameWalker::from_top(cx.stack(), top)?;
    let descriptor = walker.exit_descriptor(cx.registry())?;
    args.set_out(OutValue::Bool(descriptor.name() == "Inspect"));
    Ok(())
}

static COLLECT_NOW: NativeFunction = NativeFunction {
    name: "CollectNow",
    target: collect_now,
    args: &[ArgKind::Pointer, ArgKind::Value, ArgKind::OutParam(OutKind::Bool)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

static FAIL_SILENTLY: NativeFunction = NativeFunction {
    name: "FailSilently",
    target: fail_silently,
    args: &[],
    ret: ReturnKind::Bool,
    may_gc: false,
    exit_frame: true,
};

static THROW_AND_SUCCEED: NativeFunction = NativeFunction {
    name: "ThrowAndSucceed",
    target: throw_and_succeed,
    args: &[],
    ret: ReturnKind::Bool,
    may_gc: false,
    exit_frame: true,
};

static INSPECT: NativeFunction = NativeFunction {
    name: "Inspect",
    target: inspect,
    args: &[ArgKind::OutParam(OutKind::Bool)],
    ret: ReturnKind::Bool,
    may_gc: false,
    exit_frame: true,
};

fn test_runtime() -> Runtime {
    let registry = RegistryBuilder::new()
        .with_builtins()
        .register(&COLLECT_NOW)
        .register(&FAIL_SILENTLY)
        .register(&THROW_AND_SUCCEED)
        .register(&INSPECT)
        .build()
        .unwrap();
    Runtime::with_registry(JitOptions::for_testing(), Arc::new(registry))
}

// ============================================================================
// Exit frame lifecycle
// ============================================================================

#[rstest]
#[case("InterruptCheck", vec![])]
#[case("LooselyEqual", vec![Arg::Value(Value::Int32(1)), Arg::Value(Value::Double(1.0))])]
#[case("StrictlyEqual", vec![Arg::Value(Value::Null), Arg::Value(Value::Undefined)])]
#[case("StringFromCharCode", vec![Arg::Word(0x41)])]
#[case("FailSilently", vec![])]
fn test_stack_is_restored_after_call(#[case] name: &str, #[case] args: Vec<Arg>) {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();

    let activation = enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 16).unwrap();
    let used = cx.stack().used();

    let ret = cx.code_address(code, 0x10).unwrap();
    let _ = call_by_name(&mut cx, name, ret, args);

    assert_eq!(cx.stack().innermost(), Some(fp));
    assert_eq!(cx.stack().top(), None);
    assert_eq!(cx.stack().used(), used);
    cx.pop_frame(fp).unwrap();
    leave_jit(&mut cx, activation).unwrap();
}

#[test]
fn test_exit_frame_resolves_to_its_descriptor() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    cx.push_js_frame(code, 0, 0).unwrap();

    let outcome = call(&mut cx, "Inspect", code, 0x10, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
}

#[test]
fn test_direct_result_without_exit_frame() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();

    let obj = cx.new_object(ObjectKind::Plain);
    cx.heap_mut().object_mut(obj).unwrap().emulates_undefined = true;
    let outcome = call(&mut cx, "ObjectEmulatesUndefined", code, 0x10, vec![Arg::Pointer(obj)]);
    assert_eq!(outcome.value(), Some(Value::Boolean(true)));
    assert_eq!(cx.stack().innermost(), Some(fp));
}

// ============================================================================
// Rooting
// ============================================================================

#[test]
fn test_managed_arguments_survive_collection_inside_routine() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    cx.push_js_frame(code, 0, 0).unwrap();

    let obj = cx.new_object(ObjectKind::Plain);
    let s = cx.alloc_string("kept");
    let outcome = call(
        &mut cx,
        "CollectNow",
        code,
        0x10,
        vec![Arg::Pointer(obj), Arg::Value(Value::String(s))],
    );
    assert_eq!(outcome.as_bool(), Some(true));

    // Nothing holds them once the call is over.
    cx.collect_garbage();
    assert!(!cx.heap().is_live(obj));
    assert!(!cx.heap().is_live(s));
}

#[test]
fn test_dead_argument_is_rejected() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();

    let obj = cx.new_object(ObjectKind::Plain);
    cx.collect_garbage();
    let ret = cx.code_address(code, 0x10).unwrap();
    let result = call_by_name(
        &mut cx,
        "CreateThis",
        ret,
        vec![Arg::Pointer(obj)],
    );
    assert_eq!(result, Err(IntegrityError::DeadReference(obj)));
    assert_eq!(cx.stack().innermost(), Some(fp));
}

// ============================================================================
// Contract violations
// ============================================================================

#[test]
fn test_failure_without_exception_is_an_integrity_error() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    cx.push_js_frame(code, 0, 0).unwrap();

    let ret = cx.code_address(code, 0x10).unwrap();
    assert_eq!(
        call_by_name(&mut cx, "FailSilently", ret, vec![]),
        Err(IntegrityError::FailureWithoutException("FailSilently"))
    );
}

#[test]
fn test_exception_with_success_is_an_integrity_error() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    cx.push_js_frame(code, 0, 0).unwrap();

    let ret = cx.code_address(code, 0x10).unwrap();
    assert_eq!(
        call_by_name(&mut cx, "ThrowAndSucceed", ret, vec![]),
        Err(IntegrityError::ExceptionOnSuccess("ThrowAndSucceed"))
    );
}

#[test]
fn test_argument_kinds_must_match_descriptor() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();

    let ret = cx.code_address(code, 0x10).unwrap();
    let result = call_by_name(&mut cx, "LooselyEqual", ret, vec![Arg::Word(1)]);
    match result {
        Err(IntegrityError::ArgumentMismatch { routine, expected, got }) => {
            assert_eq!(routine, "LooselyEqual");
            assert_eq!(expected, "(value, value)");
            assert_eq!(got, "(word)");
        }
        other => panic!("expected argument mismatch, got {:?}", other),
    }
    assert_eq!(cx.stack().innermost(), Some(fp));
}

#[test]
fn test_failed_unwind_restores_stack() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();
    let top = cx.stack().top();

    // The return address lies outside the caller's code, so the unwinder
    // cannot place the throwing frame.
    let revoked = cx.new_object(ObjectKind::Revoked);
    let name = cx.alloc_string("x");
    let result = call_by_name(
        &mut cx,
        "GetProperty",
        1,
        vec![Arg::Value(Value::Object(revoked)), Arg::Pointer(name)],
    );
    assert!(matches!(result, Err(IntegrityError::AddressOutsideCode { .. })));
    assert_eq!(cx.stack().innermost(), Some(fp));
    assert_eq!(cx.stack().top(), top);
}

#[test]
fn test_unknown_address_does_not_resolve() {
    let mut rt = test_runtime();
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let address = NativeAddress(0x7000_0001);
    assert_eq!(
        call_native(&mut cx, address, 0, vec![]),
        Err(IntegrityError::UnresolvedCallSite(address))
    );
}

#[test]
fn test_call_requires_activation() {
    let mut rt = test_runtime();
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    assert_eq!(
        call_by_name(&mut cx, "InterruptCheck", 0, vec![]),
        Err(IntegrityError::NoActivation)
    );
}

// ============================================================================
// Unwinding
// ============================================================================

fn not_a_function(cx: &mut ExecutionContext<'_>) -> Vec<Arg> {
    let obj = cx.new_object(ObjectKind::Plain);
    vec![Arg::Pointer(obj), Arg::Values(vec![Value::Undefined])]
}

#[test]
fn test_uncaught_exception_unwinds_to_entry() {
    let mut rt = test_runtime();
    let (_, code) = compiled_script(&mut rt, "main", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let activation = enter_jit(&mut cx).unwrap();
    let entry = cx.stack().innermost().unwrap();
    cx.push_js_frame(code, 0, 0).unwrap();

    let args = not_a_function(&mut cx);
    let outcome = call(&mut cx, "InvokeFunction", code, 0x10, args);
    assert_eq!(outcome, NativeOutcome::Threw(ResumeTarget::Entry { fp: entry }));
    assert_eq!(cx.stack().innermost(), Some(entry));

    let exc = cx.pending_exception().and_then(|v| v.as_object()).unwrap();
    assert!(matches!(
        cx.heap().object(exc).unwrap().kind,
        ObjectKind::Error { kind: ErrorKind::TypeError, .. }
    ));
    leave_jit(&mut cx, activation).unwrap();
}

#[test]
fn test_innermost_try_note_takes_the_exception() {
    let mut rt = test_runtime();
    let script = rt.add_script(Script::new("main"));
    let spec = CodeSpec::new(CODE_SIZE, InlineTableBuilder::new().record(0x18, &[(script, 3)]).build())
        .with_try_note(TryNote { start: 0, end: 0x80, landing: 0x90 })
        .with_try_note(TryNote { start: 0x10, end: 0x20, landing: 0xa0 });
    let code = rt.install_code(script, spec).unwrap();
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();

    let args = not_a_function(&mut cx);
    let outcome = call(&mut cx, "InvokeFunction", code, 0x18, args);
    let landing = cx.code_address(code, 0xa0).unwrap();
    assert_eq!(outcome, NativeOutcome::Threw(ResumeTarget::Handler { fp, landing }));
    assert_eq!(cx.stack().innermost(), Some(fp));
    assert!(cx.is_exception_pending());
}

#[test]
fn test_unwinding_pops_frames_without_handlers() {
    let mut rt = test_runtime();
    let outer = rt.add_script(Script::new("outer"));
    let outer_spec = CodeSpec::new(CODE_SIZE, InlineTableBuilder::new().record(0x30, &[(outer, 1)]).build())
        .with_try_note(TryNote { start: 0x20, end: 0x40, landing: 0x50 });
    let outer_code = rt.install_code(outer, outer_spec).unwrap();
    let (_, inner_code) = compiled_script(&mut rt, "inner", &[0x10]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();

    let outer_fp = cx.push_js_frame(outer_code, 0, 32).unwrap();
    let into_outer = cx.code_address(outer_code, 0x30).unwrap();
    cx.push_js_frame(inner_code, into_outer, 16).unwrap();

    let args = not_a_function(&mut cx);
    let outcome = call(&mut cx, "InvokeFunction", inner_code, 0x10, args);
    let landing = cx.code_address(outer_code, 0x50).unwrap();
    assert_eq!(
        outcome,
        NativeOutcome::Threw(ResumeTarget::Handler { fp: outer_fp, landing })
    );
    assert_eq!(cx.stack().innermost(), Some(outer_fp));
}
