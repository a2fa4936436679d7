//! Debug-mode routines and the epilogue protocol

mod common;

use common::*;
use common::{assert_eq, assert_ne};
use ember_jit::bridge::{Arg, NativeOutcome, ResumeTarget};
use ember_jit::debugger::{DebugTarget, Debugger, EpilogueState, TrapHook, TrapStatus};
use ember_jit::frames::{enter_jit, StackAddr};
use ember_jit::script::{CodeId, Pc, ScriptId};
use ember_jit::{ExecutionContext, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const SITE: u32 = 0x10;

/// Debugger whose verdicts are set up front
struct Scripted {
    enter: Cell<TrapStatus>,
    leave: Cell<TrapStatus>,
    step: Cell<TrapStatus>,
    trap: Cell<TrapStatus>,
    statement: Cell<TrapStatus>,
    events: RefCell<Vec<&'static str>>,
    /// `ok` passed to each `on_leave_frame`
    leaves: RefCell<Vec<bool>>,
}

impl Scripted {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            enter: Cell::new(TrapStatus::Continue),
            leave: Cell::new(TrapStatus::Continue),
            step: Cell::new(TrapStatus::Continue),
            trap: Cell::new(TrapStatus::Continue),
            statement: Cell::new(TrapStatus::Continue),
            events: RefCell::new(Vec::new()),
            leaves: RefCell::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<&'static str> {
        self.events.borrow().clone()
    }
}

impl Debugger for Scripted {
    fn on_enter_frame(&self, _cx: &mut ExecutionContext<'_>, _target: DebugTarget) -> TrapStatus {
        self.events.borrow_mut().push("enter");
        self.enter.get()
    }

    fn on_leave_frame(&self, _cx: &mut ExecutionContext<'_>, _target: DebugTarget, ok: bool) -> TrapStatus {
        self.events.borrow_mut().push("leave");
        self.leaves.borrow_mut().push(ok);
        self.leave.get()
    }

    fn on_single_step(&self, _cx: &mut ExecutionContext<'_>, _target: DebugTarget) -> TrapStatus {
        self.events.borrow_mut().push("step");
        self.step.get()
    }

    fn on_trap(&self, _cx: &mut ExecutionContext<'_>, target: DebugTarget) -> TrapStatus {
        assert_eq!(target.pc, SITE);
        self.events.borrow_mut().push("trap");
        self.trap.get()
    }

    fn on_debugger_statement(&self, _cx: &mut ExecutionContext<'_>, _target: DebugTarget) -> TrapStatus {
        self.events.borrow_mut().push("statement");
        self.statement.get()
    }
}

fn hook(f: impl Fn(&mut ExecutionContext<'_>, ScriptId, Pc) -> TrapStatus + 'static) -> TrapHook {
    Rc::new(f)
}

fn debug_runtime(debugger: &Rc<Scripted>) -> (Runtime, ScriptId, CodeId) {
    let mut rt = runtime_with(|o| o.debug_mode = true);
    rt.set_debugger(Some(debugger.clone()));
    let (script, code) = compiled_script(&mut rt, "debuggee", &[SITE]);
    (rt, script, code)
}

/// Enter compiled code, push a frame for `code` and run its prologue
fn enter_debuggee(cx: &mut ExecutionContext<'_>, code: CodeId) -> (StackAddr, StackAddr) {
    enter_jit(cx).unwrap();
    let entry = cx.stack().innermost().unwrap();
    let fp = cx.push_js_frame(code, 0, 16).unwrap();
    let outcome = call(cx, "DebugPrologue", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(false));
    (entry, fp)
}

// ============================================================================
// Prologue and epilogue
// ============================================================================

#[test]
fn test_forced_return_in_prologue_runs_epilogue_once() {
    let debugger = Scripted::new();
    debugger.enter.set(TrapStatus::Return(Value::Int32(7)));
    let (mut rt, _, code) = debug_runtime(&debugger);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();

    let outcome = call(&mut cx, "DebugPrologue", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
    let frame = cx.debug_frame(fp).unwrap();
    assert_eq!(frame.state, EpilogueState::Done);
    assert_eq!(frame.return_value, Some(Value::Int32(7)));
    assert_eq!(frame.scope_releases, 1);

    // The frame's own return path reaches the epilogue again.
    let outcome = call(&mut cx, "DebugEpilogue", code, SITE, vec![Arg::Word(1)]);
    assert_eq!(outcome, NativeOutcome::Returned(None));
    assert_eq!(cx.debug_frame(fp).unwrap().scope_releases, 1);
    assert_eq!(debugger.events(), vec!["enter", "leave"]);
}

#[test]
fn test_plain_epilogue_reports_leave() {
    let debugger = Scripted::new();
    let (mut rt, _, code) = debug_runtime(&debugger);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (_, fp) = enter_debuggee(&mut cx, code);

    call(&mut cx, "DebugEpilogue", code, SITE, vec![Arg::Word(1)]);
    let frame = cx.debug_frame(fp).unwrap();
    assert_eq!(frame.state, EpilogueState::Done);
    assert_eq!(frame.return_value, None);
    assert_eq!(*debugger.leaves.borrow(), vec![true]);

    // Popping the frame drops its debug state.
    cx.pop_frame(fp).unwrap();
    assert!(cx.debug_frame(fp).is_none());
}

#[test]
fn test_prologue_without_debugger_continues() {
    let mut rt = runtime_with(|o| o.debug_mode = true);
    let (_, code) = compiled_script(&mut rt, "debuggee", &[SITE]);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (_, fp) = enter_debuggee(&mut cx, code);
    assert_eq!(cx.debug_frame(fp).unwrap().state, EpilogueState::Running);
}

#[test]
fn test_hooks_are_inert_outside_debug_mode() {
    let debugger = Scripted::new();
    debugger.enter.set(TrapStatus::Return(Value::Int32(7)));
    debugger.trap.set(TrapStatus::Error);
    debugger.statement.set(TrapStatus::Error);
    let mut rt = common::runtime();
    rt.set_debugger(Some(debugger.clone()));
    let (script, code) = compiled_script(&mut rt, "debuggee", &[SITE]);
    rt.scripts_mut().get_mut(script).unwrap().breakpoints.insert(SITE);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();

    for routine in ["DebugPrologue", "HandleDebugTrap", "OnDebuggerStatement"] {
        let outcome = call(&mut cx, routine, code, SITE, vec![]);
        assert_eq!(outcome.as_bool(), Some(false), "{}", routine);
    }
    let outcome = call(&mut cx, "DebugEpilogue", code, SITE, vec![Arg::Word(1)]);
    assert_eq!(outcome, NativeOutcome::Returned(None));
    assert!(cx.debug_frame(fp).is_none());
    assert!(debugger.events().is_empty());
}

// ============================================================================
// Traps
// ============================================================================

#[test]
fn test_breakpoint_return_runs_epilogue() {
    let debugger = Scripted::new();
    debugger.trap.set(TrapStatus::Return(Value::Boolean(true)));
    let (mut rt, script, code) = debug_runtime(&debugger);
    rt.scripts_mut().get_mut(script).unwrap().breakpoints.insert(SITE);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (_, fp) = enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
    let frame = cx.debug_frame(fp).unwrap();
    assert_eq!(frame.state, EpilogueState::Done);
    assert_eq!(frame.return_value, Some(Value::Boolean(true)));
    assert_eq!(debugger.events(), vec!["enter", "trap", "leave"]);
}

#[test]
fn test_return_after_epilogue_keeps_first_value() {
    let debugger = Scripted::new();
    debugger.enter.set(TrapStatus::Return(Value::Int32(7)));
    debugger.trap.set(TrapStatus::Return(Value::Int32(8)));
    let (mut rt, script, code) = debug_runtime(&debugger);
    rt.scripts_mut().get_mut(script).unwrap().breakpoints.insert(SITE);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    let fp = cx.push_js_frame(code, 0, 0).unwrap();
    let outcome = call(&mut cx, "DebugPrologue", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
    let frame = cx.debug_frame(fp).unwrap();
    assert_eq!(frame.state, EpilogueState::Done);
    assert_eq!(frame.return_value, Some(Value::Int32(7)));
    assert_eq!(frame.scope_releases, 1);
    assert_eq!(debugger.events(), vec!["enter", "leave", "trap"]);
}

#[test]
fn test_trap_without_breakpoint_or_stepping_continues() {
    let debugger = Scripted::new();
    debugger.trap.set(TrapStatus::Error);
    let (mut rt, _, code) = debug_runtime(&debugger);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(false));
    assert_eq!(debugger.events(), vec!["enter"]);
}

#[test]
fn test_stepping_is_consulted_before_breakpoints() {
    let debugger = Scripted::new();
    debugger.step.set(TrapStatus::Return(Value::Null));
    let (mut rt, script, code) = debug_runtime(&debugger);
    {
        let script = rt.scripts_mut().get_mut(script).unwrap();
        script.step_mode = true;
        script.breakpoints.insert(SITE);
    }
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
    assert_eq!(debugger.events(), vec!["enter", "step", "leave"]);
}

#[test]
fn test_interrupt_hook_overrides_debugger() {
    let debugger = Scripted::new();
    let (mut rt, script, code) = debug_runtime(&debugger);
    rt.scripts_mut().get_mut(script).unwrap().breakpoints.insert(SITE);
    let seen = Rc::new(Cell::new(None));
    let hook_seen = seen.clone();
    rt.debug_hooks_mut().interrupt_hook = Some(hook(move |_cx, script, pc| {
        hook_seen.set(Some((script, pc)));
        TrapStatus::Return(Value::Int32(1))
    }));
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
    assert_eq!(seen.get(), Some((script, SITE)));
    assert_eq!(debugger.events(), vec!["enter", "leave"]);
}

#[test]
fn test_trap_throw_unwinds_to_entry() {
    let debugger = Scripted::new();
    debugger.trap.set(TrapStatus::Throw(Value::Int32(13)));
    let (mut rt, script, code) = debug_runtime(&debugger);
    rt.scripts_mut().get_mut(script).unwrap().breakpoints.insert(SITE);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (entry, _) = enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome, NativeOutcome::Threw(ResumeTarget::Entry { fp: entry }));
    assert_eq!(cx.pending_exception(), Some(Value::Int32(13)));
    // Unwinding ran the frame's epilogue with the failure.
    assert_eq!(*debugger.leaves.borrow(), vec![false]);
    assert_eq!(cx.stack().innermost(), Some(entry));
}

#[test]
fn test_trap_error_aborts() {
    let debugger = Scripted::new();
    debugger.trap.set(TrapStatus::Error);
    let (mut rt, script, code) = debug_runtime(&debugger);
    rt.scripts_mut().get_mut(script).unwrap().breakpoints.insert(SITE);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (entry, _) = enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "HandleDebugTrap", code, SITE, vec![]);
    assert_eq!(outcome, NativeOutcome::Threw(ResumeTarget::Entry { fp: entry }));
    assert!(cx.is_abort_requested());
    assert_eq!(cx.pending_exception(), None);
}

// ============================================================================
// Debugger statements
// ============================================================================

#[test]
fn test_debugger_handler_takes_precedence() {
    let debugger = Scripted::new();
    debugger.statement.set(TrapStatus::Error);
    let (mut rt, _, code) = debug_runtime(&debugger);
    rt.debug_hooks_mut().debugger_handler =
        Some(hook(|_cx, _script, _pc| TrapStatus::Return(Value::Int32(2))));
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (_, fp) = enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "OnDebuggerStatement", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(true));
    assert_eq!(cx.debug_frame(fp).unwrap().return_value, Some(Value::Int32(2)));
    assert!(!debugger.events().contains(&"statement"));
}

#[test]
fn test_debugger_statement_falls_through_to_debugger() {
    let debugger = Scripted::new();
    let (mut rt, _, code) = debug_runtime(&debugger);
    rt.debug_hooks_mut().debugger_handler = Some(hook(|_cx, _script, _pc| TrapStatus::Continue));
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_debuggee(&mut cx, code);

    let outcome = call(&mut cx, "OnDebuggerStatement", code, SITE, vec![]);
    assert_eq!(outcome.as_bool(), Some(false));
    assert_eq!(debugger.events(), vec!["enter", "statement"]);
}

// ============================================================================
// Unwinding through debuggee frames
// ============================================================================

#[test]
fn test_epilogue_can_turn_exception_into_return() {
    let debugger = Scripted::new();
    debugger.leave.set(TrapStatus::Return(Value::Int32(9)));
    let (mut rt, _, code) = debug_runtime(&debugger);
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    let (_, fp) = enter_debuggee(&mut cx, code);

    let not_callable = cx.new_object(ember_jit::heap::ObjectKind::Plain);
    let outcome = call(
        &mut cx,
        "InvokeFunction",
        code,
        SITE,
        vec![Arg::Pointer(not_callable), Arg::Values(vec![Value::Undefined])],
    );
    assert_eq!(
        outcome,
        NativeOutcome::Threw(ResumeTarget::ForcedReturn { fp, value: Value::Int32(9) })
    );
    assert!(!cx.is_exception_pending());
    assert_eq!(cx.stack().innermost(), Some(fp));

    // The frame returning afterwards does not report a second leave.
    call(&mut cx, "DebugEpilogue", code, SITE, vec![Arg::Word(1)]);
    assert_eq!(*debugger.leaves.borrow(), vec![false]);
}
