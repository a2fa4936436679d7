//! Shared test utilities
//!
//! Builders for runtimes, compiled scripts and stacks so the integration
//! tests read as "push these frames, make this call, check the result".

#![allow(dead_code)]

use ember_jit::bridge::{call_by_name, Arg, NativeOutcome};
use ember_jit::frames::{InlineTable, InlineTableBuilder};
use ember_jit::heap::ObjectKind;
use ember_jit::script::{CodeId, CodeSpec, Pc, Script, ScriptId};
use ember_jit::{ExecutionContext, JitOptions, JsResult, Runtime, ScriptHost, Value};
use std::cell::{Cell, RefCell};

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

/// Size of every compiled code range the helpers install
pub const CODE_SIZE: u32 = 0x100;

pub fn runtime() -> Runtime {
    Runtime::new(JitOptions::for_testing()).unwrap()
}

pub fn runtime_with(configure: impl FnOnce(&mut JitOptions)) -> Runtime {
    let mut options = JitOptions::for_testing();
    configure(&mut options);
    Runtime::new(options).unwrap()
}

/// A script with compiled code in which each safepoint is a single logical
/// frame whose pc equals the safepoint offset
pub fn compiled_script(rt: &mut Runtime, name: &str, safepoints: &[u32]) -> (ScriptId, CodeId) {
    let script = rt.add_script(Script::new(name));
    let table = safepoints
        .iter()
        .fold(InlineTableBuilder::new(), |b, &offset| b.record(offset, &[(script, offset)]))
        .build();
    let code = rt.install_code(script, CodeSpec::new(CODE_SIZE, table)).unwrap();
    (script, code)
}

/// Install compiled code for `script` with an explicit inline table
pub fn compile_with(rt: &mut Runtime, script: ScriptId, chains: &[(u32, Vec<(ScriptId, Pc)>)]) -> CodeId {
    let table = chains
        .iter()
        .fold(InlineTableBuilder::new(), |b, (offset, chain)| b.record(*offset, chain))
        .build();
    rt.install_code(script, CodeSpec::new(CODE_SIZE, table)).unwrap()
}

pub fn empty_code(rt: &mut Runtime, name: &str) -> CodeId {
    let script = rt.add_script(Script::new(name));
    rt.install_code(script, CodeSpec::new(CODE_SIZE, InlineTable::default()))
        .unwrap()
}

/// Call a routine by name from `offset` inside `code`
pub fn call(
    cx: &mut ExecutionContext<'_>,
    name: &str,
    code: CodeId,
    offset: u32,
    args: Vec<Arg>,
) -> NativeOutcome {
    let ret = cx.code_address(code, offset).unwrap();
    call_by_name(cx, name, ret, args).unwrap()
}

/// A function object whose body is `script`
pub fn function(cx: &mut ExecutionContext<'_>, script: ScriptId) -> Value {
    Value::Object(cx.new_object(ObjectKind::Function(script)))
}

/// Interpreter stand-in that records what compiled code asked of it
pub struct RecordingHost {
    pub calls: Cell<u32>,
    pub constructs: Cell<u32>,
    pub delazified: RefCell<Vec<ScriptId>>,
    pub interrupts: Cell<u32>,
    /// What `handle_interrupt` answers
    pub keep_running: Cell<bool>,
    pub result: Cell<Value>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            calls: Cell::new(0),
            constructs: Cell::new(0),
            delazified: RefCell::new(Vec::new()),
            interrupts: Cell::new(0),
            keep_running: Cell::new(true),
            result: Cell::new(Value::Undefined),
        }
    }
}

impl ScriptHost for RecordingHost {
    fn delazify(&self, _cx: &mut ExecutionContext<'_>, script: ScriptId) -> JsResult<()> {
        self.delazified.borrow_mut().push(script);
        Ok(())
    }

    fn call(
        &self,
        _cx: &mut ExecutionContext<'_>,
        _callee: ember_jit::heap::GcRef,
        _this: Value,
        _args: &[Value],
    ) -> JsResult<Value> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.result.get())
    }

    fn construct(
        &self,
        cx: &mut ExecutionContext<'_>,
        _callee: ember_jit::heap::GcRef,
        _args: &[Value],
    ) -> JsResult<Value> {
        self.constructs.set(self.constructs.get() + 1);
        Ok(Value::Object(cx.new_object(ObjectKind::Plain)))
    }

    fn handle_interrupt(&self, _cx: &mut ExecutionContext<'_>) -> bool {
        self.interrupts.set(self.interrupts.get() + 1);
        self.keep_running.get()
    }
}
