//! Runtime and execution contexts.
//!
//! A `Runtime` owns everything one thread needs to run compiled code: the
//! heap, scripts and their compiled code, the native stack and its
//! activations. Execution contexts are lightweight views into it that carry
//! their own pending-exception state.

use crate::bridge::DescriptorRegistry;
use crate::debugger::{DebugFrame, DebugHooks, Debugger};
use crate::error::{IntegrityError, IntegrityResult, JsResult, RoutineError};
use crate::frames::{Activation, FrameKind, NativeStack, StackAddr};
use crate::heap::{AtomId, AtomTable, Cell, ErrorKind, GcRef, Heap, JsObject, ObjectKind};
use crate::profiler::ProfilerStack;
use crate::script::{self, CodeAddress, CodeId, CodeSpec, CodeTable, Script, ScriptId, ScriptTable};
use crate::types::{TypeClass, TypeId, TypeMonitor, TypeTable};
use crate::value::Value;
use crate::JitOptions;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// Cross-thread handle for requesting an interrupt.
///
/// The flag is only polled at safe points (loop back-edges and call
/// prologues), so a raised interrupt takes effect at the next check.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// The interpreter, as seen from compiled code
pub trait ScriptHost {
    /// Produce bytecode for a lazily parsed script
    fn delazify(&self, cx: &mut ExecutionContext<'_>, script: ScriptId) -> JsResult<()> {
        let _ = (cx, script);
        Ok(())
    }

    fn call(
        &self,
        cx: &mut ExecutionContext<'_>,
        callee: GcRef,
        this: Value,
        args: &[Value],
    ) -> JsResult<Value>;

    fn construct(
        &self,
        cx: &mut ExecutionContext<'_>,
        callee: GcRef,
        args: &[Value],
    ) -> JsResult<Value>;

    /// Run the embedder's interrupt callback; `false` terminates execution
    fn handle_interrupt(&self, cx: &mut ExecutionContext<'_>) -> bool {
        let _ = cx;
        true
    }
}

/// Host that runs nothing: calls return `undefined`, constructs return a
/// fresh plain object
#[derive(Debug, Default)]
pub struct NullHost;

impl ScriptHost for NullHost {
    fn call(
        &self,
        _cx: &mut ExecutionContext<'_>,
        _callee: GcRef,
        _this: Value,
        _args: &[Value],
    ) -> JsResult<Value> {
        Ok(Value::Undefined)
    }

    fn construct(
        &self,
        cx: &mut ExecutionContext<'_>,
        _callee: GcRef,
        _args: &[Value],
    ) -> JsResult<Value> {
        Ok(Value::Object(cx.new_object(ObjectKind::Plain)))
    }
}

#[derive(Debug, Default)]
struct ContextState {
    pending_exception: Option<Value>,
    abort_requested: bool,
}

pub struct Runtime {
    pub(crate) registry: Arc<DescriptorRegistry>,
    pub(crate) options: JitOptions,
    pub(crate) heap: Heap,
    pub(crate) atoms: AtomTable,
    pub(crate) types: TypeTable,
    pub(crate) monitor: TypeMonitor,
    pub(crate) scripts: ScriptTable,
    pub(crate) code: CodeTable,
    pub(crate) stack: NativeStack,
    pub(crate) activations: Vec<Activation>,
    contexts: Vec<ContextState>,
    pub(crate) interrupt: InterruptHandle,
    pub(crate) host: Rc<dyn ScriptHost>,
    pub(crate) debugger: Option<Rc<dyn Debugger>>,
    pub(crate) debug_hooks: DebugHooks,
    pub(crate) debug_frames: HashMap<StackAddr, DebugFrame>,
    pub(crate) profiler: ProfilerStack,
    unit_strings: Vec<Option<GcRef>>,
}

impl Runtime {
    /// Create a runtime using the process-wide builtin routines
    pub fn new(options: JitOptions) -> IntegrityResult<Self> {
        Ok(Self::with_registry(options, DescriptorRegistry::builtins()?))
    }

    pub fn with_registry(options: JitOptions, registry: Arc<DescriptorRegistry>) -> Self {
        Self {
            heap: Heap::new(options.gc_threshold),
            stack: NativeStack::new(options.stack_capacity),
            profiler: ProfilerStack::new(options.max_profiler_depth),
            registry,
            options,
            atoms: AtomTable::new(),
            types: TypeTable::new(),
            monitor: TypeMonitor::new(),
            scripts: ScriptTable::new(),
            code: CodeTable::new(),
            activations: Vec::new(),
            contexts: Vec::new(),
            interrupt: InterruptHandle::new(),
            host: Rc::new(NullHost),
            debugger: None,
            debug_hooks: DebugHooks::default(),
            debug_frames: HashMap::new(),
            unit_strings: vec![None; 256],
        }
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    pub fn set_host(&mut self, host: Rc<dyn ScriptHost>) {
        self.host = host;
    }

    pub fn set_debugger(&mut self, debugger: Option<Rc<dyn Debugger>>) {
        self.debugger = debugger;
    }

    pub fn debug_hooks_mut(&mut self) -> &mut DebugHooks {
        &mut self.debug_hooks
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn new_context(&mut self) -> ContextId {
        let id = ContextId(self.contexts.len() as u32);
        self.contexts.push(ContextState::default());
        id
    }

    pub fn context(&mut self, id: ContextId) -> IntegrityResult<ExecutionContext<'_>> {
        if id.0 as usize >= self.contexts.len() {
            return Err(IntegrityError::UnknownContext(id));
        }
        Ok(ExecutionContext { rt: self, id })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn monitor(&self) -> &TypeMonitor {
        &self.monitor
    }

    pub fn scripts(&self) -> &ScriptTable {
        &self.scripts
    }

    pub fn scripts_mut(&mut self) -> &mut ScriptTable {
        &mut self.scripts
    }

    pub fn code(&self) -> &CodeTable {
        &self.code
    }

    pub fn stack(&self) -> &NativeStack {
        &self.stack
    }

    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    pub fn profiler(&self) -> &ProfilerStack {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut ProfilerStack {
        &mut self.profiler
    }

    pub fn debug_frame(&self, fp: StackAddr) -> Option<&DebugFrame> {
        self.debug_frames.get(&fp)
    }

    pub fn intern(&mut self, name: &str) -> AtomId {
        self.atoms.intern(name)
    }

    pub fn atom_name(&self, atom: AtomId) -> Option<&str> {
        self.atoms.name(atom)
    }

    pub fn add_script(&mut self, script: Script) -> ScriptId {
        self.scripts.add(script)
    }

    /// Install compiled code for `script`, replacing any current code
    pub fn install_code(&mut self, script: ScriptId, spec: CodeSpec) -> IntegrityResult<CodeId> {
        script::install_code(&mut self.scripts, &mut self.code, script, spec)
    }

    pub fn forbid_compilation(&mut self, script: ScriptId) -> IntegrityResult<()> {
        script::forbid_compilation(&mut self.scripts, &mut self.code, script)
    }

    pub fn code_address(&self, code: CodeId, offset: u32) -> IntegrityResult<CodeAddress> {
        self.code.get(code)?.address_at(offset)
    }

    /// Push the frame compiled code builds in its prologue
    pub fn push_js_frame(
        &mut self,
        code: CodeId,
        return_address: CodeAddress,
        locals_size: u32,
    ) -> IntegrityResult<StackAddr> {
        self.code.get(code)?;
        self.stack
            .push_frame(FrameKind::Js { code }, return_address, locals_size)
    }

    /// Pop the innermost frame, as compiled code does on return
    pub fn pop_frame(&mut self, fp: StackAddr) -> IntegrityResult<()> {
        self.stack.pop_frame(fp)?;
        self.debug_frames.remove(&fp);
        Ok(())
    }

    fn before_alloc(&mut self) {
        if self.heap.wants_collection() {
            self.collect_garbage();
        }
    }

    pub fn alloc_string(&mut self, s: impl Into<String>) -> GcRef {
        self.before_alloc();
        self.heap.alloc(Cell::String(s.into()))
    }

    pub fn alloc_object(&mut self, object: JsObject) -> GcRef {
        self.before_alloc();
        self.heap.alloc(Cell::Object(object))
    }

    /// Allocate an object with its class's shared type
    pub fn new_object(&mut self, kind: ObjectKind) -> GcRef {
        let type_id = self.types.default_type(TypeClass::of(&kind));
        self.alloc_object(JsObject::new(type_id, kind))
    }

    pub fn new_singleton_type(&mut self, class: TypeClass) -> TypeId {
        self.types.new_type(class, true)
    }

    /// Cached string for a single code unit below 256
    pub fn unit_string(&mut self, code: u8) -> GcRef {
        if let Some(cached) = self.unit_strings[code as usize] {
            return cached;
        }
        let s = self.alloc_string(char::from(code).to_string());
        self.heap.add_permanent_root(Value::String(s));
        self.unit_strings[code as usize] = Some(s);
        s
    }

    /// Collect everything not reachable from roots
    pub fn collect_garbage(&mut self) -> usize {
        let mut extra: Vec<Value> = self
            .contexts
            .iter()
            .filter_map(|c| c.pending_exception)
            .collect();
        extra.extend(self.debug_frames.values().filter_map(|f| f.return_value));
        self.heap.collect(&extra)
    }
}

/// A runtime borrowed on behalf of one execution context
pub struct ExecutionContext<'rt> {
    rt: &'rt mut Runtime,
    id: ContextId,
}

impl Deref for ExecutionContext<'_> {
    type Target = Runtime;

    fn deref(&self) -> &Runtime {
        self.rt
    }
}

impl DerefMut for ExecutionContext<'_> {
    fn deref_mut(&mut self) -> &mut Runtime {
        self.rt
    }
}

impl ExecutionContext<'_> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    fn state(&self) -> &ContextState {
        &self.rt.contexts[self.id.0 as usize]
    }

    fn state_mut(&mut self) -> &mut ContextState {
        &mut self.rt.contexts[self.id.0 as usize]
    }

    pub fn is_exception_pending(&self) -> bool {
        self.state().pending_exception.is_some()
    }

    pub fn pending_exception(&self) -> Option<Value> {
        self.state().pending_exception
    }

    pub fn set_pending_exception(&mut self, value: Value) {
        self.state_mut().pending_exception = Some(value);
    }

    pub fn take_pending_exception(&mut self) -> Option<Value> {
        self.state_mut().pending_exception.take()
    }

    pub fn clear_pending_exception(&mut self) {
        self.state_mut().pending_exception = None;
    }

    /// Ask for uncatchable termination of the running script
    pub fn request_abort(&mut self) {
        tracing::debug!(context = ?self.id, "abort requested");
        self.state_mut().abort_requested = true;
    }

    pub fn is_abort_requested(&self) -> bool {
        self.state().abort_requested
    }

    pub fn clear_abort(&mut self) {
        self.state_mut().abort_requested = false;
    }

    /// Whether a failure has been recorded for this context
    pub fn has_failure(&self) -> bool {
        self.is_exception_pending() || self.is_abort_requested()
    }

    /// Set `value` as the pending exception
    pub fn throw_value(&mut self, value: Value) -> RoutineError {
        self.set_pending_exception(value);
        RoutineError::Thrown
    }

    /// Create an error object and set it as the pending exception
    pub fn throw_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> RoutineError {
        let message = message.into();
        tracing::trace!(kind = kind.name(), %message, "throwing");
        let error = self.new_object(ObjectKind::Error { kind, message });
        self.throw_value(Value::Object(error))
    }
}
