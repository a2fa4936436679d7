//! Native call descriptors.
//!
//! A descriptor says how compiled code calls one runtime routine: which
//! arguments it passes and how, how the result comes back, whether the call
//! may collect garbage, and whether it runs behind an Exit frame.

use crate::error::{IntegrityError, IntegrityResult, RoutineResult};
use crate::heap::GcRef;
use crate::runtime::ExecutionContext;
use crate::value::Value;
use std::fmt;

/// Entry address of a runtime routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeAddress(pub u64);

impl fmt::Display for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Type of the out-parameter a routine writes on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutKind {
    Value,
    Bool,
    Int32,
    Uint32,
}

/// How one argument is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Raw machine word
    Word,
    /// Reference to a managed cell
    Pointer,
    /// Managed value
    Value,
    /// Variable-length run of managed values, passed as count plus slots
    Values,
    /// Out-parameter written by the routine; always last
    OutParam(OutKind),
}

impl ArgKind {
    pub fn is_managed(&self) -> bool {
        matches!(self, ArgKind::Pointer | ArgKind::Value | ArgKind::Values)
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ArgKind::Word => "word",
            ArgKind::Pointer => "pointer",
            ArgKind::Value => "value",
            ArgKind::Values => "values",
            ArgKind::OutParam(_) => "out",
        }
    }
}

/// How the routine's result reaches compiled code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Success flag, plus the out-parameter if the descriptor has one
    Bool,
    /// The result value itself
    Direct,
}

/// Routine signature under the uniform calling convention.
///
/// `Err(RoutineError::Thrown)` is the `false` success flag; the routine must
/// have set a pending exception or requested an abort.
pub type NativeFn = fn(&mut ExecutionContext<'_>, &mut NativeArgs) -> RoutineResult<()>;

/// Static description of one routine
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub target: NativeFn,
    pub args: &'static [ArgKind],
    pub ret: ReturnKind,
    /// The call may collect garbage; managed arguments are rooted around it
    pub may_gc: bool,
    /// The call runs behind an Exit frame
    pub exit_frame: bool,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("ret", &self.ret)
            .field("may_gc", &self.may_gc)
            .field("exit_frame", &self.exit_frame)
            .finish()
    }
}

impl NativeFunction {
    /// Argument kinds compiled code supplies, without the out-parameter
    pub fn explicit_args(&self) -> &'static [ArgKind] {
        match self.args.split_last() {
            Some((ArgKind::OutParam(_), rest)) => rest,
            _ => self.args,
        }
    }

    pub fn out_kind(&self) -> Option<OutKind> {
        match self.args.last() {
            Some(ArgKind::OutParam(kind)) => Some(*kind),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> IntegrityResult<()> {
        let invalid = |reason| IntegrityError::InvalidDescriptor {
            name: self.name,
            reason,
        };
        if self
            .explicit_args()
            .iter()
            .any(|a| matches!(a, ArgKind::OutParam(_)))
        {
            return Err(invalid("out-parameter must be the last argument"));
        }
        if self.ret == ReturnKind::Direct && self.out_kind().is_some() {
            return Err(invalid("direct return cannot use an out-parameter"));
        }
        if !self.exit_frame && (self.may_gc || self.ret != ReturnKind::Direct) {
            return Err(invalid(
                "routines without an exit frame must be infallible and must not collect",
            ));
        }
        Ok(())
    }

    pub(crate) fn signature(&self) -> String {
        let kinds: Vec<&str> = self.explicit_args().iter().map(|a| a.name()).collect();
        format!("({})", kinds.join(", "))
    }
}

/// A registered routine together with its address
#[derive(Debug, Clone, Copy)]
pub struct NativeCallDescriptor {
    pub address: NativeAddress,
    pub function: &'static NativeFunction,
}

impl NativeCallDescriptor {
    pub fn name(&self) -> &'static str {
        self.function.name
    }
}

/// An argument as passed by compiled code
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Word(u64),
    Pointer(GcRef),
    Value(Value),
    Values(Vec<Value>),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Word(_) => ArgKind::Word,
            Arg::Pointer(_) => ArgKind::Pointer,
            Arg::Value(_) => ArgKind::Value,
            Arg::Values(_) => ArgKind::Values,
        }
    }

    /// Managed references carried by this argument
    pub fn refs(&self) -> Vec<GcRef> {
        match self {
            Arg::Word(_) => Vec::new(),
            Arg::Pointer(r) => vec![*r],
            Arg::Value(v) => v.gc_ref().into_iter().collect(),
            Arg::Values(vs) => vs.iter().filter_map(|v| v.gc_ref()).collect(),
        }
    }
}

/// Value written through an out-parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutValue {
    Value(Value),
    Bool(bool),
    Int32(i32),
    Uint32(u32),
}

impl OutValue {
    pub fn kind(&self) -> OutKind {
        match self {
            OutValue::Value(_) => OutKind::Value,
            OutValue::Bool(_) => OutKind::Bool,
            OutValue::Int32(_) => OutKind::Int32,
            OutValue::Uint32(_) => OutKind::Uint32,
        }
    }

    pub fn gc_ref(&self) -> Option<GcRef> {
        match self {
            OutValue::Value(v) => v.gc_ref(),
            _ => None,
        }
    }
}

/// Arguments and results of one routine invocation
#[derive(Debug)]
pub struct NativeArgs {
    routine: &'static str,
    args: Vec<Arg>,
    pub(crate) out: Option<OutValue>,
    pub(crate) ret: Option<Value>,
}

impl NativeArgs {
    pub(crate) fn new(routine: &'static str, args: Vec<Arg>) -> Self {
        Self {
            routine,
            args,
            out: None,
            ret: None,
        }
    }

    fn mismatch(&self, index: usize, expected: ArgKind) -> IntegrityError {
        IntegrityError::ArgumentMismatch {
            routine: self.routine,
            expected: format!("{} at {}", expected.name(), index),
            got: self
                .args
                .get(index)
                .map_or("nothing", |a| a.kind().name())
                .to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn word(&self, index: usize) -> IntegrityResult<u64> {
        match self.args.get(index) {
            Some(Arg::Word(w)) => Ok(*w),
            _ => Err(self.mismatch(index, ArgKind::Word)),
        }
    }

    pub fn pointer(&self, index: usize) -> IntegrityResult<GcRef> {
        match self.args.get(index) {
            Some(Arg::Pointer(r)) => Ok(*r),
            _ => Err(self.mismatch(index, ArgKind::Pointer)),
        }
    }

    pub fn value(&self, index: usize) -> IntegrityResult<Value> {
        match self.args.get(index) {
            Some(Arg::Value(v)) => Ok(*v),
            _ => Err(self.mismatch(index, ArgKind::Value)),
        }
    }

    pub fn values(&self, index: usize) -> IntegrityResult<&[Value]> {
        match self.args.get(index) {
            Some(Arg::Values(vs)) => Ok(vs),
            _ => Err(self.mismatch(index, ArgKind::Values)),
        }
    }

    /// A word argument that must fit in 32 bits
    pub fn word_u32(&self, index: usize) -> IntegrityResult<u32> {
        u32::try_from(self.word(index)?).map_err(|_| IntegrityError::ArgumentRange {
            routine: self.routine,
            index,
        })
    }

    pub fn set_out(&mut self, out: OutValue) {
        self.out = Some(out);
    }

    pub fn set_return(&mut self, value: Value) {
        self.ret = Some(value);
    }

    pub(crate) fn args(&self) -> &[Arg] {
        &self.args
    }
}
