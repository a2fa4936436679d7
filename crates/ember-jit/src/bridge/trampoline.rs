//! The call trampoline between compiled code and runtime routines.
//!
//! Every routine call goes through [`call_native`], which plays the part of
//! the generated stub: it marshals the arguments into an Exit frame, roots
//! them if the routine may collect, runs the routine and turns its success
//! flag into either a result for compiled code or an unwind to the nearest
//! handler.

use super::descriptor::{Arg, ArgKind, NativeAddress, NativeArgs, NativeCallDescriptor, OutValue, ReturnKind};
use super::unwind::{handle_exception, ResumeTarget};
use crate::error::{IntegrityError, IntegrityResult, RoutineError};
use crate::frames::{FrameKind, NativeStack, StackAddr, VALUE_SLOT_SIZE};
use crate::heap::{Cell, GcRef};
use crate::runtime::ExecutionContext;
use crate::script::CodeAddress;
use crate::value::Value;

/// What compiled code sees when a routine call completes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeOutcome {
    /// The routine succeeded. Carries the out-parameter or direct result;
    /// `None` for routines that only report success.
    Returned(Option<OutValue>),
    /// The routine failed and the stack was unwound to `ResumeTarget`
    Threw(ResumeTarget),
}

impl NativeOutcome {
    pub fn value(&self) -> Option<Value> {
        match self {
            NativeOutcome::Returned(Some(OutValue::Value(v))) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeOutcome::Returned(Some(OutValue::Bool(b))) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int32(&self) -> Option<i32> {
        match self {
            NativeOutcome::Returned(Some(OutValue::Int32(i))) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uint32(&self) -> Option<u32> {
        match self {
            NativeOutcome::Returned(Some(OutValue::Uint32(u))) => Some(*u),
            _ => None,
        }
    }

    pub fn threw(&self) -> bool {
        matches!(self, NativeOutcome::Threw(_))
    }
}

fn slot_count(args: &[Arg]) -> usize {
    args.iter()
        .map(|arg| match arg {
            Arg::Values(vs) => 1 + vs.len(),
            _ => 1,
        })
        .sum()
}

fn write_slot_word(stack: &mut NativeStack, slot: StackAddr, word: u64) -> IntegrityResult<()> {
    stack.write_word(slot, word)?;
    stack.write_word(StackAddr(slot.0 + VALUE_SLOT_SIZE / 2), 0)
}

/// Lay the arguments out in the locals of the Exit frame at `fp`
fn marshal(stack: &mut NativeStack, fp: StackAddr, args: &[Arg]) -> IntegrityResult<()> {
    let mut index = 0;
    for arg in args {
        match arg {
            Arg::Word(w) => write_slot_word(stack, stack.local_slot(fp, index), *w)?,
            Arg::Pointer(r) => write_slot_word(stack, stack.local_slot(fp, index), r.to_bits())?,
            Arg::Value(v) => stack.write_value(stack.local_slot(fp, index), *v)?,
            Arg::Values(vs) => {
                write_slot_word(stack, stack.local_slot(fp, index), vs.len() as u64)?;
                for v in vs {
                    index += 1;
                    stack.write_value(stack.local_slot(fp, index), *v)?;
                }
            }
        }
        index += 1;
    }
    Ok(())
}

/// Managed references marshaled into the Exit frame at `fp`, read back
/// through the routine's descriptor
pub(crate) fn exit_frame_refs(
    stack: &NativeStack,
    fp: StackAddr,
    descriptor: &NativeCallDescriptor,
) -> IntegrityResult<Vec<GcRef>> {
    let mut refs = Vec::new();
    let mut index = 0;
    for kind in descriptor.function.explicit_args() {
        let slot = stack.local_slot(fp, index);
        match kind {
            ArgKind::Pointer => refs.push(GcRef::from_bits(stack.read_word(slot)?)),
            ArgKind::Value => refs.extend(stack.read_value(slot)?.gc_ref()),
            ArgKind::Values => {
                let count = stack.read_word(slot)? as usize;
                for _ in 0..count {
                    index += 1;
                    refs.extend(stack.read_value(stack.local_slot(fp, index))?.gc_ref());
                }
            }
            ArgKind::Word | ArgKind::OutParam(_) => {}
        }
        index += 1;
    }
    Ok(refs)
}

fn check_signature(descriptor: &NativeCallDescriptor, args: &[Arg]) -> IntegrityResult<()> {
    let expected = descriptor.function.explicit_args();
    let matches = expected.len() == args.len()
        && expected.iter().zip(args).all(|(kind, arg)| *kind == arg.kind());
    if matches {
        return Ok(());
    }
    let got: Vec<&str> = args.iter().map(|a| a.kind().name()).collect();
    Err(IntegrityError::ArgumentMismatch {
        routine: descriptor.name(),
        expected: descriptor.function.signature(),
        got: format!("({})", got.join(", ")),
    })
}

/// Root value for a live reference
fn root_for(cx: &ExecutionContext<'_>, r: GcRef) -> IntegrityResult<Value> {
    Ok(match cx.heap().get(r)? {
        Cell::String(_) => Value::String(r),
        Cell::Object(_) => Value::Object(r),
    })
}

/// Call the routine at `address` from compiled code.
///
/// `return_address` is the resume point inside the calling JS frame's
/// code. Integrity errors leave the stack as it was before the call.
#[tracing::instrument(level = "trace", skip(cx, args), fields(context = ?cx.id()))]
pub fn call_native(
    cx: &mut ExecutionContext<'_>,
    address: NativeAddress,
    return_address: CodeAddress,
    args: Vec<Arg>,
) -> IntegrityResult<NativeOutcome> {
    let descriptor = cx
        .registry
        .lookup(address)
        .ok_or(IntegrityError::UnresolvedCallSite(address))?;
    check_signature(&descriptor, &args)?;
    match cx.activations.last() {
        Some(activation) if activation.context == cx.id() => {}
        _ => return Err(IntegrityError::NoActivation),
    }

    let mut roots = Vec::new();
    for arg in &args {
        for r in arg.refs() {
            roots.push(root_for(cx, r)?);
        }
    }

    let function = descriptor.function;
    let prev_top = cx.stack.top();
    let exit_fp = if function.exit_frame {
        let locals = (slot_count(&args) * VALUE_SLOT_SIZE) as u32;
        let fp = cx
            .stack
            .push_frame(FrameKind::Exit { target: address }, return_address, locals)?;
        if let Err(err) = marshal(&mut cx.stack, fp, &args) {
            cx.stack.pop_frame(fp)?;
            return Err(err);
        }
        cx.stack.set_top(Some(fp));
        Some(fp)
    } else {
        None
    };

    let mark = cx.heap().root_mark();
    if function.may_gc {
        for root in roots {
            cx.heap_mut().push_root(root);
        }
    }
    let mut native_args = NativeArgs::new(function.name, args);
    let result = (function.target)(cx, &mut native_args);
    cx.heap_mut().truncate_roots(mark);

    let outcome = match result {
        Err(RoutineError::Integrity(err)) => Err(err),
        Err(RoutineError::Thrown) if !cx.has_failure() => {
            Err(IntegrityError::FailureWithoutException(function.name))
        }
        Err(RoutineError::Thrown) if exit_fp.is_none() => Err(IntegrityError::InvalidDescriptor {
            name: function.name,
            reason: "routine without an exit frame reported failure",
        }),
        Err(RoutineError::Thrown) => match handle_exception(cx) {
            Ok(target) => {
                cx.stack.set_top(prev_top);
                return Ok(NativeOutcome::Threw(target));
            }
            Err(err) => Err(err),
        },
        Ok(()) if cx.is_exception_pending() => {
            Err(IntegrityError::ExceptionOnSuccess(function.name))
        }
        Ok(()) => collect_result(function.name, function.ret, function.out_kind(), native_args),
    };

    if let Err(err) = &outcome {
        tracing::error!(routine = function.name, error = %err, "native call failed integrity checks");
    }
    if let Some(fp) = exit_fp {
        let popped = match &outcome {
            Ok(_) => cx.stack.pop_frame(fp).map(|_| ()),
            Err(_) => cx.stack.pop_through(fp),
        };
        if let Err(cleanup) = popped {
            tracing::error!(routine = function.name, error = %cleanup, "could not remove exit frame");
            cx.stack.set_top(prev_top);
            return Err(outcome.err().unwrap_or(cleanup));
        }
        tracing::trace!(routine = function.name, %fp, "exit frame popped");
    }
    cx.stack.set_top(prev_top);
    outcome
}

fn collect_result(
    name: &'static str,
    ret: ReturnKind,
    out_kind: Option<super::OutKind>,
    args: NativeArgs,
) -> IntegrityResult<NativeOutcome> {
    match (ret, out_kind) {
        (ReturnKind::Bool, None) => Ok(NativeOutcome::Returned(None)),
        (ReturnKind::Bool, Some(kind)) => match args.out {
            Some(out) if out.kind() == kind => Ok(NativeOutcome::Returned(Some(out))),
            _ => Err(IntegrityError::MissingResult(name)),
        },
        (ReturnKind::Direct, _) => args
            .ret
            .map(|v| NativeOutcome::Returned(Some(OutValue::Value(v))))
            .ok_or(IntegrityError::MissingResult(name)),
    }
}

/// Call a routine by its registered name
pub fn call_by_name(
    cx: &mut ExecutionContext<'_>,
    name: &str,
    return_address: CodeAddress,
    args: Vec<Arg>,
) -> IntegrityResult<NativeOutcome> {
    let descriptor = cx.registry.by_name(name).ok_or_else(|| IntegrityError::ArgumentMismatch {
        routine: "call_by_name",
        expected: "a registered routine".to_string(),
        got: name.to_string(),
    })?;
    call_native(cx, descriptor.address, return_address, args)
}
