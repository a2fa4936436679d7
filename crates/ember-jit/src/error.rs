//! Error types shared by the frame walkers and the call bridge.

use crate::bridge::NativeAddress;
use crate::frames::StackAddr;
use crate::heap::GcRef;
use crate::runtime::ContextId;
use crate::script::{CodeAddress, CodeId, ScriptId};
use thiserror::Error;

/// A breach of the contract between the code generator and the runtime.
///
/// These are never user-recoverable. They are logged and handed back to the
/// embedder, which is expected to tear the context down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("stack access out of bounds at {addr} ({len} bytes)")]
    OutOfBounds { addr: StackAddr, len: usize },

    #[error("native stack exhausted: need {needed} bytes, {available} available")]
    StackOverflow { needed: usize, available: usize },

    #[error("unknown frame type tag {tag} at {fp}")]
    UnknownFrameType { tag: u64, fp: StackAddr },

    #[error("unexpected {found} frame at {fp}, expected {expected}")]
    UnexpectedFrameType {
        fp: StackAddr,
        expected: &'static str,
        found: &'static str,
    },

    #[error("broken frame chain at {fp}: saved frame pointer {saved:?}")]
    BrokenChain { fp: StackAddr, saved: Option<StackAddr> },

    #[error("advanced past the entry frame at {0}")]
    PastEntry(StackAddr),

    #[error("frame at {0} is not the innermost frame")]
    NotInnermost(StackAddr),

    #[error("no frame at {0}")]
    NoFrame(StackAddr),

    #[error("corrupt value slot at {0}")]
    CorruptValue(StackAddr),

    #[error("unknown compiled code {0:?}")]
    UnknownCode(CodeId),

    #[error("unknown script {0:?}")]
    UnknownScript(ScriptId),

    #[error("return address {address:#x} lies outside compiled code {code:?}")]
    AddressOutsideCode { code: CodeId, address: CodeAddress },

    #[error("no safepoint recorded for {code:?} at offset {offset:#x}")]
    MissingSafepoint { code: CodeId, offset: u32 },

    #[error("JS frame at {0} has no known return address")]
    MissingReturnAddress(StackAddr),

    #[error("inline frame walker constructed without a physical frame")]
    NoPhysicalFrame,

    #[error("inline frame decode underflow")]
    InlineUnderflow,

    #[error("corrupt inline side table for {0:?}")]
    CorruptInlineTable(CodeId),

    #[error("exit frame target {0} does not resolve to a native call descriptor")]
    UnresolvedCallSite(NativeAddress),

    #[error("duplicate native call descriptor '{0}'")]
    DuplicateDescriptor(&'static str),

    #[error("invalid native call descriptor '{name}': {reason}")]
    InvalidDescriptor { name: &'static str, reason: &'static str },

    #[error("argument mismatch calling '{routine}': expected {expected}, got {got}")]
    ArgumentMismatch {
        routine: &'static str,
        expected: String,
        got: String,
    },

    #[error("'{0}' reported failure without a pending exception or abort request")]
    FailureWithoutException(&'static str),

    #[error("'{0}' reported success without producing its result")]
    MissingResult(&'static str),

    #[error("'{0}' reported success but left an exception pending")]
    ExceptionOnSuccess(&'static str),

    #[error("no active compiled-code activation")]
    NoActivation,

    #[error("activation {0} left out of order")]
    ActivationOrder(usize),

    #[error("no exit frame on top of the stack")]
    NoExitFrame,

    #[error("dead managed reference {0:?}")]
    DeadReference(GcRef),

    #[error("managed reference {0:?} has the wrong cell kind")]
    WrongCellKind(GcRef),

    #[error("no debug frame registered at {0}")]
    NoDebugFrame(StackAddr),

    #[error("unknown execution context {0:?}")]
    UnknownContext(ContextId),

    #[error("value out of range for '{routine}' argument {index}")]
    ArgumentRange { routine: &'static str, index: usize },
}

/// Marker for a failed operation.
///
/// Holding a `Thrown` means the context already carries a pending exception
/// or an abort request; it never carries a payload of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exception pending")]
pub struct Thrown;

/// Result type for operations with script-visible failure
pub type JsResult<T> = Result<T, Thrown>;

/// Failure of a bridged routine or a runtime operation it delegates to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutineError {
    #[error("exception pending")]
    Thrown,

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl From<Thrown> for RoutineError {
    fn from(_: Thrown) -> Self {
        RoutineError::Thrown
    }
}

pub type RoutineResult<T> = Result<T, RoutineError>;

/// Result type for stack introspection and bridge plumbing
pub type IntegrityResult<T> = Result<T, IntegrityError>;
