//! Exception unwinding out of a failed routine call.

use crate::debugger::{debug_epilogue, DebugTarget};
use crate::error::{IntegrityError, IntegrityResult, RoutineError};
use crate::frames::{FrameType, FrameWalker, InlineFrameWalker, StackAddr};
use crate::runtime::ExecutionContext;
use crate::script::CodeAddress;
use crate::value::Value;

/// Where execution continues after an exception left a routine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResumeTarget {
    /// Jump to `landing` inside the JS frame at `fp`
    Handler { fp: StackAddr, landing: CodeAddress },
    /// The debugger overrode the exception; the JS frame at `fp` returns
    /// `value`
    ForcedReturn { fp: StackAddr, value: Value },
    /// Nothing in this activation handles the exception; return to the
    /// embedder through the Entry frame at `fp`
    Entry { fp: StackAddr },
}

impl ResumeTarget {
    pub fn fp(&self) -> StackAddr {
        match self {
            ResumeTarget::Handler { fp, .. }
            | ResumeTarget::ForcedReturn { fp, .. }
            | ResumeTarget::Entry { fp } => *fp,
        }
    }
}

enum Candidate {
    Js {
        fp: StackAddr,
        handler: Option<CodeAddress>,
        debug: Option<DebugTarget>,
    },
    Entry(StackAddr),
}

/// Frames the exception may stop at, newest first, ending at the Entry
/// frame of the running activation
fn candidates(cx: &ExecutionContext<'_>) -> IntegrityResult<Vec<Candidate>> {
    let top = cx.stack.top().ok_or(IntegrityError::NoExitFrame)?;
    let mut frames = FrameWalker::from_top(&cx.stack, top)?;
    let mut out = Vec::new();
    while frames.more() {
        frames.advance()?;
        match frames.frame_type() {
            FrameType::Js => {
                let (id, offset) = frames.safepoint_offset(&cx.code)?;
                let code = cx.code.get(id)?;
                let handler = code
                    .try_note_for(offset)
                    .map(|note| code.base + note.landing as CodeAddress);
                let debug = if cx.debug_frames.contains_key(&frames.fp()) {
                    let (script, pc) = InlineFrameWalker::outermost(&frames, &cx.code)?;
                    Some(DebugTarget {
                        fp: frames.fp(),
                        script,
                        pc,
                    })
                } else {
                    None
                };
                out.push(Candidate::Js {
                    fp: frames.fp(),
                    handler,
                    debug,
                });
            }
            FrameType::Entry => out.push(Candidate::Entry(frames.fp())),
            FrameType::Exit | FrameType::Rectifier | FrameType::BailedRectifier => {}
        }
    }
    Ok(out)
}

/// Unwind from the top Exit frame to the frame that takes the pending
/// exception, popping everything newer than it.
///
/// An abort request skips handlers and forced returns; the walk then always
/// ends at the Entry frame.
pub fn handle_exception(cx: &mut ExecutionContext<'_>) -> IntegrityResult<ResumeTarget> {
    let mut target = None;
    for candidate in candidates(cx)? {
        match candidate {
            Candidate::Js { fp, handler, debug } => {
                if let (Some(landing), false) = (handler, cx.is_abort_requested()) {
                    target = Some(ResumeTarget::Handler { fp, landing });
                    break;
                }
                let Some(debug) = debug else { continue };
                let ok = match debug_epilogue(cx, debug, false) {
                    Ok(ok) => ok,
                    Err(RoutineError::Integrity(err)) => return Err(err),
                    Err(RoutineError::Thrown) => false,
                };
                if ok && !cx.is_abort_requested() {
                    let value = cx
                        .debug_frames
                        .get(&fp)
                        .and_then(|frame| frame.return_value)
                        .unwrap_or(Value::Undefined);
                    target = Some(ResumeTarget::ForcedReturn { fp, value });
                    break;
                }
            }
            Candidate::Entry(fp) => {
                target = Some(ResumeTarget::Entry { fp });
                break;
            }
        }
    }
    let target = target.ok_or(IntegrityError::NoActivation)?;

    let fp = target.fp();
    cx.stack.pop_to(fp)?;
    cx.debug_frames.retain(|frame_fp, _| *frame_fp >= fp);
    tracing::debug!(
        context = ?cx.id(),
        ?target,
        abort = cx.is_abort_requested(),
        "exception unwound"
    );
    Ok(target)
}
