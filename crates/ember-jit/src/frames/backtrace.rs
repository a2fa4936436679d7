//! Stack introspection built on the walkers.

use super::activation::{ActivationId, ActivationWalker};
use super::inline::InlineFrameWalker;
use super::layout::{FrameType, StackAddr};
use super::walker::FrameWalker;
use crate::bridge::exit_frame_refs;
use crate::error::{IntegrityError, IntegrityResult};
use crate::heap::GcRef;
use crate::runtime::ExecutionContext;
use crate::script::{CodeId, Pc, ScriptId};

/// One logical frame in a captured backtrace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub script: ScriptId,
    pub pc: Pc,
    /// Inline depth within the physical frame; 0 owns the frame
    pub depth: u32,
    pub fp: StackAddr,
    pub activation: ActivationId,
}

/// Stack top of the context's newest activation
fn current_top(cx: &ExecutionContext<'_>) -> IntegrityResult<StackAddr> {
    let walker = ActivationWalker::new(cx);
    if !walker.more() {
        return Err(IntegrityError::NoActivation);
    }
    walker.top().ok_or(IntegrityError::NoExitFrame)
}

/// The JS frame that made the native call currently in progress
pub fn calling_js_frame(cx: &ExecutionContext<'_>) -> IntegrityResult<(StackAddr, CodeId)> {
    let mut frames = FrameWalker::from_top(&cx.stack, current_top(cx)?)?;
    frames.advance()?;
    Ok((frames.fp(), frames.code_id()?))
}

/// Script and pc of the innermost logical frame of the calling JS frame
pub fn pc_script(cx: &ExecutionContext<'_>) -> IntegrityResult<(ScriptId, Pc)> {
    let mut frames = FrameWalker::from_top(&cx.stack, current_top(cx)?)?;
    frames.advance()?;
    let inline = InlineFrameWalker::new(Some(&frames), &cx.code)?;
    Ok((inline.script()?, inline.pc()?))
}

/// Script owning the innermost physical JS frame
pub fn top_script(cx: &ExecutionContext<'_>) -> IntegrityResult<ScriptId> {
    let mut frames = FrameWalker::from_top(&cx.stack, current_top(cx)?)?;
    while frames.more() {
        frames.advance()?;
        if frames.is_js() {
            return frames.script(&cx.code);
        }
    }
    Err(IntegrityError::UnexpectedFrameType {
        fp: frames.fp(),
        expected: FrameType::Js.name(),
        found: frames.frame_type().name(),
    })
}

/// All logical frames of the context, newest first, across activations.
///
/// Activations whose compiled code is running without a native call in
/// progress have no walkable top and are skipped.
pub fn capture_backtrace(cx: &ExecutionContext<'_>) -> IntegrityResult<Vec<BacktraceFrame>> {
    let mut out = Vec::new();
    let mut activations = ActivationWalker::new(cx);
    while activations.more() {
        if let (Some(top), Some(activation)) = (activations.top(), activations.id()) {
            let mut frames = FrameWalker::from_top(&cx.stack, top)?;
            while frames.more() {
                frames.advance()?;
                if !frames.is_js() {
                    continue;
                }
                let mut inline = InlineFrameWalker::new(Some(&frames), &cx.code)?;
                loop {
                    out.push(BacktraceFrame {
                        script: inline.script()?,
                        pc: inline.pc()?,
                        depth: inline.depth()?,
                        fp: frames.fp(),
                        activation,
                    });
                    if !inline.has_more() {
                        break;
                    }
                    inline.advance()?;
                }
            }
        }
        activations.advance()?;
    }
    Ok(out)
}

/// Managed references marshaled into every Exit frame of the context
pub fn exit_frame_roots(cx: &ExecutionContext<'_>) -> IntegrityResult<Vec<GcRef>> {
    let mut out = Vec::new();
    let mut activations = ActivationWalker::new(cx);
    while activations.more() {
        if let Some(top) = activations.top() {
            let mut frames = FrameWalker::from_top(&cx.stack, top)?;
            loop {
                if frames.is_exit() {
                    let descriptor = frames.exit_descriptor(&cx.registry)?;
                    out.extend(exit_frame_refs(&cx.stack, frames.fp(), &descriptor)?);
                }
                if !frames.more() {
                    break;
                }
                frames.advance()?;
            }
        }
        activations.advance()?;
    }
    Ok(out)
}
