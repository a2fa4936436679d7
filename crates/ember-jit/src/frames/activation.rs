//! Activation records.
//!
//! Each entry into compiled code pushes an Entry frame and an activation.
//! While that code is running, native calls may re-enter compiled code, so
//! one stack holds several disjoint compiled regions. The activation list
//! is how a walker finds the top of each region.

use super::layout::{FrameKind, StackAddr};
use crate::error::{IntegrityError, IntegrityResult};
use crate::runtime::{ContextId, ExecutionContext, Runtime};

/// Handle returned by `enter_jit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub context: ContextId,
    /// Previous activation of the same context
    pub prev: Option<ActivationId>,
    /// Stack top when this activation was entered
    pub prev_top: Option<StackAddr>,
    pub entry_fp: StackAddr,
}

/// Enter compiled code on behalf of `cx`
pub fn enter_jit(cx: &mut ExecutionContext<'_>) -> IntegrityResult<ActivationId> {
    let context = cx.id();
    let prev = cx
        .activations
        .iter()
        .rposition(|a| a.context == context)
        .map(ActivationId);
    let prev_top = cx.stack.top();
    let entry_fp = cx.stack.push_frame(FrameKind::Entry { context }, 0, 0)?;
    cx.stack.set_top(None);

    let id = ActivationId(cx.activations.len());
    cx.activations.push(Activation {
        context,
        prev,
        prev_top,
        entry_fp,
    });
    tracing::debug!(?context, activation = id.0, %entry_fp, "entered compiled code");
    Ok(id)
}

/// Leave the activation `id`, which must be the newest one
pub fn leave_jit(cx: &mut ExecutionContext<'_>, id: ActivationId) -> IntegrityResult<()> {
    let context = cx.id();
    match cx.activations.last() {
        Some(last) if id.0 + 1 == cx.activations.len() && last.context == context => {}
        _ => return Err(IntegrityError::ActivationOrder(id.0)),
    }
    let Some(activation) = cx.activations.pop() else {
        return Err(IntegrityError::NoActivation);
    };

    cx.stack.pop_through(activation.entry_fp)?;
    cx.stack.set_top(activation.prev_top);
    cx.debug_frames.retain(|fp, _| *fp > activation.entry_fp);
    tracing::debug!(?context, activation = id.0, "left compiled code");
    Ok(())
}

/// Walks activations newest to oldest, yielding each one's stack top
#[derive(Debug, Clone)]
pub struct ActivationWalker<'a> {
    activations: &'a [Activation],
    stack_top: Option<StackAddr>,
    context: Option<ContextId>,
    current: Option<usize>,
}

impl<'a> ActivationWalker<'a> {
    /// Activations belonging to one context
    pub fn new(cx: &'a ExecutionContext<'_>) -> Self {
        let context = cx.id();
        let activations = cx.activations.as_slice();
        Self {
            activations,
            stack_top: cx.stack.top(),
            context: Some(context),
            current: activations.iter().rposition(|a| a.context == context),
        }
    }

    /// Every activation in the runtime
    pub fn for_runtime(rt: &'a Runtime) -> Self {
        let activations = rt.activations.as_slice();
        Self {
            activations,
            stack_top: rt.stack.top(),
            context: None,
            current: activations.len().checked_sub(1),
        }
    }

    pub fn more(&self) -> bool {
        self.current.is_some()
    }

    pub fn id(&self) -> Option<ActivationId> {
        self.current.map(ActivationId)
    }

    pub fn activation(&self) -> Option<&'a Activation> {
        self.current.map(|i| &self.activations[i])
    }

    /// Innermost Exit frame of the current activation, or `None` while its
    /// compiled code is running without a native call in progress
    pub fn top(&self) -> Option<StackAddr> {
        let index = self.current?;
        match self.activations.get(index + 1) {
            Some(newer) => newer.prev_top,
            None => self.stack_top,
        }
    }

    pub fn entry_fp(&self) -> Option<StackAddr> {
        self.activation().map(|a| a.entry_fp)
    }

    pub fn advance(&mut self) -> IntegrityResult<()> {
        let index = self.current.ok_or(IntegrityError::NoActivation)?;
        self.current = match self.context {
            Some(_) => self.activations[index].prev.map(|p| p.0),
            None => index.checked_sub(1),
        };
        Ok(())
    }
}
