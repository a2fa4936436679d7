//! Native stack frames and the walkers over them

pub mod activation;
pub mod backtrace;
pub mod inline;
pub mod layout;
pub mod stack;
pub mod walker;

pub use activation::{enter_jit, leave_jit, Activation, ActivationId, ActivationWalker};
pub use backtrace::{
    calling_js_frame, capture_backtrace, exit_frame_roots, pc_script, top_script, BacktraceFrame,
};
pub use inline::{InlineFrameWalker, InlineTable, InlineTableBuilder};
pub use layout::{FrameHeader, FrameKind, FrameType, StackAddr, HEADER_SIZE, VALUE_SLOT_SIZE};
pub use stack::NativeStack;
pub use walker::FrameWalker;
