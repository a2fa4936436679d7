//! Physical frame header layout.
//!
//! Every frame starts with a fixed 32-byte header at its frame pointer:
//!
//! ```text
//! fp + 0   descriptor      (locals_size << 4) | type tag
//! fp + 8   saved fp        frame pointer of the next-older frame, 0 if none
//! fp + 16  return address  where this frame returns to in its caller
//! fp + 24  callee token    per-type payload (see `FrameKind`)
//! ```
//!
//! Locals occupy the `locals_size` bytes directly below the header. The
//! stack grows toward lower addresses, so older frames sit at higher ones.

use crate::bridge::NativeAddress;
use crate::runtime::ContextId;
use crate::script::{CodeAddress, CodeId};
use std::fmt;

pub const WORD_SIZE: usize = 8;
pub const HEADER_SIZE: usize = 32;
pub const VALUE_SLOT_SIZE: usize = 16;

pub(crate) const DESCRIPTOR_OFFSET: usize = 0;
pub(crate) const SAVED_FP_OFFSET: usize = 8;
pub(crate) const RETURN_ADDRESS_OFFSET: usize = 16;
pub(crate) const TOKEN_OFFSET: usize = 24;

const TAG_BITS: u32 = 4;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;

/// Offset into the native stack buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackAddr(pub(crate) usize);

impl StackAddr {
    pub fn offset(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StackAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sp+{:#x}", self.0)
    }
}

/// Frame classification tag stored in the descriptor word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Js = 0,
    Entry = 1,
    Rectifier = 2,
    BailedRectifier = 3,
    Exit = 4,
}

impl FrameType {
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(FrameType::Js),
            1 => Some(FrameType::Entry),
            2 => Some(FrameType::Rectifier),
            3 => Some(FrameType::BailedRectifier),
            4 => Some(FrameType::Exit),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Js => "JS",
            FrameType::Entry => "Entry",
            FrameType::Rectifier => "Rectifier",
            FrameType::BailedRectifier => "BailedRectifier",
            FrameType::Exit => "Exit",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A frame's type together with its callee token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Compiled script code
    Js { code: CodeId },
    /// Transition from non-compiled code into compiled code
    Entry { context: ContextId },
    /// Adapter inserted when caller and callee disagree on argument count
    Rectifier { actual_args: u32 },
    /// Rectifier left behind by a bailout on its way back to the interpreter
    BailedRectifier { actual_args: u32 },
    /// Transition from compiled code into a native runtime routine
    Exit { target: NativeAddress },
}

impl FrameKind {
    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameKind::Js { .. } => FrameType::Js,
            FrameKind::Entry { .. } => FrameType::Entry,
            FrameKind::Rectifier { .. } => FrameType::Rectifier,
            FrameKind::BailedRectifier { .. } => FrameType::BailedRectifier,
            FrameKind::Exit { .. } => FrameType::Exit,
        }
    }

    pub(crate) fn token(&self) -> u64 {
        match self {
            FrameKind::Js { code } => code.0 as u64,
            FrameKind::Entry { context } => context.0 as u64,
            FrameKind::Rectifier { actual_args } | FrameKind::BailedRectifier { actual_args } => {
                *actual_args as u64
            }
            FrameKind::Exit { target } => target.0,
        }
    }

    pub(crate) fn decode(frame_type: FrameType, token: u64) -> Self {
        match frame_type {
            FrameType::Js => FrameKind::Js {
                code: CodeId(token as u32),
            },
            FrameType::Entry => FrameKind::Entry {
                context: ContextId(token as u32),
            },
            FrameType::Rectifier => FrameKind::Rectifier {
                actual_args: token as u32,
            },
            FrameType::BailedRectifier => FrameKind::BailedRectifier {
                actual_args: token as u32,
            },
            FrameType::Exit => FrameKind::Exit {
                target: NativeAddress(token),
            },
        }
    }
}

/// A decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub saved_fp: Option<StackAddr>,
    pub return_address: CodeAddress,
    /// Bytes of locals below the header
    pub locals_size: u32,
}

impl FrameHeader {
    pub fn frame_type(&self) -> FrameType {
        self.kind.frame_type()
    }

    pub(crate) fn descriptor(&self) -> u64 {
        ((self.locals_size as u64) << TAG_BITS) | self.frame_type() as u64
    }

    /// Split a descriptor word into its tag and locals size
    pub(crate) fn split_descriptor(word: u64) -> (u64, u32) {
        (word & TAG_MASK, (word >> TAG_BITS) as u32)
    }
}
