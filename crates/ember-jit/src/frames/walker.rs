//! Physical frame walker.
//!
//! Walks one activation's frames from newest to oldest, stopping at its
//! Entry frame. The walker never allocates and never mutates the stack; it
//! trusts nothing it reads, so every link is checked before it is followed.

use super::layout::{FrameHeader, FrameKind, FrameType, StackAddr, HEADER_SIZE};
use super::stack::NativeStack;
use crate::bridge::{DescriptorRegistry, NativeCallDescriptor};
use crate::error::{IntegrityError, IntegrityResult};
use crate::script::{CodeAddress, CodeId, CodeTable, CompiledCode, ScriptId};

#[derive(Debug, Clone)]
pub struct FrameWalker<'a> {
    stack: &'a NativeStack,
    fp: StackAddr,
    header: FrameHeader,
    /// Address execution will resume at inside the current frame's code,
    /// taken from the next-newer frame
    return_address_to_fp: Option<CodeAddress>,
}

impl<'a> FrameWalker<'a> {
    /// Start at the Exit frame recorded as the top of the running activation
    pub fn from_top(stack: &'a NativeStack, top: StackAddr) -> IntegrityResult<Self> {
        let header = stack.read_header(top)?;
        if header.frame_type() != FrameType::Exit {
            return Err(IntegrityError::UnexpectedFrameType {
                fp: top,
                expected: FrameType::Exit.name(),
                found: header.frame_type().name(),
            });
        }
        Ok(Self {
            stack,
            fp: top,
            header,
            return_address_to_fp: None,
        })
    }

    /// Start mid-stack at a known JS frame
    pub fn from_js_frame(stack: &'a NativeStack, fp: StackAddr) -> IntegrityResult<Self> {
        let header = stack.read_header(fp)?;
        if header.frame_type() != FrameType::Js {
            return Err(IntegrityError::UnexpectedFrameType {
                fp,
                expected: FrameType::Js.name(),
                found: header.frame_type().name(),
            });
        }
        Ok(Self {
            stack,
            fp,
            header,
            return_address_to_fp: None,
        })
    }

    /// Supply the resume address for a walker started mid-stack
    pub fn with_return_address(mut self, address: CodeAddress) -> Self {
        self.return_address_to_fp = Some(address);
        self
    }

    pub fn frame_type(&self) -> FrameType {
        self.header.frame_type()
    }

    pub fn fp(&self) -> StackAddr {
        self.fp
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    pub fn is_js(&self) -> bool {
        self.frame_type() == FrameType::Js
    }

    pub fn is_exit(&self) -> bool {
        self.frame_type() == FrameType::Exit
    }

    pub fn is_entry(&self) -> bool {
        self.frame_type() == FrameType::Entry
    }

    /// Resume address inside the current frame's own code
    pub fn return_address_to_fp(&self) -> IntegrityResult<CodeAddress> {
        self.return_address_to_fp
            .ok_or(IntegrityError::MissingReturnAddress(self.fp))
    }

    /// Address the current frame returns to in its caller
    pub fn return_address_to_caller_frame(&self) -> CodeAddress {
        self.header.return_address
    }

    /// Whether an older frame exists in this activation
    pub fn more(&self) -> bool {
        !self.is_entry()
    }

    /// Move to the next-older frame
    pub fn advance(&mut self) -> IntegrityResult<()> {
        if self.is_entry() {
            return Err(IntegrityError::PastEntry(self.fp));
        }
        let saved = match self.header.saved_fp {
            Some(saved) if saved > self.fp => saved,
            saved => {
                return Err(IntegrityError::BrokenChain {
                    fp: self.fp,
                    saved,
                })
            }
        };
        let header = self.stack.read_header(saved)?;
        // The gap between the two headers must be exactly the older
        // frame's locals.
        if saved.0 - self.fp.0 != HEADER_SIZE + header.locals_size as usize {
            return Err(IntegrityError::BrokenChain {
                fp: self.fp,
                saved: Some(saved),
            });
        }
        self.return_address_to_fp = Some(self.header.return_address);
        self.fp = saved;
        self.header = header;
        Ok(())
    }

    /// Bytes of locals in the current frame
    pub fn frame_size(&self) -> usize {
        self.header.locals_size as usize
    }

    /// Bytes of locals in the next-older frame, from the chain geometry
    pub fn previous_frame_locals_size(&self) -> IntegrityResult<usize> {
        match self.header.saved_fp {
            Some(saved) if saved > self.fp => Ok(saved.0 - self.fp.0 - HEADER_SIZE),
            saved => Err(IntegrityError::BrokenChain {
                fp: self.fp,
                saved,
            }),
        }
    }

    pub fn code_id(&self) -> IntegrityResult<CodeId> {
        match self.header.kind {
            FrameKind::Js { code } => Ok(code),
            other => Err(IntegrityError::UnexpectedFrameType {
                fp: self.fp,
                expected: FrameType::Js.name(),
                found: other.frame_type().name(),
            }),
        }
    }

    pub fn script(&self, code: &CodeTable) -> IntegrityResult<ScriptId> {
        Ok(code.get(self.code_id()?)?.script)
    }

    /// Offset of the resume address within the current frame's code
    pub fn safepoint_offset(&self, code: &CodeTable) -> IntegrityResult<(CodeId, u32)> {
        let id = self.code_id()?;
        let offset = code.get(id)?.offset_of(self.return_address_to_fp()?)?;
        Ok((id, offset))
    }

    /// The current JS frame's compiled code if it has been invalidated since
    /// the frame was entered
    pub fn check_invalidation<'c>(
        &self,
        code: &'c CodeTable,
    ) -> IntegrityResult<Option<&'c CompiledCode>> {
        let compiled = code.get(self.code_id()?)?;
        if compiled.invalidated {
            tracing::debug!(fp = %self.fp, code = ?compiled.id, "frame runs invalidated code");
            return Ok(Some(compiled));
        }
        Ok(None)
    }

    /// The routine an Exit frame belongs to
    pub fn exit_descriptor(
        &self,
        registry: &DescriptorRegistry,
    ) -> IntegrityResult<NativeCallDescriptor> {
        match self.header.kind {
            FrameKind::Exit { target } => registry.lookup(target).ok_or_else(|| {
                tracing::error!(fp = %self.fp, %target, "exit frame does not resolve");
                IntegrityError::UnresolvedCallSite(target)
            }),
            other => Err(IntegrityError::UnexpectedFrameType {
                fp: self.fp,
                expected: FrameType::Exit.name(),
                found: other.frame_type().name(),
            }),
        }
    }
}
