//! Bounds-checked view of native stack memory.

use super::layout::{
    FrameHeader, FrameKind, FrameType, StackAddr, DESCRIPTOR_OFFSET, HEADER_SIZE,
    RETURN_ADDRESS_OFFSET, SAVED_FP_OFFSET, TOKEN_OFFSET, VALUE_SLOT_SIZE, WORD_SIZE,
};
use crate::error::{IntegrityError, IntegrityResult};
use crate::script::CodeAddress;
use crate::value::Value;

/// Bytes at the bottom of the buffer that are never handed out, so no frame
/// pointer is ever 0 and 0 can mean "no saved frame".
const GUARD_SIZE: usize = 16;

/// Native stack memory for one runtime. Grows toward lower addresses.
#[derive(Debug)]
pub struct NativeStack {
    bytes: Vec<u8>,
    /// Lowest address in use
    sp: usize,
    innermost: Option<StackAddr>,
    /// Innermost Exit frame of the running activation, if it is inside a
    /// native call
    top: Option<StackAddr>,
}

impl NativeStack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(GUARD_SIZE + HEADER_SIZE);
        Self {
            bytes: vec![0; capacity],
            sp: capacity,
            innermost: None,
            top: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes currently occupied by frames
    pub fn used(&self) -> usize {
        self.bytes.len() - self.sp
    }

    pub fn innermost(&self) -> Option<StackAddr> {
        self.innermost
    }

    pub fn top(&self) -> Option<StackAddr> {
        self.top
    }

    pub fn set_top(&mut self, top: Option<StackAddr>) {
        self.top = top;
    }

    fn range(&self, addr: StackAddr, len: usize) -> IntegrityResult<std::ops::Range<usize>> {
        let start = addr.0;
        match start.checked_add(len) {
            Some(end) if start >= GUARD_SIZE && end <= self.bytes.len() => Ok(start..end),
            _ => Err(IntegrityError::OutOfBounds { addr, len }),
        }
    }

    pub fn read_word(&self, addr: StackAddr) -> IntegrityResult<u64> {
        let range = self.range(addr, WORD_SIZE)?;
        let mut buf = [0u8; WORD_SIZE];
        buf.copy_from_slice(&self.bytes[range]);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_word(&mut self, addr: StackAddr, word: u64) -> IntegrityResult<()> {
        let range = self.range(addr, WORD_SIZE)?;
        self.bytes[range].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    pub fn read_value(&self, addr: StackAddr) -> IntegrityResult<Value> {
        let tag = self.read_word(addr)?;
        let payload = self.read_word(StackAddr(addr.0 + WORD_SIZE))?;
        Value::decode(tag, payload).ok_or(IntegrityError::CorruptValue(addr))
    }

    pub fn write_value(&mut self, addr: StackAddr, value: Value) -> IntegrityResult<()> {
        let [tag, payload] = value.encode();
        self.write_word(addr, tag)?;
        self.write_word(StackAddr(addr.0 + WORD_SIZE), payload)
    }

    /// Decode the header of the frame at `fp`
    pub fn read_header(&self, fp: StackAddr) -> IntegrityResult<FrameHeader> {
        let descriptor = self.read_word(StackAddr(fp.0 + DESCRIPTOR_OFFSET))?;
        let (tag, locals_size) = FrameHeader::split_descriptor(descriptor);
        let frame_type =
            FrameType::from_tag(tag).ok_or(IntegrityError::UnknownFrameType { tag, fp })?;
        let saved = self.read_word(StackAddr(fp.0 + SAVED_FP_OFFSET))?;
        let return_address = self.read_word(StackAddr(fp.0 + RETURN_ADDRESS_OFFSET))?;
        let token = self.read_word(StackAddr(fp.0 + TOKEN_OFFSET))?;
        Ok(FrameHeader {
            kind: FrameKind::decode(frame_type, token),
            saved_fp: (saved != 0).then_some(StackAddr(saved as usize)),
            return_address,
            locals_size,
        })
    }

    pub fn write_header(&mut self, fp: StackAddr, header: &FrameHeader) -> IntegrityResult<()> {
        self.range(fp, HEADER_SIZE)?;
        self.write_word(StackAddr(fp.0 + DESCRIPTOR_OFFSET), header.descriptor())?;
        let saved = header.saved_fp.map_or(0, |s| s.0 as u64);
        self.write_word(StackAddr(fp.0 + SAVED_FP_OFFSET), saved)?;
        self.write_word(StackAddr(fp.0 + RETURN_ADDRESS_OFFSET), header.return_address)?;
        self.write_word(StackAddr(fp.0 + TOKEN_OFFSET), header.kind.token())
    }

    /// Push a new innermost frame linked to the current one
    pub fn push_frame(
        &mut self,
        kind: FrameKind,
        return_address: CodeAddress,
        locals_size: u32,
    ) -> IntegrityResult<StackAddr> {
        let needed = HEADER_SIZE + locals_size as usize;
        let available = self.sp.saturating_sub(GUARD_SIZE);
        if needed > available {
            return Err(IntegrityError::StackOverflow { needed, available });
        }
        let fp = StackAddr(self.sp - HEADER_SIZE);
        let header = FrameHeader {
            kind,
            saved_fp: self.innermost,
            return_address,
            locals_size,
        };
        self.write_header(fp, &header)?;
        self.sp = fp.0 - locals_size as usize;
        self.innermost = Some(fp);
        tracing::trace!(%fp, kind = %kind.frame_type(), locals_size, "frame pushed");
        Ok(fp)
    }

    /// Pop the innermost frame, which must be the one at `fp`
    pub fn pop_frame(&mut self, fp: StackAddr) -> IntegrityResult<FrameHeader> {
        if self.innermost != Some(fp) {
            return Err(IntegrityError::NotInnermost(fp));
        }
        let header = self.read_header(fp)?;
        self.sp = fp.0 + HEADER_SIZE;
        self.innermost = header.saved_fp;
        if self.top == Some(fp) {
            self.top = None;
        }
        Ok(header)
    }

    /// Pop frames until the one at `fp` is innermost
    pub fn pop_to(&mut self, fp: StackAddr) -> IntegrityResult<()> {
        if !self.contains_frame(fp)? {
            return Err(IntegrityError::NoFrame(fp));
        }
        while let Some(current) = self.innermost {
            if current == fp {
                break;
            }
            self.pop_frame(current)?;
        }
        Ok(())
    }

    /// Pop frames up to and including the one at `fp`
    pub fn pop_through(&mut self, fp: StackAddr) -> IntegrityResult<()> {
        self.pop_to(fp)?;
        self.pop_frame(fp).map(|_| ())
    }

    /// Whether `fp` is on the saved-frame chain starting at the innermost frame
    pub fn contains_frame(&self, fp: StackAddr) -> IntegrityResult<bool> {
        let mut cursor = self.innermost;
        while let Some(current) = cursor {
            if current == fp {
                return Ok(true);
            }
            if current > fp {
                return Ok(false);
            }
            cursor = self.read_header(current)?.saved_fp;
        }
        Ok(false)
    }

    /// Address of the `index`th value slot in the locals of the frame at `fp`
    pub fn local_slot(&self, fp: StackAddr, index: usize) -> StackAddr {
        StackAddr(fp.0.wrapping_sub((index + 1) * VALUE_SLOT_SIZE))
    }
}
