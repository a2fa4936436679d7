//! Inline frame reconstruction.
//!
//! When the compiler inlines calls, one physical JS frame stands for a chain
//! of logical frames. For every safepoint (return-address offset) the
//! compiler records that chain, outermost first, as a run of LEB128 words:
//!
//! ```text
//! count, (script, pc) * count
//! ```
//!
//! The reconstructor replays it newest-first.

use super::walker::FrameWalker;
use crate::error::{IntegrityError, IntegrityResult};
use crate::script::{CodeId, CodeTable, Pc, ScriptId};

/// Per-safepoint inline chains for one compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineTable {
    /// (safepoint offset, byte position) sorted by offset
    index: Vec<(u32, u32)>,
    bytes: Vec<u8>,
}

impl InlineTable {
    fn entry(&self, offset: u32) -> Option<usize> {
        self.index
            .binary_search_by_key(&offset, |(o, _)| *o)
            .ok()
            .map(|i| self.index[i].1 as usize)
    }

    pub fn safepoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.index.iter().map(|(o, _)| *o)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct InlineTableBuilder {
    entries: Vec<(u32, Vec<(ScriptId, Pc)>)>,
}

impl InlineTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the chain at `offset`, outermost frame first
    pub fn record(mut self, offset: u32, chain: &[(ScriptId, Pc)]) -> Self {
        self.entries.retain(|(o, _)| *o != offset);
        self.entries.push((offset, chain.to_vec()));
        self
    }

    pub fn build(mut self) -> InlineTable {
        self.entries.sort_by_key(|(o, _)| *o);
        let mut table = InlineTable::default();
        for (offset, chain) in self.entries {
            table.index.push((offset, table.bytes.len() as u32));
            write_varint(&mut table.bytes, chain.len() as u32);
            for (script, pc) in chain {
                write_varint(&mut table.bytes, script.0);
                write_varint(&mut table.bytes, pc);
            }
        }
        table
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        value |= ((byte & 0x7f) as u32).checked_shl(shift)?;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct Located<'a> {
    table: &'a InlineTable,
    code: CodeId,
    /// Byte position just past the frame count
    frames_at: usize,
}

impl Located<'_> {
    fn decode(&self, index: u32) -> IntegrityResult<(ScriptId, Pc)> {
        let corrupt = IntegrityError::CorruptInlineTable(self.code);
        let mut pos = self.frames_at;
        for _ in 0..(index as usize * 2) {
            read_varint(&self.table.bytes, &mut pos).ok_or(corrupt.clone())?;
        }
        let script = read_varint(&self.table.bytes, &mut pos).ok_or(corrupt.clone())?;
        let pc = read_varint(&self.table.bytes, &mut pos).ok_or(corrupt)?;
        Ok((ScriptId(script), pc))
    }
}

/// Logical frames of one physical JS frame, newest first
#[derive(Debug, Clone)]
pub struct InlineFrameWalker<'a> {
    located: Option<Located<'a>>,
    frame_count: u32,
    remaining: u32,
    current: Option<(ScriptId, Pc)>,
}

impl<'a> InlineFrameWalker<'a> {
    /// Walk the logical frames of `frame`. `None` yields a walker with no
    /// frames whose accessors fail.
    pub fn new(frame: Option<&FrameWalker<'_>>, code: &'a CodeTable) -> IntegrityResult<Self> {
        let Some(frame) = frame else {
            return Ok(Self {
                located: None,
                frame_count: 0,
                remaining: 0,
                current: None,
            });
        };

        let (id, offset) = frame.safepoint_offset(code)?;
        let table = &code.get(id)?.inline;
        let start = table
            .entry(offset)
            .ok_or(IntegrityError::MissingSafepoint { code: id, offset })?;
        let mut pos = start;
        let frame_count = read_varint(&table.bytes, &mut pos)
            .filter(|count| *count > 0)
            .ok_or(IntegrityError::CorruptInlineTable(id))?;

        let located = Located {
            table,
            code: id,
            frames_at: pos,
        };
        let remaining = frame_count - 1;
        let current = located.decode(remaining)?;
        Ok(Self {
            located: Some(located),
            frame_count,
            remaining,
            current: Some(current),
        })
    }

    /// Script and pc of the logical frame that owns `frame`
    pub fn outermost(frame: &FrameWalker<'_>, code: &'a CodeTable) -> IntegrityResult<(ScriptId, Pc)> {
        let mut inline = Self::new(Some(frame), code)?;
        while inline.has_more() {
            inline.advance()?;
        }
        Ok((inline.script()?, inline.pc()?))
    }

    pub fn script(&self) -> IntegrityResult<ScriptId> {
        self.current
            .map(|(script, _)| script)
            .ok_or(IntegrityError::NoPhysicalFrame)
    }

    pub fn pc(&self) -> IntegrityResult<Pc> {
        self.current
            .map(|(_, pc)| pc)
            .ok_or(IntegrityError::NoPhysicalFrame)
    }

    /// Ordinal of the current frame; the outermost frame is 0
    pub fn depth(&self) -> IntegrityResult<u32> {
        self.located
            .map(|_| self.remaining)
            .ok_or(IntegrityError::NoPhysicalFrame)
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn has_more(&self) -> bool {
        self.remaining > 0
    }

    /// Move to the next-older logical frame
    pub fn advance(&mut self) -> IntegrityResult<()> {
        let located = self.located.ok_or(IntegrityError::NoPhysicalFrame)?;
        if self.remaining == 0 {
            return Err(IntegrityError::InlineUnderflow);
        }
        self.remaining -= 1;
        self.current = Some(located.decode(self.remaining)?);
        Ok(())
    }
}
