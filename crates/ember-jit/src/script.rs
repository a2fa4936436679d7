//! Scripts and the compiled code installed for them.
//!
//! Compiled code is not generated here. The code generator hands over a
//! description of what it emitted (size, inline side table, handler ranges)
//! and receives a synthetic address range that return addresses on the
//! native stack point into.

use crate::error::{IntegrityError, IntegrityResult};
use crate::frames::InlineTable;
use std::collections::BTreeSet;

/// Bytecode offset within a script
pub type Pc = u32;

/// Address inside a compiled code range
pub type CodeAddress = u64;

/// First address handed out to compiled code
pub const CODE_BASE: CodeAddress = 0x1000_0000;

/// Gap between consecutive code ranges so a stray offset never lands in a
/// neighbour
const CODE_ALIGN: CodeAddress = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    /// Bytecode has not been produced yet
    pub lazy: bool,
    /// Cleared permanently once the script is disqualified from optimized
    /// compilation
    pub can_ion_compile: bool,
    pub use_count: u32,
    pub step_mode: bool,
    pub breakpoints: BTreeSet<Pc>,
    /// Currently installed compiled code, if any
    pub ion: Option<CodeId>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lazy: false,
            can_ion_compile: true,
            use_count: 0,
            step_mode: false,
            breakpoints: BTreeSet::new(),
            ion: None,
        }
    }

    pub fn lazy(name: impl Into<String>) -> Self {
        Self {
            lazy: true,
            ..Self::new(name)
        }
    }

    pub fn has_breakpoint_at(&self, pc: Pc) -> bool {
        self.breakpoints.contains(&pc)
    }

    pub fn inc_use_count(&mut self, amount: u32) {
        self.use_count = self.use_count.saturating_add(amount);
    }
}

/// A handler range in compiled code, as offsets from the code base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryNote {
    pub start: u32,
    pub end: u32,
    /// Offset execution resumes at when an exception lands here
    pub landing: u32,
}

impl TryNote {
    pub fn covers(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug)]
pub struct CompiledCode {
    pub id: CodeId,
    pub script: ScriptId,
    pub base: CodeAddress,
    pub size: u32,
    /// Superseded or deoptimized; frames still running it are stale
    pub invalidated: bool,
    /// Calls from this code that had to take the slow path
    pub slow_call_count: u32,
    pub inline: InlineTable,
    pub try_notes: Vec<TryNote>,
}

impl CompiledCode {
    pub fn contains(&self, address: CodeAddress) -> bool {
        address >= self.base && address < self.base + self.size as CodeAddress
    }

    /// Offset of `address` within this code
    pub fn offset_of(&self, address: CodeAddress) -> IntegrityResult<u32> {
        if !self.contains(address) {
            return Err(IntegrityError::AddressOutsideCode {
                code: self.id,
                address,
            });
        }
        Ok((address - self.base) as u32)
    }

    pub fn address_at(&self, offset: u32) -> IntegrityResult<CodeAddress> {
        if offset >= self.size {
            return Err(IntegrityError::AddressOutsideCode {
                code: self.id,
                address: self.base + offset as CodeAddress,
            });
        }
        Ok(self.base + offset as CodeAddress)
    }

    /// Innermost handler covering `offset`
    pub fn try_note_for(&self, offset: u32) -> Option<&TryNote> {
        self.try_notes
            .iter()
            .filter(|note| note.covers(offset))
            .min_by_key(|note| note.end - note.start)
    }
}

/// What the code generator emitted for one compilation
#[derive(Debug, Default)]
pub struct CodeSpec {
    pub size: u32,
    pub inline: InlineTable,
    pub try_notes: Vec<TryNote>,
}

impl CodeSpec {
    pub fn new(size: u32, inline: InlineTable) -> Self {
        Self {
            size,
            inline,
            try_notes: Vec::new(),
        }
    }

    pub fn with_try_note(mut self, note: TryNote) -> Self {
        self.try_notes.push(note);
        self
    }
}

#[derive(Debug, Default)]
pub struct ScriptTable {
    scripts: Vec<Script>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, script: Script) -> ScriptId {
        let id = ScriptId(self.scripts.len() as u32);
        self.scripts.push(script);
        id
    }

    pub fn get(&self, id: ScriptId) -> IntegrityResult<&Script> {
        self.scripts
            .get(id.0 as usize)
            .ok_or(IntegrityError::UnknownScript(id))
    }

    pub fn get_mut(&mut self, id: ScriptId) -> IntegrityResult<&mut Script> {
        self.scripts
            .get_mut(id.0 as usize)
            .ok_or(IntegrityError::UnknownScript(id))
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

#[derive(Debug)]
pub struct CodeTable {
    code: Vec<CompiledCode>,
    next_base: CodeAddress,
}

impl CodeTable {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            next_base: CODE_BASE,
        }
    }

    /// Assign an address range to freshly emitted code for `script`
    pub fn insert(&mut self, script: ScriptId, spec: CodeSpec) -> CodeId {
        let id = CodeId(self.code.len() as u32);
        let base = self.next_base;
        let span = (spec.size as CodeAddress).max(1);
        self.next_base = (base + span + CODE_ALIGN) & !(CODE_ALIGN - 1);
        self.code.push(CompiledCode {
            id,
            script,
            base,
            size: spec.size,
            invalidated: false,
            slow_call_count: 0,
            inline: spec.inline,
            try_notes: spec.try_notes,
        });
        id
    }

    pub fn get(&self, id: CodeId) -> IntegrityResult<&CompiledCode> {
        self.code
            .get(id.0 as usize)
            .ok_or(IntegrityError::UnknownCode(id))
    }

    pub fn get_mut(&mut self, id: CodeId) -> IntegrityResult<&mut CompiledCode> {
        self.code
            .get_mut(id.0 as usize)
            .ok_or(IntegrityError::UnknownCode(id))
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Install `spec` as the current compiled code of `script`, invalidating
/// whatever was installed before.
pub fn install_code(
    scripts: &mut ScriptTable,
    code: &mut CodeTable,
    script: ScriptId,
    spec: CodeSpec,
) -> IntegrityResult<CodeId> {
    let previous = scripts.get(script)?.ion;
    if let Some(old) = previous {
        code.get_mut(old)?.invalidated = true;
    }
    let id = code.insert(script, spec);
    scripts.get_mut(script)?.ion = Some(id);
    Ok(id)
}

/// Permanently disqualify `script` from optimized compilation and
/// invalidate its current compiled code.
pub fn forbid_compilation(
    scripts: &mut ScriptTable,
    code: &mut CodeTable,
    script: ScriptId,
) -> IntegrityResult<()> {
    let entry = scripts.get_mut(script)?;
    entry.can_ion_compile = false;
    if let Some(current) = entry.ion.take() {
        code.get_mut(current)?.invalidated = true;
        tracing::debug!(?script, code = ?current, "compiled code invalidated");
    }
    tracing::warn!(?script, name = %entry.name, "script disqualified from optimized compilation");
    Ok(())
}
