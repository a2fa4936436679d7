//! Garbage-collected heap
//!
//! A non-moving mark-sweep arena. Collection only happens when the runtime
//! asks for it at an allocation site, so a reference observed between two
//! bridge steps stays valid unless the cell became unreachable and a
//! collection ran in between. Every reference carries a generation so stale
//! uses are detected rather than aliased.

use crate::error::{IntegrityError, IntegrityResult};
use crate::script::ScriptId;
use crate::types::TypeId;
use crate::value::Value;
use std::collections::HashMap;

/// A reference to a heap cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef {
    index: u32,
    generation: u32,
}

impl GcRef {
    pub(crate) fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub(crate) fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Interned property name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

/// Built-in error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    RangeError,
    InternalError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

/// Array backing storage. Indices at or beyond `elements.len()` but below
/// `length` are holes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayStorage {
    pub elements: Vec<Value>,
    pub length: u32,
}

impl ArrayStorage {
    pub fn dense(elements: Vec<Value>) -> Self {
        let length = elements.len() as u32;
        Self { elements, length }
    }

    /// True when every index below `length` is backed by an element
    pub fn is_dense(&self) -> bool {
        self.elements.len() as u32 == self.length
    }
}

/// Object representation
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Plain,
    Array(ArrayStorage),
    Function(ScriptId),
    Call { slots: Vec<Value> },
    StringObject(GcRef),
    Error { kind: ErrorKind, message: String },
    /// Every operation on a revoked object throws a TypeError
    Revoked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsObject {
    pub type_id: TypeId,
    pub kind: ObjectKind,
    pub properties: Vec<(AtomId, Value)>,
    pub frozen: bool,
    /// Behaves like `undefined` under loose equality and `typeof`
    pub emulates_undefined: bool,
}

impl JsObject {
    pub fn new(type_id: TypeId, kind: ObjectKind) -> Self {
        Self {
            type_id,
            kind,
            properties: Vec::new(),
            frozen: false,
            emulates_undefined: false,
        }
    }

    pub fn get_own(&self, atom: AtomId) -> Option<Value> {
        self.properties
            .iter()
            .find(|(a, _)| *a == atom)
            .map(|(_, v)| *v)
    }

    pub fn remove_own(&mut self, atom: AtomId) -> Option<Value> {
        let pos = self.properties.iter().position(|(a, _)| *a == atom)?;
        Some(self.properties.remove(pos).1)
    }

    pub fn set_own(&mut self, atom: AtomId, value: Value) {
        match self.properties.iter_mut().find(|(a, _)| *a == atom) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((atom, value)),
        }
    }

    pub fn array(&self) -> Option<&ArrayStorage> {
        match &self.kind {
            ObjectKind::Array(storage) => Some(storage),
            _ => None,
        }
    }

    pub fn array_mut(&mut self) -> Option<&mut ArrayStorage> {
        match &mut self.kind {
            ObjectKind::Array(storage) => Some(storage),
            _ => None,
        }
    }

    fn trace(&self, out: &mut Vec<Value>) {
        out.extend(self.properties.iter().map(|(_, v)| *v));
        match &self.kind {
            ObjectKind::Array(storage) => out.extend(storage.elements.iter().copied()),
            ObjectKind::Call { slots } => out.extend(slots.iter().copied()),
            ObjectKind::StringObject(s) => out.push(Value::String(*s)),
            _ => {}
        }
    }
}

/// A heap cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    String(String),
    Object(JsObject),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    cell: Option<Cell>,
    marked: bool,
}

/// The managed heap
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Temporary roots registered around calls that may collect
    roots: Vec<Value>,
    /// Roots that live as long as the runtime
    permanent: Vec<Value>,
    allocations_since_gc: u32,
    threshold: u32,
    collections: u64,
}

impl Heap {
    pub fn new(threshold: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            permanent: Vec::new(),
            allocations_since_gc: 0,
            threshold: threshold.max(1),
            collections: 0,
        }
    }

    /// Allocate a cell. Never collects; see [`Heap::wants_collection`].
    pub fn alloc(&mut self, cell: Cell) -> GcRef {
        self.allocations_since_gc += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.cell = Some(cell);
            return GcRef {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            cell: Some(cell),
            marked: false,
        });
        GcRef {
            index,
            generation: 0,
        }
    }

    /// Whether the allocation budget since the last collection is spent
    pub fn wants_collection(&self) -> bool {
        self.allocations_since_gc >= self.threshold
    }

    pub fn is_live(&self, r: GcRef) -> bool {
        self.slots
            .get(r.index as usize)
            .is_some_and(|s| s.generation == r.generation && s.cell.is_some())
    }

    pub fn get(&self, r: GcRef) -> IntegrityResult<&Cell> {
        self.slots
            .get(r.index as usize)
            .filter(|s| s.generation == r.generation)
            .and_then(|s| s.cell.as_ref())
            .ok_or(IntegrityError::DeadReference(r))
    }

    pub fn get_mut(&mut self, r: GcRef) -> IntegrityResult<&mut Cell> {
        self.slots
            .get_mut(r.index as usize)
            .filter(|s| s.generation == r.generation)
            .and_then(|s| s.cell.as_mut())
            .ok_or(IntegrityError::DeadReference(r))
    }

    pub fn object(&self, r: GcRef) -> IntegrityResult<&JsObject> {
        match self.get(r)? {
            Cell::Object(obj) => Ok(obj),
            Cell::String(_) => Err(IntegrityError::WrongCellKind(r)),
        }
    }

    pub fn object_mut(&mut self, r: GcRef) -> IntegrityResult<&mut JsObject> {
        match self.get_mut(r)? {
            Cell::Object(obj) => Ok(obj),
            Cell::String(_) => Err(IntegrityError::WrongCellKind(r)),
        }
    }

    pub fn string(&self, r: GcRef) -> IntegrityResult<&str> {
        match self.get(r)? {
            Cell::String(s) => Ok(s),
            Cell::Object(_) => Err(IntegrityError::WrongCellKind(r)),
        }
    }

    /// Current height of the temporary root stack
    pub fn root_mark(&self) -> usize {
        self.roots.len()
    }

    pub fn push_root(&mut self, value: Value) {
        self.roots.push(value);
    }

    /// Drop temporary roots registered after `mark`
    pub fn truncate_roots(&mut self, mark: usize) {
        self.roots.truncate(mark);
    }

    pub fn add_permanent_root(&mut self, value: Value) {
        self.permanent.push(value);
    }

    /// Mark from the registered roots plus `extra`, then sweep.
    /// Returns the number of cells freed.
    pub fn collect(&mut self, extra: &[Value]) -> usize {
        let mut worklist: Vec<Value> = Vec::with_capacity(self.roots.len() + extra.len());
        worklist.extend(self.roots.iter().copied());
        worklist.extend(self.permanent.iter().copied());
        worklist.extend(extra.iter().copied());

        while let Some(value) = worklist.pop() {
            let Some(r) = value.gc_ref() else { continue };
            let Some(slot) = self.slots.get_mut(r.index as usize) else {
                continue;
            };
            if slot.generation != r.generation || slot.marked {
                continue;
            }
            slot.marked = true;
            if let Some(Cell::Object(obj)) = &slot.cell {
                obj.trace(&mut worklist);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked {
                slot.marked = false;
            } else if slot.cell.take().is_some() {
                self.free.push(index as u32);
                freed += 1;
            }
        }

        self.allocations_since_gc = 0;
        self.collections += 1;
        tracing::debug!(freed, live = self.live_cells(), "heap collected");
        freed
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn live_cells(&self) -> usize {
        self.slots.iter().filter(|s| s.cell.is_some()).count()
    }
}

/// Interned property names
#[derive(Debug, Default)]
pub struct AtomTable {
    names: Vec<String>,
    index: HashMap<String, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> AtomId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = AtomId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<AtomId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: AtomId) -> Option<&str> {
        self.names.get(id.0 as usize).map(|s| s.as_str())
    }
}
