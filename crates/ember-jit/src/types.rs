//! Object layout descriptors and type monitoring.
//!
//! `TypeTable` assigns every object a layout descriptor ("type"). Templates
//! share a type; objects created without a known template get a fresh
//! singleton type, and such results must be reported to the [`TypeMonitor`].
//!
//! The monitor keeps, per (script, pc) site, the set of result types that
//! compiled code has observed. Monitoring is a set union: reporting a type
//! already in the set changes nothing.

use crate::error::IntegrityResult;
use crate::heap::{Cell, Heap, ObjectKind};
use crate::script::{Pc, ScriptId};
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};

/// Layout descriptor id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Broad object class a type describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Plain,
    Array,
    Function,
    Call,
    StringObject,
    Error,
}

impl TypeClass {
    pub fn of(kind: &ObjectKind) -> Self {
        match kind {
            ObjectKind::Plain | ObjectKind::Revoked => TypeClass::Plain,
            ObjectKind::Array(_) => TypeClass::Array,
            ObjectKind::Function(_) => TypeClass::Function,
            ObjectKind::Call { .. } => TypeClass::Call,
            ObjectKind::StringObject(_) => TypeClass::StringObject,
            ObjectKind::Error { .. } => TypeClass::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeObject {
    pub id: TypeId,
    pub class: TypeClass,
    /// Describes exactly one object
    pub singleton: bool,
}

/// All layout descriptors known to a runtime
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<TypeObject>,
    defaults: HashMap<TypeClass, TypeId>,
}

impl TypeTable {
    /// Create a table with one shared default type per class
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            defaults: HashMap::new(),
        };
        for class in [
            TypeClass::Plain,
            TypeClass::Array,
            TypeClass::Function,
            TypeClass::Call,
            TypeClass::StringObject,
            TypeClass::Error,
        ] {
            let id = table.new_type(class, false);
            table.defaults.insert(class, id);
        }
        table
    }

    pub fn new_type(&mut self, class: TypeClass, singleton: bool) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeObject {
            id,
            class,
            singleton,
        });
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeObject> {
        self.types.get(id.0 as usize)
    }

    pub fn is_singleton(&self, id: TypeId) -> bool {
        self.get(id).is_some_and(|t| t.singleton)
    }

    /// Shared type used for objects of `class` created without a template
    pub fn default_type(&self, class: TypeClass) -> TypeId {
        self.defaults[&class]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The observable type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Undefined,
    Null,
    Boolean,
    Int32,
    Double,
    String,
    Magic,
    Object(TypeId),
}

impl TypeTag {
    pub fn of(value: &Value, heap: &Heap) -> IntegrityResult<Self> {
        Ok(match value {
            Value::Undefined => TypeTag::Undefined,
            Value::Null => TypeTag::Null,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Int32(_) => TypeTag::Int32,
            Value::Double(_) => TypeTag::Double,
            Value::String(_) => TypeTag::String,
            Value::Magic(_) => TypeTag::Magic,
            Value::Object(r) => match heap.get(*r)? {
                Cell::Object(obj) => TypeTag::Object(obj.type_id),
                Cell::String(_) => TypeTag::String,
            },
        })
    }
}

/// A set of observed types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet {
    tags: BTreeSet<TypeTag>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type; returns whether the set changed
    pub fn insert(&mut self, tag: TypeTag) -> bool {
        self.tags.insert(tag)
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeTag> {
        self.tags.iter()
    }
}

/// A bytecode location whose result types are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorSite {
    pub script: ScriptId,
    pub pc: Pc,
}

impl MonitorSite {
    pub fn new(script: ScriptId, pc: Pc) -> Self {
        Self { script, pc }
    }
}

/// Observed result types per site
#[derive(Debug, Default)]
pub struct TypeMonitor {
    sites: HashMap<MonitorSite, TypeSet>,
    monitor_calls: u64,
}

impl TypeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether compiled code at `site` is already guarded for `tag`.
    ///
    /// A type counts as proven once it is in the site's observed set; the
    /// compiler emits barriers for exactly that set.
    pub fn is_proven(&self, site: MonitorSite, tag: TypeTag) -> bool {
        self.sites.get(&site).is_some_and(|set| set.contains(tag))
    }

    /// Report a result type for `site`; returns whether the set grew
    pub fn monitor(&mut self, site: MonitorSite, tag: TypeTag) -> bool {
        self.monitor_calls += 1;
        let changed = self.sites.entry(site).or_default().insert(tag);
        if changed {
            tracing::trace!(?site, ?tag, "type set widened");
        }
        changed
    }

    pub fn observed(&self, site: MonitorSite) -> Option<&TypeSet> {
        self.sites.get(&site)
    }

    /// Number of times any routine reported a result
    pub fn monitor_calls(&self) -> u64 {
        self.monitor_calls
    }
}
