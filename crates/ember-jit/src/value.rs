//! Managed values as seen by compiled code and bridged routines.
//!
//! A `Value` is `Copy`; strings and objects are references into the
//! [`Heap`](crate::heap::Heap). Stack slots hold values as two little-endian
//! words: a tag and a payload.

use crate::heap::GcRef;

/// Sentinel payloads that never escape to script code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicKind {
    /// `this` has not been created yet; the callee must construct it
    IsConstructing,
}

/// A managed value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    String(GcRef),
    Object(GcRef),
    Magic(MagicKind),
}

const TAG_UNDEFINED: u64 = 0;
const TAG_NULL: u64 = 1;
const TAG_BOOLEAN: u64 = 2;
const TAG_INT32: u64 = 3;
const TAG_DOUBLE: u64 = 4;
const TAG_STRING: u64 = 5;
const TAG_OBJECT: u64 = 6;
const TAG_MAGIC: u64 = 7;

impl Value {
    /// Build a number, preferring the Int32 representation when exact
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::Int32(n as i32)
        } else {
            Value::Double(n)
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Double(_))
    }

    pub fn is_magic(&self, kind: MagicKind) -> bool {
        matches!(self, Value::Magic(k) if *k == kind)
    }

    pub fn as_object(&self) -> Option<GcRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<GcRef> {
        match self {
            Value::String(r) => Some(*r),
            _ => None,
        }
    }

    /// The heap reference carried by this value, if any
    pub fn gc_ref(&self) -> Option<GcRef> {
        match self {
            Value::String(r) | Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    /// Numeric payload for Int32 and Double values
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Encode into the (tag, payload) word pair used by stack slots
    pub fn encode(self) -> [u64; 2] {
        match self {
            Value::Undefined => [TAG_UNDEFINED, 0],
            Value::Null => [TAG_NULL, 0],
            Value::Boolean(b) => [TAG_BOOLEAN, b as u64],
            Value::Int32(i) => [TAG_INT32, i as u32 as u64],
            Value::Double(d) => [TAG_DOUBLE, d.to_bits()],
            Value::String(r) => [TAG_STRING, r.to_bits()],
            Value::Object(r) => [TAG_OBJECT, r.to_bits()],
            Value::Magic(MagicKind::IsConstructing) => [TAG_MAGIC, 0],
        }
    }

    /// Decode a (tag, payload) word pair; `None` for an unknown tag
    pub fn decode(tag: u64, payload: u64) -> Option<Self> {
        Some(match tag {
            TAG_UNDEFINED => Value::Undefined,
            TAG_NULL => Value::Null,
            TAG_BOOLEAN => Value::Boolean(payload != 0),
            TAG_INT32 => Value::Int32(payload as u32 as i32),
            TAG_DOUBLE => Value::Double(f64::from_bits(payload)),
            TAG_STRING => Value::String(GcRef::from_bits(payload)),
            TAG_OBJECT => Value::Object(GcRef::from_bits(payload)),
            TAG_MAGIC if payload == 0 => Value::Magic(MagicKind::IsConstructing),
            _ => return None,
        })
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}
