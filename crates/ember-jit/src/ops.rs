//! Canonical operation semantics.
//!
//! These are the slow paths bridged routines fall back to: conversions,
//! equality, relational comparison, property access and the general array
//! operations. Errors are reported by setting the context's pending
//! exception and returning [`RoutineError::Thrown`].
//!
//! Nothing here allocates more than once per call, so intermediate values
//! never need rooting.

use crate::error::{RoutineError, RoutineResult};
use crate::heap::{ArrayStorage, AtomId, ErrorKind, GcRef, ObjectKind};
use crate::runtime::ExecutionContext;
use crate::value::{MagicKind, Value};
use std::cmp::Ordering;

/// Largest valid array length
pub const MAX_ARRAY_LENGTH: u32 = u32::MAX;

/// Longest string a conversion may produce, in bytes
pub const MAX_STRING_LENGTH: usize = (1 << 28) - 1;

/// A resolved property key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKey {
    Index(u32),
    Atom(AtomId),
}

/// A primitive that has not been materialized on the heap
enum Primitive {
    String(String),
    Other(Value),
}

fn revoked(cx: &mut ExecutionContext<'_>) -> RoutineError {
    cx.throw_error(
        ErrorKind::TypeError,
        "illegal operation attempted on a revoked object",
    )
}

fn magic_escaped(cx: &mut ExecutionContext<'_>) -> RoutineError {
    cx.throw_error(ErrorKind::InternalError, "internal sentinel value escaped")
}

pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Canonical array index for a property name, if it is one
fn parse_index(name: &str) -> Option<u32> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    name.parse::<u32>().ok().filter(|i| *i < MAX_ARRAY_LENGTH)
}

/// Indexed elements of `r` below `length`, in index order. Only backed
/// elements and index-named properties are visited, never the holes.
fn indexed_entries(
    cx: &ExecutionContext<'_>,
    r: GcRef,
    length: u32,
) -> RoutineResult<Vec<(u32, Value)>> {
    let obj = cx.heap().object(r)?;
    let mut entries: Vec<(u32, Value)> = match obj.array() {
        Some(storage) => storage
            .elements
            .iter()
            .take(length as usize)
            .enumerate()
            .map(|(i, v)| (i as u32, *v))
            .collect(),
        None => Vec::new(),
    };
    let dense_len = entries.len() as u32;
    entries.extend(obj.properties.iter().filter_map(|(atom, v)| {
        let index = parse_index(cx.atoms.name(*atom)?)?;
        (index >= dense_len && index < length).then_some((index, *v))
    }));
    entries.sort_by_key(|(i, _)| *i);
    Ok(entries)
}

fn string_too_long(cx: &mut ExecutionContext<'_>) -> RoutineError {
    cx.throw_error(ErrorKind::InternalError, "allocation size overflow")
}

/// `Array.prototype.join(",")` with `seen` holding the arrays being joined
fn join_array(
    cx: &mut ExecutionContext<'_>,
    r: GcRef,
    length: u32,
    seen: &mut Vec<GcRef>,
) -> RoutineResult<String> {
    // Cyclic arrays join as the empty string.
    if length == 0 || seen.contains(&r) {
        return Ok(String::new());
    }
    let separators = length - 1;
    if separators as usize > MAX_STRING_LENGTH {
        return Err(string_too_long(cx));
    }
    let entries = indexed_entries(cx, r, length)?;

    seen.push(r);
    let mut out = String::new();
    let mut written = 0u32;
    for (index, element) in entries {
        let part = match element {
            Value::Undefined | Value::Null => continue,
            other => to_string_in(cx, other, seen),
        };
        let part = match part {
            Ok(part) => part,
            Err(err) => {
                seen.pop();
                return Err(err);
            }
        };
        let commas = (index - written) as usize;
        if out.len() + commas + part.len() + (separators - index) as usize > MAX_STRING_LENGTH {
            seen.pop();
            return Err(string_too_long(cx));
        }
        out.extend(std::iter::repeat(',').take(commas));
        out.push_str(&part);
        written = index;
    }
    seen.pop();
    out.extend(std::iter::repeat(',').take((separators - written) as usize));
    Ok(out)
}

fn object_to_string(cx: &mut ExecutionContext<'_>, r: GcRef) -> RoutineResult<String> {
    object_to_string_in(cx, r, &mut Vec::new())
}

fn object_to_string_in(
    cx: &mut ExecutionContext<'_>,
    r: GcRef,
    seen: &mut Vec<GcRef>,
) -> RoutineResult<String> {
    let kind = cx.heap().object(r)?.kind.clone();
    match kind {
        ObjectKind::Revoked => Err(revoked(cx)),
        ObjectKind::StringObject(s) => Ok(cx.heap().string(s)?.to_string()),
        ObjectKind::Array(storage) => join_array(cx, r, storage.length, seen),
        ObjectKind::Function(script) => {
            let name = cx.scripts().get(script)?.name.clone();
            Ok(format!("function {}() {{ [compiled code] }}", name))
        }
        ObjectKind::Error { kind, message } if message.is_empty() => Ok(kind.name().to_string()),
        ObjectKind::Error { kind, message } => Ok(format!("{}: {}", kind.name(), message)),
        ObjectKind::Plain | ObjectKind::Call { .. } => Ok("[object Object]".to_string()),
    }
}

fn to_primitive_inner(cx: &mut ExecutionContext<'_>, v: Value) -> RoutineResult<Primitive> {
    match v {
        Value::Object(r) => Ok(Primitive::String(object_to_string(cx, r)?)),
        Value::String(r) => Ok(Primitive::String(cx.heap().string(r)?.to_string())),
        Value::Magic(_) => Err(magic_escaped(cx)),
        other => Ok(Primitive::Other(other)),
    }
}

/// Convert objects to primitives, allocating the resulting string
pub fn to_primitive(cx: &mut ExecutionContext<'_>, v: Value) -> RoutineResult<Value> {
    match v {
        Value::Object(r) => {
            let s = object_to_string(cx, r)?;
            Ok(Value::String(cx.alloc_string(s)))
        }
        Value::Magic(_) => Err(magic_escaped(cx)),
        other => Ok(other),
    }
}

pub fn to_string(cx: &mut ExecutionContext<'_>, v: Value) -> RoutineResult<String> {
    to_string_in(cx, v, &mut Vec::new())
}

fn to_string_in(
    cx: &mut ExecutionContext<'_>,
    v: Value,
    seen: &mut Vec<GcRef>,
) -> RoutineResult<String> {
    match v {
        Value::Undefined => Ok("undefined".to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Int32(i) => Ok(i.to_string()),
        Value::Double(d) => Ok(number_to_string(d)),
        Value::String(r) => Ok(cx.heap().string(r)?.to_string()),
        Value::Object(r) => object_to_string_in(cx, r, seen),
        Value::Magic(_) => Err(magic_escaped(cx)),
    }
}

pub fn to_number(cx: &mut ExecutionContext<'_>, v: Value) -> RoutineResult<f64> {
    match to_primitive_inner(cx, v)? {
        Primitive::String(s) => Ok(string_to_number(&s)),
        Primitive::Other(p) => Ok(match p {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => b as u8 as f64,
            Value::Int32(i) => i as f64,
            Value::Double(d) => d,
            _ => f64::NAN,
        }),
    }
}

fn emulates_undefined(cx: &ExecutionContext<'_>, r: GcRef) -> RoutineResult<bool> {
    Ok(cx.heap().object(r)?.emulates_undefined)
}

/// Abstract (loose) equality
pub fn loose_equals(cx: &mut ExecutionContext<'_>, a: Value, b: Value) -> RoutineResult<bool> {
    use Value::*;
    match (a, b) {
        (Undefined | Null, Undefined | Null) => Ok(true),
        (Undefined | Null, Object(r)) | (Object(r), Undefined | Null) => emulates_undefined(cx, r),
        (Undefined | Null, _) | (_, Undefined | Null) => Ok(false),
        (Magic(_), _) | (_, Magic(_)) => Err(magic_escaped(cx)),
        (Object(x), Object(y)) => Ok(x == y),
        (Boolean(x), _) => loose_equals(cx, Int32(x as i32), b),
        (_, Boolean(y)) => loose_equals(cx, a, Int32(y as i32)),
        (String(x), String(y)) => Ok(cx.heap().string(x)? == cx.heap().string(y)?),
        (Object(_), _) | (_, Object(_)) => {
            let pa = to_primitive_inner(cx, a)?;
            let pb = to_primitive_inner(cx, b)?;
            Ok(match (pa, pb) {
                (Primitive::String(x), Primitive::String(y)) => x == y,
                (Primitive::String(s), Primitive::Other(n))
                | (Primitive::Other(n), Primitive::String(s)) => {
                    n.as_number() == Some(string_to_number(&s))
                }
                (Primitive::Other(x), Primitive::Other(y)) => x.as_number() == y.as_number(),
            })
        }
        (String(s), n) | (n, String(s)) => {
            let parsed = string_to_number(cx.heap().string(s)?);
            Ok(n.as_number() == Some(parsed))
        }
        _ => Ok(a.as_number() == b.as_number()),
    }
}

/// Strict equality
pub fn strict_equals(cx: &mut ExecutionContext<'_>, a: Value, b: Value) -> RoutineResult<bool> {
    use Value::*;
    Ok(match (a, b) {
        (Int32(_) | Double(_), Int32(_) | Double(_)) => a.as_number() == b.as_number(),
        (String(x), String(y)) => x == y || cx.heap().string(x)? == cx.heap().string(y)?,
        (Object(x), Object(y)) => x == y,
        (Boolean(x), Boolean(y)) => x == y,
        (Undefined, Undefined) | (Null, Null) => true,
        (Magic(_), _) | (_, Magic(_)) => return Err(magic_escaped(cx)),
        _ => false,
    })
}

/// Abstract relational comparison; `None` when either side is NaN
pub fn compare(cx: &mut ExecutionContext<'_>, a: Value, b: Value) -> RoutineResult<Option<Ordering>> {
    let pa = to_primitive_inner(cx, a)?;
    let pb = to_primitive_inner(cx, b)?;
    let (x, y) = match (pa, pb) {
        (Primitive::String(x), Primitive::String(y)) => {
            return Ok(Some(x.encode_utf16().cmp(y.encode_utf16())));
        }
        (pa, pb) => (primitive_number(pa), primitive_number(pb)),
    };
    Ok(x.partial_cmp(&y))
}

fn primitive_number(p: Primitive) -> f64 {
    match p {
        Primitive::String(s) => string_to_number(&s),
        Primitive::Other(Value::Null) => 0.0,
        Primitive::Other(Value::Boolean(b)) => b as u8 as f64,
        Primitive::Other(v) => v.as_number().unwrap_or(f64::NAN),
    }
}

pub fn less_than(cx: &mut ExecutionContext<'_>, a: Value, b: Value) -> RoutineResult<bool> {
    Ok(compare(cx, a, b)? == Some(Ordering::Less))
}

pub fn less_than_or_equal(cx: &mut ExecutionContext<'_>, a: Value, b: Value) -> RoutineResult<bool> {
    Ok(matches!(
        compare(cx, a, b)?,
        Some(Ordering::Less | Ordering::Equal)
    ))
}

pub fn greater_than(cx: &mut ExecutionContext<'_>, a: Value, b: Value) -> RoutineResult<bool> {
    Ok(compare(cx, a, b)? == Some(Ordering::Greater))
}

pub fn greater_than_or_equal(
    cx: &mut ExecutionContext<'_>,
    a: Value,
    b: Value,
) -> RoutineResult<bool> {
    Ok(matches!(
        compare(cx, a, b)?,
        Some(Ordering::Greater | Ordering::Equal)
    ))
}

/// Resolve a property key from a property name
pub fn key_from_name(cx: &mut ExecutionContext<'_>, name: &str) -> PropertyKey {
    match parse_index(name) {
        Some(i) => PropertyKey::Index(i),
        None => PropertyKey::Atom(cx.intern(name)),
    }
}

/// Resolve a property key from an arbitrary value
pub fn key_from_value(cx: &mut ExecutionContext<'_>, v: Value) -> RoutineResult<PropertyKey> {
    match v {
        Value::Int32(i) if i >= 0 => Ok(PropertyKey::Index(i as u32)),
        Value::Double(d) if d >= 0.0 && d.fract() == 0.0 && d < MAX_ARRAY_LENGTH as f64 => {
            Ok(PropertyKey::Index(d as u32))
        }
        other => {
            let name = to_string(cx, other)?;
            Ok(key_from_name(cx, &name))
        }
    }
}

fn sparse_element(cx: &ExecutionContext<'_>, r: GcRef, index: u32) -> RoutineResult<Value> {
    let Some(atom) = cx.atoms.lookup(&index.to_string()) else {
        return Ok(Value::Undefined);
    };
    Ok(cx
        .heap()
        .object(r)?
        .get_own(atom)
        .unwrap_or(Value::Undefined))
}

fn string_unit(s: &str, index: u32) -> Option<u16> {
    s.encode_utf16().nth(index as usize)
}

fn string_property(
    cx: &mut ExecutionContext<'_>,
    s: GcRef,
    key: PropertyKey,
) -> RoutineResult<Option<Value>> {
    let length_atom = cx.intern("length");
    let text = cx.heap().string(s)?;
    match key {
        PropertyKey::Index(i) => match string_unit(text, i) {
            Some(unit) => {
                let ch = String::from_utf16_lossy(&[unit]);
                Ok(Some(Value::String(cx.alloc_string(ch))))
            }
            None => Ok(None),
        },
        PropertyKey::Atom(a) if a == length_atom => {
            Ok(Some(Value::number(text.encode_utf16().count() as f64)))
        }
        PropertyKey::Atom(_) => Ok(None),
    }
}

fn get_object_property(
    cx: &mut ExecutionContext<'_>,
    r: GcRef,
    key: PropertyKey,
) -> RoutineResult<Value> {
    let length_atom = cx.intern("length");
    let obj = cx.heap().object(r)?;
    match (&obj.kind, key) {
        (ObjectKind::Revoked, _) => Err(revoked(cx)),
        (ObjectKind::Array(storage), PropertyKey::Index(i)) => {
            match storage.elements.get(i as usize) {
                Some(v) => Ok(*v),
                None => sparse_element(cx, r, i),
            }
        }
        (ObjectKind::Array(storage), PropertyKey::Atom(a)) if a == length_atom => {
            Ok(Value::number(storage.length as f64))
        }
        (ObjectKind::StringObject(s), _) => {
            let s = *s;
            match string_property(cx, s, key)? {
                Some(v) => Ok(v),
                None => own_property(cx, r, key),
            }
        }
        _ => own_property(cx, r, key),
    }
}

fn own_property(cx: &ExecutionContext<'_>, r: GcRef, key: PropertyKey) -> RoutineResult<Value> {
    match key {
        PropertyKey::Index(i) => sparse_element(cx, r, i),
        PropertyKey::Atom(a) => Ok(cx
            .heap()
            .object(r)?
            .get_own(a)
            .unwrap_or(Value::Undefined)),
    }
}

/// `target[key]`
pub fn get_property(
    cx: &mut ExecutionContext<'_>,
    target: Value,
    key: PropertyKey,
) -> RoutineResult<Value> {
    match target {
        Value::Undefined | Value::Null => {
            let what = to_string(cx, target)?;
            Err(cx.throw_error(
                ErrorKind::TypeError,
                format!("cannot read properties of {}", what),
            ))
        }
        Value::String(s) => Ok(string_property(cx, s, key)?.unwrap_or(Value::Undefined)),
        Value::Object(r) => get_object_property(cx, r, key),
        Value::Magic(_) => Err(magic_escaped(cx)),
        _ => Ok(Value::Undefined),
    }
}

fn atom_for_index(cx: &mut ExecutionContext<'_>, index: u32) -> AtomId {
    cx.intern(&index.to_string())
}

fn set_array_length(
    cx: &mut ExecutionContext<'_>,
    r: GcRef,
    value: Value,
) -> RoutineResult<()> {
    let n = to_number(cx, value)?;
    if n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
        return Err(cx.throw_error(ErrorKind::RangeError, "invalid array length"));
    }
    let new_len = n as u32;
    let sparse_atoms: Vec<AtomId> = {
        let obj = cx.heap().object(r)?;
        obj.properties
            .iter()
            .filter_map(|(atom, _)| {
                let name = cx.atoms.name(*atom)?;
                parse_index(name).filter(|i| *i >= new_len).map(|_| *atom)
            })
            .collect()
    };
    let obj = cx.heap_mut().object_mut(r)?;
    for atom in sparse_atoms {
        obj.remove_own(atom);
    }
    if let Some(storage) = obj.array_mut() {
        storage.elements.truncate(new_len as usize);
        storage.length = new_len;
    }
    Ok(())
}

fn set_array_element(
    cx: &mut ExecutionContext<'_>,
    r: GcRef,
    index: u32,
    value: Value,
) -> RoutineResult<()> {
    let dense_len = match cx.heap().object(r)?.array() {
        Some(storage) => storage.elements.len(),
        None => return Ok(()),
    };
    let sparse_atom = if (index as usize) > dense_len {
        Some(atom_for_index(cx, index))
    } else {
        None
    };
    let obj = cx.heap_mut().object_mut(r)?;
    match sparse_atom {
        Some(atom) => obj.set_own(atom, value),
        None => {
            if let Some(storage) = obj.array_mut() {
                if (index as usize) < storage.elements.len() {
                    storage.elements[index as usize] = value;
                } else {
                    storage.elements.push(value);
                }
            }
        }
    }
    if let Some(storage) = obj.array_mut() {
        storage.length = storage.length.max(index.saturating_add(1));
    }
    Ok(())
}

/// `target[key] = value`
pub fn set_property(
    cx: &mut ExecutionContext<'_>,
    target: Value,
    key: PropertyKey,
    value: Value,
    strict: bool,
) -> RoutineResult<()> {
    let r = match target {
        Value::Undefined | Value::Null => {
            let what = to_string(cx, target)?;
            return Err(cx.throw_error(
                ErrorKind::TypeError,
                format!("cannot set properties of {}", what),
            ));
        }
        Value::Magic(_) => return Err(magic_escaped(cx)),
        Value::Object(r) => r,
        _ => return Ok(()),
    };

    let length_atom = cx.intern("length");
    let (is_array, frozen, is_revoked) = {
        let obj = cx.heap().object(r)?;
        (
            obj.array().is_some(),
            obj.frozen,
            matches!(obj.kind, ObjectKind::Revoked),
        )
    };
    if is_revoked {
        return Err(revoked(cx));
    }
    if frozen {
        if strict {
            return Err(cx.throw_error(ErrorKind::TypeError, "object is not extensible"));
        }
        return Ok(());
    }

    match key {
        PropertyKey::Index(i) if is_array => set_array_element(cx, r, i, value),
        PropertyKey::Atom(a) if is_array && a == length_atom => set_array_length(cx, r, value),
        PropertyKey::Index(i) => {
            let atom = atom_for_index(cx, i);
            cx.heap_mut().object_mut(r)?.set_own(atom, value);
            Ok(())
        }
        PropertyKey::Atom(a) => {
            cx.heap_mut().object_mut(r)?.set_own(a, value);
            Ok(())
        }
    }
}

/// Define an own data property, as object literals do
pub fn define_property(
    cx: &mut ExecutionContext<'_>,
    r: GcRef,
    key: PropertyKey,
    value: Value,
) -> RoutineResult<()> {
    let (is_array, is_revoked) = {
        let obj = cx.heap().object(r)?;
        (obj.array().is_some(), matches!(obj.kind, ObjectKind::Revoked))
    };
    if is_revoked {
        return Err(revoked(cx));
    }
    match key {
        PropertyKey::Index(i) if is_array => set_array_element(cx, r, i, value),
        PropertyKey::Index(i) => {
            let atom = atom_for_index(cx, i);
            cx.heap_mut().object_mut(r)?.set_own(atom, value);
            Ok(())
        }
        PropertyKey::Atom(a) => {
            cx.heap_mut().object_mut(r)?.set_own(a, value);
            Ok(())
        }
    }
}

/// `key in target`
pub fn has_property(cx: &mut ExecutionContext<'_>, key: Value, target: Value) -> RoutineResult<bool> {
    let Value::Object(r) = target else {
        return Err(cx.throw_error(ErrorKind::TypeError, "invalid 'in' operand"));
    };
    let key = key_from_value(cx, key)?;
    let length_atom = cx.intern("length");
    let index_atom = match key {
        PropertyKey::Index(i) => cx.atoms.lookup(&i.to_string()),
        PropertyKey::Atom(a) => Some(a),
    };
    if matches!(cx.heap().object(r)?.kind, ObjectKind::Revoked) {
        return Err(revoked(cx));
    }
    let obj = cx.heap().object(r)?;
    let found = match (&obj.kind, key) {
        (ObjectKind::Array(storage), PropertyKey::Index(i)) if (i as usize) < storage.elements.len() => {
            true
        }
        (ObjectKind::Array(_), PropertyKey::Atom(a)) if a == length_atom => true,
        (ObjectKind::StringObject(s), key) => {
            let len = cx.heap().string(*s)?.encode_utf16().count() as u32;
            match key {
                PropertyKey::Index(i) => i < len,
                PropertyKey::Atom(a) => a == length_atom,
            }
        }
        _ => false,
    };
    if found {
        return Ok(true);
    }
    let obj = cx.heap().object(r)?;
    Ok(index_atom.is_some_and(|a| obj.get_own(a).is_some()))
}

fn array_length(cx: &mut ExecutionContext<'_>, r: GcRef) -> RoutineResult<u32> {
    let length_atom = cx.intern("length");
    let length = get_property(cx, Value::Object(r), PropertyKey::Atom(length_atom))?;
    let n = to_number(cx, length)?;
    Ok(if n.is_nan() || n <= 0.0 {
        0
    } else {
        n.min(MAX_ARRAY_LENGTH as f64) as u32
    })
}

/// General `Array.prototype.push` with one argument; returns the new length
pub fn array_push(cx: &mut ExecutionContext<'_>, r: GcRef, value: Value) -> RoutineResult<u32> {
    let length = array_length(cx, r)?;
    if length == MAX_ARRAY_LENGTH {
        return Err(cx.throw_error(ErrorKind::TypeError, "array length overflow"));
    }
    set_property(cx, Value::Object(r), PropertyKey::Index(length), value, true)?;
    if cx.heap().object(r)?.array().is_none() {
        let length_atom = cx.intern("length");
        set_property(
            cx,
            Value::Object(r),
            PropertyKey::Atom(length_atom),
            Value::number(length as f64 + 1.0),
            true,
        )?;
    }
    Ok(length + 1)
}

/// General `Array.prototype.pop`
pub fn array_pop(cx: &mut ExecutionContext<'_>, r: GcRef) -> RoutineResult<Value> {
    let length = array_length(cx, r)?;
    let length_atom = cx.intern("length");
    if length == 0 {
        set_property(cx, Value::Object(r), PropertyKey::Atom(length_atom), Value::Int32(0), true)?;
        return Ok(Value::Undefined);
    }
    let last = length - 1;
    let value = get_property(cx, Value::Object(r), PropertyKey::Index(last))?;
    set_property(
        cx,
        Value::Object(r),
        PropertyKey::Atom(length_atom),
        Value::number(last as f64),
        true,
    )?;
    Ok(value)
}

/// Remove every indexed element of `r` below `length`
fn clear_indexed(cx: &mut ExecutionContext<'_>, r: GcRef, length: u32) -> RoutineResult<()> {
    let index_atoms: Vec<AtomId> = {
        let obj = cx.heap().object(r)?;
        obj.properties
            .iter()
            .filter_map(|(atom, _)| {
                let index = parse_index(cx.atoms.name(*atom)?)?;
                (index < length).then_some(*atom)
            })
            .collect()
    };
    let obj = cx.heap_mut().object_mut(r)?;
    for atom in index_atoms {
        obj.remove_own(atom);
    }
    if let Some(storage) = obj.array_mut() {
        storage.elements.truncate(0);
    }
    Ok(())
}

/// General `Array.prototype.shift`. Holes move down one index and stay
/// holes.
pub fn array_shift(cx: &mut ExecutionContext<'_>, r: GcRef) -> RoutineResult<Value> {
    let length = array_length(cx, r)?;
    let length_atom = cx.intern("length");
    if length == 0 {
        set_property(cx, Value::Object(r), PropertyKey::Atom(length_atom), Value::Int32(0), true)?;
        return Ok(Value::Undefined);
    }
    let first = get_property(cx, Value::Object(r), PropertyKey::Index(0))?;
    if cx.heap().object(r)?.frozen {
        return Err(cx.throw_error(ErrorKind::TypeError, "object is not extensible"));
    }
    let entries = indexed_entries(cx, r, length)?;
    clear_indexed(cx, r, length)?;
    for (index, value) in entries.into_iter().filter(|(i, _)| *i > 0) {
        set_property(cx, Value::Object(r), PropertyKey::Index(index - 1), value, true)?;
    }
    set_property(
        cx,
        Value::Object(r),
        PropertyKey::Atom(length_atom),
        Value::number((length - 1) as f64),
        true,
    )?;
    Ok(first)
}

/// General `a.concat(b)` for a single argument
pub fn array_concat(cx: &mut ExecutionContext<'_>, a: GcRef, b: Value) -> RoutineResult<GcRef> {
    let a_len = array_length(cx, a)?;
    let spread = match b {
        Value::Object(rb) if cx.heap().object(rb)?.array().is_some() => Some(rb),
        _ => None,
    };
    let b_len = match spread {
        Some(rb) => array_length(cx, rb)?,
        None => 1,
    };
    let total = u64::from(a_len) + u64::from(b_len);
    if total > u64::from(MAX_ARRAY_LENGTH) {
        return Err(cx.throw_error(ErrorKind::RangeError, "invalid array length"));
    }

    let mut entries = indexed_entries(cx, a, a_len)?;
    match spread {
        Some(rb) => {
            let tail = indexed_entries(cx, rb, b_len)?;
            entries.extend(tail.into_iter().map(|(i, v)| (a_len + i, v)));
        }
        None => entries.push((a_len, b)),
    }

    let result = cx.new_object(ObjectKind::Array(ArrayStorage::dense(Vec::new())));
    for (index, value) in entries {
        set_array_element(cx, result, index, value)?;
    }
    if let Some(storage) = cx.heap_mut().object_mut(result)?.array_mut() {
        storage.length = total as u32;
    }
    Ok(result)
}

/// Whether `v` is the sentinel passed as `this` to constructing calls
pub fn is_constructing(v: Value) -> bool {
    v.is_magic(MagicKind::IsConstructing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::JitOptions;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, "0")]
    #[case(-0.0, "0")]
    #[case(42.0, "42")]
    #[case(-1.5, "-1.5")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    fn test_number_to_string(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(number_to_string(n), expected);
    }

    #[rstest]
    #[case("", 0.0)]
    #[case("  12 ", 12.0)]
    #[case("0x1f", 31.0)]
    #[case("1e3", 1000.0)]
    #[case("-Infinity", f64::NEG_INFINITY)]
    fn test_string_to_number(#[case] s: &str, #[case] expected: f64) {
        assert_eq!(string_to_number(s), expected);
    }

    #[rstest]
    #[case("inf")]
    #[case("abc")]
    #[case("1px")]
    fn test_string_to_number_rejects_garbage(#[case] s: &str) {
        assert!(string_to_number(s).is_nan());
    }

    #[test]
    fn test_parse_index_is_canonical() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index("17"), Some(17));
        assert_eq!(parse_index("017"), None);
        assert_eq!(parse_index("4294967295"), None);
        assert_eq!(parse_index("x"), None);
    }

    #[test]
    fn test_loose_equality_coerces() {
        let mut rt = Runtime::new(JitOptions::for_testing()).unwrap();
        let id = rt.new_context();
        let mut cx = rt.context(id).unwrap();
        let one = Value::String(cx.alloc_string("1"));

        assert!(loose_equals(&mut cx, one, Value::Int32(1)).unwrap());
        assert!(loose_equals(&mut cx, Value::Boolean(true), one).unwrap());
        assert!(loose_equals(&mut cx, Value::Null, Value::Undefined).unwrap());
        assert!(!loose_equals(&mut cx, Value::Null, Value::Int32(0)).unwrap());
        assert!(!strict_equals(&mut cx, one, Value::Int32(1)).unwrap());
        assert!(strict_equals(&mut cx, Value::Int32(1), Value::Double(1.0)).unwrap());
    }

    #[test]
    fn test_revoked_objects_throw() {
        let mut rt = Runtime::new(JitOptions::for_testing()).unwrap();
        let id = rt.new_context();
        let mut cx = rt.context(id).unwrap();
        let obj = cx.new_object(ObjectKind::Revoked);
        let key = key_from_name(&mut cx, "x");

        let err = get_property(&mut cx, Value::Object(obj), key).unwrap_err();
        assert_eq!(err, RoutineError::Thrown);
        assert!(cx.is_exception_pending());
    }

    #[test]
    fn test_sparse_writes_extend_length() {
        let mut rt = Runtime::new(JitOptions::for_testing()).unwrap();
        let id = rt.new_context();
        let mut cx = rt.context(id).unwrap();
        let arr = cx.new_object(ObjectKind::Array(ArrayStorage::dense(vec![Value::Int32(1)])));

        set_property(&mut cx, Value::Object(arr), PropertyKey::Index(5), Value::Int32(9), true)
            .unwrap();
        let storage = cx.heap().object(arr).unwrap().array().cloned().unwrap();
        assert_eq!(storage.length, 6);
        assert!(!storage.is_dense());
        assert_eq!(
            get_property(&mut cx, Value::Object(arr), PropertyKey::Index(5)).unwrap(),
            Value::Int32(9)
        );
        assert_eq!(
            get_property(&mut cx, Value::Object(arr), PropertyKey::Index(3)).unwrap(),
            Value::Undefined
        );
    }

    #[test]
    fn test_cyclic_array_joins_as_empty() {
        let mut rt = Runtime::new(JitOptions::for_testing()).unwrap();
        let id = rt.new_context();
        let mut cx = rt.context(id).unwrap();
        let arr = cx.new_object(ObjectKind::Array(ArrayStorage::dense(vec![Value::Int32(1)])));
        set_property(&mut cx, Value::Object(arr), PropertyKey::Index(1), Value::Object(arr), true)
            .unwrap();

        assert_eq!(to_string(&mut cx, Value::Object(arr)).unwrap(), "1,");
    }
}
