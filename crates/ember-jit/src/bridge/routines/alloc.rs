//! Allocation helpers.
//!
//! New objects get the layout type compiled code expects. Without a shared
//! type to use, the object gets a fresh singleton type, which compiled code
//! cannot have guarded for, so the result is reported to type monitoring.

use super::monitor_result;
use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, ReturnKind};
use crate::error::{IntegrityError, RoutineResult};
use crate::heap::{ArrayStorage, JsObject, ObjectKind};
use crate::runtime::ExecutionContext;
use crate::types::{TypeClass, TypeId};
use crate::value::Value;

/// Type word meaning "no known type"
pub const NO_TYPE: u64 = u64::MAX;

pub(super) const NEW_INIT_ARRAY: NativeFunction = NativeFunction {
    name: "NewInitArray",
    target: new_init_array,
    args: &[ArgKind::Word, ArgKind::Word],
    ret: ReturnKind::Direct,
    may_gc: true,
    exit_frame: true,
};

pub(super) const NEW_INIT_OBJECT: NativeFunction = NativeFunction {
    name: "NewInitObject",
    target: new_init_object,
    args: &[ArgKind::Pointer],
    ret: ReturnKind::Direct,
    may_gc: true,
    exit_frame: true,
};

pub(super) const NEW_CALL_OBJECT: NativeFunction = NativeFunction {
    name: "NewCallObject",
    target: new_call_object,
    args: &[ArgKind::Word],
    ret: ReturnKind::Direct,
    may_gc: true,
    exit_frame: true,
};

pub(super) const NEW_STRING_OBJECT: NativeFunction = NativeFunction {
    name: "NewStringObject",
    target: new_string_object,
    args: &[ArgKind::Pointer],
    ret: ReturnKind::Direct,
    may_gc: true,
    exit_frame: true,
};

/// Array literal with `count` holes to be filled by compiled code
fn new_init_array(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let count = args.word_u32(0)?;
    let type_word = args.word(1)?;
    let storage = ArrayStorage {
        elements: Vec::new(),
        length: count,
    };

    if type_word == NO_TYPE {
        let type_id = cx.new_singleton_type(TypeClass::Array);
        let obj = cx.alloc_object(JsObject::new(type_id, ObjectKind::Array(storage)));
        monitor_result(cx, Value::Object(obj))?;
        args.set_return(Value::Object(obj));
        return Ok(());
    }

    let type_id = u32::try_from(type_word)
        .ok()
        .map(TypeId)
        .filter(|id| cx.types().get(*id).is_some())
        .ok_or(IntegrityError::ArgumentRange {
            routine: "NewInitArray",
            index: 1,
        })?;
    let obj = cx.alloc_object(JsObject::new(type_id, ObjectKind::Array(storage)));
    args.set_return(Value::Object(obj));
    Ok(())
}

/// Object literal copied from the template compiled code was built with
fn new_init_object(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let template = cx.heap().object(args.pointer(0)?)?.clone();
    let singleton = cx.types().is_singleton(template.type_id);
    let type_id = if singleton {
        cx.new_singleton_type(TypeClass::of(&template.kind))
    } else {
        template.type_id
    };

    let mut object = JsObject::new(type_id, template.kind);
    object.properties = template.properties;
    let obj = cx.alloc_object(object);
    if singleton {
        monitor_result(cx, Value::Object(obj))?;
    }
    args.set_return(Value::Object(obj));
    Ok(())
}

/// Scope object for a function's closed-over variables, all `undefined`
fn new_call_object(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let slots = vec![Value::Undefined; args.word_u32(0)? as usize];
    let obj = cx.new_object(ObjectKind::Call { slots });
    args.set_return(Value::Object(obj));
    Ok(())
}

fn new_string_object(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let s = args.pointer(0)?;
    cx.heap().string(s)?;
    let obj = cx.new_object(ObjectKind::StringObject(s));
    args.set_return(Value::Object(obj));
    Ok(())
}
