//! Property and element access.

use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, OutKind, OutValue, ReturnKind};
use crate::error::RoutineResult;
use crate::heap::GcRef;
use crate::ops::{self, PropertyKey};
use crate::runtime::ExecutionContext;
use crate::value::Value;

pub(super) const GET_PROPERTY: NativeFunction = NativeFunction {
    name: "GetProperty",
    target: get_property,
    args: &[ArgKind::Value, ArgKind::Pointer, ArgKind::OutParam(OutKind::Value)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const SET_PROPERTY: NativeFunction = NativeFunction {
    name: "SetProperty",
    target: set_property,
    args: &[ArgKind::Pointer, ArgKind::Pointer, ArgKind::Value, ArgKind::Word],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const GET_ELEMENT: NativeFunction = NativeFunction {
    name: "GetElement",
    target: get_element,
    args: &[ArgKind::Value, ArgKind::Value, ArgKind::OutParam(OutKind::Value)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const SET_ELEMENT: NativeFunction = NativeFunction {
    name: "SetElement",
    target: set_element,
    args: &[ArgKind::Pointer, ArgKind::Value, ArgKind::Value, ArgKind::Word],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const INIT_PROP: NativeFunction = NativeFunction {
    name: "InitProp",
    target: init_prop,
    args: &[ArgKind::Pointer, ArgKind::Pointer, ArgKind::Value],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const OPERATOR_IN: NativeFunction = NativeFunction {
    name: "OperatorIn",
    target: operator_in,
    args: &[ArgKind::Value, ArgKind::Pointer, ArgKind::OutParam(OutKind::Bool)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const OBJECT_EMULATES_UNDEFINED: NativeFunction = NativeFunction {
    name: "ObjectEmulatesUndefined",
    target: object_emulates_undefined,
    args: &[ArgKind::Pointer],
    ret: ReturnKind::Direct,
    may_gc: false,
    exit_frame: false,
};

fn name_key(cx: &mut ExecutionContext<'_>, name: GcRef) -> RoutineResult<PropertyKey> {
    let name = cx.heap().string(name)?.to_owned();
    Ok(ops::key_from_name(cx, &name))
}

fn get_property(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let target = args.value(0)?;
    let key = name_key(cx, args.pointer(1)?)?;
    let value = ops::get_property(cx, target, key)?;
    args.set_out(OutValue::Value(value));
    Ok(())
}

fn set_property(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let obj = args.pointer(0)?;
    let key = name_key(cx, args.pointer(1)?)?;
    let strict = args.word(3)? != 0;
    ops::set_property(cx, Value::Object(obj), key, args.value(2)?, strict)
}

fn get_element(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let target = args.value(0)?;
    let key = ops::key_from_value(cx, args.value(1)?)?;
    let value = ops::get_property(cx, target, key)?;
    args.set_out(OutValue::Value(value));
    Ok(())
}

fn set_element(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let obj = args.pointer(0)?;
    let key = ops::key_from_value(cx, args.value(1)?)?;
    let strict = args.word(3)? != 0;
    ops::set_property(cx, Value::Object(obj), key, args.value(2)?, strict)
}

/// Object literal initialization. `__proto__` is an ordinary assignment,
/// every other name defines an own property.
fn init_prop(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let obj = args.pointer(0)?;
    let name = args.pointer(1)?;
    let value = args.value(2)?;
    if cx.heap().string(name)? == "__proto__" {
        let key = name_key(cx, name)?;
        return ops::set_property(cx, Value::Object(obj), key, value, false);
    }
    let key = name_key(cx, name)?;
    ops::define_property(cx, obj, key, value)
}

fn operator_in(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let found = ops::has_property(cx, args.value(0)?, Value::Object(args.pointer(1)?))?;
    args.set_out(OutValue::Bool(found));
    Ok(())
}

fn object_emulates_undefined(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let emulates = cx.heap().object(args.pointer(0)?)?.emulates_undefined;
    args.set_return(Value::Boolean(emulates));
    Ok(())
}
