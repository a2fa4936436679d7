//! Array mutators with a fast path for dense backing storage.

use super::monitor_result;
use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, OutKind, OutValue, ReturnKind};
use crate::error::RoutineResult;
use crate::heap::{ArrayStorage, GcRef, ObjectKind};
use crate::ops;
use crate::runtime::ExecutionContext;
use crate::value::Value;

pub(super) const ARRAY_POP_DENSE: NativeFunction = NativeFunction {
    name: "ArrayPopDense",
    target: array_pop_dense,
    args: &[ArgKind::Pointer, ArgKind::OutParam(OutKind::Value)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const ARRAY_PUSH_DENSE: NativeFunction = NativeFunction {
    name: "ArrayPushDense",
    target: array_push_dense,
    args: &[ArgKind::Pointer, ArgKind::Value, ArgKind::OutParam(OutKind::Uint32)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const ARRAY_SHIFT_DENSE: NativeFunction = NativeFunction {
    name: "ArrayShiftDense",
    target: array_shift_dense,
    args: &[ArgKind::Pointer, ArgKind::OutParam(OutKind::Value)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const ARRAY_CONCAT_DENSE: NativeFunction = NativeFunction {
    name: "ArrayConcatDense",
    target: array_concat_dense,
    args: &[ArgKind::Pointer, ArgKind::Pointer],
    ret: ReturnKind::Direct,
    may_gc: true,
    exit_frame: true,
};

/// Dense, writable array storage of `r`, if it has one
fn dense_storage<'a>(
    cx: &'a mut ExecutionContext<'_>,
    r: GcRef,
) -> RoutineResult<Option<&'a mut ArrayStorage>> {
    let obj = cx.heap_mut().object_mut(r)?;
    if obj.frozen {
        return Ok(None);
    }
    Ok(obj.array_mut().filter(|storage| storage.is_dense()))
}

fn array_pop_dense(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let r = args.pointer(0)?;
    let fast = dense_storage(cx, r)?.map(|storage| {
        let value = storage.elements.pop().unwrap_or(Value::Undefined);
        storage.length = storage.elements.len() as u32;
        value
    });
    let value = match fast {
        Some(value) => value,
        None => ops::array_pop(cx, r)?,
    };

    // An undefined result usually means the array was empty, which compiled
    // code does not guard for.
    if value.is_undefined() {
        monitor_result(cx, value)?;
    }
    args.set_out(OutValue::Value(value));
    Ok(())
}

fn array_push_dense(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let r = args.pointer(0)?;
    let value = args.value(1)?;
    let fast = dense_storage(cx, r)?
        .filter(|storage| storage.length < ops::MAX_ARRAY_LENGTH)
        .map(|storage| {
            storage.elements.push(value);
            storage.length += 1;
            storage.length
        });
    let length = match fast {
        Some(length) => length,
        None => ops::array_push(cx, r, value)?,
    };
    args.set_out(OutValue::Uint32(length));
    Ok(())
}

fn array_shift_dense(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let r = args.pointer(0)?;
    let fast = dense_storage(cx, r)?.map(|storage| {
        if storage.elements.is_empty() {
            return Value::Undefined;
        }
        let value = storage.elements.remove(0);
        storage.length -= 1;
        value
    });
    let value = match fast {
        Some(value) => value,
        None => ops::array_shift(cx, r)?,
    };

    if value.is_undefined() {
        monitor_result(cx, value)?;
    }
    args.set_out(OutValue::Value(value));
    Ok(())
}

fn dense_elements(cx: &ExecutionContext<'_>, r: GcRef) -> RoutineResult<Option<Vec<Value>>> {
    Ok(cx
        .heap()
        .object(r)?
        .array()
        .filter(|storage| storage.is_dense())
        .map(|storage| storage.elements.clone()))
}

fn array_concat_dense(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let (a, b) = (args.pointer(0)?, args.pointer(1)?);
    let result = match (dense_elements(cx, a)?, dense_elements(cx, b)?) {
        (Some(mut elements), Some(tail)) => {
            elements.extend(tail);
            cx.new_object(ObjectKind::Array(ArrayStorage::dense(elements)))
        }
        _ => ops::array_concat(cx, a, Value::Object(b))?,
    };
    args.set_return(Value::Object(result));
    Ok(())
}
