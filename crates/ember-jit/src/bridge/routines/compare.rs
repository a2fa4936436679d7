//! Equality and relational comparisons that compiled code could not
//! specialize.

use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFn, NativeFunction, OutKind, OutValue, ReturnKind};
use crate::error::RoutineResult;
use crate::ops;
use crate::runtime::ExecutionContext;

const VALUE_PAIR: &[ArgKind] = &[ArgKind::Value, ArgKind::Value, ArgKind::OutParam(OutKind::Bool)];
const STRING_PAIR: &[ArgKind] = &[ArgKind::Pointer, ArgKind::Pointer, ArgKind::OutParam(OutKind::Bool)];

const fn comparison(name: &'static str, target: NativeFn, args: &'static [ArgKind]) -> NativeFunction {
    NativeFunction {
        name,
        target,
        args,
        ret: ReturnKind::Bool,
        may_gc: true,
        exit_frame: true,
    }
}

pub(super) const LOOSE_EQ: NativeFunction = comparison("LooselyEqual", loosely_equal::<true>, VALUE_PAIR);
pub(super) const LOOSE_NE: NativeFunction = comparison("LooselyNotEqual", loosely_equal::<false>, VALUE_PAIR);
pub(super) const STRICT_EQ: NativeFunction = comparison("StrictlyEqual", strictly_equal::<true>, VALUE_PAIR);
pub(super) const STRICT_NE: NativeFunction = comparison("StrictlyNotEqual", strictly_equal::<false>, VALUE_PAIR);
pub(super) const LESS_THAN: NativeFunction = comparison("LessThan", less_than, VALUE_PAIR);
pub(super) const LESS_THAN_OR_EQUAL: NativeFunction =
    comparison("LessThanOrEqual", less_than_or_equal, VALUE_PAIR);
pub(super) const GREATER_THAN: NativeFunction = comparison("GreaterThan", greater_than, VALUE_PAIR);
pub(super) const GREATER_THAN_OR_EQUAL: NativeFunction =
    comparison("GreaterThanOrEqual", greater_than_or_equal, VALUE_PAIR);
pub(super) const STRINGS_EQUAL: NativeFunction = comparison("StringsEqual", strings_equal::<true>, STRING_PAIR);
pub(super) const STRINGS_NOT_EQUAL: NativeFunction =
    comparison("StringsNotEqual", strings_equal::<false>, STRING_PAIR);

fn loosely_equal<const EQ: bool>(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let equal = ops::loose_equals(cx, args.value(0)?, args.value(1)?)?;
    args.set_out(OutValue::Bool(equal == EQ));
    Ok(())
}

fn strictly_equal<const EQ: bool>(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let equal = ops::strict_equals(cx, args.value(0)?, args.value(1)?)?;
    args.set_out(OutValue::Bool(equal == EQ));
    Ok(())
}

fn less_than(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let result = ops::less_than(cx, args.value(0)?, args.value(1)?)?;
    args.set_out(OutValue::Bool(result));
    Ok(())
}

fn less_than_or_equal(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let result = ops::less_than_or_equal(cx, args.value(0)?, args.value(1)?)?;
    args.set_out(OutValue::Bool(result));
    Ok(())
}

fn greater_than(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let result = ops::greater_than(cx, args.value(0)?, args.value(1)?)?;
    args.set_out(OutValue::Bool(result));
    Ok(())
}

fn greater_than_or_equal(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let result = ops::greater_than_or_equal(cx, args.value(0)?, args.value(1)?)?;
    args.set_out(OutValue::Bool(result));
    Ok(())
}

/// Compare two string cells by contents
fn strings_equal<const EQ: bool>(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let (a, b) = (args.pointer(0)?, args.pointer(1)?);
    let equal = a == b || cx.heap().string(a)? == cx.heap().string(b)?;
    args.set_out(OutValue::Bool(equal == EQ));
    Ok(())
}
