use crate::bridge::descriptor::{ArgKind, NativeArgs, NativeFunction, OutKind, OutValue, ReturnKind};
use crate::error::{IntegrityError, RoutineResult};
use crate::runtime::ExecutionContext;
use crate::value::Value;

pub(super) const CHAR_CODE_AT: NativeFunction = NativeFunction {
    name: "CharCodeAt",
    target: char_code_at,
    args: &[ArgKind::Pointer, ArgKind::Word, ArgKind::OutParam(OutKind::Uint32)],
    ret: ReturnKind::Bool,
    may_gc: true,
    exit_frame: true,
};

pub(super) const STRING_FROM_CHAR_CODE: NativeFunction = NativeFunction {
    name: "StringFromCharCode",
    target: string_from_char_code,
    args: &[ArgKind::Word],
    ret: ReturnKind::Direct,
    may_gc: true,
    exit_frame: true,
};

/// UTF-16 code unit at an index compiled code has already bounds-checked
fn char_code_at(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let s = args.pointer(0)?;
    let index = args.word(1)?;
    let unit = {
        let mut units = cx.heap().string(s)?.encode_utf16();
        usize::try_from(index).ok().and_then(|i| units.nth(i))
    };
    let unit = unit.ok_or(IntegrityError::ArgumentRange {
        routine: "CharCodeAt",
        index: 1,
    })?;
    args.set_out(OutValue::Uint32(unit as u32));
    Ok(())
}

fn string_from_char_code(cx: &mut ExecutionContext<'_>, args: &mut NativeArgs) -> RoutineResult<()> {
    let unit = args.word(0)? as u16;
    let s = match u8::try_from(unit) {
        Ok(byte) => cx.unit_string(byte),
        Err(_) => cx.alloc_string(String::from_utf16_lossy(&[unit])),
    };
    args.set_return(Value::String(s));
    Ok(())
}
