//! The native call bridge.
//!
//! Compiled code reaches runtime routines through a fixed table of
//! descriptors. Each call runs behind an Exit frame so stack walkers can
//! find the boundary, keeps its managed arguments rooted while the routine
//! may collect, and turns a failed routine into an unwind.

mod descriptor;
mod registry;
pub mod routines;
mod trampoline;
mod unwind;

pub use descriptor::{
    Arg, ArgKind, NativeAddress, NativeArgs, NativeCallDescriptor, NativeFn, NativeFunction,
    OutKind, OutValue, ReturnKind,
};
pub use registry::{DescriptorRegistry, RegistryBuilder, NATIVE_CODE_BASE, NATIVE_STUB_SIZE};
pub use trampoline::{call_by_name, call_native, NativeOutcome};
pub use unwind::{handle_exception, ResumeTarget};

pub(crate) use trampoline::exit_frame_refs;
