//! The native call descriptor registry.
//!
//! Descriptors are collected by a builder during initialization and frozen
//! into an immutable table before any context runs. After that the table is
//! shared read-only across threads.

use super::descriptor::{NativeAddress, NativeCallDescriptor, NativeFunction};
use super::routines::BUILTINS;
use crate::error::{IntegrityError, IntegrityResult};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Address of the first routine stub
pub const NATIVE_CODE_BASE: u64 = 0x7000_0000;

/// Distance between consecutive routine stubs
pub const NATIVE_STUB_SIZE: u64 = 0x40;

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    functions: Vec<&'static NativeFunction>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, function: &'static NativeFunction) -> Self {
        self.functions.push(function);
        self
    }

    /// Add every routine the runtime provides
    pub fn with_builtins(mut self) -> Self {
        self.functions.extend(BUILTINS.iter());
        self
    }

    pub fn build(self) -> IntegrityResult<DescriptorRegistry> {
        let mut descriptors = Vec::with_capacity(self.functions.len());
        let mut by_name = HashMap::with_capacity(self.functions.len());

        for (i, function) in self.functions.into_iter().enumerate() {
            function.validate()?;
            if by_name.insert(function.name, i).is_some() {
                return Err(IntegrityError::DuplicateDescriptor(function.name));
            }
            descriptors.push(NativeCallDescriptor {
                address: NativeAddress(NATIVE_CODE_BASE + i as u64 * NATIVE_STUB_SIZE),
                function,
            });
        }

        tracing::debug!(count = descriptors.len(), "native call registry built");
        Ok(DescriptorRegistry {
            descriptors,
            by_name,
        })
    }
}

/// Immutable table of native call descriptors
#[derive(Debug)]
pub struct DescriptorRegistry {
    descriptors: Vec<NativeCallDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

impl DescriptorRegistry {
    /// The process-wide registry of builtin routines
    pub fn builtins() -> IntegrityResult<Arc<DescriptorRegistry>> {
        static BUILTIN_REGISTRY: OnceLock<IntegrityResult<Arc<DescriptorRegistry>>> =
            OnceLock::new();
        BUILTIN_REGISTRY
            .get_or_init(|| RegistryBuilder::new().with_builtins().build().map(Arc::new))
            .clone()
    }

    /// Resolve a routine address
    pub fn lookup(&self, address: NativeAddress) -> Option<NativeCallDescriptor> {
        let offset = address.0.checked_sub(NATIVE_CODE_BASE)?;
        if offset % NATIVE_STUB_SIZE != 0 {
            return None;
        }
        self.descriptors.get((offset / NATIVE_STUB_SIZE) as usize).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<NativeCallDescriptor> {
        self.by_name.get(name).map(|i| self.descriptors[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativeCallDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::descriptor::{ArgKind, NativeArgs, ReturnKind};
    use crate::error::RoutineResult;
    use crate::runtime::ExecutionContext;

    fn noop(_cx: &mut ExecutionContext<'_>, _args: &mut NativeArgs) -> RoutineResult<()> {
        Ok(())
    }

    static NOOP: NativeFunction = NativeFunction {
        name: "Noop",
        target: noop,
        args: &[],
        ret: ReturnKind::Bool,
        may_gc: false,
        exit_frame: true,
    };

    static COLLECTS_WITHOUT_EXIT: NativeFunction = NativeFunction {
        name: "CollectsWithoutExit",
        target: noop,
        args: &[ArgKind::Pointer],
        ret: ReturnKind::Direct,
        may_gc: true,
        exit_frame: false,
    };

    static OUT_NOT_LAST: NativeFunction = NativeFunction {
        name: "OutNotLast",
        target: noop,
        args: &[ArgKind::OutParam(crate::bridge::OutKind::Value), ArgKind::Word],
        ret: ReturnKind::Bool,
        may_gc: false,
        exit_frame: true,
    };

    #[test]
    fn test_builtins_resolve_by_address_and_name() {
        let registry = DescriptorRegistry::builtins().unwrap();
        assert!(!registry.is_empty());
        for descriptor in registry.iter() {
            let found = registry.lookup(descriptor.address).unwrap();
            assert_eq!(found.name(), descriptor.name());
            assert_eq!(registry.by_name(descriptor.name()).unwrap().address, descriptor.address);
        }
    }

    #[test]
    fn test_misaligned_or_foreign_addresses_do_not_resolve() {
        let registry = DescriptorRegistry::builtins().unwrap();
        assert!(registry.lookup(NativeAddress(NATIVE_CODE_BASE + 1)).is_none());
        assert!(registry.lookup(NativeAddress(0x10)).is_none());
        let past_end = NATIVE_CODE_BASE + registry.len() as u64 * NATIVE_STUB_SIZE;
        assert!(registry.lookup(NativeAddress(past_end)).is_none());
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let err = RegistryBuilder::new()
            .register(&NOOP)
            .register(&NOOP)
            .build()
            .unwrap_err();
        assert_eq!(err, IntegrityError::DuplicateDescriptor("Noop"));
    }

    #[test]
    fn test_invalid_descriptors_are_rejected() {
        let err = RegistryBuilder::new()
            .register(&COLLECTS_WITHOUT_EXIT)
            .build()
            .unwrap_err();
        assert!(matches!(err, IntegrityError::InvalidDescriptor { name: "CollectsWithoutExit", .. }));

        let err = RegistryBuilder::new()
            .register(&OUT_NOT_LAST)
            .build()
            .unwrap_err();
        assert!(matches!(err, IntegrityError::InvalidDescriptor { name: "OutNotLast", .. }));
    }

    #[test]
    fn test_builtins_append_after_custom_routines() {
        let registry = RegistryBuilder::new()
            .register(&NOOP)
            .with_builtins()
            .build()
            .unwrap();
        assert_eq!(registry.lookup(NativeAddress(NATIVE_CODE_BASE)).unwrap().name(), "Noop");
        assert_eq!(registry.len(), BUILTINS.len() + 1);
    }
}
