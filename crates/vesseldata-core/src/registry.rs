//! Type registry: component kind → data kind → factory.
//!
//! Every data kind submits a [`ModuleKind`] descriptor through `inventory`
//! with [`register_module_kind!`](crate::register_module_kind). At startup,
//! [`TypeRegistry::scan`] walks every submitted descriptor once and builds two
//! lookup tables. Nothing is resolved reflectively afterwards: instantiation
//! is a plain function-pointer call.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::RegistryError;
use crate::records::ModuleData;

/// A data kind, paired one-to-one with the component kind it persists
pub trait DataKind: ModuleData + Default {
    /// Name of the live component kind this data belongs to
    const COMPONENT_KIND: &'static str;
    /// Name of this data kind, used in persisted node names
    const DATA_KIND: &'static str;
}

fn new_boxed<T: DataKind>() -> Box<dyn ModuleData> {
    Box::new(T::default())
}

/// Immutable descriptor for one component/data kind pair
#[derive(Clone, Copy)]
pub struct ModuleKind {
    pub component_kind: &'static str,
    pub data_kind: &'static str,
    factory: fn() -> Box<dyn ModuleData>,
}

impl ModuleKind {
    pub const fn of<T: DataKind>() -> Self {
        Self {
            component_kind: T::COMPONENT_KIND,
            data_kind: T::DATA_KIND,
            factory: new_boxed::<T>,
        }
    }

    /// Construct a fresh, default data instance
    pub fn instantiate(&self) -> Box<dyn ModuleData> {
        (self.factory)()
    }
}

impl fmt::Debug for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleKind")
            .field("component_kind", &self.component_kind)
            .field("data_kind", &self.data_kind)
            .finish()
    }
}

impl PartialEq for ModuleKind {
    fn eq(&self, other: &Self) -> bool {
        self.component_kind == other.component_kind && self.data_kind == other.data_kind
    }
}

impl Eq for ModuleKind {}

/// Wrapper for `inventory::collect!`
pub struct ModuleKindReg(pub ModuleKind);
inventory::collect!(ModuleKindReg);

/// Submits a data kind to the startup scan.
///
/// ```rust,ignore
/// vesseldata_core::register_module_kind!(HabitatData);
/// ```
#[macro_export]
macro_rules! register_module_kind {
    ($data:ty) => {
        $crate::inventory::submit! {
            $crate::registry::ModuleKindReg($crate::registry::ModuleKind::of::<$data>())
        }
    };
}

/// Name of the registration set built by [`TypeRegistry::scan`]
pub const SCANNED_SET: &str = "inventory";

/// Lookup tables built once at startup
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_component: HashMap<&'static str, ModuleKind>,
    by_data: HashMap<&'static str, ModuleKind>,
    sets: HashSet<String>,
}

impl TypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every kind submitted with `register_module_kind!`
    pub fn scan() -> Self {
        let mut registry = Self::new();
        registry.register_scanned();
        registry
    }

    /// Register every submitted kind under [`SCANNED_SET`]
    pub fn register_scanned(&mut self) -> usize {
        let mut kinds = Vec::new();
        for reg in inventory::iter::<ModuleKindReg> {
            kinds.push(reg.0);
        }
        self.register_set(SCANNED_SET, kinds)
    }

    /// Register a named set of kinds. A set name already registered is a
    /// no-op. Returns how many kinds were added.
    pub fn register_set(
        &mut self,
        set: &str,
        kinds: impl IntoIterator<Item = ModuleKind>,
    ) -> usize {
        if !self.sets.insert(set.to_string()) {
            log::debug!("module kind set `{}` already registered", set);
            return 0;
        }

        let mut added = 0;
        for kind in kinds {
            if self.by_component.contains_key(kind.component_kind) {
                log::warn!(
                    "component kind `{}` registered twice, keeping the first",
                    kind.component_kind
                );
                continue;
            }
            if self.by_data.contains_key(kind.data_kind) {
                log::warn!(
                    "data kind `{}` registered twice, keeping the first",
                    kind.data_kind
                );
                continue;
            }
            self.by_component.insert(kind.component_kind, kind);
            self.by_data.insert(kind.data_kind, kind);
            added += 1;
        }

        log::debug!("registered {} module kinds from set `{}`", added, set);
        added
    }

    /// Descriptor for a component kind
    pub fn resolve(&self, component_kind: &str) -> Result<ModuleKind, RegistryError> {
        self.by_component
            .get(component_kind)
            .copied()
            .ok_or_else(|| RegistryError::UnknownComponentKind(component_kind.to_string()))
    }

    /// Descriptor for a data kind
    pub fn resolve_data_kind(&self, data_kind: &str) -> Result<ModuleKind, RegistryError> {
        self.by_data
            .get(data_kind)
            .copied()
            .ok_or_else(|| RegistryError::UnknownDataKind(data_kind.to_string()))
    }

    pub fn is_known_component(&self, component_kind: &str) -> bool {
        self.by_component.contains_key(component_kind)
    }

    pub fn len(&self) -> usize {
        self.by_component.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_component.is_empty()
    }

    /// All registered kinds, sorted by component kind
    pub fn kinds(&self) -> Vec<ModuleKind> {
        let mut kinds: Vec<ModuleKind> = self.by_component.values().copied().collect();
        kinds.sort_by_key(|k| k.component_kind);
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{HabitatData, ProcessControllerData, RadiationEmitterData};

    #[test]
    fn test_scan_finds_builtin_kinds() {
        let registry = TypeRegistry::scan();
        for kind in [
            ModuleKind::of::<HabitatData>(),
            ModuleKind::of::<ProcessControllerData>(),
            ModuleKind::of::<RadiationEmitterData>(),
        ] {
            assert_eq!(registry.resolve(kind.component_kind), Ok(kind));
            assert_eq!(registry.resolve_data_kind(kind.data_kind), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_component_kind() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.resolve("ModuleNothing"),
            Err(RegistryError::UnknownComponentKind("ModuleNothing".into()))
        );
        assert!(!registry.is_known_component("ModuleNothing"));
    }

    #[test]
    fn test_register_same_set_twice_is_noop() {
        let mut registry = TypeRegistry::new();
        let added = registry.register_set("core", [ModuleKind::of::<HabitatData>()]);
        assert_eq!(added, 1);
        let again = registry.register_set(
            "core",
            [
                ModuleKind::of::<HabitatData>(),
                ModuleKind::of::<ProcessControllerData>(),
            ],
        );
        assert_eq!(again, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_kind_across_sets_keeps_first() {
        let mut registry = TypeRegistry::new();
        registry.register_set("a", [ModuleKind::of::<HabitatData>()]);
        let added = registry.register_set("b", [ModuleKind::of::<HabitatData>()]);
        assert_eq!(added, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_factory_builds_matching_type() {
        let kind = ModuleKind::of::<HabitatData>();
        let data = kind.instantiate();
        assert!(data.as_ref().as_any().downcast_ref::<HabitatData>().is_some());
    }
}
