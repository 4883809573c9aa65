use crate::error::ModuleError;
use crate::script::{Script, ScriptHandle};
use anyhow::{anyhow, Context};
use libloading::Library;
use std::path::Path;

/// Bumped whenever the host/module contract changes shape. A module built
/// against a different version is refused at load time.
pub const SCRIPT_MODULE_API_VERSION: u32 = 1;
pub const SCRIPT_ENTRY_SYMBOL: &[u8] = b"shrike_script_entry\0";

pub type ScriptEntryFn = unsafe extern "C" fn() -> ScriptModuleExport;
pub type RegisterScriptsFn = unsafe extern "C" fn(&mut ScriptRegistry);
pub type CreateScriptFn = unsafe extern "C" fn() -> ScriptHandle;

/// What a compiled script module exports through its single entry symbol.
#[repr(C)]
pub struct ScriptModuleExport {
    pub api_version: u32,
    pub register: RegisterScriptsFn,
}

/// Registration table a module fills in at load time. Each script source
/// file contributes its kinds through its `register` function; the order of
/// registration is the discovery order used for instantiation.
#[derive(Default)]
pub struct ScriptRegistry {
    kinds: Vec<(String, CreateScriptFn)>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Script + Default + 'static>(&mut self, name: impl Into<String>) {
        self.kinds.push((name.into(), create_default::<S>));
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

unsafe extern "C" fn create_default<S: Script + Default + 'static>() -> ScriptHandle {
    ScriptHandle::from_box(Box::new(S::default()))
}

enum ScriptFactory {
    Native(CreateScriptFn),
    Hosted(Box<dyn Fn() -> Box<dyn Script>>),
}

struct ScriptKindSlot {
    name: String,
    factory: ScriptFactory,
}

enum ModuleOrigin {
    Hosted,
    Dynamic(Library),
}

/// One compiled generation of the script set. Exactly one module is active
/// at a time; each generation lives in its own library with a unique name,
/// so two generations are never indistinguishable to the loader. Dropping or
/// unloading the module releases its code and static state.
pub struct ScriptModule {
    generation: u64,
    kinds: Vec<ScriptKindSlot>,
    origin: ModuleOrigin,
}

impl std::fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptModule")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ScriptModule {
    /// Loads a compiled module library and runs its registration table.
    pub fn load_dynamic(path: &Path, generation: u64) -> Result<Self, ModuleError> {
        let library = unsafe {
            Library::new(path)
                .with_context(|| format!("loading script module '{}'", path.display()))?
        };
        let entry = unsafe {
            library
                .get::<ScriptEntryFn>(SCRIPT_ENTRY_SYMBOL)
                .with_context(|| format!("resolving script entry in '{}'", path.display()))?
        };
        let export = unsafe { entry() };
        drop(entry);
        if export.api_version != SCRIPT_MODULE_API_VERSION {
            return Err(ModuleError::ApiMismatch {
                module: export.api_version,
                host: SCRIPT_MODULE_API_VERSION,
            });
        }
        let mut registry = ScriptRegistry::new();
        unsafe {
            (export.register)(&mut registry);
        }
        let kinds = registry
            .kinds
            .into_iter()
            .map(|(name, create)| ScriptKindSlot { name, factory: ScriptFactory::Native(create) })
            .collect();
        Ok(Self { generation, kinds, origin: ModuleOrigin::Dynamic(library) })
    }

    /// Builds an in-process module from plain factories. Used by tests and
    /// by hosts that embed a fixed script set without going through the
    /// compiler.
    pub fn hosted(
        generation: u64,
        kinds: Vec<(String, Box<dyn Fn() -> Box<dyn Script>>)>,
    ) -> Self {
        let kinds = kinds
            .into_iter()
            .map(|(name, factory)| ScriptKindSlot { name, factory: ScriptFactory::Hosted(factory) })
            .collect();
        Self { generation, kinds, origin: ModuleOrigin::Hosted }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn kind_names(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(|slot| slot.name.as_str())
    }

    pub fn kind_name(&self, index: usize) -> Option<&str> {
        self.kinds.get(index).map(|slot| slot.name.as_str())
    }

    /// Creates a fresh instance of the kind at `index` in discovery order.
    pub fn instantiate(&self, index: usize) -> Result<Box<dyn Script>, ModuleError> {
        let slot = self
            .kinds
            .get(index)
            .ok_or_else(|| ModuleError::Load(anyhow!("script kind index {index} out of range")))?;
        match &slot.factory {
            ScriptFactory::Hosted(factory) => Ok(factory()),
            ScriptFactory::Native(create) => {
                let handle = unsafe { create() };
                if handle.is_null() {
                    return Err(ModuleError::NullInstance(slot.name.clone()));
                }
                Ok(unsafe { handle.into_box() })
            }
        }
    }

    /// Releases the module's code and state. For dynamic modules this is a
    /// real unload (`dlclose`); the host must not retain any pointer into the
    /// module past this call. Factories and instances are gone by the time
    /// the library closes because `kinds` is dropped first.
    pub fn unload(self) -> Result<(), ModuleError> {
        let ScriptModule { kinds, origin, .. } = self;
        drop(kinds);
        match origin {
            ModuleOrigin::Hosted => Ok(()),
            ModuleOrigin::Dynamic(library) => {
                library.close().map_err(|err| ModuleError::Unload(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptContext;
    use anyhow::Result;

    #[derive(Default)]
    struct Noop;

    impl Script for Noop {
        fn on_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registry_preserves_registration_order() {
        let mut registry = ScriptRegistry::new();
        registry.register::<Noop>("Beta");
        registry.register::<Noop>("Alpha");
        let names: Vec<&str> = registry.kinds.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Alpha"], "discovery order is registration order");
    }

    #[test]
    fn hosted_module_instantiates_by_index() {
        let module = ScriptModule::hosted(
            3,
            vec![("Noop".to_string(), Box::new(|| Box::new(Noop) as Box<dyn Script>))],
        );
        assert_eq!(module.generation(), 3);
        assert_eq!(module.kind_name(0), Some("Noop"));
        module.instantiate(0).expect("factory produces an instance");
        assert!(module.instantiate(1).is_err(), "out of range index is an error");
    }

    #[test]
    fn native_create_round_trips_through_handle() {
        let handle = unsafe { create_default::<Noop>() };
        assert!(!handle.is_null(), "factory returns a live handle");
        let _script = unsafe { handle.into_box() };
    }
}
