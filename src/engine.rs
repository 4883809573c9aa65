use crate::component::{
    ComponentDescriptor, ComponentHandle, EntityId, FieldDescriptor, FieldType,
};
use crate::error::BridgeError;
use anyhow::{Context, Result};
use libloading::Library;
use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::ptr;

/// Upper bound on one entity enumeration round-trip. The engine's snapshot
/// call writes into a caller-provided buffer of this many ids.
pub const ENTITY_SNAPSHOT_CAPACITY: usize = 1024;

/// The consumed capability set implemented by the external native engine.
///
/// Production code talks to the engine through [`EngineLibrary`]; tests
/// substitute an in-memory implementation. Raw reads and writes are `unsafe`
/// because the engine performs no bounds checking of its own; the bridge
/// validates every offset against the component descriptor before calling
/// down here.
pub trait EngineInterface {
    /// Enumerates every registered component kind with full field metadata.
    fn component_kinds(&self) -> Result<Vec<ComponentDescriptor>, BridgeError>;

    fn has_component(&self, entity: EntityId, kind: &str) -> bool;

    /// Resolves raw component storage for (entity, kind). Ensure-present
    /// semantics: if the entity lacks the component the engine allocates it
    /// as a side effect. A null pointer means the engine could not resolve
    /// storage; callers must tolerate that.
    fn resolve_component(&self, entity: EntityId, kind: &str) -> ComponentHandle;

    /// Copies `buf.len()` bytes starting at `offset` out of the component
    /// memory behind `handle`.
    ///
    /// # Safety
    /// `handle` must have been produced by [`Self::resolve_component`] on
    /// this engine, must still refer to a live entity, and `offset +
    /// buf.len()` must lie within the component per its descriptor.
    unsafe fn read_raw(&self, handle: ComponentHandle, offset: usize, buf: &mut [u8]);

    /// Writes `bytes` at `offset` into (entity, kind)'s component memory.
    /// The write is routed through the engine by identity rather than by
    /// pointer, so it lands even before a handle has been resolved.
    ///
    /// # Safety
    /// `offset + bytes.len()` must lie within the component per its
    /// descriptor; the engine applies the write without checking.
    unsafe fn write_raw(&self, entity: EntityId, kind: &str, offset: usize, bytes: &[u8]);

    /// Point-in-time snapshot of live entity ids. No subscription to
    /// creation or destruction events.
    fn entities(&self) -> Vec<EntityId>;
}

/// Field metadata record as returned by value from the engine ABI.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawFieldInfo {
    name: *const c_char,
    offset: i32,
    ty: i32,
    size: i32,
}

struct EngineSymbols {
    component_count: unsafe extern "C" fn() -> i32,
    component_name: unsafe extern "C" fn(i32) -> *const c_char,
    component_size: unsafe extern "C" fn(*const c_char) -> i32,
    field_count: unsafe extern "C" fn(*const c_char) -> i32,
    field_info: unsafe extern "C" fn(*const c_char, i32) -> RawFieldInfo,
    component_ptr: unsafe extern "C" fn(i32, *const c_char) -> *mut u8,
    has_component: unsafe extern "C" fn(i32, *const c_char) -> i32,
    all_entities: unsafe extern "C" fn(*mut i32, i32, *mut i32),
    write_component: unsafe extern "C" fn(i32, *const c_char, i32, *const u8, i32),
    run_program: unsafe extern "C" fn(i32, *const *const c_char) -> i32,
}

/// Production [`EngineInterface`]: resolves the engine's `Engine_*` C symbols
/// from its dynamic library. The library stays loaded for the lifetime of
/// this value; the raw function pointers never outlive it.
pub struct EngineLibrary {
    symbols: EngineSymbols,
    _library: Library,
}

impl EngineLibrary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let library = unsafe {
            Library::new(path).with_context(|| format!("loading engine library '{}'", path.display()))?
        };
        let symbols = unsafe {
            EngineSymbols {
                component_count: *library
                    .get(b"Engine_GetRegisteredComponentCount\0")
                    .context("resolving Engine_GetRegisteredComponentCount")?,
                component_name: *library
                    .get(b"Engine_GetRegisteredComponentName\0")
                    .context("resolving Engine_GetRegisteredComponentName")?,
                component_size: *library
                    .get(b"Engine_GetRegisteredComponentSize\0")
                    .context("resolving Engine_GetRegisteredComponentSize")?,
                field_count: *library
                    .get(b"Engine_GetComponentFieldCount\0")
                    .context("resolving Engine_GetComponentFieldCount")?,
                field_info: *library
                    .get(b"Engine_GetComponentFieldInfo\0")
                    .context("resolving Engine_GetComponentFieldInfo")?,
                component_ptr: *library
                    .get(b"Engine_GetComponentPtr\0")
                    .context("resolving Engine_GetComponentPtr")?,
                has_component: *library
                    .get(b"Engine_HasComponent\0")
                    .context("resolving Engine_HasComponent")?,
                all_entities: *library
                    .get(b"Engine_GetAllEntities\0")
                    .context("resolving Engine_GetAllEntities")?,
                write_component: *library
                    .get(b"Engine_WriteComponentData\0")
                    .context("resolving Engine_WriteComponentData")?,
                run_program: *library.get(b"RunProgram\0").context("resolving RunProgram")?,
            }
        };
        Ok(Self { symbols, _library: library })
    }

    /// Hands control to the engine's own run entry point, forwarding process
    /// arguments. Blocks until the engine returns; the return value is the
    /// engine's exit code.
    pub fn run(&self, args: &[String]) -> Result<i32> {
        let owned: Vec<CString> = args
            .iter()
            .map(|arg| CString::new(arg.as_str()).context("engine argument contains a NUL byte"))
            .collect::<Result<_>>()?;
        let argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
        let code = unsafe { (self.symbols.run_program)(argv.len() as i32, argv.as_ptr()) };
        Ok(code)
    }

    fn kind_cstring(kind: &str) -> Result<CString, BridgeError> {
        CString::new(kind)
            .map_err(|_| BridgeError::Introspection(format!("component name '{kind}' contains NUL")))
    }
}

impl EngineInterface for EngineLibrary {
    fn component_kinds(&self) -> Result<Vec<ComponentDescriptor>, BridgeError> {
        let count = unsafe { (self.symbols.component_count)() };
        let mut descriptors = Vec::with_capacity(count.max(0) as usize);
        for kind_index in 0..count {
            let name_ptr = unsafe { (self.symbols.component_name)(kind_index) };
            if name_ptr.is_null() {
                return Err(BridgeError::Introspection(format!(
                    "engine returned a null name for component index {kind_index}"
                )));
            }
            let name = unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy().into_owned();
            let c_name = Self::kind_cstring(&name)?;
            let size = unsafe { (self.symbols.component_size)(c_name.as_ptr()) };
            let field_count = unsafe { (self.symbols.field_count)(c_name.as_ptr()) };
            let mut fields = Vec::with_capacity(field_count.max(0) as usize);
            for field_index in 0..field_count {
                let info = unsafe { (self.symbols.field_info)(c_name.as_ptr(), field_index) };
                if info.name.is_null() {
                    return Err(BridgeError::Introspection(format!(
                        "engine returned a null field name for '{name}' index {field_index}"
                    )));
                }
                let field_name = unsafe { CStr::from_ptr(info.name) }.to_string_lossy().into_owned();
                let ty = FieldType::from_code(info.ty).ok_or_else(|| {
                    BridgeError::Introspection(format!(
                        "unknown field type code {} for '{name}.{field_name}'",
                        info.ty
                    ))
                })?;
                fields.push(FieldDescriptor {
                    name: field_name,
                    offset: info.offset as usize,
                    ty,
                    size: info.size as usize,
                });
            }
            descriptors.push(ComponentDescriptor { name, size: size as usize, fields });
        }
        Ok(descriptors)
    }

    fn has_component(&self, entity: EntityId, kind: &str) -> bool {
        let Ok(c_name) = Self::kind_cstring(kind) else {
            return false;
        };
        unsafe { (self.symbols.has_component)(entity.0, c_name.as_ptr()) != 0 }
    }

    fn resolve_component(&self, entity: EntityId, kind: &str) -> ComponentHandle {
        let Ok(c_name) = Self::kind_cstring(kind) else {
            return ComponentHandle::unresolved(entity);
        };
        let raw = unsafe { (self.symbols.component_ptr)(entity.0, c_name.as_ptr()) };
        ComponentHandle { entity, raw }
    }

    unsafe fn read_raw(&self, handle: ComponentHandle, offset: usize, buf: &mut [u8]) {
        ptr::copy_nonoverlapping(handle.raw.add(offset), buf.as_mut_ptr(), buf.len());
    }

    unsafe fn write_raw(&self, entity: EntityId, kind: &str, offset: usize, bytes: &[u8]) {
        let Ok(c_name) = Self::kind_cstring(kind) else {
            return;
        };
        (self.symbols.write_component)(
            entity.0,
            c_name.as_ptr(),
            offset as i32,
            bytes.as_ptr(),
            bytes.len() as i32,
        );
    }

    fn entities(&self) -> Vec<EntityId> {
        let mut buf = [0i32; ENTITY_SNAPSHOT_CAPACITY];
        let mut written = 0i32;
        unsafe {
            (self.symbols.all_entities)(buf.as_mut_ptr(), buf.len() as i32, &mut written);
        }
        let count = (written.max(0) as usize).min(buf.len());
        buf[..count].iter().map(|id| EntityId(*id)).collect()
    }
}
