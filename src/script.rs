use crate::accessor::ComponentView;
use crate::bridge::NativeBridge;
use crate::component::EntityId;
use crate::error::BridgeError;
use anyhow::Result;
use std::mem;
use std::ptr;

/// The lifecycle contract every script kind implements.
///
/// Hooks run in a strict order for each instance: `on_init` once right after
/// binding, `on_start` once after every instance in the reload batch has
/// been initialized, `on_update` once per frame, `on_destroy` once when the
/// instance is retired (explicitly or by a reload superseding its module).
/// An instance is bound to exactly one entity for its whole lifetime; a new
/// entity means a new instance.
pub trait Script {
    fn on_init(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_start(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<()> {
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Per-hook view of the world handed to a script: the entity it is bound to
/// plus the public bridge surface scripts are allowed to call.
pub struct ScriptContext<'a> {
    entity: EntityId,
    bridge: &'a NativeBridge,
}

impl<'a> ScriptContext<'a> {
    pub fn new(entity: EntityId, bridge: &'a NativeBridge) -> Self {
        Self { entity, bridge }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn has_component(&self, kind: &str) -> bool {
        self.bridge.has_component(self.entity, kind)
    }

    /// Typed view of this entity's `kind` component. Ensure-present: the
    /// engine allocates the component if it is missing. The view must not be
    /// held across frames; resolve it again on each access.
    pub fn component(&self, kind: &str) -> Result<ComponentView<'a>, BridgeError> {
        self.bridge.component_view(self.entity, kind)
    }

    pub fn log(&self, message: impl AsRef<str>) {
        println!("[script] entity {}: {}", self.entity, message.as_ref());
    }
}

/// FFI-safe carrier for a boxed script crossing the module boundary. Both
/// sides are built by the same compiler against the same host crate, which
/// is what makes the fat-pointer transmute sound.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScriptHandle {
    data: *mut (),
    vtable: *mut (),
}

impl ScriptHandle {
    pub const fn null() -> Self {
        Self { data: ptr::null_mut(), vtable: ptr::null_mut() }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null() || self.vtable.is_null()
    }

    /// # Safety
    /// The caller transfers ownership of `script`; the handle must be turned
    /// back into a box exactly once via [`Self::into_box`].
    pub unsafe fn from_box(script: Box<dyn Script>) -> Self {
        Self::from_raw(Box::into_raw(script))
    }

    /// # Safety
    /// `raw` must be a valid fat pointer to a `dyn Script`.
    pub unsafe fn from_raw(raw: *mut dyn Script) -> Self {
        let erased: (*mut (), *mut ()) = mem::transmute(raw);
        Self { data: erased.0, vtable: erased.1 }
    }

    /// # Safety
    /// The handle must originate from [`Self::from_box`]/[`Self::from_raw`]
    /// and must not be null.
    pub unsafe fn into_raw(self) -> *mut dyn Script {
        mem::transmute((self.data, self.vtable))
    }

    /// # Safety
    /// Same conditions as [`Self::into_raw`]; consumes ownership.
    pub unsafe fn into_box(self) -> Box<dyn Script> {
        Box::from_raw(self.into_raw())
    }
}
