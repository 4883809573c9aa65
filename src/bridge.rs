use crate::accessor::ComponentView;
use crate::component::{ComponentDescriptor, ComponentHandle, ComponentLayout, EntityId};
use crate::engine::EngineInterface;
use crate::error::BridgeError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Typed façade over the native engine's introspection and raw memory API.
///
/// Layouts are resolved from engine descriptors the first time a kind is
/// touched and cached for the rest of the process run; the engine does not
/// redefine component schemas at runtime. All raw access is bounds-checked
/// against the cached layout before it reaches the engine.
pub struct NativeBridge {
    engine: Rc<dyn EngineInterface>,
    layouts: RefCell<HashMap<String, Rc<ComponentLayout>>>,
}

impl NativeBridge {
    pub fn new(engine: Rc<dyn EngineInterface>) -> Self {
        Self { engine, layouts: RefCell::new(HashMap::new()) }
    }

    /// Enumerates registered component kinds straight from the engine. No
    /// side effects; the per-kind layout cache is populated lazily instead.
    pub fn component_kinds(&self) -> Result<Vec<ComponentDescriptor>, BridgeError> {
        self.engine.component_kinds()
    }

    /// Cached layout for `kind`. The first lookup pulls every descriptor the
    /// engine knows about in one round-trip.
    pub fn layout(&self, kind: &str) -> Result<Rc<ComponentLayout>, BridgeError> {
        if let Some(layout) = self.layouts.borrow().get(kind) {
            return Ok(layout.clone());
        }
        let descriptors = self.engine.component_kinds()?;
        let mut cache = self.layouts.borrow_mut();
        for descriptor in &descriptors {
            if !cache.contains_key(&descriptor.name) {
                let layout = Rc::new(ComponentLayout::from_descriptor(descriptor)?);
                cache.insert(descriptor.name.clone(), layout);
            }
        }
        cache.get(kind).cloned().ok_or_else(|| BridgeError::UnknownKind(kind.to_string()))
    }

    pub fn has_component(&self, entity: EntityId, kind: &str) -> bool {
        self.engine.has_component(entity, kind)
    }

    /// Resolves the raw storage handle for (entity, kind).
    ///
    /// Ensure-present semantics: if the entity lacks the component, the
    /// engine allocates storage for it as a side effect. This is not a pure
    /// query. The returned handle may still be unresolved (null) when the
    /// engine cannot provide storage; reads through such a handle yield
    /// zero-value defaults at the accessor layer.
    pub fn resolve_component_handle(
        &self,
        entity: EntityId,
        kind: &str,
    ) -> Result<ComponentHandle, BridgeError> {
        // Validates the kind against the descriptor cache before touching
        // native storage, so unknown kinds fail fast instead of allocating.
        self.layout(kind)?;
        Ok(self.engine.resolve_component(entity, kind))
    }

    /// Bounds-checked raw read of `len` bytes at `offset`.
    pub fn read_raw(
        &self,
        layout: &ComponentLayout,
        handle: ComponentHandle,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, BridgeError> {
        self.check_bounds(layout, offset, len)?;
        if handle.is_null() {
            return Err(BridgeError::UnresolvedHandle {
                kind: layout.name().to_string(),
                entity: handle.entity.0,
            });
        }
        let mut buf = vec![0u8; len];
        unsafe {
            self.engine.read_raw(handle, offset, &mut buf);
        }
        Ok(buf)
    }

    /// Bounds-checked raw write. Applied to native-owned memory, visible to
    /// the engine on its next read; no synchronization is performed here.
    /// The engine routes writes by (entity, kind), so this succeeds even
    /// when the handle pointer has not been resolved yet.
    pub fn write_raw(
        &self,
        layout: &ComponentLayout,
        handle: ComponentHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), BridgeError> {
        self.check_bounds(layout, offset, bytes.len())?;
        unsafe {
            self.engine.write_raw(handle.entity, layout.name(), offset, bytes);
        }
        Ok(())
    }

    /// Point-in-time snapshot of live entity ids.
    pub fn entities(&self) -> Vec<EntityId> {
        self.engine.entities()
    }

    /// Descriptor-driven field view of (entity, kind). Resolves the handle
    /// eagerly (ensure-present); field reads through a still-null handle
    /// return zero-value defaults.
    pub fn component_view(&self, entity: EntityId, kind: &str) -> Result<ComponentView<'_>, BridgeError> {
        let layout = self.layout(kind)?;
        let handle = self.engine.resolve_component(entity, kind);
        Ok(ComponentView::new(self, layout, handle))
    }

    fn check_bounds(
        &self,
        layout: &ComponentLayout,
        offset: usize,
        len: usize,
    ) -> Result<(), BridgeError> {
        // checked_add: a wrapped offset + len must fail, not slip past.
        if offset.checked_add(len).map_or(true, |end| end > layout.size()) {
            return Err(BridgeError::OutOfBounds {
                kind: layout.name().to_string(),
                offset,
                len,
                size: layout.size(),
            });
        }
        Ok(())
    }
}
