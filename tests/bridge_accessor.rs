use shrike::accessor::FieldValue;
use shrike::bridge::NativeBridge;
use shrike::component::{
    ComponentDescriptor, ComponentHandle, EntityId, FieldDescriptor, FieldType,
};
use shrike::engine::EngineInterface;
use shrike::error::BridgeError;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr;
use std::rc::Rc;

/// In-memory stand-in for the native component store: real byte buffers,
/// ensure-present resolution, and writes routed by (entity, kind).
struct FakeEngine {
    descriptors: Vec<ComponentDescriptor>,
    storage: RefCell<HashMap<(i32, String), Box<[u8]>>>,
    entities: Vec<EntityId>,
    enumerations: Cell<usize>,
    deny_resolution: Cell<bool>,
}

impl FakeEngine {
    fn new(descriptors: Vec<ComponentDescriptor>, entities: Vec<i32>) -> Self {
        Self {
            descriptors,
            storage: RefCell::new(HashMap::new()),
            entities: entities.into_iter().map(EntityId).collect(),
            enumerations: Cell::new(0),
            deny_resolution: Cell::new(false),
        }
    }

    fn kind_size(&self, kind: &str) -> Option<usize> {
        self.descriptors.iter().find(|d| d.name == kind).map(|d| d.size)
    }

    fn raw_bytes(&self, entity: i32, kind: &str) -> Option<Vec<u8>> {
        self.storage.borrow().get(&(entity, kind.to_string())).map(|b| b.to_vec())
    }
}

impl EngineInterface for FakeEngine {
    fn component_kinds(&self) -> Result<Vec<ComponentDescriptor>, BridgeError> {
        self.enumerations.set(self.enumerations.get() + 1);
        Ok(self.descriptors.clone())
    }

    fn has_component(&self, entity: EntityId, kind: &str) -> bool {
        self.storage.borrow().contains_key(&(entity.0, kind.to_string()))
    }

    fn resolve_component(&self, entity: EntityId, kind: &str) -> ComponentHandle {
        if self.deny_resolution.get() {
            return ComponentHandle::unresolved(entity);
        }
        let Some(size) = self.kind_size(kind) else {
            return ComponentHandle::unresolved(entity);
        };
        let mut storage = self.storage.borrow_mut();
        let buf = storage
            .entry((entity.0, kind.to_string()))
            .or_insert_with(|| vec![0u8; size].into_boxed_slice());
        ComponentHandle { entity, raw: buf.as_mut_ptr() }
    }

    unsafe fn read_raw(&self, handle: ComponentHandle, offset: usize, buf: &mut [u8]) {
        ptr::copy_nonoverlapping(handle.raw.add(offset), buf.as_mut_ptr(), buf.len());
    }

    unsafe fn write_raw(&self, entity: EntityId, kind: &str, offset: usize, bytes: &[u8]) {
        let Some(size) = self.kind_size(kind) else {
            return;
        };
        let mut storage = self.storage.borrow_mut();
        let buf = storage
            .entry((entity.0, kind.to_string()))
            .or_insert_with(|| vec![0u8; size].into_boxed_slice());
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn entities(&self) -> Vec<EntityId> {
        self.entities.clone()
    }
}

fn f32_field(name: &str, offset: usize) -> FieldDescriptor {
    FieldDescriptor { name: name.to_string(), offset, ty: FieldType::F32, size: 4 }
}

fn world_descriptors() -> Vec<ComponentDescriptor> {
    vec![
        ComponentDescriptor {
            name: "Transform".to_string(),
            size: 8,
            fields: vec![f32_field("x", 0), f32_field("y", 4)],
        },
        ComponentDescriptor {
            name: "Velocity".to_string(),
            size: 8,
            fields: vec![f32_field("vx", 0), f32_field("vy", 4)],
        },
        ComponentDescriptor {
            name: "Health".to_string(),
            size: 4,
            fields: vec![FieldDescriptor {
                name: "hp".to_string(),
                offset: 0,
                ty: FieldType::I32,
                size: 4,
            }],
        },
    ]
}

fn world() -> (Rc<FakeEngine>, NativeBridge) {
    let engine = Rc::new(FakeEngine::new(world_descriptors(), vec![1, 2]));
    let bridge = NativeBridge::new(engine.clone());
    (engine, bridge)
}

#[test]
fn typed_fields_round_trip_through_native_storage() {
    let (engine, bridge) = world();
    let view = bridge.component_view(EntityId(1), "Transform").expect("view resolves");
    view.set_f32("x", 12.5).expect("write x");
    view.set_f32("y", -3.0).expect("write y");
    assert_eq!(view.get_f32("x").expect("read x"), 12.5);
    assert_eq!(view.get_f32("y").expect("read y"), -3.0);

    let bytes = engine.raw_bytes(1, "Transform").expect("storage allocated");
    assert_eq!(&bytes[0..4], &12.5f32.to_le_bytes(), "write landed in native-order memory");
    assert_eq!(&bytes[4..8], &(-3.0f32).to_le_bytes());
}

#[test]
fn fields_resolve_by_descriptor_offset_not_declaration_order() {
    let (_engine, bridge) = world();
    let view = bridge.component_view(EntityId(1), "Velocity").expect("view resolves");
    view.set_f32("vy", 9.0).expect("write vy");
    assert_eq!(view.get_f32("vy").expect("read vy"), 9.0);
    assert_eq!(view.get_f32("vx").expect("read vx"), 0.0, "untouched field stays zeroed");
}

#[test]
fn unknown_kind_is_rejected_before_touching_storage() {
    let (engine, bridge) = world();
    let err = bridge.component_view(EntityId(1), "Gravity").expect_err("unknown kind fails");
    assert!(matches!(err, BridgeError::UnknownKind(ref kind) if kind == "Gravity"), "got {err:?}");
    assert!(engine.raw_bytes(1, "Gravity").is_none(), "nothing was allocated for the bad kind");
}

#[test]
fn unknown_field_is_rejected() {
    let (_engine, bridge) = world();
    let view = bridge.component_view(EntityId(1), "Transform").expect("view resolves");
    let err = view.get("z").expect_err("unknown field fails");
    assert!(
        matches!(err, BridgeError::UnknownField { ref kind, ref field } if kind == "Transform" && field == "z"),
        "got {err:?}"
    );
}

#[test]
fn type_mismatch_is_rejected_without_writing() {
    let (engine, bridge) = world();
    let view = bridge.component_view(EntityId(1), "Health").expect("view resolves");
    view.set_i32("hp", 100).expect("typed write");
    let err = view.set("hp", FieldValue::F32(1.0)).expect_err("f32 into i32 field fails");
    assert!(matches!(err, BridgeError::TypeMismatch { .. }), "got {err:?}");
    assert_eq!(view.get_i32("hp").expect("read hp"), 100, "rejected write left the value intact");
    let err = view.get_f32("hp").expect_err("typed read with the wrong type fails");
    assert!(matches!(err, BridgeError::TypeMismatch { .. }), "got {err:?}");
    assert_eq!(engine.enumerations.get(), 1);
}

#[test]
fn raw_access_is_bounds_checked_against_component_size() {
    let (_engine, bridge) = world();
    let layout = bridge.layout("Health").expect("layout resolves");
    let handle = bridge.resolve_component_handle(EntityId(1), "Health").expect("handle resolves");

    bridge.write_raw(&layout, handle, 0, &[1, 2, 3, 4]).expect("in-bounds write");
    bridge.read_raw(&layout, handle, 0, 4).expect("in-bounds read");

    let err = bridge.write_raw(&layout, handle, 4, &[0; 4]).expect_err("write past the end fails");
    assert!(
        matches!(err, BridgeError::OutOfBounds { offset: 4, len: 4, size: 4, .. }),
        "got {err:?}"
    );
    let err = bridge.read_raw(&layout, handle, 2, 4).expect_err("straddling read fails");
    assert!(matches!(err, BridgeError::OutOfBounds { .. }), "got {err:?}");
}

#[test]
fn overflowing_offsets_fail_as_out_of_bounds() {
    let (_engine, bridge) = world();
    let layout = bridge.layout("Health").expect("layout resolves");
    let handle = bridge.resolve_component_handle(EntityId(1), "Health").expect("handle resolves");

    let err = bridge.read_raw(&layout, handle, usize::MAX - 2, 4).expect_err("wrapped range fails");
    assert!(matches!(err, BridgeError::OutOfBounds { .. }), "got {err:?}");
    let err = bridge.write_raw(&layout, handle, usize::MAX, &[0]).expect_err("wrapped write fails");
    assert!(matches!(err, BridgeError::OutOfBounds { .. }), "got {err:?}");
}

#[test]
fn layouts_are_cached_after_one_enumeration() {
    let (engine, bridge) = world();
    bridge.layout("Transform").expect("first layout");
    bridge.layout("Velocity").expect("second kind from the same enumeration");
    bridge.component_view(EntityId(1), "Transform").expect("view");
    bridge.component_view(EntityId(2), "Health").expect("other entity, other kind");
    assert_eq!(engine.enumerations.get(), 1, "descriptors are fetched once per process");
}

#[test]
fn resolution_ensures_the_component_is_present() {
    let (engine, bridge) = world();
    assert!(!bridge.has_component(EntityId(2), "Velocity"));
    let handle = bridge.resolve_component_handle(EntityId(2), "Velocity").expect("handle resolves");
    assert!(!handle.is_null());
    assert!(bridge.has_component(EntityId(2), "Velocity"), "resolution allocated storage");
    assert_eq!(engine.raw_bytes(2, "Velocity").expect("allocated").len(), 8);
}

#[test]
fn unresolved_handle_reads_zero_and_writes_by_identity() {
    let (engine, bridge) = world();
    engine.deny_resolution.set(true);
    let view = bridge.component_view(EntityId(1), "Transform").expect("view still builds");
    assert!(!view.is_resolved());
    assert_eq!(view.get_f32("x").expect("null read defaults"), 0.0);
    assert_eq!(view.get("y").expect("null read defaults"), FieldValue::F32(0.0));

    view.set_f32("x", 5.0).expect("write routed by identity succeeds");
    let bytes = engine.raw_bytes(1, "Transform").expect("engine applied the identity write");
    assert_eq!(&bytes[0..4], &5.0f32.to_le_bytes());

    engine.deny_resolution.set(false);
    let view = bridge.component_view(EntityId(1), "Transform").expect("view resolves now");
    assert!(view.is_resolved());
    assert_eq!(view.get_f32("x").expect("read x"), 5.0, "earlier identity write is visible");

    engine.deny_resolution.set(true);
    let layout = bridge.layout("Transform").expect("layout");
    let handle = ComponentHandle::unresolved(EntityId(1));
    let err = bridge.read_raw(&layout, handle, 0, 4).expect_err("raw read needs a live handle");
    assert!(matches!(err, BridgeError::UnresolvedHandle { .. }), "got {err:?}");
}

#[test]
fn entity_snapshot_comes_from_the_engine() {
    let (_engine, bridge) = world();
    assert_eq!(bridge.entities(), vec![EntityId(1), EntityId(2)]);
}
