use crate::bridge::NativeBridge;
use crate::component::{ComponentHandle, ComponentLayout, EntityId, FieldType};
use crate::error::BridgeError;
use std::rc::Rc;

/// A typed field value moving through the descriptor-driven codec. The wire
/// form is fixed-width little-endian, matching the engine's native struct
/// layout; the declared field width is authoritative on both paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),
    U8(u8),
    Bool(bool),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::F32(_) => FieldType::F32,
            FieldValue::F64(_) => FieldType::F64,
            FieldValue::I32(_) => FieldType::I32,
            FieldValue::I64(_) => FieldType::I64,
            FieldValue::U8(_) => FieldType::U8,
            FieldValue::Bool(_) => FieldType::Bool,
        }
    }

    /// Zero-value default for a field type, returned when a component handle
    /// has not resolved yet. Scripts must tolerate "component not ready".
    pub fn zero(ty: FieldType) -> Self {
        match ty {
            FieldType::F32 => FieldValue::F32(0.0),
            FieldType::F64 => FieldValue::F64(0.0),
            FieldType::I32 => FieldValue::I32(0),
            FieldType::I64 => FieldValue::I64(0),
            FieldType::U8 => FieldValue::U8(0),
            FieldType::Bool => FieldValue::Bool(false),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            FieldValue::F32(v) => v.to_le_bytes().to_vec(),
            FieldValue::F64(v) => v.to_le_bytes().to_vec(),
            FieldValue::I32(v) => v.to_le_bytes().to_vec(),
            FieldValue::I64(v) => v.to_le_bytes().to_vec(),
            FieldValue::U8(v) => vec![v],
            FieldValue::Bool(v) => vec![v as u8],
        }
    }

    pub fn decode(ty: FieldType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ty.width() {
            return None;
        }
        Some(match ty {
            FieldType::F32 => FieldValue::F32(f32::from_le_bytes(bytes.try_into().ok()?)),
            FieldType::F64 => FieldValue::F64(f64::from_le_bytes(bytes.try_into().ok()?)),
            FieldType::I32 => FieldValue::I32(i32::from_le_bytes(bytes.try_into().ok()?)),
            FieldType::I64 => FieldValue::I64(i64::from_le_bytes(bytes.try_into().ok()?)),
            FieldType::U8 => FieldValue::U8(bytes[0]),
            FieldType::Bool => FieldValue::Bool(bytes[0] != 0),
        })
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            FieldValue::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            FieldValue::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// Typed, descriptor-driven view over one entity's instance of one component
/// kind. Field offsets come from the cached layout, never from source
/// constants. Views are cheap; scripts create them per access and never hold
/// one across a reload boundary.
pub struct ComponentView<'a> {
    bridge: &'a NativeBridge,
    layout: Rc<ComponentLayout>,
    handle: ComponentHandle,
}

impl std::fmt::Debug for ComponentView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentView")
            .field("layout", &self.layout)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<'a> ComponentView<'a> {
    pub(crate) fn new(bridge: &'a NativeBridge, layout: Rc<ComponentLayout>, handle: ComponentHandle) -> Self {
        Self { bridge, layout, handle }
    }

    pub fn kind(&self) -> &str {
        self.layout.name()
    }

    pub fn entity(&self) -> EntityId {
        self.handle.entity
    }

    /// True once the underlying native storage has been resolved. While
    /// false, reads yield zero-value defaults and writes are still routed
    /// through the engine by identity.
    pub fn is_resolved(&self) -> bool {
        !self.handle.is_null()
    }

    pub fn get(&self, field: &str) -> Result<FieldValue, BridgeError> {
        let descriptor = self.layout.field(field).ok_or_else(|| BridgeError::UnknownField {
            kind: self.layout.name().to_string(),
            field: field.to_string(),
        })?;
        if self.handle.is_null() {
            return Ok(FieldValue::zero(descriptor.ty));
        }
        let bytes = self.bridge.read_raw(&self.layout, self.handle, descriptor.offset, descriptor.size)?;
        FieldValue::decode(descriptor.ty, &bytes).ok_or_else(|| BridgeError::MalformedDescriptor {
            kind: self.layout.name().to_string(),
            detail: format!("field '{field}' decoded with unexpected width {}", bytes.len()),
        })
    }

    pub fn set(&self, field: &str, value: FieldValue) -> Result<(), BridgeError> {
        let descriptor = self.layout.field(field).ok_or_else(|| BridgeError::UnknownField {
            kind: self.layout.name().to_string(),
            field: field.to_string(),
        })?;
        if value.field_type() != descriptor.ty {
            return Err(BridgeError::TypeMismatch {
                kind: self.layout.name().to_string(),
                field: field.to_string(),
                expected: descriptor.ty.label(),
                got: value.field_type().label(),
            });
        }
        self.bridge.write_raw(&self.layout, self.handle, descriptor.offset, &value.encode())
    }

    pub fn get_f32(&self, field: &str) -> Result<f32, BridgeError> {
        let value = self.get(field)?;
        value.as_f32().ok_or_else(|| self.type_mismatch(field, FieldType::F32, value))
    }

    pub fn set_f32(&self, field: &str, value: f32) -> Result<(), BridgeError> {
        self.set(field, FieldValue::F32(value))
    }

    pub fn get_i32(&self, field: &str) -> Result<i32, BridgeError> {
        let value = self.get(field)?;
        value.as_i32().ok_or_else(|| self.type_mismatch(field, FieldType::I32, value))
    }

    pub fn set_i32(&self, field: &str, value: i32) -> Result<(), BridgeError> {
        self.set(field, FieldValue::I32(value))
    }

    fn type_mismatch(&self, field: &str, expected: FieldType, got: FieldValue) -> BridgeError {
        BridgeError::TypeMismatch {
            kind: self.layout.name().to_string(),
            field: field.to_string(),
            expected: expected.label(),
            got: got.field_type().label(),
        }
    }
}
