use crate::error::BridgeError;
use std::collections::HashMap;
use std::fmt;

/// Identity handle for an engine-owned entity. The native engine allocates
/// these; the scripting side only observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub i32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field type codes used by the engine's introspection ABI. Every variant has
/// a fixed byte width that must match the field's declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    F32,
    F64,
    I32,
    I64,
    U8,
    Bool,
}

impl FieldType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FieldType::F32),
            1 => Some(FieldType::F64),
            2 => Some(FieldType::I32),
            3 => Some(FieldType::I64),
            4 => Some(FieldType::U8),
            5 => Some(FieldType::Bool),
            _ => None,
        }
    }

    pub fn width(self) -> usize {
        match self {
            FieldType::F32 | FieldType::I32 => 4,
            FieldType::F64 | FieldType::I64 => 8,
            FieldType::U8 | FieldType::Bool => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldType::F32 => "f32",
            FieldType::F64 => "f64",
            FieldType::I32 => "i32",
            FieldType::I64 => "i64",
            FieldType::U8 => "u8",
            FieldType::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset: usize,
    pub ty: FieldType,
    pub size: usize,
}

/// Component schema as reported by engine introspection. Immutable for a
/// process run; the bridge caches the derived [`ComponentLayout`] per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDescriptor {
    pub name: String,
    pub size: usize,
    pub fields: Vec<FieldDescriptor>,
}

/// Non-owning reference to one entity's instance of one component kind.
/// Valid only while the underlying entity lives in the native store; never
/// retained across a reload.
#[derive(Debug, Clone, Copy)]
pub struct ComponentHandle {
    pub entity: EntityId,
    pub raw: *mut u8,
}

impl ComponentHandle {
    pub fn unresolved(entity: EntityId) -> Self {
        Self { entity, raw: std::ptr::null_mut() }
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }
}

/// Validated component schema with a by-name field index. Built once per kind
/// from the engine descriptor, then reused for every access.
#[derive(Debug)]
pub struct ComponentLayout {
    name: String,
    size: usize,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

impl ComponentLayout {
    pub fn from_descriptor(descriptor: &ComponentDescriptor) -> Result<Self, BridgeError> {
        let mut index = HashMap::with_capacity(descriptor.fields.len());
        for (slot, field) in descriptor.fields.iter().enumerate() {
            if field.size != field.ty.width() {
                return Err(BridgeError::MalformedDescriptor {
                    kind: descriptor.name.clone(),
                    detail: format!(
                        "field '{}' declares size {} but type {} is {} bytes",
                        field.name,
                        field.size,
                        field.ty.label(),
                        field.ty.width()
                    ),
                });
            }
            if field.offset + field.size > descriptor.size {
                return Err(BridgeError::MalformedDescriptor {
                    kind: descriptor.name.clone(),
                    detail: format!(
                        "field '{}' at offset {} with size {} exceeds component size {}",
                        field.name, field.offset, field.size, descriptor.size
                    ),
                });
            }
            if index.insert(field.name.clone(), slot).is_some() {
                return Err(BridgeError::MalformedDescriptor {
                    kind: descriptor.name.clone(),
                    detail: format!("duplicate field '{}'", field.name),
                });
            }
        }
        Ok(Self {
            name: descriptor.name.clone(),
            size: descriptor.size,
            fields: descriptor.fields.clone(),
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|slot| &self.fields[*slot])
    }
}
