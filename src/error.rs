use thiserror::Error;

/// Failures raised by the native bridge and the typed accessors. Accessor
/// misuse (`UnknownField`, `OutOfBounds`) fails fast rather than clamping.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown component kind '{0}'")]
    UnknownKind(String),
    #[error("unknown field '{field}' on component '{kind}'")]
    UnknownField { kind: String, field: String },
    #[error("out of bounds on '{kind}': offset {offset} + {len} bytes exceeds component size {size}")]
    OutOfBounds { kind: String, offset: usize, len: usize, size: usize },
    #[error("field '{field}' on '{kind}' is {expected}, got {got}")]
    TypeMismatch { kind: String, field: String, expected: &'static str, got: &'static str },
    #[error("component handle for '{kind}' on entity {entity} is unresolved")]
    UnresolvedHandle { kind: String, entity: i32 },
    #[error("malformed descriptor for '{kind}': {detail}")]
    MalformedDescriptor { kind: String, detail: String },
    #[error("engine introspection failed: {0}")]
    Introspection(String),
}

/// Failures in the module reload pipeline. Compilation failures leave the
/// host degraded; unload failures are surfaced as warnings and the pipeline
/// proceeds.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("script compilation failed:\n{diagnostics}")]
    Compilation { diagnostics: String },
    #[error("module unload failed: {0}")]
    Unload(String),
    #[error("module targets script API v{module}, host exports v{host}")]
    ApiMismatch { module: u32, host: u32 },
    #[error("script kind '{0}' returned a null instance")]
    NullInstance(String),
    #[error(transparent)]
    Load(#[from] anyhow::Error),
}
