pub mod accessor;
pub mod bridge;
pub mod cli;
pub mod component;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod host;
pub mod module;
pub mod script;
pub mod time;
pub mod watch;

pub use accessor::{ComponentView, FieldValue};
pub use bridge::NativeBridge;
pub use component::{ComponentDescriptor, ComponentHandle, EntityId, FieldDescriptor, FieldType};
pub use engine::{EngineInterface, EngineLibrary};
pub use error::{BridgeError, ModuleError};
pub use host::{HostState, ScriptHost};
pub use module::{ScriptModule, ScriptRegistry, SCRIPT_MODULE_API_VERSION};
pub use script::{Script, ScriptContext};
