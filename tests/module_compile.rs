use shrike::bridge::NativeBridge;
use shrike::compiler::{CargoModuleLoader, ModuleLoader};
use shrike::component::{ComponentDescriptor, ComponentHandle, EntityId};
use shrike::engine::EngineInterface;
use shrike::error::{BridgeError, ModuleError};
use shrike::host::ScriptHost;
use shrike::script::{Script, ScriptContext};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tempfile::tempdir;

// These tests drive the real compiler pipeline: they stage a crate, run
// cargo, and dlopen the artifact. They are ignored by default because they
// need a toolchain and registry access for the staged crate's dependencies;
// run them with `cargo test -- --ignored`.

struct NullEngine;

impl EngineInterface for NullEngine {
    fn component_kinds(&self) -> Result<Vec<ComponentDescriptor>, BridgeError> {
        Ok(Vec::new())
    }

    fn has_component(&self, _entity: EntityId, _kind: &str) -> bool {
        false
    }

    fn resolve_component(&self, entity: EntityId, _kind: &str) -> ComponentHandle {
        ComponentHandle::unresolved(entity)
    }

    unsafe fn read_raw(&self, _handle: ComponentHandle, _offset: usize, _buf: &mut [u8]) {}

    unsafe fn write_raw(&self, _entity: EntityId, _kind: &str, _offset: usize, _bytes: &[u8]) {}

    fn entities(&self) -> Vec<EntityId> {
        vec![EntityId(1)]
    }
}

fn host_crate_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

const COUNTER_SCRIPT: &str = r#"
use anyhow::Result;
use shrike::module::ScriptRegistry;
use shrike::script::{Script, ScriptContext};

#[derive(Default)]
struct Counter {
    frames: u32,
}

impl Script for Counter {
    fn on_update(&mut self, ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<()> {
        self.frames += 1;
        ctx.log(format!("frame {}", self.frames));
        Ok(())
    }
}

pub fn register(registry: &mut ScriptRegistry) {
    registry.register::<Counter>("Counter");
}
"#;

#[test]
#[ignore]
fn compiles_loads_and_runs_a_real_script_module() {
    let scripts = tempdir().expect("temp scripts dir");
    let stage = tempdir().expect("temp stage dir");
    fs::write(scripts.path().join("counter.rs"), COUNTER_SCRIPT).expect("write script source");

    let mut loader = CargoModuleLoader::new(stage.path(), host_crate_dir(), true);
    let sources = vec![scripts.path().join("counter.rs")];
    let module = loader.load(&sources, 1).expect("stage, build, and load the module");

    assert_eq!(module.generation(), 1);
    assert_eq!(module.kind_names().collect::<Vec<_>>(), vec!["Counter"]);

    let engine = Rc::new(NullEngine);
    let bridge = NativeBridge::new(engine);
    let mut script = module.instantiate(0).expect("factory produces an instance");
    let mut ctx = ScriptContext::new(EntityId(1), &bridge);
    script.on_init(&mut ctx).expect("init succeeds");
    script.on_update(&mut ctx, 0.016).expect("update succeeds");
    drop(script);
    drop(ctx);

    module.unload().expect("library closes cleanly");
}

#[test]
#[ignore]
fn compile_errors_surface_their_diagnostics() {
    let scripts = tempdir().expect("temp scripts dir");
    let stage = tempdir().expect("temp stage dir");
    fs::write(scripts.path().join("broken.rs"), "pub fn register(_: &mut) {").expect("write source");

    let mut loader = CargoModuleLoader::new(stage.path(), host_crate_dir(), true);
    let sources = vec![scripts.path().join("broken.rs")];
    let err = loader.load(&sources, 1).expect_err("broken source fails to build");
    match err {
        ModuleError::Compilation { diagnostics } => {
            assert!(diagnostics.contains("error"), "cargo diagnostics preserved: {diagnostics}");
        }
        other => panic!("expected a compilation error, got {other:?}"),
    }
}

#[test]
#[ignore]
fn dropping_the_host_with_a_live_module_is_safe() {
    let scripts = tempdir().expect("temp scripts dir");
    let stage = tempdir().expect("temp stage dir");
    fs::write(scripts.path().join("counter.rs"), COUNTER_SCRIPT).expect("write script source");

    let engine = Rc::new(NullEngine);
    let bridge = Rc::new(NativeBridge::new(engine));
    let loader = CargoModuleLoader::new(stage.path(), host_crate_dir(), true);
    let mut host = ScriptHost::new(
        bridge,
        Box::new(loader),
        scripts.path(),
        "rs",
        Duration::from_millis(200),
    );
    host.reload();
    assert_eq!(host.instance_count(), 1, "one entity, one kind");
    host.update(0.016);
    // No explicit shutdown: the drop path must retire the instances before
    // the module's library closes, or their destructors run through freed
    // code.
    drop(host);
}

#[test]
#[ignore]
fn successive_generations_get_distinct_artifacts() {
    let scripts = tempdir().expect("temp scripts dir");
    let stage = tempdir().expect("temp stage dir");
    fs::write(scripts.path().join("counter.rs"), COUNTER_SCRIPT).expect("write script source");
    let sources = vec![scripts.path().join("counter.rs")];

    let mut loader = CargoModuleLoader::new(stage.path(), host_crate_dir(), true);
    let first = loader.load(&sources, 1).expect("first generation builds");
    let second = loader.load(&sources, 2).expect("second generation builds alongside the first");
    assert_eq!(first.generation(), 1);
    assert_eq!(second.generation(), 2);
    first.unload().expect("first generation unloads");
    second.unload().expect("second generation unloads");
}
