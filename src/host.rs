use crate::bridge::NativeBridge;
use crate::component::EntityId;
use crate::compiler::ModuleLoader;
use crate::module::ScriptModule;
use crate::script::{Script, ScriptContext};
use crate::watch::ScriptSourceWatcher;
use anyhow::Result;
use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Reload coordinator state. `Degraded` means the most recent reload failed;
/// whatever module was active before the failing attempt began has already
/// been unloaded, so the host runs with zero scripts until a reload
/// succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Reloading,
    Degraded,
}

struct ScriptInstance {
    entity: EntityId,
    kind: String,
    script: Box<dyn Script>,
    failed: bool,
}

/// Owns the active script module generation and every live script instance.
///
/// A file change under the script directory schedules a debounced reload;
/// the reload pipeline is strictly ordered: destroy all instances, discard
/// the list, unload the old module, re-enumerate sources, compile them as
/// one unit, load the fresh generation, snapshot entities, then instantiate
/// one instance per (entity, kind) pair: init for all, then start for all.
/// Instances and module are owned exclusively here; nothing outside the host
/// holds a reference across a reload boundary.
pub struct ScriptHost {
    bridge: Rc<NativeBridge>,
    loader: Box<dyn ModuleLoader>,
    scripts_dir: PathBuf,
    extension: String,
    debounce: Duration,
    watcher: Option<ScriptSourceWatcher>,
    pending_reload_at: Option<Instant>,
    state: HostState,
    module: Option<ScriptModule>,
    instances: Vec<ScriptInstance>,
    attempts: u64,
    last_error: Option<String>,
}

impl ScriptHost {
    pub fn new(
        bridge: Rc<NativeBridge>,
        loader: Box<dyn ModuleLoader>,
        scripts_dir: impl Into<PathBuf>,
        extension: &str,
        debounce: Duration,
    ) -> Self {
        let scripts_dir = scripts_dir.into();
        if !scripts_dir.exists() {
            if let Err(err) = fs::create_dir_all(&scripts_dir) {
                eprintln!("[script] could not create script directory '{}': {err}", scripts_dir.display());
            }
        }
        let watcher = match ScriptSourceWatcher::new(&scripts_dir, extension) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                eprintln!("[script] source watcher disabled: {err:?}");
                None
            }
        };
        Self {
            bridge,
            loader,
            scripts_dir,
            extension: extension.to_string(),
            debounce,
            watcher,
            pending_reload_at: None,
            state: HostState::Idle,
            module: None,
            instances: Vec::new(),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Generation of the active module, if one is loaded.
    pub fn active_generation(&self) -> Option<u64> {
        self.module.as_ref().map(|module| module.generation())
    }

    pub fn active_kinds(&self) -> Vec<String> {
        self.module
            .as_ref()
            .map(|module| module.kind_names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// (entity, kind) bindings of the live instance list, in instantiation
    /// order.
    pub fn instance_bindings(&self) -> Vec<(EntityId, String)> {
        self.instances.iter().map(|instance| (instance.entity, instance.kind.clone())).collect()
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Schedules a reload after the debounce window. Repeated calls within
    /// the window push the deadline out, coalescing an edit burst into one
    /// reload. A request arriving while a reload is in flight is dropped;
    /// the in-flight pipeline re-reads the directory anyway, so its result
    /// reflects the latest contents. The pipeline runs synchronously on the
    /// frame path, so an in-flight request can only originate from inside a
    /// lifecycle hook.
    pub fn schedule_reload(&mut self) {
        self.schedule_reload_at(Instant::now());
    }

    pub fn schedule_reload_at(&mut self, now: Instant) {
        if matches!(self.state, HostState::Reloading) {
            println!("[script] reload already in flight; request dropped");
            return;
        }
        self.pending_reload_at = Some(now + self.debounce);
    }

    /// Runs the reload pipeline if the debounce deadline has passed. Returns
    /// true when a reload was executed.
    pub fn run_pending_reload(&mut self, now: Instant) -> bool {
        match self.pending_reload_at {
            Some(deadline) if now >= deadline => {
                self.pending_reload_at = None;
                self.reload();
                true
            }
            _ => false,
        }
    }

    /// Frame-path entry: drains watcher notifications into the debounce
    /// schedule, then fires the pipeline once the window has elapsed. The
    /// watcher thread itself never executes a reload.
    pub fn pump(&mut self, now: Instant) {
        let changed = self.watcher.as_mut().map_or(false, ScriptSourceWatcher::change_detected);
        if changed {
            self.schedule_reload_at(now);
        }
        self.run_pending_reload(now);
    }

    /// The full reload pipeline. Failures at the structural steps abort the
    /// rest of this reload and leave the host degraded; nothing here is
    /// fatal to the process.
    pub fn reload(&mut self) {
        if matches!(self.state, HostState::Reloading) {
            println!("[script] reload already in flight; request dropped");
            return;
        }
        self.state = HostState::Reloading;
        self.pending_reload_at = None;
        println!("[script] reloading scripts...");

        // Old instances are destroyed before anything else so no stale
        // script observes the new module. A failed compile below therefore
        // leaves zero instances live, not the previous set.
        self.destroy_instances();
        if let Some(module) = self.module.take() {
            let generation = module.generation();
            if let Err(err) = module.unload() {
                eprintln!(
                    "[script] warning: generation {generation} unload failed, resources may leak: {err}"
                );
            }
        }

        let sources = match self.enumerate_sources() {
            Ok(sources) => sources,
            Err(err) => {
                eprintln!("[script] cannot read script directory '{}': {err}", self.scripts_dir.display());
                self.last_error = Some(err.to_string());
                self.state = HostState::Degraded;
                return;
            }
        };
        if sources.is_empty() {
            println!("[script] no scripts found under '{}'", self.scripts_dir.display());
            self.last_error = None;
            self.state = HostState::Idle;
            return;
        }

        self.attempts += 1;
        let generation = self.attempts;
        let module = match self.loader.load(&sources, generation) {
            Ok(module) => module,
            Err(err) => {
                eprintln!("[script] reload failed: {err}");
                self.last_error = Some(err.to_string());
                self.state = HostState::Degraded;
                return;
            }
        };
        if module.kind_count() == 0 {
            println!("[script] generation {generation} registered no script kinds");
        }

        // Deterministic instantiation order: entity snapshot outer,
        // discovered kinds inner. Scripts that inspect siblings in on_start
        // rely on this.
        let entities = self.bridge.entities();
        let bridge = self.bridge.clone();
        let mut instances = Vec::with_capacity(entities.len() * module.kind_count());
        for entity in &entities {
            for index in 0..module.kind_count() {
                let kind = module.kind_name(index).unwrap_or("?").to_string();
                let mut script = match module.instantiate(index) {
                    Ok(script) => script,
                    Err(err) => {
                        eprintln!("[script] failed to instantiate {kind} for entity {entity}: {err}");
                        continue;
                    }
                };
                let mut ctx = ScriptContext::new(*entity, bridge.as_ref());
                let initialized =
                    run_hook(*entity, &kind, "on_init", || script.on_init(&mut ctx));
                if initialized {
                    instances.push(ScriptInstance { entity: *entity, kind, script, failed: false });
                }
            }
        }
        for instance in &mut instances {
            let mut ctx = ScriptContext::new(instance.entity, bridge.as_ref());
            let started = run_hook(instance.entity, &instance.kind, "on_start", || {
                instance.script.on_start(&mut ctx)
            });
            if !started {
                instance.failed = true;
            }
        }

        println!(
            "[script] reload complete: generation {generation}, {} instance(s) across {} entit{} and {} kind(s)",
            instances.len(),
            entities.len(),
            if entities.len() == 1 { "y" } else { "ies" },
            module.kind_count()
        );
        self.instances = instances;
        self.module = Some(module);
        self.last_error = None;
        self.state = HostState::Idle;
    }

    /// Per-frame update over the live instance list. Reloads run only
    /// between frames on this same call path, so the list cannot change
    /// mid-loop; a reentrant reload path would have to switch this to a
    /// drained snapshot first. A hook failure or panic is contained to its
    /// instance: it is logged, the instance is unscheduled, and the rest of
    /// the frame proceeds.
    pub fn update(&mut self, dt: f32) {
        let bridge = self.bridge.clone();
        let count = self.instances.len();
        for index in 0..count {
            let instance = &mut self.instances[index];
            if instance.failed {
                continue;
            }
            let mut ctx = ScriptContext::new(instance.entity, bridge.as_ref());
            let ok = run_hook(instance.entity, &instance.kind, "on_update", || {
                instance.script.on_update(&mut ctx, dt)
            });
            if !ok {
                let instance = &mut self.instances[index];
                instance.failed = true;
                eprintln!(
                    "[script] {} on entity {} unscheduled after update failure",
                    instance.kind, instance.entity
                );
            }
        }
    }

    /// Retires every instance and unloads the active module. The host stays
    /// usable; a later reload starts a fresh generation.
    pub fn shutdown(&mut self) {
        self.destroy_instances();
        if let Some(module) = self.module.take() {
            let generation = module.generation();
            if let Err(err) = module.unload() {
                eprintln!(
                    "[script] warning: generation {generation} unload failed during shutdown: {err}"
                );
            }
        }
        self.state = HostState::Idle;
    }

    /// Best-effort on_destroy for every instance; one failing destructor
    /// never prevents the others from running.
    fn destroy_instances(&mut self) {
        let bridge = self.bridge.clone();
        for instance in &mut self.instances {
            let mut ctx = ScriptContext::new(instance.entity, bridge.as_ref());
            run_hook(instance.entity, &instance.kind, "on_destroy", || {
                instance.script.on_destroy(&mut ctx)
            });
        }
        self.instances.clear();
    }

    fn enumerate_sources(&self) -> io::Result<Vec<PathBuf>> {
        let mut sources = Vec::new();
        for entry in fs::read_dir(&self.scripts_dir)? {
            let path = entry?.path();
            let recognized =
                path.is_file() && path.extension().map_or(false, |ext| ext == self.extension.as_str());
            if recognized {
                sources.push(path);
            }
        }
        sources.sort();
        Ok(sources)
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        // Instances carry vtables and drop glue that live inside the active
        // module's library; they must be gone before the library closes.
        self.shutdown();
    }
}

fn run_hook<F>(entity: EntityId, kind: &str, hook: &str, f: F) -> bool
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            eprintln!("[script] {kind} on entity {entity}: {hook} failed: {err:?}");
            false
        }
        Err(payload) => {
            eprintln!("[script] {kind} on entity {entity}: {hook} panicked: {}", panic_text(&payload));
            false
        }
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic payload"
    }
}
