use crate::error::ModuleError;
use crate::module::ScriptModule;
use anyhow::{anyhow, Context};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Turns the current script-source set into a loaded [`ScriptModule`]
/// generation. The host owns exactly one loader; tests substitute hosted
/// implementations to drive the reload pipeline without a toolchain.
pub trait ModuleLoader {
    fn load(&mut self, sources: &[PathBuf], generation: u64) -> Result<ScriptModule, ModuleError>;
}

/// Production loader: stages a one-off cdylib crate per generation, builds it
/// with cargo, and loads the artifact. The staged package name embeds the
/// generation counter, so every generation produces a distinctly named
/// library and the previous generation can never be re-resolved by accident.
pub struct CargoModuleLoader {
    stage_dir: PathBuf,
    host_crate_dir: PathBuf,
    offline: bool,
}

impl CargoModuleLoader {
    pub fn new(stage_dir: impl Into<PathBuf>, host_crate_dir: impl Into<PathBuf>, offline: bool) -> Self {
        Self { stage_dir: stage_dir.into(), host_crate_dir: host_crate_dir.into(), offline }
    }

    fn package_name(generation: u64) -> String {
        format!("shrike_scripts_gen_{generation}")
    }

    fn generated_manifest(&self, package: &str) -> Result<String, ModuleError> {
        let host_dir = fs::canonicalize(&self.host_crate_dir)
            .with_context(|| format!("resolving host crate dir '{}'", self.host_crate_dir.display()))?;
        Ok(format!(
            r#"[package]
name = "{package}"
version = "0.0.0"
edition = "2021"

[lib]
name = "{package}"
crate-type = ["cdylib"]

[dependencies]
anyhow = "1.0"
shrike = {{ path = "{host}" }}

[workspace]
"#,
            host = toml_path(&host_dir),
        ))
    }

    /// One module per source file, stitched together behind the single entry
    /// symbol. Sources arrive pre-sorted from the host, which fixes the kind
    /// discovery order across reloads.
    fn generated_shim(sources: &[PathBuf]) -> String {
        let mut shim = String::from(
            "use shrike::module::{ScriptModuleExport, ScriptRegistry, SCRIPT_MODULE_API_VERSION};\n\n",
        );
        for (index, source) in sources.iter().enumerate() {
            shim.push_str(&format!(
                "#[path = \"{path}\"]\nmod script_{index};\n",
                path = toml_path(source),
            ));
        }
        shim.push_str("\nunsafe extern \"C\" fn register(registry: &mut ScriptRegistry) {\n");
        for index in 0..sources.len() {
            shim.push_str(&format!("    script_{index}::register(registry);\n"));
        }
        shim.push_str("}\n\n#[no_mangle]\npub extern \"C\" fn shrike_script_entry() -> ScriptModuleExport {\n    ScriptModuleExport { api_version: SCRIPT_MODULE_API_VERSION, register }\n}\n");
        shim
    }

    fn stage_crate(&self, sources: &[PathBuf], generation: u64) -> Result<PathBuf, ModuleError> {
        let package = Self::package_name(generation);
        let crate_dir = self.stage_dir.join(format!("gen_{generation}"));
        if crate_dir.exists() {
            fs::remove_dir_all(&crate_dir)
                .with_context(|| format!("clearing stale stage dir '{}'", crate_dir.display()))?;
        }
        fs::create_dir_all(crate_dir.join("src"))
            .with_context(|| format!("creating stage dir '{}'", crate_dir.display()))?;
        let mut absolute_sources = Vec::with_capacity(sources.len());
        for source in sources {
            let absolute = fs::canonicalize(source)
                .with_context(|| format!("resolving script source '{}'", source.display()))?;
            absolute_sources.push(absolute);
        }
        fs::write(crate_dir.join("Cargo.toml"), self.generated_manifest(&package)?)
            .context("writing staged Cargo.toml")?;
        fs::write(crate_dir.join("src").join("lib.rs"), Self::generated_shim(&absolute_sources))
            .context("writing staged lib.rs")?;
        Ok(crate_dir)
    }

    fn artifact_path(crate_dir: &Path, generation: u64) -> PathBuf {
        let file = format!(
            "{}{}{}",
            env::consts::DLL_PREFIX,
            Self::package_name(generation),
            env::consts::DLL_SUFFIX
        );
        crate_dir.join("target").join("debug").join(file)
    }
}

impl ModuleLoader for CargoModuleLoader {
    fn load(&mut self, sources: &[PathBuf], generation: u64) -> Result<ScriptModule, ModuleError> {
        let crate_dir = self.stage_crate(sources, generation)?;
        let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
        let mut command = Command::new(&cargo);
        command.arg("build").current_dir(&crate_dir);
        if self.offline {
            command.arg("--offline");
        }
        let output = command.output().map_err(|err| {
            ModuleError::Load(anyhow!("spawning '{cargo} build' in '{}': {err}", crate_dir.display()))
        })?;
        if !output.status.success() {
            return Err(ModuleError::Compilation {
                diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let artifact = Self::artifact_path(&crate_dir, generation);
        if !artifact.exists() {
            return Err(ModuleError::Load(anyhow!(
                "build succeeded but artifact '{}' is missing",
                artifact.display()
            )));
        }
        ScriptModule::load_dynamic(&artifact, generation)
    }
}

/// Paths embedded in generated toml/source use forward slashes so the output
/// is identical across platforms and needs no escaping.
fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_wires_every_source_through_one_entry() {
        let sources = vec![PathBuf::from("/scripts/mover.rs"), PathBuf::from("/scripts/spin.rs")];
        let shim = CargoModuleLoader::generated_shim(&sources);
        assert!(shim.contains("#[path = \"/scripts/mover.rs\"]\nmod script_0;"), "first module: {shim}");
        assert!(shim.contains("#[path = \"/scripts/spin.rs\"]\nmod script_1;"), "second module: {shim}");
        assert!(shim.contains("script_0::register(registry);\n    script_1::register(registry);"));
        assert!(shim.contains("pub extern \"C\" fn shrike_script_entry()"), "entry symbol present");
    }

    #[test]
    fn package_name_embeds_generation() {
        assert_eq!(CargoModuleLoader::package_name(7), "shrike_scripts_gen_7");
        assert_ne!(
            CargoModuleLoader::package_name(1),
            CargoModuleLoader::package_name(2),
            "generations must never share a library name"
        );
    }

    #[test]
    fn manifest_declares_cdylib_and_host_dependency() {
        let loader = CargoModuleLoader::new("target/stage", env!("CARGO_MANIFEST_DIR"), true);
        let manifest = loader.generated_manifest("shrike_scripts_gen_1").expect("manifest renders");
        assert!(manifest.contains("crate-type = [\"cdylib\"]"), "cdylib crate type: {manifest}");
        assert!(manifest.contains("shrike = { path = "), "host dependency present: {manifest}");
        assert!(manifest.contains("[workspace]"), "staged crate opts out of any outer workspace");
    }
}
