use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host configuration, read from a JSON file with per-field defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Directory whose entire contents form one compilation unit per reload.
    #[serde(default = "HostConfig::default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Recognized script-source extension, without the dot.
    #[serde(default = "HostConfig::default_source_extension")]
    pub source_extension: String,
    /// Quiet window that coalesces a burst of file events into one reload.
    #[serde(default = "HostConfig::default_debounce_ms")]
    pub debounce_ms: u64,
    /// Where staged per-generation script crates are built.
    #[serde(default = "HostConfig::default_stage_dir")]
    pub stage_dir: PathBuf,
    /// Directory of this crate, used as the staged crates' path dependency.
    #[serde(default = "HostConfig::default_host_crate_dir")]
    pub host_crate_dir: PathBuf,
    /// Pass --offline to the staged builds.
    #[serde(default = "HostConfig::default_offline")]
    pub offline: bool,
    /// Native engine library to bind against.
    #[serde(default)]
    pub engine_library: Option<PathBuf>,
    /// Frame-driver target rate.
    #[serde(default = "HostConfig::default_target_fps")]
    pub target_fps: u32,
}

impl HostConfig {
    fn default_scripts_dir() -> PathBuf {
        PathBuf::from("scripts")
    }

    fn default_source_extension() -> String {
        "rs".to_string()
    }

    const fn default_debounce_ms() -> u64 {
        200
    }

    fn default_stage_dir() -> PathBuf {
        PathBuf::from("target/script_stage")
    }

    fn default_host_crate_dir() -> PathBuf {
        PathBuf::from(".")
    }

    const fn default_offline() -> bool {
        true
    }

    const fn default_target_fps() -> u32 {
        60
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("[config] {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            scripts_dir: Self::default_scripts_dir(),
            source_extension: Self::default_source_extension(),
            debounce_ms: Self::default_debounce_ms(),
            stage_dir: Self::default_stage_dir(),
            host_crate_dir: Self::default_host_crate_dir(),
            offline: Self::default_offline(),
            engine_library: None,
            target_fps: Self::default_target_fps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let cfg: HostConfig = serde_json::from_str(r#"{ "scripts_dir": "behaviors" }"#).expect("parses");
        assert_eq!(cfg.scripts_dir, PathBuf::from("behaviors"));
        assert_eq!(cfg.source_extension, "rs", "extension defaults");
        assert_eq!(cfg.debounce_ms, 200, "debounce defaults");
        assert!(cfg.offline, "offline builds by default");
        assert!(cfg.engine_library.is_none(), "engine library unset by default");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = HostConfig::load_or_default("definitely/not/here.json");
        assert_eq!(cfg.target_fps, 60);
    }
}
