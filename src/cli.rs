use crate::config::HostConfig;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Command-line overrides for the driver binary. Anything not given here
/// falls through to the config file, then to built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    scripts_dir: Option<PathBuf>,
    engine_library: Option<PathBuf>,
    debounce_ms: Option<u64>,
    run_engine: bool,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            }
            let key = &flag[2..];
            if key == "run-engine" {
                overrides.run_engine = true;
                continue;
            }
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "scripts-dir" => overrides.scripts_dir = Some(PathBuf::from(value)),
                "engine-library" => overrides.engine_library = Some(PathBuf::from(value)),
                "debounce-ms" => {
                    overrides.debounce_ms = Some(
                        value.parse::<u64>().with_context(|| format!("Invalid debounce '{value}'"))?,
                    );
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --scripts-dir, \
                     --engine-library, --debounce-ms, --run-engine."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn run_engine(&self) -> bool {
        self.run_engine
    }

    pub fn apply(&self, config: &mut HostConfig) {
        if let Some(dir) = &self.scripts_dir {
            config.scripts_dir = dir.clone();
        }
        if let Some(path) = &self.engine_library {
            config.engine_library = Some(path.clone());
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_and_debounce() {
        let args =
            ["shrike", "--scripts-dir", "behaviors", "--engine-library", "engine.so", "--debounce-ms", "50"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        let mut config = HostConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.scripts_dir, PathBuf::from("behaviors"));
        assert_eq!(config.engine_library, Some(PathBuf::from("engine.so")));
        assert_eq!(config.debounce_ms, 50);
    }

    #[test]
    fn run_engine_is_a_bare_flag() {
        let overrides = CliOverrides::parse(["shrike", "--run-engine"]).expect("parse overrides");
        assert!(overrides.run_engine(), "run-engine should be set");
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = CliOverrides::parse(["shrike", "--frobnicate", "1"]).expect_err("unknown flag errors");
        assert!(err.to_string().contains("Unknown flag"), "error names the flag: {err}");
    }

    #[test]
    fn rejects_missing_values() {
        let err = CliOverrides::parse(["shrike", "--scripts-dir"]).expect_err("missing value errors");
        assert!(err.to_string().contains("Expected a value"), "error explains: {err}");
    }
}
