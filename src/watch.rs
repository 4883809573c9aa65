use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// Watches the script-source directory for changes to recognized source
/// files. The notify callback only forwards events onto a channel; draining
/// and scheduling happen on the frame path, never on the watcher thread.
pub struct ScriptSourceWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    extension: String,
}

impl ScriptSourceWatcher {
    pub fn new(root: impl AsRef<Path>, extension: &str) -> Result<Self> {
        let root = root.as_ref();
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .configure(
                NotifyConfig::default()
                    .with_compare_contents(false)
                    .with_poll_interval(Duration::from_millis(300)),
            )
            .context("configure script source watcher")?;
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch script directory '{}'", root.display()))?;
        Ok(Self { _watcher: watcher, rx, extension: extension.to_string() })
    }

    /// Drains pending notifications and reports whether any recognized
    /// source file was created, modified, removed, or renamed since the last
    /// call. Bursts collapse into a single answer; the reload pipeline
    /// re-reads the directory itself, so no detail is lost here.
    pub fn change_detected(&mut self) -> bool {
        let mut changed = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) => {
                    if !Self::is_relevant(&event.kind) {
                        continue;
                    }
                    if event.paths.iter().any(|path| self.matches_extension(path)) {
                        changed = true;
                    }
                }
                Err(err) => eprintln!("[script] source watcher error: {err}"),
            }
        }
        changed
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == self.extension.as_str())
    }

    fn is_relevant(kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::Modify(ModifyKind::Data(_))
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Modify(ModifyKind::Any)
                | EventKind::Create(_)
                | EventKind::Remove(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::tempdir;

    #[test]
    fn detects_source_file_creation() {
        let dir = tempdir().expect("temp dir");
        let mut watcher = ScriptSourceWatcher::new(dir.path(), "rs").expect("watcher starts");
        fs::write(dir.path().join("mover.rs"), "// script").expect("file written");
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline {
            if watcher.change_detected() {
                seen = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(seen, "watcher should observe a new .rs file");
    }

    #[test]
    fn ignores_unrelated_extensions() {
        let dir = tempdir().expect("temp dir");
        let mut watcher = ScriptSourceWatcher::new(dir.path(), "rs").expect("watcher starts");
        fs::write(dir.path().join("notes.txt"), "not a script").expect("file written");
        std::thread::sleep(Duration::from_millis(300));
        assert!(!watcher.change_detected(), "non-script files should not trigger a reload");
    }
}
