//! Configuration store — atomic snapshots with file-watch hot reload.
//!
//! [`ConfigStore`] holds the current [`Config`] in an [`ArcSwap`] so readers
//! always observe a fully-formed snapshot with a single atomic load. Reloads
//! replace the whole snapshot; they never mutate one in place. Sessions that
//! captured an earlier snapshot keep it until they finish.
//!
//! On a file-change event the store re-parses and re-validates the config:
//! a bad file keeps the previous snapshot and reports through the error
//! callback; a good file swaps the snapshot and then invokes the reload
//! callback.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};

use super::settings::{Config, ConfigError};
use super::AppPaths;

type ReloadCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&ConfigError) + Send + Sync>;

/// Thread-safe configuration holder with hot reload.
pub struct ConfigStore {
    path: PathBuf,
    snapshot: ArcSwap<Config>,
    on_reload: Mutex<Option<ReloadCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ConfigStore {
    /// Open the store against the standard config path, creating the default
    /// config file when absent.
    pub fn new() -> Result<Arc<Self>, ConfigError> {
        let paths = AppPaths::new();
        if !paths.config_file.exists() {
            log::info!(
                "config: no config file at {}, creating with defaults",
                paths.config_file.display()
            );
            Config::write_default(&paths.config_file)?;
        }
        Self::with_path(paths.config_file)
    }

    /// Open the store against an explicit config file (useful for tests).
    pub fn with_path(path: PathBuf) -> Result<Arc<Self>, ConfigError> {
        let config = Config::load_from(&path)?;
        Ok(Arc::new(Self {
            path,
            snapshot: ArcSwap::from_pointee(config),
            on_reload: Mutex::new(None),
            on_error: Mutex::new(None),
            watcher: Mutex::new(None),
        }))
    }

    /// The current snapshot. Cheap; never blocks.
    pub fn get(&self) -> Arc<Config> {
        self.snapshot.load_full()
    }

    /// Register the callback invoked after a successful reload has been made
    /// visible to readers.
    pub fn set_on_reload(&self, cb: impl Fn() + Send + Sync + 'static) {
        *self.on_reload.lock().unwrap() = Some(Arc::new(cb));
    }

    /// Register the callback invoked when a reload fails validation or
    /// parsing. The previous snapshot stays in place.
    pub fn set_on_error(&self, cb: impl Fn(&ConfigError) + Send + Sync + 'static) {
        *self.on_error.lock().unwrap() = Some(Arc::new(cb));
    }

    /// Re-read the config file now. Called by the watcher thread and directly
    /// by tests.
    pub fn reload(&self) {
        match Config::load_from(&self.path) {
            Ok(config) => {
                self.snapshot.store(Arc::new(config));
                log::info!("config: reloaded from {}", self.path.display());
                let cb = self.on_reload.lock().unwrap().clone();
                if let Some(cb) = cb {
                    cb();
                }
            }
            Err(err) => {
                log::error!("config: reload failed, keeping previous snapshot: {err}");
                let cb = self.on_error.lock().unwrap().clone();
                if let Some(cb) = cb {
                    cb(&err);
                }
            }
        }
    }

    /// Begin watching the config file's directory for changes.
    ///
    /// The parent directory is watched (non-recursively) rather than the file
    /// itself so editor save-via-rename does not detach the watch.
    pub fn start_watching(self: &Arc<Self>) -> Result<(), notify::Error> {
        let store = Arc::clone(self);
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    log::warn!("config: watch error: {err}");
                    return;
                }
            };
            if !matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_)
            ) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_config {
                store.reload();
            }
        })?;

        let watch_dir = self
            .path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        *self.watcher.lock().unwrap() = Some(watcher);
        log::info!("config: watching {}", self.path.display());
        Ok(())
    }

    /// Stop watching. Idempotent.
    pub fn stop(&self) {
        self.watcher.lock().unwrap().take();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn write_valid(path: &std::path::Path, sample_rate: u32) {
        std::fs::write(
            path,
            format!(
                "[recording]\nsample_rate = {sample_rate}\n\n\
                 [transcription]\napi_key = \"k\"\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn get_returns_loaded_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_valid(&path, 48_000);

        let store = ConfigStore::with_path(path).unwrap();
        assert_eq!(store.get().recording.sample_rate, 48_000);
    }

    #[test]
    fn reload_swaps_snapshot_and_fires_callback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_valid(&path, 16_000);

        let store = ConfigStore::with_path(path.clone()).unwrap();
        let reloads = Arc::new(AtomicUsize::new(0));
        let reloads_cb = Arc::clone(&reloads);
        store.set_on_reload(move || {
            reloads_cb.fetch_add(1, Ordering::SeqCst);
        });

        write_valid(&path, 44_100);
        store.reload();

        assert_eq!(store.get().recording.sample_rate, 44_100);
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_reload_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_valid(&path, 16_000);

        let store = ConfigStore::with_path(path.clone()).unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_cb = Arc::clone(&errors);
        store.set_on_error(move |_| {
            errors_cb.fetch_add(1, Ordering::SeqCst);
        });

        let before = store.get();
        std::fs::write(&path, "[recording]\nsample_rate = 0\n").unwrap();
        store.reload();

        let after = store.get();
        assert_eq!(after.recording.sample_rate, before.recording.sample_rate);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unparseable_reload_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_valid(&path, 16_000);

        let store = ConfigStore::with_path(path.clone()).unwrap();
        std::fs::write(&path, "this is { not toml").unwrap();
        store.reload();

        assert_eq!(store.get().recording.sample_rate, 16_000);
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_valid(&path, 16_000);

        let store = ConfigStore::with_path(path).unwrap();
        store.stop();
        store.stop();
    }
}
