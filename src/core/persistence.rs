use crate::core::app_log;
use crate::core::rule_store::RuleStore;
use crate::models::{Rule, Settings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const CURRENT_STATE_VERSION: u32 = 1;

fn default_state_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default = "default_state_version")]
    version: u32,
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Reads the persisted state. `Ok(None)` when the file doesn't exist; the
/// caller treats both that and a parse error as "start from defaults".
pub fn load(path: &Path) -> io::Result<Option<(Settings, Vec<Rule>)>> {
    if !path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(path)?;
    let state: PersistedState = serde_json::from_slice(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(Some((state.settings, state.rules)))
}

fn write_state_atomically(path: &Path, state: &PersistedState) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp)?;
    serde_json::to_writer(&mut file, state)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    file.write_all(b"\n")?;
    file.sync_all()?;

    let _ = fs::remove_file(path);
    fs::rename(tmp, path)?;
    Ok(())
}

fn write_snapshot(store: &RuleStore, settings: &Settings, path: &Path) -> io::Result<()> {
    let state = PersistedState {
        version: CURRENT_STATE_VERSION,
        settings: settings.clone(),
        rules: store.rules(),
    };
    write_state_atomically(path, &state)
}

/// Background writer fed by the rule store's save notifier. Writes are
/// debounced so a recorder sampling twice a second doesn't hit the disk at
/// the same rate.
pub struct Persistence {
    store: Arc<RuleStore>,
    settings: Settings,
    path: PathBuf,
    worker: Option<JoinHandle<()>>,
}

impl Persistence {
    pub fn spawn(store: Arc<RuleStore>, settings: Settings, path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        store.set_save_notifier(tx);

        let worker = {
            let store = Arc::clone(&store);
            let settings = settings.clone();
            let path = path.clone();
            std::thread::Builder::new()
                .name("persistence".to_string())
                .spawn(move || {
                    loop {
                        if rx.recv().is_err() {
                            break;
                        }

                        // debounce: coalesce frequent rule updates into a single write
                        let start = Instant::now();
                        while start.elapsed() < Duration::from_millis(500) {
                            if rx.recv_timeout(Duration::from_millis(80)).is_err() {
                                break;
                            }
                        }

                        if let Err(e) = write_snapshot(&store, &settings, &path) {
                            let _ = app_log::error(
                                "persistence",
                                &format!("failed to persist state: {e}"),
                            );
                        }
                    }
                })
                .expect("spawn persistence")
        };

        Self {
            store,
            settings,
            path,
            worker: Some(worker),
        }
    }

    /// Stops the writer and performs the final synchronous write. This is the
    /// one place a persistence failure is surfaced instead of swallowed: the
    /// rules being flushed here are the session's whole output.
    pub fn shutdown(mut self) -> io::Result<()> {
        self.store.clear_save_notifier();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        write_snapshot(&self.store, &self.settings, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Placement, ShowState};

    fn sample_rules() -> Vec<Rule> {
        vec![Rule {
            process_name: "notepad".to_string(),
            state: Some(Placement {
                left: 100,
                top: 100,
                width: 800,
                height: 600,
                show_state: ShowState::Maximized,
            }),
        }]
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir.path().join("state.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn shutdown_flushes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = Arc::new(RuleStore::load(sample_rules()));
        let persistence = Persistence::spawn(store.clone(), Settings::default(), path.clone());
        store.record_live("notepad", |rule| {
            if let Some(state) = rule.state.as_mut() {
                state.left = 250;
            }
        });
        persistence.shutdown().unwrap();

        let (settings, rules) = load(&path).unwrap().unwrap();
        assert_eq!(settings.watcher_poll_ms, 1000);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].state.as_ref().unwrap().left, 250);

        // The atomic write leaves no temp file behind.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn show_state_is_stored_as_its_integer_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = Arc::new(RuleStore::load(sample_rules()));
        Persistence::spawn(store, Settings::default(), path.clone())
            .shutdown()
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""show_state":3"#), "raw: {raw}");
    }

    #[test]
    fn state_without_version_or_rules_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, br#"{"settings":{"watcher_poll_ms":2000}}"#).unwrap();

        let (settings, rules) = load(&path).unwrap().unwrap();
        assert_eq!(settings.watcher_poll_ms, 2000);
        assert!(rules.is_empty());
    }
}
