use crate::core::cancel::CancelToken;
use crate::core::platform::{Desktop, Pid, WindowHandle};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle events for watched processes, in poll order. Events for one
/// target are strictly ordered because every transition happens inside the
/// same locked poll iteration; across targets there is no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A watched process appeared with a usable main window.
    Started {
        name: String,
        pid: Pid,
        window: WindowHandle,
    },
    /// A watched process that was already running grew its main window later
    /// than process start.
    WindowOpened {
        name: String,
        pid: Pid,
        window: WindowHandle,
    },
    /// A tracked process is no longer alive (or was unwatched while running).
    Stopped { name: String, pid: Pid },
}

/// Comparison key for process names: case-insensitive, and a trailing `.exe`
/// is ignored so `Notepad`, `notepad` and `notepad.exe` name the same target.
pub(crate) fn normalized_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

pub(crate) fn names_match(a: &str, b: &str) -> bool {
    normalized_name(a) == normalized_name(b)
}

enum TargetState {
    /// No matching process known.
    Absent,
    /// Process alive, main window not yet shown; gates the window-opened event.
    Pending(Pid),
    /// Process alive with a tracked main window.
    Running { pid: Pid, window: WindowHandle },
}

struct Target {
    name: String,
    state: TargetState,
}

/// Polls the OS process table and diffs it against a mutable watch set.
pub struct ProcessWatcher {
    desktop: Arc<dyn Desktop>,
    poll_interval: Duration,
    targets: Mutex<Vec<Target>>,
    tx: Sender<WatchEvent>,
}

impl ProcessWatcher {
    pub fn new(
        desktop: Arc<dyn Desktop>,
        poll_interval: Duration,
    ) -> (Arc<Self>, Receiver<WatchEvent>) {
        let (tx, rx) = mpsc::channel();
        let watcher = Arc::new(Self {
            desktop,
            poll_interval,
            targets: Mutex::new(Vec::new()),
            tx,
        });
        (watcher, rx)
    }

    /// Adds `name` to the watch set. No-op when an equivalent name is already
    /// watched.
    pub fn watch(&self, name: &str) {
        let mut targets = self.targets.lock();
        if targets.iter().any(|t| names_match(&t.name, name)) {
            return;
        }
        targets.push(Target {
            name: name.to_string(),
            state: TargetState::Absent,
        });
    }

    /// Removes `name` from the watch set. A target that was running gets an
    /// immediate `Stopped` event so its recorder is torn down rather than
    /// left writing into a rule nobody is configured for.
    pub fn unwatch(&self, name: &str) {
        let mut targets = self.targets.lock();
        let Some(index) = targets.iter().position(|t| names_match(&t.name, name)) else {
            return;
        };
        let target = targets.remove(index);
        if let TargetState::Running { pid, .. } = target.state {
            let _ = self.tx.send(WatchEvent::Stopped {
                name: target.name,
                pid,
            });
        }
    }

    pub fn start(self: &Arc<Self>, cancel: CancelToken) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        thread::Builder::new()
            .name("process-watcher".to_string())
            .spawn(move || {
                while !cancel.is_cancelled() {
                    watcher.poll_once();
                    thread::sleep(watcher.poll_interval);
                }
            })
            .expect("spawn process-watcher")
    }

    /// One poll iteration: enumerate, then apply per-target transitions under
    /// the watch-set lock. Enumeration happens outside the lock so `watch` /
    /// `unwatch` callers never wait on OS calls.
    pub(crate) fn poll_once(&self) {
        let snapshot = self.desktop.processes();
        let mut targets = self.targets.lock();

        for target in targets.iter_mut() {
            let with_window = snapshot.iter().find_map(|p| {
                let window = p.window?;
                names_match(&p.name, &target.name).then_some((p.pid, window))
            });
            let any_match = snapshot.iter().find(|p| names_match(&p.name, &target.name));

            match target.state {
                TargetState::Absent => {
                    if let Some((pid, window)) = with_window {
                        target.state = TargetState::Running { pid, window };
                        let _ = self.tx.send(WatchEvent::Started {
                            name: target.name.clone(),
                            pid,
                            window,
                        });
                    } else if let Some(process) = any_match {
                        target.state = TargetState::Pending(process.pid);
                    }
                }
                TargetState::Pending(_) => {
                    if let Some((pid, window)) = with_window {
                        target.state = TargetState::Running { pid, window };
                        let _ = self.tx.send(WatchEvent::WindowOpened {
                            name: target.name.clone(),
                            pid,
                            window,
                        });
                    } else if any_match.is_none() {
                        // Exited before ever showing a window; no started
                        // event was sent, so no stopped event either.
                        target.state = TargetState::Absent;
                    }
                }
                TargetState::Running { pid, .. } => {
                    let alive = snapshot.iter().any(|p| p.pid == pid);
                    if !alive {
                        target.state = TargetState::Absent;
                        let _ = self.tx.send(WatchEvent::Stopped {
                            name: target.name.clone(),
                            pid,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::fake::FakeDesktop;
    use std::sync::mpsc::TryRecvError;

    fn watcher_with_fake() -> (Arc<ProcessWatcher>, Receiver<WatchEvent>, Arc<FakeDesktop>) {
        let desktop = Arc::new(FakeDesktop::new());
        let (watcher, rx) =
            ProcessWatcher::new(desktop.clone(), Duration::from_millis(10));
        (watcher, rx, desktop)
    }

    fn drain(rx: &Receiver<WatchEvent>) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return events,
            }
        }
    }

    #[test]
    fn started_fires_once_per_continuous_run() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");
        desktop.set_processes(vec![FakeDesktop::process(
            42,
            "notepad.exe",
            Some(WindowHandle(7)),
        )]);

        for _ in 0..5 {
            watcher.poll_once();
        }

        let events = drain(&rx);
        assert_eq!(
            events,
            vec![WatchEvent::Started {
                name: "notepad".to_string(),
                pid: 42,
                window: WindowHandle(7),
            }]
        );
    }

    #[test]
    fn no_events_for_names_that_never_match() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");
        desktop.set_processes(vec![FakeDesktop::process(1, "calc.exe", Some(WindowHandle(2)))]);

        for _ in 0..3 {
            watcher.poll_once();
        }
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn watch_is_idempotent() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");
        watcher.watch("Notepad.exe");
        desktop.set_processes(vec![FakeDesktop::process(
            42,
            "notepad.exe",
            Some(WindowHandle(7)),
        )]);

        watcher.poll_once();
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn late_window_emits_window_opened_not_started() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");

        desktop.set_processes(vec![FakeDesktop::process(42, "notepad.exe", None)]);
        watcher.poll_once();
        assert!(drain(&rx).is_empty());

        desktop.set_processes(vec![FakeDesktop::process(
            42,
            "notepad.exe",
            Some(WindowHandle(7)),
        )]);
        watcher.poll_once();
        assert_eq!(
            drain(&rx),
            vec![WatchEvent::WindowOpened {
                name: "notepad".to_string(),
                pid: 42,
                window: WindowHandle(7),
            }]
        );
    }

    #[test]
    fn pending_process_that_exits_produces_no_events() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");

        desktop.set_processes(vec![FakeDesktop::process(42, "notepad.exe", None)]);
        watcher.poll_once();
        desktop.set_processes(vec![]);
        watcher.poll_once();

        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn stopped_fires_when_the_pid_disappears() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");

        desktop.set_processes(vec![FakeDesktop::process(
            42,
            "notepad.exe",
            Some(WindowHandle(7)),
        )]);
        watcher.poll_once();
        desktop.set_processes(vec![]);
        watcher.poll_once();

        let events = drain(&rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            WatchEvent::Stopped {
                name: "notepad".to_string(),
                pid: 42,
            }
        );
    }

    #[test]
    fn restart_after_stop_emits_started_again() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");

        desktop.set_processes(vec![FakeDesktop::process(
            42,
            "notepad.exe",
            Some(WindowHandle(7)),
        )]);
        watcher.poll_once();
        desktop.set_processes(vec![]);
        watcher.poll_once();
        desktop.set_processes(vec![FakeDesktop::process(
            43,
            "notepad.exe",
            Some(WindowHandle(8)),
        )]);
        watcher.poll_once();

        let events = drain(&rx);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            WatchEvent::Started {
                name: "notepad".to_string(),
                pid: 43,
                window: WindowHandle(8),
            }
        );
    }

    #[test]
    fn unwatch_of_a_running_target_emits_stopped_immediately() {
        let (watcher, rx, desktop) = watcher_with_fake();
        watcher.watch("notepad");
        desktop.set_processes(vec![FakeDesktop::process(
            42,
            "notepad.exe",
            Some(WindowHandle(7)),
        )]);
        watcher.poll_once();
        drain(&rx);

        watcher.unwatch("NOTEPAD.EXE");
        assert_eq!(
            drain(&rx),
            vec![WatchEvent::Stopped {
                name: "notepad".to_string(),
                pid: 42,
            }]
        );

        // Gone from the watch set: the process reappearing changes nothing.
        watcher.poll_once();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn name_normalization_ignores_case_and_exe_suffix() {
        assert!(names_match("Notepad", "notepad.exe"));
        assert!(names_match("NOTEPAD.EXE", "notepad"));
        assert!(!names_match("notepad2", "notepad"));
        // A bare ".exe" is a real (odd) name, not an empty one.
        assert_eq!(normalized_name(".exe"), ".exe");
    }
}
