use crate::core::app_log;
use crate::core::cancel::CancelToken;
use crate::core::geometry;
use crate::core::platform::{Desktop, Pid, WindowHandle};
use crate::core::recorder;
use crate::core::rule_store::RuleStore;
use crate::core::watcher::{names_match, ProcessWatcher, WatchEvent};
use crate::models::Settings;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const DISPATCH_WAKE_INTERVAL: Duration = Duration::from_millis(200);

/// One live recorder task. At most one exists per rule.
struct TrackingHandle {
    name: String,
    cancel: CancelToken,
    task: JoinHandle<()>,
}

/// Glue between watcher events and tracking state: applies recorded
/// placements when a watched window appears, runs a recorder per open window,
/// freezes rules when their process stops, and drains everything at shutdown.
pub struct Engine {
    desktop: Arc<dyn Desktop>,
    store: Arc<RuleStore>,
    watcher: Arc<ProcessWatcher>,
    cancel: CancelToken,
    recorder_interval: Duration,
}

impl Engine {
    pub fn new(
        desktop: Arc<dyn Desktop>,
        store: Arc<RuleStore>,
        settings: &Settings,
    ) -> (Self, Receiver<WatchEvent>) {
        let (watcher, events) = ProcessWatcher::new(
            Arc::clone(&desktop),
            Duration::from_millis(settings.watcher_poll_ms),
        );
        for name in store.names() {
            watcher.watch(&name);
        }
        let engine = Self {
            desktop,
            store,
            watcher,
            cancel: CancelToken::new(),
            recorder_interval: Duration::from_millis(settings.recorder_poll_ms),
        };
        (engine, events)
    }

    /// Token that stops the whole engine when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Reconciles the configured target list against `desired`: names no
    /// longer wanted are unwatched (running ones get a stopped event, which
    /// tears their recorder down) and dropped from the store; new names get
    /// an empty rule and a watch entry.
    pub fn reconcile(&self, desired: &[String]) {
        for name in self.store.names() {
            if !desired.iter().any(|d| names_match(d, &name)) {
                self.watcher.unwatch(&name);
                self.store.remove(&name);
            }
        }
        for name in desired {
            if self.store.insert(name) {
                self.watcher.watch(name);
            }
        }
    }

    /// Runs the watcher and the event dispatch loop until the engine token is
    /// cancelled, then joins every outstanding task. Placement rules are in
    /// their final state when this returns, so the caller can persist them.
    pub fn run(&self, events: Receiver<WatchEvent>) {
        let watcher_task = self.watcher.start(self.cancel.clone());
        let mut handles: Vec<TrackingHandle> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match events.recv_timeout(DISPATCH_WAKE_INTERVAL) {
                Ok(event) => self.handle_event(&mut handles, event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let _ = watcher_task.join();

        // Cancel everything first so the recorders wind down in parallel,
        // then wait for each to observe it.
        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles.drain(..) {
            let _ = handle.task.join();
        }
    }

    pub(crate) fn handle_event(&self, handles: &mut Vec<TrackingHandle>, event: WatchEvent) {
        match event {
            WatchEvent::Started { name, pid, window }
            | WatchEvent::WindowOpened { name, pid, window } => {
                self.on_window_ready(handles, name, pid, window);
            }
            WatchEvent::Stopped { name, pid } => {
                self.on_stopped(handles, name, pid);
            }
        }
    }

    fn on_window_ready(
        &self,
        handles: &mut Vec<TrackingHandle>,
        name: String,
        pid: Pid,
        window: WindowHandle,
    ) {
        if !self.store.contains(&name) {
            // A reconcile can remove the rule while its event is in flight.
            return;
        }
        let _ = app_log::info("engine", &format!("{name} opened (pid {pid})"));

        if let Some(initial) = self.store.initial_state(&name) {
            geometry::apply_placement(self.desktop.as_ref(), window, &initial);
        }

        // A stale recorder for this rule (e.g. a stop event that never
        // arrived) must go before the new one starts.
        if let Some(index) = handles.iter().position(|h| names_match(&h.name, &name)) {
            let stale = handles.remove(index);
            stale.cancel.cancel();
            let _ = stale.task.join();
        }

        let cancel = CancelToken::new();
        let task = recorder::spawn(
            Arc::clone(&self.desktop),
            Arc::clone(&self.store),
            name.clone(),
            window,
            self.recorder_interval,
            cancel.clone(),
        );
        handles.push(TrackingHandle { name, cancel, task });
    }

    fn on_stopped(&self, handles: &mut Vec<TrackingHandle>, name: String, pid: Pid) {
        let Some(index) = handles.iter().position(|h| names_match(&h.name, &name)) else {
            return;
        };
        let handle = handles.remove(index);
        handle.cancel.cancel();
        // Joining before the freeze guarantees the frozen snapshot is the
        // recorder's last sample, not one taken after the stop.
        let _ = handle.task.join();
        self.store.freeze(&name);
        let _ = app_log::info("engine", &format!("{name} closed (pid {pid})"));
    }
}
