pub mod core;
pub mod models;

use crate::core::engine::Engine;
use crate::core::persistence::{self, Persistence};
use crate::core::watcher::names_match;
use crate::core::{app_log, platform, RuleStore};
use crate::models::{Rule, Settings, ShowState};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

const INSTANCE_MUTEX_NAME: &str = "reseat-single-instance";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub watch: Vec<String>,
    pub unwatch: Vec<String>,
    pub watcher_poll_ms: Option<u64>,
    pub recorder_poll_ms: Option<u64>,
    pub list: bool,
}

fn default_state_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reseat")
        .join("state.json")
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reseat")
        .join("logs")
}

fn describe(rule: &Rule) -> String {
    match rule.state.as_ref() {
        Some(state) => {
            let mode = match state.show_state {
                ShowState::Hidden => "hidden",
                ShowState::Normal => "normal",
                ShowState::Minimized => "minimized",
                ShowState::Maximized => "maximized",
            };
            format!(
                "{}  {},{} {}x{} {}",
                rule.process_name, state.left, state.top, state.width, state.height, mode
            )
        }
        None => format!("{}  (no placement recorded)", rule.process_name),
    }
}

pub fn run(options: Options) -> anyhow::Result<()> {
    let state_path = options.config.clone().unwrap_or_else(default_state_path);

    let (mut settings, rules) = match persistence::load(&state_path) {
        Ok(Some(loaded)) => loaded,
        Ok(None) => (Settings::default(), Vec::new()),
        Err(e) => {
            // An unreadable state file must not keep the watcher from
            // starting; the rules can be rebuilt by use.
            eprintln!(
                "reseat: ignoring unreadable state file {}: {}",
                state_path.display(),
                e
            );
            (Settings::default(), Vec::new())
        }
    };

    if options.list {
        if rules.is_empty() {
            println!("no rules configured");
        }
        for rule in &rules {
            println!("{}", describe(rule));
        }
        return Ok(());
    }

    if let Some(ms) = options.watcher_poll_ms {
        settings.watcher_poll_ms = ms;
    }
    if let Some(ms) = options.recorder_poll_ms {
        settings.recorder_poll_ms = ms;
    }
    let settings = settings.sanitized();

    let mut desired: Vec<String> = rules.iter().map(|r| r.process_name.clone()).collect();
    for name in &options.watch {
        if !desired.iter().any(|d| names_match(d, name)) {
            desired.push(name.clone());
        }
    }
    desired.retain(|d| !options.unwatch.iter().any(|u| names_match(u, d)));

    if !platform::acquire_single_instance(INSTANCE_MUTEX_NAME) {
        eprintln!("reseat: another instance is already running");
        return Ok(());
    }

    platform::enable_dpi_awareness();

    if let Err(e) = app_log::init(default_log_dir()) {
        eprintln!("reseat: logging disabled: {}", e);
    }
    app_log::install_panic_hook();
    let _ = app_log::info("app", "startup");

    let store = Arc::new(RuleStore::load(rules));
    let (engine, events) = Engine::new(platform::native(), store.clone(), &settings);
    engine.reconcile(&desired);

    let persistence = Persistence::spawn(store, settings.clone(), state_path.clone());

    if !platform::install_ctrl_handler(engine.cancel_token()) {
        let _ = app_log::warn("app", "no console ctrl handler; stop via the process manager");
    }

    engine.run(events);

    let _ = app_log::info("app", "shutdown");
    persistence
        .shutdown()
        .with_context(|| format!("failed to write final state to {}", state_path.display()))?;
    Ok(())
}
