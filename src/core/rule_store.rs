use crate::core::watcher::names_match;
use crate::models::{Placement, Rule};
use parking_lot::Mutex;
use std::sync::mpsc::Sender;

struct TrackedRule {
    rule: Rule,
    /// The placement to apply the next time this process's window appears.
    /// Re-frozen from the live state only when the process fully stops, so
    /// continued sampling never corrupts the pending restore target.
    initial: Option<Placement>,
}

struct Inner {
    rules: Vec<TrackedRule>,
    save_tx: Option<Sender<()>>,
}

/// All per-process rules behind one coarse lock. Poll intervals are hundreds
/// of milliseconds and rule counts are small, so contention is a non-issue.
pub struct RuleStore {
    inner: Mutex<Inner>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::load(Vec::new())
    }

    /// Builds the store from persisted rules. The persisted state doubles as
    /// the initial restore target, exactly as it was at last shutdown.
    pub fn load(rules: Vec<Rule>) -> Self {
        let mut tracked: Vec<TrackedRule> = Vec::new();
        for rule in rules {
            if tracked
                .iter()
                .any(|t| names_match(&t.rule.process_name, &rule.process_name))
            {
                continue;
            }
            tracked.push(TrackedRule {
                initial: rule.state.clone(),
                rule,
            });
        }
        Self {
            inner: Mutex::new(Inner {
                rules: tracked,
                save_tx: None,
            }),
        }
    }

    /// Wires the persistence writer; every mutation from here on requests a
    /// (debounced) save.
    pub fn set_save_notifier(&self, tx: Sender<()>) {
        self.inner.lock().save_tx = Some(tx);
    }

    /// Drops the notifier so the persistence worker sees its channel close.
    pub fn clear_save_notifier(&self) {
        self.inner.lock().save_tx = None;
    }

    fn notify(inner: &Inner) {
        if let Some(tx) = inner.save_tx.as_ref() {
            let _ = tx.send(());
        }
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.inner.lock().rules.iter().map(|t| t.rule.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .rules
            .iter()
            .map(|t| t.rule.process_name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .rules
            .iter()
            .any(|t| names_match(&t.rule.process_name, name))
    }

    /// Adds an empty rule for a newly configured target. Returns false when
    /// an equivalent name already exists.
    pub fn insert(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner
            .rules
            .iter()
            .any(|t| names_match(&t.rule.process_name, name))
        {
            return false;
        }
        inner.rules.push(TrackedRule {
            rule: Rule::new(name),
            initial: None,
        });
        Self::notify(&inner);
        true
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(index) = inner
            .rules
            .iter()
            .position(|t| names_match(&t.rule.process_name, name))
        else {
            return false;
        };
        inner.rules.remove(index);
        Self::notify(&inner);
        true
    }

    pub fn initial_state(&self, name: &str) -> Option<Placement> {
        self.inner
            .lock()
            .rules
            .iter()
            .find(|t| names_match(&t.rule.process_name, name))
            .and_then(|t| t.initial.clone())
    }

    pub fn live_state(&self, name: &str) -> Option<Placement> {
        self.inner
            .lock()
            .rules
            .iter()
            .find(|t| names_match(&t.rule.process_name, name))
            .and_then(|t| t.rule.state.clone())
    }

    /// Mutates a rule's live state under the store lock. Returns false for
    /// unknown names.
    pub fn record_live(&self, name: &str, update: impl FnOnce(&mut Rule)) -> bool {
        let mut inner = self.inner.lock();
        let Some(tracked) = inner
            .rules
            .iter_mut()
            .find(|t| names_match(&t.rule.process_name, name))
        else {
            return false;
        };
        update(&mut tracked.rule);
        Self::notify(&inner);
        true
    }

    /// Copies the live state into the initial state. Called once the
    /// process has stopped and its recorder has been joined, so the copy is
    /// exactly the last sample.
    pub fn freeze(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(tracked) = inner
            .rules
            .iter_mut()
            .find(|t| names_match(&t.rule.process_name, name))
        {
            tracked.initial = tracked.rule.state.clone();
            Self::notify(&inner);
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShowState;

    fn placement(left: i32) -> Placement {
        Placement {
            left,
            top: 40,
            width: 800,
            height: 600,
            show_state: ShowState::Maximized,
        }
    }

    #[test]
    fn load_seeds_initial_state_from_persisted_rules() {
        let store = RuleStore::load(vec![Rule {
            process_name: "notepad".to_string(),
            state: Some(placement(100)),
        }]);
        assert_eq!(store.initial_state("notepad.exe"), Some(placement(100)));
    }

    #[test]
    fn load_drops_duplicate_names() {
        let store = RuleStore::load(vec![
            Rule::new("notepad"),
            Rule::new("Notepad.exe"),
        ]);
        assert_eq!(store.names(), vec!["notepad".to_string()]);
    }

    #[test]
    fn insert_is_case_insensitively_idempotent() {
        let store = RuleStore::new();
        assert!(store.insert("notepad"));
        assert!(!store.insert("NOTEPAD.exe"));
        assert_eq!(store.names().len(), 1);
    }

    #[test]
    fn frozen_state_is_decoupled_from_later_live_updates() {
        let store = RuleStore::load(vec![Rule {
            process_name: "notepad".to_string(),
            state: Some(placement(250)),
        }]);

        store.freeze("notepad");
        store.record_live("notepad", |rule| {
            rule.state = Some(placement(999));
        });

        assert_eq!(store.initial_state("notepad"), Some(placement(250)));
        assert_eq!(store.live_state("notepad"), Some(placement(999)));
    }

    #[test]
    fn mutations_ping_the_save_notifier() {
        let store = RuleStore::new();
        let (tx, rx) = std::sync::mpsc::channel();
        store.set_save_notifier(tx);

        store.insert("notepad");
        store.record_live("notepad", |rule| rule.state = Some(placement(1)));
        store.freeze("notepad");
        store.remove("notepad");

        assert_eq!(rx.try_iter().count(), 4);
    }
}
