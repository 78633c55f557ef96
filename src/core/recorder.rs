use crate::core::cancel::CancelToken;
use crate::core::platform::{Desktop, WindowHandle};
use crate::core::rule_store::RuleStore;
use crate::models::{Placement, ShowState};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Spawns the sampling loop for one open tracked window. The loop runs until
/// its token is cancelled; there is no final flush because every sample is
/// already the rule's live state.
pub fn spawn(
    desktop: Arc<dyn Desktop>,
    store: Arc<RuleStore>,
    name: String,
    window: WindowHandle,
    interval: Duration,
    cancel: CancelToken,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("recorder-{name}"))
        .spawn(move || {
            while !cancel.is_cancelled() {
                sample_once(desktop.as_ref(), &store, &name, window);
                thread::sleep(interval);
            }
        })
        .expect("spawn recorder")
}

/// Takes one placement sample. OS queries happen before the store lock is
/// taken; only the rule write holds it.
pub(crate) fn sample_once(
    desktop: &dyn Desktop,
    store: &RuleStore,
    name: &str,
    window: WindowHandle,
) {
    let Some(rect) = desktop.window_rect(window) else {
        return;
    };
    let Some(show_state) = desktop.show_state(window) else {
        return;
    };

    if show_state == ShowState::Normal {
        store.record_live(name, |rule| {
            rule.state = Some(Placement {
                left: rect.left,
                top: rect.top,
                width: rect.width(),
                height: rect.height(),
                show_state,
            });
        });
        return;
    }

    // Minimized/maximized geometry is meaningless as a restore target: keep
    // the last normal width/height and re-center on the current monitor so
    // the stored placement stays sensible, updating only the show state.
    let work_area = desktop.work_area(window);
    store.record_live(name, |rule| {
        let state = rule.state.get_or_insert_with(Placement::default);
        if let Some(work) = work_area {
            state.left = work.left + work.width() / 2 - state.width / 2;
            state.top = work.top + work.height() / 2 - state.height / 2;
        }
        state.show_state = show_state;
    });
}
