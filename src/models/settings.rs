use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interval between process-table polls, in milliseconds.
    pub watcher_poll_ms: u64,
    /// Interval between placement samples for an open tracked window.
    pub recorder_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watcher_poll_ms: 1000,
            recorder_poll_ms: 500,
        }
    }
}

impl Settings {
    pub fn sanitized(mut self) -> Self {
        self.watcher_poll_ms = self.watcher_poll_ms.clamp(100, 60_000);
        self.recorder_poll_ms = self.recorder_poll_ms.clamp(100, 10_000);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_out_of_range_intervals() {
        let settings = Settings {
            watcher_poll_ms: 0,
            recorder_poll_ms: 9_999_999,
        }
        .sanitized();
        assert_eq!(settings.watcher_poll_ms, 100);
        assert_eq!(settings.recorder_poll_ms, 10_000);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.watcher_poll_ms, 1000);
        assert_eq!(settings.recorder_poll_ms, 500);
    }
}
