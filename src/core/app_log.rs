use chrono::Utc;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const LOG_FILE_NAME: &str = "app.log.jsonl";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const MAX_ROTATIONS: usize = 3;

static LOG_DIR: OnceCell<PathBuf> = OnceCell::new();
static LOG_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppLogRecord {
    pub ts_ms: i64,
    pub level: String,
    pub scope: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Installs the log directory. Logging before (or without) init is a silent
/// no-op so library callers and tests never pay for it.
pub fn init(dir: PathBuf) -> Result<(), String> {
    fs::create_dir_all(&dir).map_err(|e| format!("Failed to create log dir: {}", e))?;
    let _ = LOG_DIR.set(dir);
    Ok(())
}

fn log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE_NAME)
}

fn rotated_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("app.log.{}.jsonl", index))
}

fn rotate_if_needed(dir: &Path) -> Result<(), String> {
    let path = log_path(dir);
    let Ok(meta) = fs::metadata(&path) else {
        return Ok(());
    };
    if meta.len() < MAX_LOG_BYTES {
        return Ok(());
    }

    let oldest = rotated_path(dir, MAX_ROTATIONS);
    if oldest.exists() {
        fs::remove_file(&oldest)
            .map_err(|e| format!("Failed to remove old log {}: {}", oldest.display(), e))?;
    }

    for i in (1..MAX_ROTATIONS).rev() {
        let src = rotated_path(dir, i);
        let dst = rotated_path(dir, i + 1);
        if src.exists() {
            fs::rename(&src, &dst).map_err(|e| {
                format!("Failed to rotate log ({} -> {}): {}", src.display(), dst.display(), e)
            })?;
        }
    }

    let first = rotated_path(dir, 1);
    fs::rename(&path, &first).map_err(|e| {
        format!("Failed to rotate log ({} -> {}): {}", path.display(), first.display(), e)
    })?;
    Ok(())
}

pub fn append(record: AppLogRecord) -> Result<(), String> {
    let Some(dir) = LOG_DIR.get() else {
        return Ok(());
    };

    let _guard = LOG_LOCK.lock();
    rotate_if_needed(dir)?;
    let path = log_path(dir);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file: {}", e))?;

    let line = serde_json::to_string(&record)
        .map_err(|e| format!("Failed to serialize log record: {}", e))?;
    file.write_all(line.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .map_err(|e| format!("Failed to write log record: {}", e))?;
    Ok(())
}

fn record(level: &str, scope: &str, message: &str) -> AppLogRecord {
    AppLogRecord {
        ts_ms: Utc::now().timestamp_millis(),
        level: level.to_string(),
        scope: scope.to_string(),
        message: message.to_string(),
        data: None,
    }
}

pub fn info(scope: &str, message: &str) -> Result<(), String> {
    append(record("info", scope, message))
}

pub fn warn(scope: &str, message: &str) -> Result<(), String> {
    append(record("warn", scope, message))
}

pub fn error(scope: &str, message: &str) -> Result<(), String> {
    append(record("error", scope, message))
}

pub fn install_panic_hook() {
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "panic".to_string()
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());

        let _ = error("panic", &format!("{} ({})", payload, location));

        prev(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_without_init_is_a_silent_no_op() {
        // LOG_DIR is process-global; this test relies on no other test
        // calling init, which none does.
        assert!(info("test", "hello").is_ok());
    }

    #[test]
    fn records_serialize_without_a_data_field_when_absent() {
        let line = serde_json::to_string(&record("info", "engine", "notepad opened")).unwrap();
        assert!(!line.contains("\"data\""));
        assert!(line.contains("\"scope\":\"engine\""));
    }
}
