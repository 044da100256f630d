// src/events.rs
//! Machine-readable run event log.
//!
//! Events are appended to `.forgefix/events.jsonl`, one JSON object per line.

use crate::limiter::ServiceClass;
use crate::pipeline::TaskState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub const EVENTS_FILE: &str = ".forgefix/events.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        candidates: usize,
        dispatched: usize,
        dry_run: bool,
    },
    Transition {
        path: String,
        from: TaskState,
        to: TaskState,
    },
    TaskFailed {
        path: String,
        reason: String,
        detail: String,
    },
    CacheHit {
        path: String,
        record_id: String,
    },
    CacheUnavailable {
        reason: String,
    },
    RetryScheduled {
        path: String,
        class: ServiceClass,
        attempt: u32,
        error: String,
    },
    RolledBack {
        path: String,
    },
    RunAborted {
        reason: String,
    },
    RunFinished {
        done: usize,
        skipped: usize,
        failed: usize,
        not_dispatched: usize,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgefixEvent {
    pub timestamp: u64,
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Clone)]
pub struct EventLogger {
    log_path: Option<PathBuf>,
    run_id: String,
    lock: Arc<Mutex<()>>,
}

impl EventLogger {
    #[must_use]
    pub fn new(repo_root: &Path, run_id: impl Into<String>) -> Self {
        Self {
            log_path: Some(repo_root.join(EVENTS_FILE)),
            run_id: run_id.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// A logger that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            log_path: None,
            run_id: String::new(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn log(&self, kind: EventKind) {
        let Some(path) = &self.log_path else {
            return;
        };
        // Best-effort: a failing log never fails the run.
        if let Ok(json) = self.serialize_event(kind) {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = append_line(path, &json);
        }
    }

    fn serialize_event(&self, kind: EventKind) -> Result<String> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let event = ForgefixEvent {
            timestamp,
            run_id: self.run_id.clone(),
            kind,
        };
        Ok(serde_json::to_string(&event)?)
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{line}\n").as_bytes())?;
    Ok(())
}

/// Reads back every parseable event in a log file.
///
/// # Errors
/// Returns error if the file cannot be read.
pub fn read_events(path: &Path) -> Result<Vec<ForgefixEvent>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(dir.path(), "run-1");
        logger.log(EventKind::RunAborted {
            reason: "x".into(),
        });
        logger.log(EventKind::Transition {
            path: "a.rs".into(),
            from: TaskState::Pending,
            to: TaskState::Analyzing,
        });

        let events = read_events(&dir.path().join(EVENTS_FILE)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].run_id, "run-1");
        assert!(matches!(events[1].kind, EventKind::Transition { .. }));
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let logger = EventLogger::disabled();
        logger.log(EventKind::RunAborted {
            reason: "x".into(),
        });
        assert!(logger.path().is_none());
    }
}
