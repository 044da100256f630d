// src/pipeline/report.rs
use super::task::{FileTask, PatchSource, TaskState};
use crate::collab::PublishReceipt;
use crate::exit::ForgefixExit;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Done,
    Skipped,
    Failed,
}

/// Archived result of one FileTask.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub path: String,
    pub status: OutcomeStatus,
    /// Stable failure label (`conflict`, `parse`, ...).
    pub reason: Option<String>,
    pub detail: Option<String>,
    pub issues: usize,
    pub cache_hit: bool,
    pub dry_run: bool,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub receipt: Option<PublishReceipt>,
}

impl TaskOutcome {
    /// Archives a terminal task.
    #[must_use]
    pub fn from_task(task: &FileTask, dry_run: bool, receipt: Option<PublishReceipt>) -> Self {
        let status = match task.state() {
            TaskState::Done => OutcomeStatus::Done,
            TaskState::Skipped => OutcomeStatus::Skipped,
            _ => OutcomeStatus::Failed,
        };
        let (reason, detail) = match (status, task.error()) {
            (OutcomeStatus::Failed, Some(e)) => (Some(e.label().to_string()), Some(e.to_string())),
            (OutcomeStatus::Failed, None) => (
                Some("internal".to_string()),
                Some(format!("task stopped in state {}", task.state())),
            ),
            _ => (None, None),
        };
        let done = status == OutcomeStatus::Done;
        Self {
            path: task.display().to_string(),
            status,
            reason,
            detail,
            issues: task.issues().len(),
            cache_hit: done && task.patch_source() == Some(PatchSource::Cache),
            dry_run: done && dry_run,
            lines_added: task.patch().filter(|_| done).map_or(0, |p| p.lines_added()),
            lines_removed: task.patch().filter(|_| done).map_or(0, |p| p.lines_removed()),
            receipt,
        }
    }

    /// A task that never got a worker (panicked or otherwise lost).
    #[must_use]
    pub fn lost(path: String, detail: String) -> Self {
        Self {
            path,
            status: OutcomeStatus::Failed,
            reason: Some("internal".to_string()),
            detail: Some(detail),
            issues: 0,
            cache_hit: false,
            dry_run: false,
            lines_added: 0,
            lines_removed: 0,
            receipt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
    /// Candidates beyond the file cap or left pending by cancellation.
    pub not_dispatched: Vec<String>,
    pub cancelled: bool,
    /// Set when a run-fatal condition stopped the run.
    pub aborted: Option<String>,
    pub pull_request: Option<String>,
    /// Failure of the closing publish step (push, PR creation).
    pub publish_error: Option<String>,
}

impl RunReport {
    #[must_use]
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: started_at,
            outcomes: Vec::new(),
            not_dispatched: Vec::new(),
            cancelled: false,
            aborted: None,
            pull_request: None,
            publish_error: None,
        }
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    #[must_use]
    pub fn done(&self) -> usize {
        self.count(OutcomeStatus::Done)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cache_hit).count()
    }

    /// Tasks that had issues to fix, i.e. everything not skipped.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.outcomes.len() - self.skipped()
    }

    #[must_use]
    pub fn outcome(&self, path: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.path == path)
    }

    #[must_use]
    pub fn exit_code(&self) -> ForgefixExit {
        if self.aborted.is_some() {
            ForgefixExit::Fatal
        } else if self.attempted() > 0 && self.done() == 0 {
            ForgefixExit::NoSuccess
        } else {
            ForgefixExit::Success
        }
    }
}
