// src/pipeline/task.rs
use crate::error::TaskError;
use crate::patch::Patch;
use crate::types::Issue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle of one file under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Analyzing,
    Analyzed,
    ProposingPatch,
    PatchReady,
    Applying,
    Applied,
    Publishing,
    Done,
    Skipped,
    Failed,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Whether the state machine permits `self -> next`.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use TaskState as S;
        if self.is_terminal() {
            return false;
        }
        if next == S::Failed {
            return true;
        }
        matches!(
            (self, next),
            (S::Pending, S::Analyzing)
                | (S::Analyzing, S::Analyzed)
                | (S::Analyzed, S::ProposingPatch | S::PatchReady | S::Skipped)
                | (S::ProposingPatch, S::PatchReady)
                // a conflicting cached patch falls back to proposing
                | (S::PatchReady, S::Applying | S::ProposingPatch | S::Done)
                | (S::Applying, S::Applied | S::ProposingPatch)
                | (S::Applied, S::Publishing | S::Done)
                | (S::Publishing, S::Done)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::ProposingPatch => "proposing_patch",
            Self::PatchReady => "patch_ready",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the patch being applied came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchSource {
    Cache,
    Proposed,
}

/// One source file under review. Owned by exactly one worker at a time.
#[derive(Debug)]
pub struct FileTask {
    path: PathBuf,
    display: String,
    state: TaskState,
    original: Option<String>,
    issues: Vec<Issue>,
    patch: Option<(Patch, PatchSource)>,
    error: Option<TaskError>,
}

impl FileTask {
    #[must_use]
    pub fn new(path: PathBuf, root: &Path) -> Self {
        let display = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        Self {
            path,
            display,
            state: TaskState::Pending,
            original: None,
            issues: Vec::new(),
            patch: None,
            error: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root-relative path with forward slashes.
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    #[must_use]
    pub fn patch(&self) -> Option<&Patch> {
        self.patch.as_ref().map(|(p, _)| p)
    }

    #[must_use]
    pub fn patch_source(&self) -> Option<PatchSource> {
        self.patch.as_ref().map(|(_, s)| *s)
    }

    #[must_use]
    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub(crate) fn set_original(&mut self, content: String) {
        self.original = Some(content);
    }

    pub(crate) fn set_issues(&mut self, issues: Vec<Issue>) {
        self.issues = issues;
    }

    pub(crate) fn set_patch(&mut self, patch: Patch, source: PatchSource) {
        self.patch = Some((patch, source));
    }

    /// Moves to `next`, returning the previous state. Illegal moves are ignored.
    pub(crate) fn advance(&mut self, next: TaskState) -> Option<TaskState> {
        if !self.state.can_advance_to(next) {
            return None;
        }
        let previous = self.state;
        self.state = next;
        Some(previous)
    }

    pub(crate) fn fail(&mut self, error: TaskError) -> Option<TaskState> {
        let previous = self.advance(TaskState::Failed)?;
        self.error = Some(error);
        Some(previous)
    }
}
