// src/pipeline/worker.rs
//! Per-file state machine. One worker owns one [`FileTask`] from dispatch to
//! its terminal state.

use super::report::TaskOutcome;
use super::task::{FileTask, PatchSource, TaskState};
use super::PipelineSettings;
use crate::apply::{AppliedResult, BackupHandle, FileApplier};
use crate::collab::{Collaborators, PublishReceipt};
use crate::error::{ApiError, RateLimitExceeded, TaskError};
use crate::events::{EventKind, EventLogger};
use crate::limiter::{with_retry, RateLimiter, RetryError, Retryable, ServiceClass};
use crate::memory::{MemoryCache, PatchRecord};
use crate::patch::{self, Patch};
use crate::reporting;
use crate::types::{Fingerprint, Issue};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Failure of one rate-limited, time-boxed call attempt.
#[derive(Debug)]
enum CallError {
    Limit(RateLimitExceeded),
    Api(ApiError),
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Limit(e) => e.is_retryable(),
            Self::Api(e) => e.is_retryable(),
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit(e) => e.fmt(f),
            Self::Api(e) => e.fmt(f),
        }
    }
}

/// Patch validated in memory (dry run) or committed to disk.
enum Staged {
    Preview,
    Written(AppliedResult, BackupHandle),
}

/// State shared by every worker of one run.
pub(super) struct Context {
    pub(super) settings: PipelineSettings,
    pub(super) collab: Collaborators,
    pub(super) limiter: Arc<RateLimiter>,
    pub(super) memory: Arc<MemoryCache>,
    pub(super) applier: FileApplier,
    pub(super) events: EventLogger,
    pub(super) cancel: CancellationToken,
    pub(super) outcomes: Mutex<Vec<TaskOutcome>>,
    pub(super) fatal: Mutex<Option<(ServiceClass, ApiError)>>,
}

impl Context {
    /// Runs `task` to a terminal state and archives its outcome.
    pub(super) async fn drive(&self, mut task: FileTask) {
        let receipt = match self.process(&mut task).await {
            Ok(receipt) => receipt,
            Err(error) => {
                self.fail(&mut task, error);
                None
            }
        };
        let outcome = TaskOutcome::from_task(&task, self.settings.dry_run, receipt);
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }

    async fn process(&self, task: &mut FileTask) -> Result<Option<PublishReceipt>, TaskError> {
        self.advance(task, TaskState::Analyzing);
        let content = tokio::fs::read_to_string(task.path())
            .await
            .map_err(|e| TaskError::Io {
                path: task.path().to_path_buf(),
                message: e.to_string(),
            })?;
        let issues = self
            .collab
            .analyzer
            .analyze(task.path(), &content)
            .await
            .map_err(|e| TaskError::Analysis(format!("{e:#}")))?;
        task.set_original(content.clone());
        task.set_issues(issues);
        self.advance(task, TaskState::Analyzed);

        let Some(primary) = task.issues().first().cloned() else {
            self.advance(task, TaskState::Skipped);
            return Ok(None);
        };
        let embedding = self.collab.embedder.embed(&primary, &content);

        let cached = self.lookup(task, &primary, &embedding, &content);
        let cached_fingerprint = match cached {
            Some((patch, fingerprint)) => {
                task.set_patch(patch, PatchSource::Cache);
                self.advance(task, TaskState::PatchReady);
                Some(fingerprint)
            }
            None => {
                self.propose(task, &primary, &content).await?;
                None
            }
        };

        loop {
            match self.stage(task, &content) {
                Ok(staged) => {
                    let reused = cached_fingerprint
                        .as_ref()
                        .filter(|_| task.patch_source() == Some(PatchSource::Cache));
                    return self.finish(task, &primary, embedding, reused, staged).await;
                }
                Err(TaskError::Conflict(_)) if task.patch_source() == Some(PatchSource::Cache) => {
                    self.propose(task, &primary, &content).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn lookup(
        &self,
        task: &FileTask,
        primary: &Issue,
        embedding: &[f32],
        content: &str,
    ) -> Option<(Patch, Fingerprint)> {
        if !self.settings.use_memory {
            return None;
        }
        let threshold = self.settings.similarity_threshold;
        match self.memory.try_lookup(primary.fingerprint(), embedding, threshold) {
            Ok(Some(record)) => {
                // A stored patch that no longer parses against this file is a miss.
                let patch = patch::parse(&record.patch, content).ok()?;
                self.events.log(EventKind::CacheHit {
                    path: task.display().to_string(),
                    record_id: record.id.to_string(),
                });
                Some((patch, record.fingerprint))
            }
            Ok(None) => None,
            Err(e) => {
                self.events.log(EventKind::CacheUnavailable { reason: e.reason });
                None
            }
        }
    }

    async fn propose(
        &self,
        task: &mut FileTask,
        issue: &Issue,
        content: &str,
    ) -> Result<(), TaskError> {
        self.advance(task, TaskState::ProposingPatch);
        let path = task.path().to_path_buf();
        let proposer = &self.collab.proposer;
        let text = self
            .call(
                ServiceClass::FixGeneration,
                task.display(),
                TaskError::Propose,
                || proposer.propose(issue, &path, content),
            )
            .await?;
        let patch = patch::parse(&text, content)?;
        task.set_patch(patch, PatchSource::Proposed);
        self.advance(task, TaskState::PatchReady);
        Ok(())
    }

    fn stage(&self, task: &mut FileTask, content: &str) -> Result<Staged, TaskError> {
        if self.settings.dry_run {
            let patch = task.patch().ok_or_else(no_patch)?;
            self.applier.preview(task.path(), patch, content)?;
            return Ok(Staged::Preview);
        }
        if self.cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        self.advance(task, TaskState::Applying);
        let patch = task.patch().ok_or_else(no_patch)?;
        let (applied, handle) = self.applier.apply_file(task.path(), patch, content)?;
        Ok(Staged::Written(applied, handle))
    }

    async fn finish(
        &self,
        task: &mut FileTask,
        primary: &Issue,
        embedding: Vec<f32>,
        reused: Option<&Fingerprint>,
        staged: Staged,
    ) -> Result<Option<PublishReceipt>, TaskError> {
        let (applied, handle) = match staged {
            Staged::Preview => {
                self.advance(task, TaskState::Done);
                return Ok(None);
            }
            Staged::Written(applied, handle) => (applied, handle),
        };
        self.advance(task, TaskState::Applied);

        // Nothing is published once the run is winding down.
        if self.cancel.is_cancelled() {
            self.rollback(task, &handle);
            return Err(TaskError::Cancelled);
        }

        let receipt = if self.settings.publish {
            self.advance(task, TaskState::Publishing);
            match self.publish(task, &applied.content).await {
                Ok(receipt) => Some(receipt),
                Err(e) => {
                    self.rollback(task, &handle);
                    return Err(e);
                }
            }
        } else {
            None
        };

        if reused != Some(primary.fingerprint()) {
            self.remember(task, primary, embedding);
        }
        if receipt.is_some() {
            // Published changes no longer need a local undo.
            let _ = self.applier.discard(&handle);
        }
        self.advance(task, TaskState::Done);
        Ok(receipt)
    }

    async fn publish(&self, task: &FileTask, content: &str) -> Result<PublishReceipt, TaskError> {
        let publisher = &self.collab.publisher;
        let issues = task.issues();
        self.call(
            ServiceClass::Publishing,
            task.display(),
            TaskError::Publish,
            || publisher.publish(task.path(), content, issues),
        )
        .await
    }

    /// Closing publish step over the receipts of every finished task.
    pub(super) async fn finalize(
        &self,
        receipts: &[PublishReceipt],
    ) -> Result<Option<String>, TaskError> {
        let publisher = &self.collab.publisher;
        self.call(ServiceClass::Publishing, "", TaskError::Publish, || {
            publisher.finalize(receipts)
        })
        .await
    }

    /// One external call: token from the limiter, bounded by the call
    /// timeout, retried per the run's policy, abandoned on cancellation.
    async fn call<T, F, Fut>(
        &self,
        class: ServiceClass,
        path: &str,
        wrap: fn(ApiError) -> TaskError,
        mut op: F,
    ) -> Result<T, TaskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let timeout = self.settings.call_timeout;
        let max_attempts = self.settings.retry.max_attempts;
        let result = with_retry(&self.settings.retry, &self.cancel, |attempt| {
            let call = op();
            async move {
                let outcome = match self.limiter.acquire(class).await {
                    Err(e) => Err(CallError::Limit(e)),
                    Ok(()) => match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result.map_err(CallError::Api),
                        Err(_) => Err(CallError::Api(ApiError::timeout(timeout))),
                    },
                };
                if let Err(e) = &outcome {
                    if e.is_retryable() && attempt < max_attempts {
                        self.events.log(EventKind::RetryScheduled {
                            path: path.to_string(),
                            class,
                            attempt,
                            error: e.to_string(),
                        });
                    }
                }
                outcome
            }
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(RetryError::Cancelled) => Err(TaskError::Cancelled),
            Err(RetryError::Exhausted { last, .. } | RetryError::Permanent(last)) => Err(match last {
                CallError::Limit(e) => TaskError::RateLimit(e),
                CallError::Api(e) => wrap(e),
            }),
        }
    }

    fn remember(&self, task: &FileTask, primary: &Issue, embedding: Vec<f32>) {
        if !self.settings.use_memory {
            return;
        }
        let Some(patch) = task.patch() else {
            return;
        };
        let record = PatchRecord::new(
            primary.fingerprint().clone(),
            embedding,
            patch.to_unified(task.display()),
            task.display(),
        );
        if let Err(e) = self.memory.insert(record) {
            self.events.log(EventKind::CacheUnavailable { reason: e.reason });
        }
    }

    fn rollback(&self, task: &FileTask, handle: &BackupHandle) {
        match self.applier.rollback(handle) {
            Ok(()) => self.events.log(EventKind::RolledBack {
                path: task.display().to_string(),
            }),
            Err(e) => {
                reporting::warn(&format!("rollback of {} failed: {e}", task.display()));
                self.events.log(EventKind::TaskFailed {
                    path: task.display().to_string(),
                    reason: "rollback".to_string(),
                    detail: e.to_string(),
                });
            }
        }
    }

    fn advance(&self, task: &mut FileTask, next: TaskState) {
        if let Some(previous) = task.advance(next) {
            self.transitioned(task, previous, next);
        }
    }

    fn fail(&self, task: &mut FileTask, error: TaskError) {
        match &error {
            TaskError::Propose(e) if e.kind.is_fatal() => {
                self.abort(ServiceClass::FixGeneration, e.clone());
            }
            TaskError::Publish(e) if e.kind.is_fatal() => {
                self.abort(ServiceClass::Publishing, e.clone());
            }
            _ => {}
        }
        let reason = error.label().to_string();
        let detail = error.to_string();
        if let Some(previous) = task.fail(error) {
            self.transitioned(task, previous, TaskState::Failed);
            self.events.log(EventKind::TaskFailed {
                path: task.display().to_string(),
                reason,
                detail,
            });
        }
    }

    /// Records the first run-fatal error and stops the run.
    pub(super) fn abort(&self, class: ServiceClass, error: ApiError) {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some((class, error));
        }
        self.cancel.cancel();
    }

    fn transitioned(&self, task: &FileTask, from: TaskState, to: TaskState) {
        self.events.log(EventKind::Transition {
            path: task.display().to_string(),
            from,
            to,
        });
        if self.settings.verbose {
            reporting::print_transition(task.display(), from, to);
        }
    }
}

fn no_patch() -> TaskError {
    TaskError::Internal("no patch staged".to_string())
}
