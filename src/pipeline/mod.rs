// src/pipeline/mod.rs
//! Orchestrator: drives a bounded set of candidate files through the
//! remediation state machine on a fixed-size worker pool.
//!
//! Tasks are independent. A failed task never touches its siblings; only a
//! run-fatal collaborator error (rejected credentials) stops dispatch and
//! cancels whatever is still in flight.

pub mod report;
pub mod task;
mod worker;

pub use report::{OutcomeStatus, RunReport, TaskOutcome};
pub use task::{FileTask, PatchSource, TaskState};

use crate::apply::{BackupStore, FileApplier};
use crate::collab::{Collaborators, PublishReceipt};
use crate::config::Config;
use crate::error::{ApiError, RunError, TaskError};
use crate::events::{EventKind, EventLogger};
use crate::limiter::{LimiterSettings, RateLimiter, RetryPolicy, ServiceClass};
use crate::memory::{MemoryCache, MemorySettings, DEFAULT_THRESHOLD};
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use worker::Context;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_files: usize,
    pub workers: usize,
    /// Validate patches in memory only; write and publish nothing.
    pub dry_run: bool,
    pub publish: bool,
    pub use_memory: bool,
    pub similarity_threshold: f32,
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
    pub verbose: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_files: 10,
            workers: 4,
            dry_run: false,
            publish: true,
            use_memory: true,
            similarity_threshold: DEFAULT_THRESHOLD,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(60),
            verbose: false,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_files: config.pipeline.max_files,
            workers: config.pipeline.workers,
            dry_run: config.pipeline.dry_run,
            publish: config.publish.enabled,
            use_memory: config.memory.enabled,
            similarity_threshold: config.memory.similarity_threshold,
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            verbose: config.verbose,
        }
    }
}

/// `<yyyymmddHHMMSS>-<8 hex>`; sorts by start time.
#[must_use]
pub fn new_run_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{}-{suffix}", Utc::now().format("%Y%m%d%H%M%S"))
}

pub struct Orchestrator {
    run_id: String,
    root: PathBuf,
    settings: PipelineSettings,
    collaborators: Collaborators,
    limiter: Arc<RateLimiter>,
    memory: Arc<MemoryCache>,
    events: EventLogger,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// An orchestrator with a default limiter, an in-memory cache, and no
    /// event log. Use the `with_*` builders to supply shared ones.
    #[must_use]
    pub fn new(
        root: &Path,
        run_id: impl Into<String>,
        settings: PipelineSettings,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            root: root.to_path_buf(),
            settings,
            collaborators,
            limiter: Arc::new(RateLimiter::new(LimiterSettings::default())),
            memory: Arc::new(MemoryCache::in_memory(MemorySettings::default())),
            events: EventLogger::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: Arc<MemoryCache>) -> Self {
        self.memory = memory;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventLogger) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryCache> {
        &self.memory
    }

    /// Token that stops dispatch and cancels in-flight external calls.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Processes up to `max_files` of `candidates` and reports every outcome.
    ///
    /// # Errors
    /// Returns [`RunError::Fatal`] when a collaborator rejects the run's
    /// credentials, during preflight or mid-run. A mid-run abort carries the
    /// partial report.
    pub async fn run(&self, mut candidates: Vec<PathBuf>) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        self.preflight().await?;

        let overflow = candidates.split_off(self.settings.max_files.min(candidates.len()));
        self.events.log(EventKind::RunStarted {
            candidates: candidates.len() + overflow.len(),
            dispatched: candidates.len(),
            dry_run: self.settings.dry_run,
        });

        let ctx = Arc::new(self.context());
        let (displays, outcomes) = self.dispatch(&ctx, candidates).await;

        let mut report = RunReport::new(&self.run_id, started_at);
        report.not_dispatched = overflow
            .iter()
            .map(|p| FileTask::new(p.clone(), &self.root).display().to_string())
            .collect();
        report.not_dispatched.extend(displays);
        report.outcomes = outcomes;
        report.outcomes.sort_by(|a, b| a.path.cmp(&b.path));

        let fatal = ctx.fatal.lock().unwrap_or_else(PoisonError::into_inner).take();
        if fatal.is_none() && !self.cancel.is_cancelled() {
            self.finalize(&ctx, &mut report).await;
        }
        let fatal = fatal.or_else(|| ctx.fatal.lock().unwrap_or_else(PoisonError::into_inner).take());
        report.cancelled = self.cancel.is_cancelled() && fatal.is_none();

        if let Err(e) = self.memory.flush() {
            self.events.log(EventKind::CacheUnavailable { reason: e.reason });
        }
        report.finished_at = Utc::now();
        self.events.log(EventKind::RunFinished {
            done: report.done(),
            skipped: report.skipped(),
            failed: report.failed(),
            not_dispatched: report.not_dispatched.len(),
        });

        match fatal {
            Some((class, error)) => {
                report.aborted = Some(error.to_string());
                self.events.log(EventKind::RunAborted {
                    reason: error.to_string(),
                });
                Err(RunError::Fatal {
                    class,
                    error,
                    report: Some(Box::new(report)),
                })
            }
            None => Ok(report),
        }
    }

    fn context(&self) -> Context {
        let backups = BackupStore::new(&self.root, self.run_id.clone());
        Context {
            settings: self.settings.clone(),
            collab: self.collaborators.clone(),
            limiter: Arc::clone(&self.limiter),
            memory: Arc::clone(&self.memory),
            applier: FileApplier::new(backups, Arc::clone(&self.collaborators.checker)),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            outcomes: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
        }
    }

    /// Spawns one task per candidate, gated by the worker semaphore. Returns
    /// the paths that were never started plus every archived outcome.
    async fn dispatch(
        &self,
        ctx: &Arc<Context>,
        candidates: Vec<PathBuf>,
    ) -> (Vec<String>, Vec<TaskOutcome>) {
        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut displays = Vec::with_capacity(candidates.len());
        let mut handles = Vec::with_capacity(candidates.len());

        for path in candidates {
            let task = FileTask::new(path, &self.root);
            displays.push(task.display().to_string());
            let ctx = Arc::clone(ctx);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return false;
                };
                if ctx.cancel.is_cancelled() {
                    return false;
                }
                ctx.drive(task).await;
                true
            }));
        }

        let mut not_started = Vec::new();
        let mut lost = Vec::new();
        for (display, joined) in displays.into_iter().zip(futures::future::join_all(handles).await) {
            match joined {
                Ok(true) => {}
                Ok(false) => not_started.push(display),
                Err(e) => lost.push(TaskOutcome::lost(display, format!("worker failed: {e}"))),
            }
        }

        let mut outcomes = std::mem::take(&mut *ctx.outcomes.lock().unwrap_or_else(PoisonError::into_inner));
        outcomes.extend(lost);
        (not_started, outcomes)
    }

    /// Checks credentials of every collaborator the run will need.
    async fn preflight(&self) -> Result<(), RunError> {
        let timeout = self.settings.call_timeout;
        let proposer = bounded(timeout, self.collaborators.proposer.preflight()).await;
        if let Err(error) = proposer {
            return Err(self.preflight_failed(ServiceClass::FixGeneration, error));
        }
        if self.settings.publish && !self.settings.dry_run {
            let publisher = bounded(timeout, self.collaborators.publisher.preflight()).await;
            if let Err(error) = publisher {
                return Err(self.preflight_failed(ServiceClass::Publishing, error));
            }
        }
        Ok(())
    }

    fn preflight_failed(&self, class: ServiceClass, error: ApiError) -> RunError {
        self.events.log(EventKind::RunAborted {
            reason: format!("{class} preflight failed: {error}"),
        });
        RunError::Fatal {
            class,
            error,
            report: None,
        }
    }

    async fn finalize(&self, ctx: &Context, report: &mut RunReport) {
        if self.settings.dry_run || !self.settings.publish {
            return;
        }
        let receipts: Vec<PublishReceipt> = report
            .outcomes
            .iter()
            .filter_map(|o| o.receipt.clone())
            .collect();
        match ctx.finalize(&receipts).await {
            Ok(url) => report.pull_request = url,
            Err(TaskError::Publish(e)) if e.kind.is_fatal() => {
                ctx.abort(ServiceClass::Publishing, e);
            }
            Err(e) => report.publish_error = Some(e.to_string()),
        }
    }
}

async fn bounded<F>(timeout: Duration, fut: F) -> Result<(), ApiError>
where
    F: Future<Output = Result<(), ApiError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(ApiError::timeout(timeout)))
}
