// tests/integration_pipeline.rs
use async_trait::async_trait;
use forgefix_core::apply::{NoCheck, StructureCheck};
use forgefix_core::collab::{Analyzer, Collaborators, FixProposer, PublishReceipt, Publisher};
use forgefix_core::error::{ApiError, ApiErrorKind, RunError};
use forgefix_core::events::{read_events, EventKind, EventLogger, EVENTS_FILE};
use forgefix_core::limiter::{LimiterSettings, RateLimiter, RetryPolicy, ServiceClass};
use forgefix_core::memory::{Embedder, HashingEmbedder, MemoryCache, MemorySettings, PatchRecord};
use forgefix_core::patch;
use forgefix_core::pipeline::{Orchestrator, OutcomeStatus, PipelineSettings};
use forgefix_core::types::{Issue, IssueKind, LineRange};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const MARKER: &str = "fixme";

/// Reports one issue on the first line containing the marker.
struct MarkerAnalyzer;

#[async_trait]
impl Analyzer for MarkerAnalyzer {
    async fn analyze(&self, _path: &Path, content: &str) -> anyhow::Result<Vec<Issue>> {
        Ok(content
            .lines()
            .position(|l| l.contains(MARKER))
            .map(|idx| {
                vec![Issue::new(
                    IssueKind::Complexity,
                    LineRange::single(idx + 1),
                    "function 'f' is too complex",
                )]
            })
            .unwrap_or_default())
    }
}

/// Replaces the marker. Files named `stale*` get a patch drafted against
/// content that no longer matches. With `hang_first` the first call never
/// answers.
#[derive(Default)]
struct MarkerProposer {
    calls: AtomicUsize,
    transient_failures: usize,
    fail_with: Option<ApiErrorKind>,
    hang_first: bool,
}

#[async_trait]
impl FixProposer for MarkerProposer {
    async fn propose(&self, _issue: &Issue, path: &Path, content: &str) -> std::result::Result<String, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.fail_with {
            return Err(ApiError::new(kind, "rejected"));
        }
        if n < self.transient_failures {
            return Err(ApiError::new(ApiErrorKind::Server, "503"));
        }
        if n == 0 && self.hang_first {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let name = path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
        let base = if name.starts_with("stale") {
            content.replacen("line b", "line B", 1)
        } else {
            content.to_string()
        };
        let fixed = base.replacen(MARKER, "fixed", 1);
        Ok(format!("```diff\n{}```\n", patch::diff(&name, &base, &fixed)))
    }
}

struct AuthFailingPreflight;

#[async_trait]
impl FixProposer for AuthFailingPreflight {
    async fn propose(&self, _issue: &Issue, _path: &Path, _content: &str) -> std::result::Result<String, ApiError> {
        Ok(String::new())
    }

    async fn preflight(&self) -> std::result::Result<(), ApiError> {
        Err(ApiError::new(ApiErrorKind::Auth, "401 bad key"))
    }
}

#[derive(Default)]
struct CountingPublisher {
    calls: AtomicUsize,
    reject: bool,
}

#[async_trait]
impl Publisher for CountingPublisher {
    async fn publish(
        &self,
        path: &Path,
        _applied_content: &str,
        _issues: &[Issue],
    ) -> std::result::Result<PublishReceipt, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(ApiError::new(ApiErrorKind::Rejected, "push refused"));
        }
        Ok(PublishReceipt {
            reference: format!("commit:{}", path.display()),
            url: None,
        })
    }
}

/// Rejects any content the proposer has touched.
struct RejectFixed;

impl StructureCheck for RejectFixed {
    fn check(&self, _path: &Path, content: &str) -> std::result::Result<(), String> {
        if content.contains("fixed") {
            return Err("unbalanced block".to_string());
        }
        Ok(())
    }
}

/// Cancels the run from inside the apply step, after the patch has been
/// accepted but before it is published.
#[derive(Default)]
struct CancelDuringApply {
    token: Mutex<Option<CancellationToken>>,
}

impl StructureCheck for CancelDuringApply {
    fn check(&self, _path: &Path, _content: &str) -> std::result::Result<(), String> {
        if let Some(token) = self.token.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            token.cancel();
        }
        Ok(())
    }
}

fn collaborators(proposer: Arc<dyn FixProposer>, publisher: Arc<dyn Publisher>) -> Collaborators {
    Collaborators {
        analyzer: Arc::new(MarkerAnalyzer),
        proposer,
        publisher,
        checker: Arc::new(NoCheck),
        embedder: Arc::new(HashingEmbedder::default()),
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        use_memory: false,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(5),
        },
        call_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    }
}

fn source(tag: &str) -> String {
    format!("line a {tag}\nline b\n{MARKER}\nline c\nline d\n")
}

fn write_files(root: &Path, names: &[&str]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for name in names {
        let path = root.join(name);
        fs::write(&path, source(name))?;
        paths.push(path);
    }
    Ok(paths)
}

#[tokio::test]
async fn one_conflict_fails_alone() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(
        temp.path(),
        &["a.txt", "b.txt", "c.txt", "d.txt", "stale.txt"],
    )?;
    let publisher = Arc::new(CountingPublisher::default());
    let orch = Orchestrator::new(
        temp.path(),
        "run-e2e1",
        settings(),
        collaborators(Arc::new(MarkerProposer::default()), publisher.clone()),
    );

    let report = orch.run(files).await?;

    assert_eq!(report.done(), 4);
    assert_eq!(report.failed(), 1);
    let stale = report.outcome("stale.txt").ok_or("missing outcome")?;
    assert_eq!(stale.status, OutcomeStatus::Failed);
    assert_eq!(stale.reason.as_deref(), Some("conflict"));
    assert_eq!(fs::read_to_string(temp.path().join("stale.txt"))?, source("stale.txt"));
    assert_eq!(
        fs::read_to_string(temp.path().join("a.txt"))?,
        source("a.txt").replace(MARKER, "fixed")
    );
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.exit_code().code(), 0);
    Ok(())
}

#[tokio::test]
async fn identical_issue_is_served_from_memory() -> Result<()> {
    let temp = TempDir::new()?;
    let content = source("same");
    let first = temp.path().join("one.txt");
    let second = temp.path().join("two.txt");
    fs::write(&first, &content)?;
    fs::write(&second, &content)?;

    let proposer = Arc::new(MarkerProposer::default());
    let limiter = Arc::new(RateLimiter::new(LimiterSettings::default()));
    let orch = Orchestrator::new(
        temp.path(),
        "run-e2e2",
        PipelineSettings {
            workers: 1,
            use_memory: true,
            ..settings()
        },
        collaborators(proposer.clone(), Arc::new(CountingPublisher::default())),
    )
    .with_limiter(limiter.clone())
    .with_memory(Arc::new(MemoryCache::in_memory(MemorySettings::default())));

    let report = orch.run(vec![first, second]).await?;

    assert_eq!(report.done(), 2);
    assert_eq!(report.cache_hits(), 1);
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(limiter.granted(ServiceClass::FixGeneration), 1);
    assert_eq!(orch.memory().len(), 1);
    Ok(())
}

#[tokio::test]
async fn max_files_caps_dispatch() -> Result<()> {
    let temp = TempDir::new()?;
    let names: Vec<String> = (0..10).map(|i| format!("f{i}.txt")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let files = write_files(temp.path(), &refs)?;

    let orch = Orchestrator::new(
        temp.path(),
        "run-e2e3",
        PipelineSettings {
            max_files: 3,
            ..settings()
        },
        collaborators(
            Arc::new(MarkerProposer::default()),
            Arc::new(CountingPublisher::default()),
        ),
    );

    let report = orch.run(files).await?;
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.not_dispatched.len(), 7);
    for name in &names[3..] {
        assert_eq!(fs::read_to_string(temp.path().join(name))?, source(name));
    }
    Ok(())
}

#[tokio::test]
async fn rejected_credentials_abort_the_run() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt", "b.txt", "c.txt"])?;
    let proposer = Arc::new(MarkerProposer {
        fail_with: Some(ApiErrorKind::Auth),
        ..MarkerProposer::default()
    });
    let orch = Orchestrator::new(
        temp.path(),
        "run-auth",
        PipelineSettings {
            workers: 1,
            ..settings()
        },
        collaborators(proposer.clone(), Arc::new(CountingPublisher::default())),
    );

    let err = orch.run(files).await.err().ok_or("run should abort")?;
    let RunError::Fatal { class, error, report } = err;
    assert_eq!(class, ServiceClass::FixGeneration);
    assert_eq!(error.kind, ApiErrorKind::Auth);
    let report = report.ok_or("partial report expected")?;
    assert!(report.aborted.is_some());
    assert_eq!(report.failed(), 1);
    assert_eq!(report.not_dispatched.len(), 2);
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.exit_code().code(), 3);
    Ok(())
}

#[tokio::test]
async fn failed_preflight_dispatches_nothing() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let orch = Orchestrator::new(
        temp.path(),
        "run-preflight",
        settings(),
        collaborators(
            Arc::new(AuthFailingPreflight),
            Arc::new(CountingPublisher::default()),
        ),
    );

    let err = orch.run(files).await.err().ok_or("run should abort")?;
    let RunError::Fatal { report, .. } = err;
    assert!(report.is_none());
    assert_eq!(fs::read_to_string(temp.path().join("a.txt"))?, source("a.txt"));
    Ok(())
}

#[tokio::test]
async fn dry_run_writes_nothing() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt", "b.txt"])?;
    let publisher = Arc::new(CountingPublisher::default());
    let orch = Orchestrator::new(
        temp.path(),
        "run-dry",
        PipelineSettings {
            dry_run: true,
            ..settings()
        },
        collaborators(Arc::new(MarkerProposer::default()), publisher.clone()),
    );

    let report = orch.run(files).await?;
    assert_eq!(report.done(), 2);
    assert!(report.outcomes.iter().all(|o| o.dry_run));
    assert_eq!(fs::read_to_string(temp.path().join("a.txt"))?, source("a.txt"));
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    assert!(!temp.path().join(".forgefix/backups").exists());
    Ok(())
}

#[tokio::test]
async fn transient_errors_are_retried() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let proposer = Arc::new(MarkerProposer {
        transient_failures: 2,
        ..MarkerProposer::default()
    });
    let orch = Orchestrator::new(
        temp.path(),
        "run-retry",
        settings(),
        collaborators(proposer.clone(), Arc::new(CountingPublisher::default())),
    );

    let report = orch.run(files).await?;
    assert_eq!(report.done(), 1);
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_fail_the_task() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let proposer = Arc::new(MarkerProposer {
        transient_failures: 10,
        ..MarkerProposer::default()
    });
    let orch = Orchestrator::new(
        temp.path(),
        "run-exhaust",
        settings(),
        collaborators(proposer.clone(), Arc::new(CountingPublisher::default())),
    );

    let report = orch.run(files).await?;
    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes[0].reason.as_deref(), Some("propose"));
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.exit_code().code(), 4);
    Ok(())
}

#[tokio::test]
async fn publish_failure_rolls_back() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let publisher = Arc::new(CountingPublisher {
        reject: true,
        ..CountingPublisher::default()
    });
    let orch = Orchestrator::new(
        temp.path(),
        "run-publish",
        settings(),
        collaborators(Arc::new(MarkerProposer::default()), publisher),
    );

    let report = orch.run(files).await?;
    assert_eq!(report.outcomes[0].reason.as_deref(), Some("publish"));
    assert_eq!(fs::read_to_string(temp.path().join("a.txt"))?, source("a.txt"));
    Ok(())
}

#[tokio::test]
async fn files_without_issues_are_skipped() -> Result<()> {
    let temp = TempDir::new()?;
    let clean = temp.path().join("clean.txt");
    fs::write(&clean, "nothing to see\n")?;
    let orch = Orchestrator::new(
        temp.path(),
        "run-skip",
        settings(),
        collaborators(
            Arc::new(MarkerProposer::default()),
            Arc::new(CountingPublisher::default()),
        ),
    );

    let report = orch.run(vec![clean]).await?;
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.attempted(), 0);
    assert_eq!(report.exit_code().code(), 0);
    Ok(())
}

#[tokio::test]
async fn transitions_reach_the_event_log() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let orch = Orchestrator::new(
        temp.path(),
        "run-events",
        settings(),
        collaborators(
            Arc::new(MarkerProposer::default()),
            Arc::new(CountingPublisher::default()),
        ),
    )
    .with_events(EventLogger::new(temp.path(), "run-events"));

    orch.run(files).await?;

    let events = read_events(&temp.path().join(EVENTS_FILE))?;
    let transitions: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Transition { to, .. } => Some(to.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        [
            "analyzing",
            "analyzed",
            "proposing_patch",
            "patch_ready",
            "applying",
            "applied",
            "publishing",
            "done"
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::RunFinished { done: 1, .. })));
    assert!(events.iter().all(|e| e.run_id == "run-events"));
    Ok(())
}

#[tokio::test]
async fn cancellation_rolls_back_and_stops_dispatch() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt", "b.txt", "c.txt"])?;
    let check = Arc::new(CancelDuringApply::default());
    let publisher = Arc::new(CountingPublisher::default());
    let orch = Orchestrator::new(
        temp.path(),
        "run-cancel",
        PipelineSettings {
            workers: 1,
            ..settings()
        },
        Collaborators {
            checker: check.clone(),
            ..collaborators(Arc::new(MarkerProposer::default()), publisher.clone())
        },
    )
    .with_events(EventLogger::new(temp.path(), "run-cancel"));
    *check.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(orch.cancel_token());

    let report = orch.run(files).await?;

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(report.outcomes[0].reason.as_deref(), Some("cancelled"));
    assert_eq!(report.not_dispatched.len(), 2);
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    for name in ["a.txt", "b.txt", "c.txt"] {
        assert_eq!(fs::read_to_string(temp.path().join(name))?, source(name));
    }

    let events = read_events(&temp.path().join(EVENTS_FILE))?;
    assert!(events.iter().any(|e| matches!(e.kind, EventKind::RolledBack { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(&e.kind, EventKind::Transition { to, .. } if to.as_str() == "publishing")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_is_retried() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let proposer = Arc::new(MarkerProposer {
        hang_first: true,
        ..MarkerProposer::default()
    });
    let orch = Orchestrator::new(
        temp.path(),
        "run-timeout",
        settings(),
        collaborators(proposer.clone(), Arc::new(CountingPublisher::default())),
    )
    .with_events(EventLogger::new(temp.path(), "run-timeout"));

    let report = orch.run(files).await?;

    assert_eq!(report.done(), 1);
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 2);
    let events = read_events(&temp.path().join(EVENTS_FILE))?;
    assert!(events.iter().any(|e| matches!(
        e.kind,
        EventKind::RetryScheduled {
            class: ServiceClass::FixGeneration,
            attempt: 1,
            ..
        }
    )));
    Ok(())
}

#[tokio::test]
async fn structure_failure_leaves_file_untouched() -> Result<()> {
    let temp = TempDir::new()?;
    let files = write_files(temp.path(), &["a.txt"])?;
    let publisher = Arc::new(CountingPublisher::default());
    let orch = Orchestrator::new(
        temp.path(),
        "run-validation",
        settings(),
        Collaborators {
            checker: Arc::new(RejectFixed),
            ..collaborators(Arc::new(MarkerProposer::default()), publisher.clone())
        },
    );

    let report = orch.run(files).await?;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes[0].reason.as_deref(), Some("validation"));
    assert_eq!(fs::read_to_string(temp.path().join("a.txt"))?, source("a.txt"));
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
    assert!(!temp.path().join(".forgefix/backups/run-validation").exists());
    Ok(())
}

#[tokio::test]
async fn conflicting_cached_patch_falls_back_to_a_proposal() -> Result<()> {
    let temp = TempDir::new()?;
    let content = source("a.txt");
    let path = temp.path().join("a.txt");
    fs::write(&path, &content)?;

    // Remember a fix drafted against an older revision of the file.
    let issue = Issue::new(
        IssueKind::Complexity,
        LineRange::single(3),
        "function 'f' is too complex",
    );
    let embedding = HashingEmbedder::default().embed(&issue, &content);
    let older = content.replacen("line b", "line B", 1);
    let stale_patch = patch::diff("a.txt", &older, &older.replacen(MARKER, "fixed", 1));
    let memory = Arc::new(MemoryCache::in_memory(MemorySettings::default()));
    memory.insert(PatchRecord::new(
        issue.fingerprint().clone(),
        embedding,
        stale_patch,
        "a.txt",
    ))?;

    let proposer = Arc::new(MarkerProposer::default());
    let orch = Orchestrator::new(
        temp.path(),
        "run-fallback",
        PipelineSettings {
            workers: 1,
            use_memory: true,
            ..settings()
        },
        collaborators(proposer.clone(), Arc::new(CountingPublisher::default())),
    )
    .with_memory(memory.clone())
    .with_events(EventLogger::new(temp.path(), "run-fallback"));

    let report = orch.run(vec![path.clone()]).await?;

    assert_eq!(report.done(), 1);
    assert_eq!(report.cache_hits(), 0);
    assert_eq!(proposer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_to_string(&path)?, content.replacen(MARKER, "fixed", 1));
    assert_eq!(memory.len(), 2);

    let events = read_events(&temp.path().join(EVENTS_FILE))?;
    assert!(events.iter().any(|e| matches!(e.kind, EventKind::CacheHit { .. })));
    Ok(())
}
