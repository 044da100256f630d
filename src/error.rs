// src/error.rs
use crate::limiter::ServiceClass;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Malformed or inconsistent unified diff. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("diff contains no hunks")]
    Empty,

    #[error("malformed diff at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("hunk {hunk} header does not match its body or the file: {reason}")]
    HeaderMismatch { hunk: usize, reason: String },

    #[error("hunks {first} and {second} overlap")]
    OverlappingHunks { first: usize, second: usize },
}

/// The file no longer matches what the patch was drafted against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("hunk {hunk}: line {line} expected {expected:?}, found {found:?}")]
    ContextMismatch {
        hunk: usize,
        line: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("file ends with a newline but the patch expects none")]
    TrailingNewline,

    #[error("patch is already applied to this content")]
    AlreadyApplied,

    #[error("file changed on disk since it was read")]
    FileChanged,
}

/// The patched content failed the language structure check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("structure check failed for {path}: {reason}")]
pub struct ValidationError {
    pub path: PathBuf,
    pub reason: String,
}

/// Failure of the patch application engine.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("I/O error: {source} (path: {path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl ApplyError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    Network,
    Timeout,
    RateLimited,
    Server,
    /// Credentials rejected. Fatal to the whole run.
    Auth,
    BadResponse,
    Rejected,
}

impl ApiErrorKind {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Server
        )
    }

    #[must_use]
    pub fn is_fatal(self) -> bool {
        self == Self::Auth
    }
}

/// Failure talking to an external collaborator service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ApiErrorKind::Timeout,
            format!("no response after {}s", after.as_secs_f32()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit for {class} not satisfied within {waited:?}")]
pub struct RateLimitExceeded {
    pub class: ServiceClass,
    pub waited: Duration,
}

/// The memory index could not be read or written. Callers treat it as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("memory cache unavailable: {reason}")]
pub struct CacheUnavailable {
    pub reason: String,
}

/// Terminal failure reason of a single file task.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("invalid diff: {0}")]
    Parse(#[from] ParseError),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitExceeded),

    #[error("fix generation failed: {0}")]
    Propose(ApiError),

    #[error("publishing failed: {0}")]
    Publish(ApiError),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Short stable label used in reports and the event log.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Analysis(_) => "analysis",
            Self::Parse(_) => "parse",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::RateLimit(_) => "rate_limit",
            Self::Propose(_) => "propose",
            Self::Publish(_) => "publish",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ApplyError> for TaskError {
    fn from(e: ApplyError) -> Self {
        match e {
            ApplyError::Conflict(c) => Self::Conflict(c),
            ApplyError::Validation(v) => Self::Validation(v),
            ApplyError::Io { source, path } => Self::Io {
                path,
                message: source.to_string(),
            },
        }
    }
}

/// Conditions that abort the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("fatal {class} error: {error}")]
    Fatal {
        class: ServiceClass,
        error: ApiError,
        report: Option<Box<crate::pipeline::RunReport>>,
    },
}
