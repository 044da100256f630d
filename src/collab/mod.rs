// src/collab/mod.rs
//! Capability traits for the external collaborators, plus the default
//! implementations the binary wires up.

pub mod git;
pub mod github;
pub mod llm;

pub use git::{GitPublisher, GitSettings};
pub use github::GitHubClient;
pub use llm::{HttpFixProposer, ServiceSettings};

use crate::apply::StructureCheck;
use crate::error::ApiError;
use crate::memory::Embedder;
use crate::types::Issue;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Detects quality issues in one file. Order matters: the first issue is the
/// one a fix is requested for.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, path: &Path, content: &str) -> anyhow::Result<Vec<Issue>>;
}

/// Drafts a fix for an issue as unified-diff text.
#[async_trait]
pub trait FixProposer: Send + Sync {
    async fn propose(&self, issue: &Issue, path: &Path, content: &str) -> Result<String, ApiError>;

    /// Called once before any file is dispatched; an error aborts the run.
    async fn preflight(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    /// Commit id or other handle for the published change.
    pub reference: String,
    pub url: Option<String>,
}

/// Turns an applied change into a reviewable change set.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        path: &Path,
        applied_content: &str,
        issues: &[Issue],
    ) -> Result<PublishReceipt, ApiError>;

    /// Called once before any file is dispatched; an error aborts the run.
    async fn preflight(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Called once after every task is terminal, with the receipts of the
    /// tasks that reached `Done`. May return a review URL.
    async fn finalize(&self, _receipts: &[PublishReceipt]) -> Result<Option<String>, ApiError> {
        Ok(None)
    }
}

/// Leaves applied changes in the working tree without committing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPublisher;

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(
        &self,
        path: &Path,
        _applied_content: &str,
        _issues: &[Issue],
    ) -> Result<PublishReceipt, ApiError> {
        Ok(PublishReceipt {
            reference: format!("local:{}", path.display()),
            url: None,
        })
    }
}

/// The full set of swappable roles handed to the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn Analyzer>,
    pub proposer: Arc<dyn FixProposer>,
    pub publisher: Arc<dyn Publisher>,
    pub checker: Arc<dyn StructureCheck>,
    pub embedder: Arc<dyn Embedder>,
}
