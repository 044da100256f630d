// src/collab/git.rs
//! Publishing through git: one commit per file on a per-run branch, pushed
//! and optionally turned into a pull request at the end of the run.

use super::github::GitHubClient;
use super::{PublishReceipt, Publisher};
use crate::error::{ApiError, ApiErrorKind};
use crate::types::Issue;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct GitSettings {
    pub root: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub remote: String,
}

pub struct GitPublisher {
    settings: GitSettings,
    github: Option<GitHubClient>,
    /// Commits share one index and HEAD, so they run one at a time. The flag
    /// records whether the run branch exists yet.
    branch_ready: Mutex<bool>,
}

impl GitPublisher {
    #[must_use]
    pub fn new(settings: GitSettings, github: Option<GitHubClient>) -> Self {
        Self {
            settings,
            github,
            branch_ready: Mutex::new(false),
        }
    }

    async fn git(&self, args: Vec<String>) -> Result<String, ApiError> {
        let root = self.settings.root.clone();
        tokio::task::spawn_blocking(move || run_git(&root, &args))
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::Rejected, format!("git task failed: {e}")))?
            .map_err(|e| ApiError::new(ApiErrorKind::Rejected, format!("{e:#}")))
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn preflight(&self) -> Result<(), ApiError> {
        self.git(args(&["rev-parse", "--is-inside-work-tree"])).await?;
        Ok(())
    }

    async fn publish(
        &self,
        path: &Path,
        _applied_content: &str,
        issues: &[Issue],
    ) -> Result<PublishReceipt, ApiError> {
        let mut ready = self.branch_ready.lock().await;
        if !*ready {
            self.git(args(&["switch", "-c", self.settings.branch.as_str()])).await?;
            *ready = true;
        }

        let relative = path.strip_prefix(&self.settings.root).unwrap_or(path);
        let file = relative.to_string_lossy().into_owned();
        let message = commit_message(relative, issues);
        self.git(args(&["add", "--", file.as_str()])).await?;
        self.git(args(&["commit", "-m", message.as_str(), "--", file.as_str()]))
            .await?;
        let sha = self.git(args(&["rev-parse", "HEAD"])).await?;

        Ok(PublishReceipt {
            reference: sha.trim().to_string(),
            url: None,
        })
    }

    async fn finalize(&self, receipts: &[PublishReceipt]) -> Result<Option<String>, ApiError> {
        if receipts.is_empty() || !*self.branch_ready.lock().await {
            return Ok(None);
        }
        let Some(github) = &self.github else {
            return Ok(None);
        };

        self.git(args(&[
            "push",
            "-u",
            self.settings.remote.as_str(),
            self.settings.branch.as_str(),
        ]))
        .await
        .map_err(|e| ApiError::new(ApiErrorKind::Network, e.message))?;

        let title = format!("forgefix: {} code-quality fix(es)", receipts.len());
        let mut body = String::from("Automated fixes. Each commit addresses one file.\n\n");
        for receipt in receipts {
            let _ = writeln!(body, "- {}", receipt.reference);
        }
        let url = github
            .create_pull_request(&title, &body, &self.settings.branch, &self.settings.base_branch)
            .await?;
        Ok(Some(url))
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

fn commit_message(path: &Path, issues: &[Issue]) -> String {
    let mut message = format!("forgefix: fix {}", path.display());
    if let Some(first) = issues.first() {
        let _ = write!(message, " ({})", first.kind());
    }
    message.push_str("\n\n");
    for issue in issues {
        let _ = writeln!(message, "- {issue}");
    }
    message
}

/// Runs git in `root` and returns stdout.
///
/// # Errors
/// Returns error if git cannot be started or exits non-zero.
pub fn run_git(root: &Path, args: &[String]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(root)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// URL of `remote`, if the repository has one.
#[must_use]
pub fn remote_url(root: &Path, remote: &str) -> Option<String> {
    run_git(root, &args(&["remote", "get-url", remote]))
        .ok()
        .map(|s| s.trim().to_string())
}
