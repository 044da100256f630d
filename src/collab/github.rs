// src/collab/github.rs
//! Pull request creation through the GitHub REST API.

use super::llm::{status_error, transport_error};
use crate::error::{ApiError, ApiErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("forgefix/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct PullRequestBody<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    html_url: String,
}

pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// `repo` is `owner/name`.
    ///
    /// # Errors
    /// Returns error if `repo` is not `owner/name` or the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, repo: &str, timeout: Duration) -> anyhow::Result<Self> {
        let Some((owner, name)) = repo.split_once('/') else {
            anyhow::bail!("GitHub repository must be 'owner/name', got '{repo}'");
        };
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token: token.into(),
            owner: owner.to_string(),
            repo: name.trim_end_matches(".git").to_string(),
        })
    }

    /// Opens a pull request from `head` into `base` and returns its URL.
    ///
    /// # Errors
    /// Returns [`ApiError`] on transport failure or a non-success status.
    pub async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<String, ApiError> {
        let url = format!("{API_ROOT}/repos/{}/{}/pulls", self.owner, self.repo);
        let response = self
            .http
            .post(url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&PullRequestBody {
                title,
                body,
                head,
                base,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        serde_json::from_str::<PullRequestResponse>(&text)
            .map(|pr| pr.html_url)
            .map_err(|e| ApiError::new(ApiErrorKind::BadResponse, format!("unexpected PR reply: {e}")))
    }
}

/// `owner/name` from a GitHub remote URL (https or ssh form).
#[must_use]
pub fn repo_from_remote(url: &str) -> Option<String> {
    let url = url.trim();
    let path = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let (owner, name) = path.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(format!("{owner}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_forms() {
        assert_eq!(repo_from_remote("git@github.com:acme/tool.git").as_deref(), Some("acme/tool"));
        assert_eq!(repo_from_remote("https://github.com/acme/tool").as_deref(), Some("acme/tool"));
        assert_eq!(repo_from_remote("https://gitlab.com/acme/tool"), None);
    }

    #[test]
    fn rejects_bad_repo_spec() {
        assert!(GitHubClient::new("t", "no-slash", Duration::from_secs(1)).is_err());
    }
}
