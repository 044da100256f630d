// src/collab/llm.rs
//! Fix generation over an OpenAI-compatible chat-completions endpoint.

use super::FixProposer;
use crate::error::{ApiError, ApiErrorKind};
use crate::types::Issue;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You fix code-quality issues. Reply with exactly one unified diff \
(---/+++ headers and @@ hunks) against the file you are given, inside a ```diff block. \
Change only what the issue requires, keep the file's style, and make sure the hunk \
line counts are correct.";

/// Lines of numbered context shown around the issue.
const CONTEXT_LINES: usize = 40;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

pub struct HttpFixProposer {
    client: reqwest::Client,
    settings: ServiceSettings,
}

impl HttpFixProposer {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(settings: ServiceSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("forgefix/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    fn models_url(&self) -> String {
        let endpoint = self.settings.endpoint.trim_end_matches('/');
        endpoint
            .strip_suffix("/chat/completions")
            .map_or_else(|| format!("{endpoint}/models"), |base| format!("{base}/models"))
    }
}

#[async_trait]
impl FixProposer for HttpFixProposer {
    async fn propose(&self, issue: &Issue, path: &Path, content: &str) -> Result<String, ApiError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: build_prompt(issue, path, content),
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: 0.0,
            stream: false,
        };

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ApiError::new(ApiErrorKind::BadResponse, format!("unparseable reply: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ApiError::new(ApiErrorKind::BadResponse, "reply has no content"))
    }

    async fn preflight(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .get(self.models_url())
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(status_error(status, &text))
    }
}

fn build_prompt(issue: &Issue, path: &Path, content: &str) -> String {
    let range = issue.location();
    let first = range.start.saturating_sub(CONTEXT_LINES).max(1);
    let last = range.end + CONTEXT_LINES;

    let mut prompt = String::new();
    let _ = writeln!(prompt, "File: {}", path.display());
    let _ = writeln!(prompt, "Issue ({}): {} at {}", issue.kind(), issue.description(), range);
    let _ = writeln!(prompt, "\nFull file (line numbers are for reference only):\n");
    for (i, line) in content.lines().enumerate() {
        let number = i + 1;
        if number >= first && number <= last {
            let _ = writeln!(prompt, "{number:>5} | {line}");
        }
    }
    let _ = writeln!(prompt, "\nUnmodified file:\n```\n{content}\n```");
    prompt
}

/// Maps an HTTP status to the error taxonomy.
#[must_use]
pub fn status_error(status: StatusCode, body: &str) -> ApiError {
    let kind = match status.as_u16() {
        401 | 403 => ApiErrorKind::Auth,
        408 => ApiErrorKind::Timeout,
        429 => ApiErrorKind::RateLimited,
        500..=599 => ApiErrorKind::Server,
        _ => ApiErrorKind::Rejected,
    };
    let snippet: String = body.chars().take(200).collect();
    ApiError::new(kind, format!("HTTP {status}: {snippet}"))
}

pub(crate) fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::new(ApiErrorKind::Timeout, e.to_string())
    } else if e.is_decode() {
        ApiError::new(ApiErrorKind::BadResponse, e.to_string())
    } else {
        ApiError::new(ApiErrorKind::Network, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssueKind, LineRange};

    #[test]
    fn status_mapping() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, "").kind, ApiErrorKind::Auth);
        assert_eq!(status_error(StatusCode::FORBIDDEN, "").kind, ApiErrorKind::Auth);
        assert_eq!(status_error(StatusCode::TOO_MANY_REQUESTS, "").kind, ApiErrorKind::RateLimited);
        assert_eq!(status_error(StatusCode::BAD_GATEWAY, "").kind, ApiErrorKind::Server);
        assert_eq!(status_error(StatusCode::BAD_REQUEST, "").kind, ApiErrorKind::Rejected);
    }

    #[test]
    fn prompt_numbers_the_issue_region() {
        let issue = Issue::new(IssueKind::Naming, LineRange::single(2), "bad name");
        let prompt = build_prompt(&issue, Path::new("a.py"), "x = 1\ndef Foo():\n    pass\n");
        assert!(prompt.contains("    2 | def Foo():"));
        assert!(prompt.contains("Issue (naming): bad name at L2"));
    }

    #[test]
    fn models_url_from_chat_endpoint() -> anyhow::Result<()> {
        let proposer = HttpFixProposer::new(ServiceSettings {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".into(),
            model: "m".into(),
            max_tokens: 10,
            api_key: "k".into(),
            timeout: Duration::from_secs(1),
        })?;
        assert_eq!(proposer.models_url(), "https://api.groq.com/openai/v1/models");
        Ok(())
    }
}
