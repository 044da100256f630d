// src/patch/common.rs
//! Line splitting and line-ending helpers shared by the parser, differ, and
//! apply engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// `CrLf` if the content uses `\r\n` anywhere.
    #[must_use]
    pub fn detect(content: &str) -> Self {
        if content.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

#[must_use]
pub fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// An empty file counts as newline-terminated.
#[must_use]
pub fn ends_with_newline(content: &str) -> bool {
    content.is_empty() || content.ends_with('\n')
}

/// A line of source together with the exact terminator it had on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a> {
    pub text: &'a str,
    pub terminator: &'a str,
}

#[must_use]
pub fn split_lines(content: &str) -> Vec<SourceLine<'_>> {
    content
        .split_inclusive('\n')
        .map(|raw| {
            if let Some(text) = raw.strip_suffix("\r\n") {
                SourceLine { text, terminator: "\r\n" }
            } else if let Some(text) = raw.strip_suffix('\n') {
                SourceLine { text, terminator: "\n" }
            } else {
                SourceLine { text: raw, terminator: "" }
            }
        })
        .collect()
}
