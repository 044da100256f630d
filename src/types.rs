// src/types.rs
//! Issue model shared by the analyzer, the memory cache, and the publisher.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Category of a detected quality problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Complexity,
    Nesting,
    Arity,
    Naming,
    DeadCode,
    Style,
    Other,
}

impl IssueKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::Nesting => "nesting",
            Self::Arity => "arity",
            Self::Naming => "naming",
            Self::DeadCode => "dead_code",
            Self::Style => "style",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complexity" => Ok(Self::Complexity),
            "nesting" => Ok(Self::Nesting),
            "arity" => Ok(Self::Arity),
            "naming" => Ok(Self::Naming),
            "dead_code" | "dead-code" => Ok(Self::DeadCode),
            "style" => Ok(Self::Style),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown issue kind '{s}'")),
        }
    }
}

/// Inclusive, 1-based line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.max(1),
            end: end.max(start.max(1)),
        }
    }

    #[must_use]
    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    /// Number of lines covered.
    #[must_use]
    pub fn span(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "L{}", self.start)
        } else {
            write!(f, "L{}-{}", self.start, self.end)
        }
    }
}

/// Stable identity of an issue, independent of cosmetic text differences.
///
/// Rendered as `<kind>:<sha256>` so the kind survives persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes kind + normalized location + normalized description.
    ///
    /// The location contributes only its span length, so an issue that moves
    /// within a file keeps its fingerprint.
    #[must_use]
    pub fn compute(kind: IssueKind, location: LineRange, description: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str());
        hasher.update([0]);
        hasher.update(location.span().to_le_bytes());
        hasher.update([0]);
        hasher.update(normalize_description(description));
        Self(format!("{}:{:x}", kind.as_str(), hasher.finalize()))
    }

    #[must_use]
    pub fn kind(&self) -> Option<IssueKind> {
        self.0.split_once(':').and_then(|(k, _)| k.parse().ok())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-cases, collapses whitespace, and masks digits.
#[must_use]
pub fn normalize_description(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .map(|c| if c.is_ascii_digit() { '#' } else { c.to_ascii_lowercase() })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A single detected quality problem. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    kind: IssueKind,
    location: LineRange,
    description: String,
    fingerprint: Fingerprint,
}

impl Issue {
    #[must_use]
    pub fn new(kind: IssueKind, location: LineRange, description: impl Into<String>) -> Self {
        let description = description.into();
        let fingerprint = Fingerprint::compute(kind, location, &description);
        Self {
            kind,
            location,
            description,
            fingerprint,
        }
    }

    #[must_use]
    pub fn kind(&self) -> IssueKind {
        self.kind
    }

    #[must_use]
    pub fn location(&self) -> LineRange {
        self.location
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.kind, self.location, self.description)
    }
}
