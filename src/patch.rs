// src/patch.rs
//! Unified-diff patch model.
//!
//! A [`Patch`] is produced by [`parse`] from diff text and the content it
//! targets, rendered back with [`Patch::to_unified`], and computed from two
//! contents with [`diff`]. Application lives in `crate::apply`.

mod common;
mod diff;
mod parser;
mod render;

#[cfg(test)]
mod tests;

pub use common::{compute_sha256, ends_with_newline, split_lines, LineEnding, SourceLine};
pub use diff::diff;
pub use parser::parse;

use serde::{Deserialize, Serialize};

/// One body line of a hunk, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "text", rename_all = "snake_case")]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

impl HunkLine {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Context(t) | Self::Removed(t) | Self::Added(t) => t,
        }
    }

    /// Present in the original file.
    #[must_use]
    pub fn in_old(&self) -> bool {
        !matches!(self, Self::Added(_))
    }

    /// Present in the patched file.
    #[must_use]
    pub fn in_new(&self) -> bool {
        !matches!(self, Self::Removed(_))
    }

    #[must_use]
    pub fn prefix(&self) -> char {
        match self {
            Self::Context(_) => ' ',
            Self::Removed(_) => '-',
            Self::Added(_) => '+',
        }
    }
}

/// Contiguous block of changes. Line numbers follow unified-diff header
/// conventions: 1-based, and for an empty range the line *after which* the
/// range sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// 0-based index of the first original line this hunk covers.
    #[must_use]
    pub fn old_index(&self) -> usize {
        zero_based(self.old_start, self.old_len)
    }

    /// 0-based index of the first target line this hunk covers.
    #[must_use]
    pub fn new_index(&self) -> usize {
        zero_based(self.new_start, self.new_len)
    }

    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter(|l| l.in_old()).map(HunkLine::text)
    }

    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter(|l| l.in_new()).map(HunkLine::text)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| !matches!(l, HunkLine::Context(_)))
    }
}

fn zero_based(start: usize, len: usize) -> usize {
    if len == 0 {
        start
    } else {
        start.saturating_sub(1)
    }
}

/// A parsed, validated unified diff against a single file.
///
/// Invariants (established by [`parse`] and [`diff`]): hunks are sorted and
/// non-overlapping on both sides, every hunk changes something, and each
/// hunk's body matches its header counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Target path from the `+++` header, if any.
    pub path: Option<String>,
    pub hunks: Vec<Hunk>,
    /// Convention that added lines are written with.
    pub line_ending: LineEnding,
    /// Whether the patched content ends with a line terminator.
    pub ends_with_newline: bool,
    /// The diff declares the original's last line has no terminator.
    #[serde(default)]
    pub old_missing_newline: bool,
    /// The diff declares the target's last line has no terminator.
    #[serde(default)]
    pub new_missing_newline: bool,
}

impl Patch {
    #[must_use]
    pub fn lines_added(&self) -> usize {
        self.count(|l| matches!(l, HunkLine::Added(_)))
    }

    #[must_use]
    pub fn lines_removed(&self) -> usize {
        self.count(|l| matches!(l, HunkLine::Removed(_)))
    }

    /// Renders the patch as unified-diff text with `a/` and `b/` headers.
    #[must_use]
    pub fn to_unified(&self, path: &str) -> String {
        render::render(self, path)
    }

    fn count(&self, pred: impl Fn(&HunkLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| pred(l))
            .count()
    }
}
