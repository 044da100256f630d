// src/apply/engine.rs
use super::validator::StructureCheck;
use crate::error::{ApplyError, ConflictError, ValidationError};
use crate::patch::{ends_with_newline, split_lines, HunkLine, Patch, SourceLine};
use std::borrow::Cow;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResult {
    pub content: String,
    pub hunks_applied: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

/// Splices `patch` into `original` and runs the structure check.
///
/// A check failure on the patched text is only blamed on the patch when the
/// original passes the same check.
///
/// # Errors
/// [`ApplyError::Conflict`] if any hunk does not match, or the patch is
/// already applied; [`ApplyError::Validation`] if the result fails the check.
pub fn apply(
    patch: &Patch,
    original: &str,
    path: &Path,
    check: &dyn StructureCheck,
) -> Result<AppliedResult, ApplyError> {
    let result = splice(patch, original)?;

    if let Err(reason) = check.check(path, &result.content) {
        if check.check(path, original).is_ok() {
            return Err(ValidationError {
                path: path.to_path_buf(),
                reason,
            }
            .into());
        }
    }
    Ok(result)
}

/// Verifies every hunk against `original` and builds the patched content.
///
/// Untouched and context lines keep their own terminators; added lines use
/// the patch's line ending.
///
/// # Errors
/// Returns [`ConflictError`] if the content does not match the patch's
/// original side, or if it already holds the patch's target side.
pub fn splice(patch: &Patch, original: &str) -> Result<AppliedResult, ConflictError> {
    let lines = split_lines(original);
    let tail = Tail::of(patch, original);

    if already_applied(patch, &lines, tail) {
        return Err(ConflictError::AlreadyApplied);
    }
    verify_old_side(patch, &lines)?;
    if !tail.old_matches {
        return Err(ConflictError::TrailingNewline);
    }

    let eol = patch.line_ending.as_str();
    let mut out: Vec<(Cow<'_, str>, &str)> = Vec::with_capacity(lines.len());
    let mut cursor = 0;

    for (n, hunk) in patch.hunks.iter().enumerate() {
        let start = hunk.old_index();
        let Some(untouched) = lines.get(cursor..start) else {
            return Err(ConflictError::ContextMismatch {
                hunk: n + 1,
                line: start + 1,
                expected: format!("hunk starting after line {cursor}"),
                found: None,
            });
        };
        out.extend(untouched.iter().map(|l| (Cow::Borrowed(l.text), l.terminator)));

        let mut idx = start;
        for line in &hunk.lines {
            match line {
                HunkLine::Context(text) => {
                    let terminator = lines.get(idx).map_or(eol, |l| l.terminator);
                    out.push((Cow::Borrowed(text.as_str()), terminator));
                    idx += 1;
                }
                HunkLine::Removed(_) => idx += 1,
                HunkLine::Added(text) => out.push((Cow::Owned(text.clone()), eol)),
            }
        }
        cursor = start + hunk.old_len;
    }
    let rest = lines.get(cursor..).unwrap_or_default();
    out.extend(rest.iter().map(|l| (Cow::Borrowed(l.text), l.terminator)));

    Ok(AppliedResult {
        content: join(&out, eol, patch.ends_with_newline),
        hunks_applied: patch.hunks.len(),
        lines_added: patch.lines_added(),
        lines_removed: patch.lines_removed(),
    })
}

fn verify_old_side(patch: &Patch, lines: &[SourceLine<'_>]) -> Result<(), ConflictError> {
    for (n, hunk) in patch.hunks.iter().enumerate() {
        let start = hunk.old_index();
        for (k, expected) in hunk.old_lines().enumerate() {
            let found = lines.get(start + k).map(|l| l.text);
            if found != Some(expected) {
                return Err(ConflictError::ContextMismatch {
                    hunk: n + 1,
                    line: start + k + 1,
                    expected: expected.to_string(),
                    found: found.map(str::to_string),
                });
            }
        }
    }
    Ok(())
}

/// How the content's final newline compares with what the patch expects on
/// each side. Only the last hunk can touch the final newline.
#[derive(Clone, Copy)]
struct Tail {
    old_matches: bool,
    new_matches: bool,
}

impl Tail {
    fn of(patch: &Patch, content: &str) -> Self {
        let terminated = !content.is_empty() && ends_with_newline(content);
        let adds_newline = patch.old_missing_newline && !patch.new_missing_newline;
        Self {
            old_matches: !(patch.old_missing_newline && terminated),
            new_matches: !(patch.new_missing_newline && terminated)
                && !(adds_newline && !ends_with_newline(content)),
        }
    }
}

/// True when every hunk's target side already sits at its target offset.
///
/// A hunk that removes lines also needs its original side gone: the target
/// side of a pure deletion is only context.
fn already_applied(patch: &Patch, lines: &[SourceLine<'_>], tail: Tail) -> bool {
    let last = patch.hunks.len().saturating_sub(1);
    patch.hunks.iter().enumerate().all(|(n, hunk)| {
        let is_last = n == last;
        let target = side_matches(hunk.new_lines(), hunk.new_index(), lines)
            && (!is_last || tail.new_matches);
        let removes = hunk.lines.iter().any(|l| matches!(l, HunkLine::Removed(_)));
        let source = side_matches(hunk.old_lines(), hunk.old_index(), lines)
            && (!is_last || tail.old_matches);
        target && (!removes || !source)
    })
}

fn side_matches<'h>(
    expected: impl Iterator<Item = &'h str>,
    start: usize,
    lines: &[SourceLine<'_>],
) -> bool {
    expected.enumerate().all(|(k, text)| lines.get(start + k).map(|l| l.text) == Some(text))
}

fn join(lines: &[(Cow<'_, str>, &str)], eol: &str, ends_with_newline: bool) -> String {
    let mut content = String::new();
    let last = lines.len().saturating_sub(1);
    for (i, (text, terminator)) in lines.iter().enumerate() {
        content.push_str(text);
        if i < last {
            content.push_str(if terminator.is_empty() { eol } else { terminator });
        } else if ends_with_newline {
            content.push_str(if terminator.is_empty() { eol } else { terminator });
        }
    }
    content
}
