// src/patch/parser.rs
use super::common::{ends_with_newline, split_lines, LineEnding};
use super::{Hunk, HunkLine, Patch};
use crate::error::ParseError;
use regex::Regex;
use std::sync::LazyLock;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$")
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});

/// Prefix of the `\ No newline at end of file` marker. The message after it
/// is localized by some tools, so only the prefix is matched.
const NO_NEWLINE_MARKER: &str = "\\ ";

const EXTENDED_HEADERS: &[&str] = &[
    "new file mode",
    "deleted file mode",
    "old mode",
    "new mode",
    "similarity index",
    "rename from",
    "rename to",
];

#[derive(Default)]
struct Markers {
    old_missing: bool,
    new_missing: bool,
    /// 1-based hunk that carried a `\ No newline` marker.
    hunk: Option<usize>,
}

/// Parses `diff_text` as a unified diff against `original`.
///
/// Prose around a fenced code block is ignored. Hunk lines are stored
/// without terminators; the patch records the original's line-ending
/// convention and whether the result should end with a newline.
///
/// # Errors
/// Returns [`ParseError`] when the text is not a valid single-file diff, or
/// when its headers disagree with the body or with `original`.
pub fn parse(diff_text: &str, original: &str) -> Result<Patch, ParseError> {
    let lines = diff_lines(diff_text);
    if !lines.iter().any(|l| l.starts_with("@@")) {
        return Err(ParseError::Empty);
    }

    let mut markers = Markers::default();
    let (path, hunks) = parse_lines(&lines, &mut markers)?;
    if hunks.is_empty() {
        return Err(ParseError::Empty);
    }

    validate(&hunks, original, &markers)?;

    let ends = if markers.new_missing {
        false
    } else if markers.old_missing {
        true
    } else {
        ends_with_newline(original)
    };

    Ok(Patch {
        path,
        hunks,
        line_ending: LineEnding::detect(original),
        ends_with_newline: ends,
        old_missing_newline: markers.old_missing,
        new_missing_newline: markers.new_missing,
    })
}

/// Lines of the diff proper: the first fenced block if there is one,
/// otherwise the whole text.
fn diff_lines(text: &str) -> Vec<&str> {
    let all: Vec<&str> = text.lines().collect();
    let Some(open) = all.iter().position(|l| l.trim_start().starts_with("```")) else {
        return all;
    };
    let rest = all.get(open + 1..).unwrap_or_default();
    let close = rest
        .iter()
        .position(|l| l.trim_start().starts_with("```"))
        .unwrap_or(rest.len());
    rest.iter().take(close).copied().collect()
}

fn parse_lines(
    lines: &[&str],
    markers: &mut Markers,
) -> Result<(Option<String>, Vec<Hunk>), ParseError> {
    let mut path = None;
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut seen_target = false;
    let mut i = 0;

    while let Some(line) = lines.get(i) {
        if line.starts_with("@@") {
            let (hunk, next) = parse_hunk(lines, i, hunks.len() + 1, markers)?;
            hunks.push(hunk);
            i = next;
            continue;
        }

        if let Some(target) = line.strip_prefix("+++ ") {
            if seen_target {
                return Err(more_than_one_file(i));
            }
            seen_target = true;
            path = header_path(target);
        } else if line.starts_with("--- ")
            || line.starts_with("diff ")
            || line.starts_with("index ")
        {
            if !hunks.is_empty() {
                return Err(more_than_one_file(i));
            }
        } else if line.trim().is_empty() || EXTENDED_HEADERS.iter().any(|h| line.starts_with(h)) {
            // ignorable
        } else if !hunks.is_empty() && line.starts_with([' ', '+', '-']) {
            return Err(ParseError::HeaderMismatch {
                hunk: hunks.len(),
                reason: "hunk body is longer than its header declares".to_string(),
            });
        } else {
            return Err(ParseError::Malformed {
                line: i + 1,
                reason: format!("unexpected line {line:?}"),
            });
        }
        i += 1;
    }

    Ok((path, hunks))
}

fn parse_hunk(
    lines: &[&str],
    at: usize,
    number: usize,
    markers: &mut Markers,
) -> Result<(Hunk, usize), ParseError> {
    let header = lines.get(at).copied().unwrap_or_default();
    let caps = HUNK_HEADER.captures(header).ok_or_else(|| ParseError::Malformed {
        line: at + 1,
        reason: format!("invalid hunk header {header:?}"),
    })?;
    let field = |idx: usize| -> Result<usize, ParseError> {
        caps.get(idx).map_or(Ok(1), |m| {
            m.as_str().parse().map_err(|_| ParseError::Malformed {
                line: at + 1,
                reason: "hunk header number out of range".to_string(),
            })
        })
    };
    let old_start = field(1)?;
    let old_len = field(2)?;
    let new_start = field(3)?;
    let new_len = field(4)?;

    let mismatch = |reason: String| ParseError::HeaderMismatch { hunk: number, reason };
    let (mut old_left, mut new_left) = (old_len, new_len);
    let mut body: Vec<HunkLine> = Vec::new();
    let mut i = at + 1;

    while old_left > 0 || new_left > 0 {
        let Some(line) = lines.get(i) else {
            return Err(mismatch(format!(
                "body ends early: {old_left} original and {new_left} target lines missing"
            )));
        };
        if line.starts_with("@@") {
            return Err(mismatch(format!(
                "next hunk starts early: {old_left} original and {new_left} target lines missing"
            )));
        }

        let entry = match line.chars().next() {
            None => HunkLine::Context(String::new()),
            Some(' ') => HunkLine::Context(line[1..].to_string()),
            Some('-') => HunkLine::Removed(line[1..].to_string()),
            Some('+') => HunkLine::Added(line[1..].to_string()),
            Some('\\') if line.starts_with(NO_NEWLINE_MARKER) => {
                mark_missing_newline(body.last(), number, markers);
                i += 1;
                continue;
            }
            Some(_) => {
                return Err(ParseError::Malformed {
                    line: i + 1,
                    reason: "body line must start with ' ', '+', '-' or '\\ '".to_string(),
                })
            }
        };

        if entry.in_old() {
            if old_left == 0 {
                return Err(mismatch("more original lines than the header declares".into()));
            }
            old_left -= 1;
        }
        if entry.in_new() {
            if new_left == 0 {
                return Err(mismatch("more target lines than the header declares".into()));
            }
            new_left -= 1;
        }
        body.push(entry);
        i += 1;
    }

    if lines.get(i).is_some_and(|l| l.starts_with(NO_NEWLINE_MARKER)) {
        mark_missing_newline(body.last(), number, markers);
        i += 1;
    }

    let hunk = Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: body,
    };
    if !hunk.has_changes() {
        return Err(ParseError::Malformed {
            line: at + 1,
            reason: "hunk contains no changes".to_string(),
        });
    }
    Ok((hunk, i))
}

fn mark_missing_newline(previous: Option<&HunkLine>, hunk: usize, markers: &mut Markers) {
    let Some(previous) = previous else {
        return;
    };
    if previous.in_old() {
        markers.old_missing = true;
    }
    if previous.in_new() {
        markers.new_missing = true;
    }
    markers.hunk = Some(hunk);
}

fn validate(hunks: &[Hunk], original: &str, markers: &Markers) -> Result<(), ParseError> {
    for (n, pair) in hunks.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        let old_overlap = next.old_index() < prev.old_index() + prev.old_len;
        let new_overlap = next.new_index() < prev.new_index() + prev.new_len;
        if old_overlap || new_overlap {
            return Err(ParseError::OverlappingHunks {
                first: n + 1,
                second: n + 2,
            });
        }
    }

    let total = split_lines(original).len();
    for (n, hunk) in hunks.iter().enumerate() {
        let number = n + 1;
        if hunk.old_len > 0 && hunk.old_start == 0 {
            return Err(ParseError::HeaderMismatch {
                hunk: number,
                reason: "original range starts at line 0".to_string(),
            });
        }
        let end = hunk.old_index() + hunk.old_len;
        if end > total {
            return Err(ParseError::HeaderMismatch {
                hunk: number,
                reason: format!("original range ends at line {end} but the file has {total} lines"),
            });
        }
    }

    if let Some(marked) = markers.hunk {
        if marked != hunks.len() {
            return Err(ParseError::HeaderMismatch {
                hunk: marked,
                reason: "'No newline at end of file' marker outside the final hunk".to_string(),
            });
        }
        let last_end = hunks.last().map_or(0, |h| h.old_index() + h.old_len);
        if markers.old_missing && last_end != total {
            return Err(ParseError::HeaderMismatch {
                hunk: marked,
                reason: "original has no final newline but the hunk does not reach the end".to_string(),
            });
        }
    }

    Ok(())
}

fn header_path(raw: &str) -> Option<String> {
    let name = raw.split('\t').next().unwrap_or(raw).trim();
    if name == "/dev/null" || name.is_empty() {
        return None;
    }
    let name = name
        .strip_prefix("b/")
        .or_else(|| name.strip_prefix("a/"))
        .unwrap_or(name);
    Some(name.to_string())
}

fn more_than_one_file(index: usize) -> ParseError {
    ParseError::Malformed {
        line: index + 1,
        reason: "diff touches more than one file".to_string(),
    }
}
