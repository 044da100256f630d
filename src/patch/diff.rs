// src/patch/diff.rs
//! Line-level LCS diff producing unified hunks with three lines of context.

use super::common::{ends_with_newline, split_lines, LineEnding};
use super::{Hunk, HunkLine, Patch};

const CONTEXT: usize = 3;
/// Above this many LCS cells the changed middle is emitted as one block.
const MAX_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// Line key: text plus "is an unterminated last line", so a change that only
/// adds or drops the final newline still shows up as an edit.
type Key<'a> = (&'a str, bool);

/// Unified diff from `old` to `new`; empty when they are identical.
#[must_use]
pub fn diff(path: &str, old: &str, new: &str) -> String {
    diff_patch(old, new).map_or_else(String::new, |p| p.to_unified(path))
}

/// Structured form of [`diff`]; `None` when the contents are identical.
#[must_use]
pub fn diff_patch(old: &str, new: &str) -> Option<Patch> {
    let a = keys(old);
    let b = keys(new);
    let ops = edit_script(&a, &b);
    if ops.iter().all(|op| *op == Op::Equal) {
        return None;
    }

    let hunks = build_hunks(&ops, &a, &b);
    let reaches_old_end = hunks
        .last()
        .is_some_and(|h| h.old_index() + h.old_len == a.len());
    let reaches_new_end = hunks
        .last()
        .is_some_and(|h| h.new_index() + h.new_len == b.len());

    Some(Patch {
        path: None,
        hunks,
        line_ending: LineEnding::detect(old),
        ends_with_newline: ends_with_newline(new),
        old_missing_newline: !ends_with_newline(old) && reaches_old_end,
        new_missing_newline: !ends_with_newline(new) && reaches_new_end,
    })
}

fn keys(content: &str) -> Vec<Key<'_>> {
    split_lines(content)
        .into_iter()
        .map(|l| (l.text, l.terminator.is_empty()))
        .collect()
}

fn edit_script(a: &[Key<'_>], b: &[Key<'_>]) -> Vec<Op> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let mut ops = vec![Op::Equal; prefix];
    if a_mid.len().saturating_mul(b_mid.len()) > MAX_CELLS {
        ops.extend(std::iter::repeat(Op::Delete).take(a_mid.len()));
        ops.extend(std::iter::repeat(Op::Insert).take(b_mid.len()));
    } else {
        ops.extend(lcs_ops(a_mid, b_mid));
    }
    ops.extend(std::iter::repeat(Op::Equal).take(suffix));
    ops
}

fn lcs_ops(a: &[Key<'_>], b: &[Key<'_>]) -> Vec<Op> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal);
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Delete);
            i += 1;
        } else {
            ops.push(Op::Insert);
            j += 1;
        }
    }
    ops.extend(std::iter::repeat(Op::Delete).take(n - i));
    ops.extend(std::iter::repeat(Op::Insert).take(m - j));
    ops
}

fn build_hunks(ops: &[Op], a: &[Key<'_>], b: &[Key<'_>]) -> Vec<Hunk> {
    // Positions in old/new before each op.
    let mut positions = Vec::with_capacity(ops.len() + 1);
    let (mut oi, mut ni) = (0usize, 0usize);
    for op in ops {
        positions.push((oi, ni));
        match op {
            Op::Equal => {
                oi += 1;
                ni += 1;
            }
            Op::Delete => oi += 1,
            Op::Insert => ni += 1,
        }
    }
    positions.push((oi, ni));

    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| **op != Op::Equal)
        .map(|(k, _)| k)
        .collect();

    let mut groups: Vec<(usize, usize)> = Vec::new();
    for &k in &changes {
        match groups.last_mut() {
            Some((_, end)) if k - *end <= 2 * CONTEXT + 1 => *end = k,
            _ => groups.push((k, k)),
        }
    }

    groups
        .into_iter()
        .map(|(first, last)| {
            let lo = first.saturating_sub(CONTEXT);
            let hi = (last + CONTEXT).min(ops.len() - 1);
            let (old_pos, new_pos) = positions[lo];

            let mut lines = Vec::new();
            for k in lo..=hi {
                let (o, n) = positions[k];
                match ops[k] {
                    Op::Equal => lines.push(HunkLine::Context(a[o].0.to_string())),
                    Op::Delete => lines.push(HunkLine::Removed(a[o].0.to_string())),
                    Op::Insert => lines.push(HunkLine::Added(b[n].0.to_string())),
                }
            }

            let old_len = lines.iter().filter(|l| l.in_old()).count();
            let new_len = lines.iter().filter(|l| l.in_new()).count();
            Hunk {
                old_start: if old_len == 0 { old_pos } else { old_pos + 1 },
                old_len,
                new_start: if new_len == 0 { new_pos } else { new_pos + 1 },
                new_len,
                lines,
            }
        })
        .collect()
}
