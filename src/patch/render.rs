// src/patch/render.rs
use super::{HunkLine, Patch};
use std::fmt::Write;

const NO_NEWLINE: &str = "\\ No newline at end of file";

pub(super) fn render(patch: &Patch, path: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- a/{path}");
    let _ = writeln!(out, "+++ b/{path}");

    let last_hunk = patch.hunks.len().saturating_sub(1);
    for (n, hunk) in patch.hunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            range(hunk.old_start, hunk.old_len),
            range(hunk.new_start, hunk.new_len)
        );

        let last_old = hunk.lines.iter().rposition(HunkLine::in_old);
        let last_new = hunk.lines.iter().rposition(HunkLine::in_new);
        for (k, line) in hunk.lines.iter().enumerate() {
            out.push(line.prefix());
            out.push_str(line.text());
            out.push('\n');

            let old_marker = patch.old_missing_newline && Some(k) == last_old;
            let new_marker = patch.new_missing_newline && Some(k) == last_new;
            if n == last_hunk && (old_marker || new_marker) {
                out.push_str(NO_NEWLINE);
                out.push('\n');
            }
        }
    }
    out
}

fn range(start: usize, len: usize) -> String {
    if len == 1 {
        start.to_string()
    } else {
        format!("{start},{len}")
    }
}
