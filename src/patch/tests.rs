// src/patch/tests.rs
#![allow(clippy::indexing_slicing, clippy::unwrap_used)]

use super::*;
use crate::apply::splice;
use crate::error::{ConflictError, ParseError};

const ORIGINAL: &str = "fn main() {\n    let a = 1;\n    let b = 2;\n    println!(\"{}\", a + b);\n}\n";

const DIFF: &str = "\
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,5 +1,5 @@
 fn main() {
-    let a = 1;
+    let a = 10;
     let b = 2;
     println!(\"{}\", a + b);
 }
";

#[test]
fn parses_headers_and_body() {
    let patch = parse(DIFF, ORIGINAL).unwrap();
    assert_eq!(patch.path.as_deref(), Some("src/main.rs"));
    assert_eq!(patch.hunks.len(), 1);
    let hunk = &patch.hunks[0];
    assert_eq!((hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len), (1, 5, 1, 5));
    assert_eq!(hunk.lines[1], HunkLine::Removed("    let a = 1;".into()));
    assert_eq!(hunk.lines[2], HunkLine::Added("    let a = 10;".into()));
    assert!(patch.ends_with_newline);
    assert_eq!(patch.line_ending, LineEnding::Lf);
}

#[test]
fn strips_fenced_reply() {
    let reply = format!("Here is the fix:\n\n```diff\n{DIFF}```\nLet me know!");
    let patch = parse(&reply, ORIGINAL).unwrap();
    assert_eq!(patch.hunks.len(), 1);
}

#[test]
fn empty_and_hunkless_text_is_empty() {
    assert_eq!(parse("", ORIGINAL), Err(ParseError::Empty));
    assert_eq!(parse("--- a/x\n+++ b/x\n", ORIGINAL), Err(ParseError::Empty));
}

#[test]
fn count_mismatch_is_header_mismatch() {
    let short = "@@ -1,3 +1,3 @@\n fn main() {\n-    let a = 1;\n+    let a = 10;\n";
    assert!(matches!(
        parse(short, ORIGINAL),
        Err(ParseError::HeaderMismatch { hunk: 1, .. })
    ));

    let long = "@@ -1,1 +1,1 @@\n-fn main() {\n+fn main()  {\n     let a = 1;\n";
    assert!(matches!(
        parse(long, ORIGINAL),
        Err(ParseError::HeaderMismatch { hunk: 1, .. })
    ));
}

#[test]
fn range_outside_file_is_header_mismatch() {
    let diff = "@@ -9,1 +9,1 @@\n-x\n+y\n";
    assert!(matches!(
        parse(diff, ORIGINAL),
        Err(ParseError::HeaderMismatch { hunk: 1, .. })
    ));
}

#[test]
fn overlapping_hunks_are_rejected() {
    let diff = "\
@@ -1,2 +1,2 @@
 fn main() {
-    let a = 1;
+    let a = 10;
@@ -2,1 +2,1 @@
-    let a = 1;
+    let a = 11;
";
    assert_eq!(
        parse(diff, ORIGINAL),
        Err(ParseError::OverlappingHunks { first: 1, second: 2 })
    );
}

#[test]
fn garbage_line_is_malformed() {
    let diff = "@@ -1,1 +1,1 @@\n-fn main() {\n*fn main() {\n";
    assert!(matches!(parse(diff, ORIGINAL), Err(ParseError::Malformed { line: 3, .. })));

    let bad_header = "@@ -x +1 @@\n-a\n";
    assert!(matches!(parse(bad_header, ORIGINAL), Err(ParseError::Malformed { line: 1, .. })));
}

#[test]
fn backslash_line_without_marker_is_malformed() {
    let inside = "@@ -1,2 +1,2 @@\n-fn main() {\n\\oops\n+fn main()  {\n     let a = 1;\n";
    assert!(matches!(parse(inside, ORIGINAL), Err(ParseError::Malformed { line: 3, .. })));

    let after = "@@ -1 +1 @@\n-fn main() {\n+fn main()  {\n\\oops\n";
    assert!(matches!(parse(after, ORIGINAL), Err(ParseError::Malformed { line: 4, .. })));
}

#[test]
fn second_file_is_malformed() {
    let diff = format!("{DIFF}--- a/other.rs\n+++ b/other.rs\n@@ -1 +1 @@\n-a\n+b\n");
    assert!(matches!(parse(&diff, ORIGINAL), Err(ParseError::Malformed { .. })));
}

#[test]
fn context_only_hunk_is_malformed() {
    let diff = "@@ -1,1 +1,1 @@\n fn main() {\n";
    assert!(matches!(parse(diff, ORIGINAL), Err(ParseError::Malformed { .. })));
}

#[test]
fn round_trip_reproduces_edits() {
    let patch = parse(DIFF, ORIGINAL).unwrap();
    let applied = splice(&patch, ORIGINAL).unwrap();
    assert_eq!(
        applied.content,
        "fn main() {\n    let a = 10;\n    let b = 2;\n    println!(\"{}\", a + b);\n}\n"
    );

    let regenerated = diff("src/main.rs", ORIGINAL, &applied.content);
    let reparsed = parse(&regenerated, ORIGINAL).unwrap();
    assert_eq!(splice(&reparsed, ORIGINAL).unwrap().content, applied.content);
    assert_eq!(reparsed.lines_added(), 1);
    assert_eq!(reparsed.lines_removed(), 1);
}

#[test]
fn reapplying_is_a_conflict() {
    let patch = parse(DIFF, ORIGINAL).unwrap();
    let once = splice(&patch, ORIGINAL).unwrap();
    assert_eq!(splice(&patch, &once.content), Err(ConflictError::AlreadyApplied));
}

#[test]
fn reapplying_an_append_is_a_conflict() {
    let original = "a\nb\n";
    let diff = "@@ -1,2 +1,3 @@\n a\n b\n+c\n";
    let patch = parse(diff, original).unwrap();
    let once = splice(&patch, original).unwrap();
    assert_eq!(once.content, "a\nb\nc\n");
    assert_eq!(splice(&patch, &once.content), Err(ConflictError::AlreadyApplied));
}

#[test]
fn deleting_the_last_function_applies() {
    let original = "def used():\n    return 1\n\n\ndef unused():\n    return 2\n";
    let updated = "def used():\n    return 1\n";
    let patch = parse(&diff("a.py", original, updated), original).unwrap();

    let once = splice(&patch, original).unwrap();
    assert_eq!(once.content, updated);
    assert_eq!(once.lines_removed, 4);
    assert_eq!(splice(&patch, &once.content), Err(ConflictError::AlreadyApplied));
}

#[test]
fn trailing_blank_lines_can_be_removed() {
    let original = "x = 1\n\n\n";
    let patch = parse(&diff("a.py", original, "x = 1\n"), original).unwrap();

    let once = splice(&patch, original).unwrap();
    assert_eq!(once.content, "x = 1\n");
    assert_eq!(splice(&patch, &once.content), Err(ConflictError::AlreadyApplied));
}

#[test]
fn context_mismatch_names_hunk_and_line() {
    let drifted = ORIGINAL.replace("let b = 2", "let b = 3");
    let patch = parse(DIFF, ORIGINAL).unwrap();
    match splice(&patch, &drifted) {
        Err(ConflictError::ContextMismatch { hunk, line, found, .. }) => {
            assert_eq!((hunk, line), (1, 3));
            assert_eq!(found.as_deref(), Some("    let b = 3;"));
        }
        other => panic!("expected context mismatch, got {other:?}"),
    }
}

#[test]
fn crlf_content_keeps_crlf() {
    let original = "a\r\nb\r\nc\r\n";
    let diff = "@@ -1,3 +1,4 @@\n a\n-b\n+B\n+B2\n c\n";
    let patch = parse(diff, original).unwrap();
    assert_eq!(patch.line_ending, LineEnding::CrLf);
    let applied = splice(&patch, original).unwrap();
    assert_eq!(applied.content, "a\r\nB\r\nB2\r\nc\r\n");
}

#[test]
fn crlf_diff_text_is_accepted() {
    let diff = "@@ -1,2 +1,2 @@\r\n a\r\n-b\r\n+c\r\n";
    let patch = parse(diff, "a\nb\n").unwrap();
    assert_eq!(splice(&patch, "a\nb\n").unwrap().content, "a\nc\n");
}

#[test]
fn missing_trailing_newline_is_preserved() {
    let original = "one\ntwo";
    let diff = "@@ -1,2 +1,2 @@\n-one\n+ONE\n two\n\\ No newline at end of file\n";
    let patch = parse(diff, original).unwrap();
    assert!(!patch.ends_with_newline);
    assert_eq!(splice(&patch, original).unwrap().content, "ONE\ntwo");
}

#[test]
fn untouched_unterminated_tail_stays_unterminated() {
    let original = "one\ntwo\nthree";
    let diff = "@@ -1 +1 @@\n-one\n+uno\n";
    let patch = parse(diff, original).unwrap();
    assert_eq!(splice(&patch, original).unwrap().content, "uno\ntwo\nthree");
}

#[test]
fn adding_final_newline() {
    let original = "x\ny";
    let updated = "x\ny\n";
    let text = diff("f.txt", original, updated);
    assert!(text.contains("\\ No newline at end of file"));
    let patch = parse(&text, original).unwrap();
    assert!(patch.old_missing_newline);
    assert_eq!(splice(&patch, original).unwrap().content, updated);
    assert_eq!(splice(&patch, "x\ny\n"), Err(ConflictError::AlreadyApplied));
}

#[test]
fn marker_expecting_no_newline_conflicts_with_terminated_file() {
    let diff = "@@ -1,2 +1,2 @@\n x\n-y\n\\ No newline at end of file\n+z\n";
    let patch = parse(diff, "x\ny").unwrap();
    assert_eq!(splice(&patch, "x\ny\n"), Err(ConflictError::TrailingNewline));
}

#[test]
fn insertion_into_empty_file() {
    let patch = parse("@@ -0,0 +1,2 @@\n+a\n+b\n", "").unwrap();
    assert_eq!(splice(&patch, "").unwrap().content, "a\nb\n");
}

#[test]
fn diff_emits_separate_hunks_for_distant_edits() {
    let old: String = (1..=30).map(|i| format!("line {i}\n")).collect();
    let new = old.replace("line 2\n", "line two\n").replace("line 28\n", "line twenty-eight\n");
    let text = diff("f.txt", &old, &new);
    assert_eq!(text.matches("@@ -").count(), 2);

    let patch = parse(&text, &old).unwrap();
    assert_eq!(splice(&patch, &old).unwrap().content, new);
}

#[test]
fn diff_of_identical_content_is_empty() {
    assert!(diff("f", "a\n", "a\n").is_empty());
}

#[test]
fn to_unified_round_trips_through_parse() {
    let patch = parse(DIFF, ORIGINAL).unwrap();
    let rendered = patch.to_unified("src/main.rs");
    assert_eq!(parse(&rendered, ORIGINAL).unwrap(), patch);
}
