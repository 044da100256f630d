// src/analysis/checks/naming.rs
//! Function naming checks: casing convention and word count.

use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::{Query, QueryCursor};

use crate::types::{Issue, IssueKind, LineRange};

use super::CheckContext;

static SNAKE_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^_*[a-z][a-z0-9_]*$").unwrap_or_else(|_| panic!("Invalid Regex"))
});
static CAMEL_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[_$]*[a-z][a-zA-Z0-9]*$").unwrap_or_else(|_| panic!("Invalid Regex"))
});

pub fn check_naming(ctx: &CheckContext, query: &Query, out: &mut Vec<Issue>) {
    let mut cursor = QueryCursor::new();
    for m in cursor.matches(query, ctx.root, ctx.source.as_bytes()) {
        for capture in m.captures {
            let Ok(name) = capture.node.utf8_text(ctx.source.as_bytes()) else {
                continue;
            };
            let line = LineRange::single(capture.node.start_position().row + 1);
            check_name(name, line, ctx, out);
        }
    }
}

fn check_name(name: &str, line: LineRange, ctx: &CheckContext, out: &mut Vec<Issue>) {
    let (convention, re) = if ctx.lang.uses_snake_case() {
        ("snake_case", &*SNAKE_CASE)
    } else {
        ("camelCase", &*CAMEL_CASE)
    };
    if !re.is_match(name) {
        out.push(Issue::new(
            IssueKind::Naming,
            line,
            format!("Function name '{name}' is not {convention}"),
        ));
        return;
    }

    let words = split_name_words(name).len();
    if words > ctx.config.max_function_words {
        out.push(Issue::new(
            IssueKind::Naming,
            line,
            format!(
                "Function name '{name}' has {words} words (max {})",
                ctx.config.max_function_words
            ),
        ));
    }
}

fn split_name_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if c == '_' || c == '$' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_snake_and_camel() {
        assert_eq!(split_name_words("load_user_profile").len(), 3);
        assert_eq!(split_name_words("loadUserProfileFast").len(), 4);
        assert_eq!(split_name_words("__init__").len(), 1);
    }
}
