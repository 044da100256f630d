// src/analysis/checks/complexity.rs
//! Per-function metrics: cyclomatic complexity, nesting depth, arity.

use tree_sitter::{Node, Query, QueryCursor};

use crate::types::{Issue, IssueKind, LineRange};

use super::CheckContext;

/// Checks every function matched by `func_query`.
pub fn check_metrics(
    ctx: &CheckContext,
    func_query: &Query,
    branch_query: &Query,
    out: &mut Vec<Issue>,
) {
    let mut cursor = QueryCursor::new();
    for m in cursor.matches(func_query, ctx.root, ctx.source.as_bytes()) {
        for capture in m.captures {
            analyze_function(capture.node, ctx, branch_query, out);
        }
    }
}

fn analyze_function(node: Node, ctx: &CheckContext, branch_query: &Query, out: &mut Vec<Issue>) {
    let span = LineRange::new(node.start_position().row + 1, node.end_position().row + 1);

    let params = count_parameters(node, ctx.source);
    if params > ctx.config.max_function_args {
        let name = function_name(node, ctx.source);
        out.push(Issue::new(
            IssueKind::Arity,
            span,
            format!(
                "Function '{name}' has {params} parameters (max {})",
                ctx.config.max_function_args
            ),
        ));
    }

    let depth = measure_nesting(node, ctx.lang.nesting_kinds(), 0);
    if depth > ctx.config.max_nesting_depth {
        let name = function_name(node, ctx.source);
        out.push(Issue::new(
            IssueKind::Nesting,
            span,
            format!(
                "Function '{name}' nests {depth} levels deep (max {})",
                ctx.config.max_nesting_depth
            ),
        ));
    }

    let complexity = measure_complexity(node, ctx.source, branch_query);
    if complexity > ctx.config.max_cyclomatic_complexity {
        let name = function_name(node, ctx.source);
        out.push(Issue::new(
            IssueKind::Complexity,
            span,
            format!(
                "Function '{name}' has cyclomatic complexity {complexity} (max {})",
                ctx.config.max_cyclomatic_complexity
            ),
        ));
    }
}

fn function_name(node: Node, source: &str) -> String {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .map_or_else(|| "<anonymous>".to_string(), str::to_string)
}

fn count_parameters(node: Node, source: &str) -> usize {
    let Some(params) = node.child_by_field_name("parameters") else {
        return 0;
    };
    let mut cursor = params.walk();
    let count = params
        .named_children(&mut cursor)
        .filter(|p| p.kind() != "self_parameter" && p.kind() != "comment")
        .filter(|p| {
            let text = p.utf8_text(source.as_bytes()).unwrap_or("");
            text != "self" && text != "cls"
        })
        .count();
    count
}

fn measure_nesting(node: Node, kinds: &[&str], current: usize) -> usize {
    let mut max_depth = current;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let depth = if kinds.contains(&child.kind()) {
            current + 1
        } else {
            current
        };
        max_depth = max_depth.max(measure_nesting(child, kinds, depth));
    }
    max_depth
}

fn measure_complexity(node: Node, source: &str, query: &Query) -> usize {
    let mut cursor = QueryCursor::new();
    let branches: usize = cursor
        .matches(query, node, source.as_bytes())
        .map(|m| m.captures.len())
        .sum();
    1 + branches
}
