// src/apply/validator.rs
//! Post-apply structure checks.

use crate::lang::Lang;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Language-aware sanity check run on patched content before it is written.
pub trait StructureCheck: Send + Sync {
    /// # Errors
    /// Returns a human-readable reason when `content` is structurally broken.
    fn check(&self, path: &Path, content: &str) -> Result<(), String>;
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheck;

impl StructureCheck for NoCheck {
    fn check(&self, _path: &Path, _content: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects content that tree-sitter cannot parse cleanly. Files in languages
/// without a grammar pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntaxCheck;

impl StructureCheck for SyntaxCheck {
    fn check(&self, path: &Path, content: &str) -> Result<(), String> {
        let Some(lang) = Lang::from_path(path) else {
            return Ok(());
        };

        let mut parser = Parser::new();
        parser
            .set_language(lang.grammar())
            .map_err(|e| format!("{} grammar unavailable: {e:?}", lang.name()))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| format!("{} parser produced no tree", lang.name()))?;

        let root = tree.root_node();
        if !root.has_error() {
            return Ok(());
        }
        match first_error(root) {
            Some(node) if node.is_missing() => Err(format!(
                "missing {} at line {}",
                node.kind(),
                node.start_position().row + 1
            )),
            Some(node) => Err(format!("syntax error at line {}", node.start_position().row + 1)),
            None => Err("syntax error".to_string()),
        }
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}
