// src/analysis/checks.rs
//! AST-based complexity and naming checks.

mod complexity;
mod naming;

use tree_sitter::Node;

use crate::config::RuleConfig;
use crate::lang::Lang;

pub use complexity::check_metrics;
pub use naming::check_naming;

/// Context for running checks on a single file.
pub struct CheckContext<'a> {
    pub root: Node<'a>,
    pub source: &'a str,
    pub lang: Lang,
    pub config: &'a RuleConfig,
}
