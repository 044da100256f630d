// src/analysis/mod.rs
//! Default issue detection built on tree-sitter.

pub mod checks;

use crate::collab::Analyzer;
use crate::config::RuleConfig;
use crate::lang::{Lang, QueryKind};
use crate::types::{Issue, IssueKind};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use checks::CheckContext;
use std::path::Path;
use tree_sitter::{Parser, Query};

pub struct TreeSitterAnalyzer {
    rules: RuleConfig,
}

impl TreeSitterAnalyzer {
    #[must_use]
    pub fn new(rules: RuleConfig) -> Self {
        Self { rules }
    }

    /// Issues in `content`, highest priority first. Unsupported languages
    /// yield none.
    ///
    /// # Errors
    /// Returns error if the grammar cannot be loaded or the parse fails.
    pub fn analyze_source(&self, path: &Path, content: &str) -> Result<Vec<Issue>> {
        let Some(lang) = Lang::from_path(path) else {
            return Ok(Vec::new());
        };

        let mut parser = Parser::new();
        parser
            .set_language(lang.grammar())
            .map_err(|e| anyhow!("Failed to load {} grammar: {e:?}", lang.name()))?;
        let tree = parser
            .parse(content, None)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let functions = compile(lang, QueryKind::Functions)?;
        let branches = compile(lang, QueryKind::Branches)?;
        let names = compile(lang, QueryKind::Naming)?;

        let ctx = CheckContext {
            root: tree.root_node(),
            source: content,
            lang,
            config: &self.rules,
        };

        let mut issues = Vec::new();
        checks::check_metrics(&ctx, &functions, &branches, &mut issues);
        checks::check_naming(&ctx, &names, &mut issues);

        issues.sort_by_key(|i| (priority(i.kind()), i.location().start));
        issues.dedup_by(|a, b| a.fingerprint() == b.fingerprint() && a.location() == b.location());
        Ok(issues)
    }
}

#[async_trait]
impl Analyzer for TreeSitterAnalyzer {
    async fn analyze(&self, path: &Path, content: &str) -> Result<Vec<Issue>> {
        self.analyze_source(path, content)
    }
}

fn compile(lang: Lang, kind: QueryKind) -> Result<Query> {
    Query::new(lang.grammar(), lang.query(kind))
        .map_err(|e| anyhow!("Invalid {kind:?} query for {}: {e:?}", lang.name()))
}

fn priority(kind: IssueKind) -> u8 {
    match kind {
        IssueKind::Complexity => 0,
        IssueKind::Nesting => 1,
        IssueKind::Arity => 2,
        IssueKind::DeadCode => 3,
        IssueKind::Naming => 4,
        IssueKind::Style => 5,
        IssueKind::Other => 6,
    }
}
