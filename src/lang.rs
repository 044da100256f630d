// src/lang.rs
use std::path::Path;
use tree_sitter::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Rust,
    Python,
    TypeScript,
}

#[derive(Debug, Clone, Copy)]
pub enum QueryKind {
    Functions,
    Naming,
    Branches,
}

impl Lang {
    #[must_use]
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(Self::Rust),
            "py" => Some(Self::Python),
            "ts" | "tsx" | "js" | "jsx" => Some(Self::TypeScript),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_ext)
    }

    #[must_use]
    pub fn grammar(self) -> Language {
        match self {
            Self::Rust => tree_sitter_rust::language(),
            Self::Python => tree_sitter_python::language(),
            Self::TypeScript => tree_sitter_typescript::language_typescript(),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::TypeScript => "typescript",
        }
    }

    // Indexing is safe: both indices come from enum discriminants that match
    // the QUERIES dimensions.
    #[must_use]
    #[allow(clippy::indexing_slicing)]
    pub fn query(self, kind: QueryKind) -> &'static str {
        QUERIES[self as usize][kind as usize]
    }

    /// Node kinds that open a new nesting level inside a function body.
    #[must_use]
    pub fn nesting_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "if_expression",
                "match_expression",
                "while_expression",
                "for_expression",
                "loop_expression",
            ],
            Self::Python => &[
                "if_statement",
                "for_statement",
                "while_statement",
                "try_statement",
                "with_statement",
            ],
            Self::TypeScript => &[
                "if_statement",
                "for_statement",
                "for_in_statement",
                "while_statement",
                "do_statement",
                "switch_statement",
                "try_statement",
            ],
        }
    }

    /// Function names are `snake_case` in Rust and Python, `camelCase` in TypeScript.
    #[must_use]
    pub fn uses_snake_case(self) -> bool {
        !matches!(self, Self::TypeScript)
    }
}

// [Rust, Python, TypeScript] x [Functions, Naming, Branches]
const QUERIES: [[&str; 3]; 3] = [
    // Rust
    [
        "(function_item) @func",
        "(function_item name: (identifier) @name)",
        r#"
            (if_expression) @branch
            (match_arm) @branch
            (while_expression) @branch
            (for_expression) @branch
            (binary_expression operator: ["&&" "||"]) @branch
        "#,
    ],
    // Python
    [
        "(function_definition) @func",
        "(function_definition name: (identifier) @name)",
        r"
            (if_statement) @branch
            (elif_clause) @branch
            (for_statement) @branch
            (while_statement) @branch
            (except_clause) @branch
            (boolean_operator) @branch
        ",
    ],
    // TypeScript
    [
        r"
            (function_declaration) @func
            (method_definition) @func
            (arrow_function) @func
        ",
        r"
            (function_declaration name: (identifier) @name)
            (method_definition name: (property_identifier) @name)
        ",
        r#"
            (if_statement) @branch
            (for_statement) @branch
            (for_in_statement) @branch
            (while_statement) @branch
            (do_statement) @branch
            (switch_case) @branch
            (catch_clause) @branch
            (ternary_expression) @branch
            (binary_expression operator: ["&&" "||" "??"]) @branch
        "#,
    ],
];
