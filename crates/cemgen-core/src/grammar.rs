//! Grammar registry for the analysis engine.
//!
//! Four tree-sitter grammars cover the source material: TypeScript for the
//! host language (plain JavaScript parses under it as well), JSDoc for
//! documentation comments, and HTML/CSS for tagged template literal
//! contents.

use tree_sitter::Language;

/// Grammars used by the analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    TypeScript,
    Jsdoc,
    Html,
    Css,
}

impl Grammar {
    /// Get the grammar name as used in query file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Grammar::TypeScript => "typescript",
            Grammar::Jsdoc => "jsdoc",
            Grammar::Html => "html",
            Grammar::Css => "css",
        }
    }

    /// Get the tree-sitter Language for this grammar.
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Jsdoc => tree_sitter_jsdoc::LANGUAGE.into(),
            Grammar::Html => tree_sitter_html::LANGUAGE.into(),
            Grammar::Css => tree_sitter_css::LANGUAGE.into(),
        }
    }

    /// All grammars, in catalog order.
    pub fn all() -> &'static [Grammar] {
        &[Grammar::TypeScript, Grammar::Jsdoc, Grammar::Html, Grammar::Css]
    }
}

impl std::fmt::Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
