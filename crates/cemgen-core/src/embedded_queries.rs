//! Embedded tree-sitter queries.
//!
//! All query sources are compiled into the binary so the analyzer works
//! without external query files. The catalog is fixed: each entry pairs a
//! grammar with a named query, and [`crate::queries::QueryManager`]
//! compiles every entry at construction time.

use crate::grammar::Grammar;

const TYPESCRIPT_CLASSES: &str = include_str!("../queries/typescript-classes.scm");
const TYPESCRIPT_CLASS_MEMBER_DECLARATION: &str =
    include_str!("../queries/typescript-class-member-declaration.scm");
const TYPESCRIPT_IMPORTS: &str = include_str!("../queries/typescript-imports.scm");
const TYPESCRIPT_DECLARATIONS: &str = include_str!("../queries/typescript-declarations.scm");
const TYPESCRIPT_TYPE_ALIASES: &str = include_str!("../queries/typescript-type-aliases.scm");
const TYPESCRIPT_RENDER_TEMPLATE: &str = include_str!("../queries/typescript-render-template.scm");
const TYPESCRIPT_STYLES: &str = include_str!("../queries/typescript-styles.scm");
const JSDOC: &str = include_str!("../queries/jsdoc.scm");
const HTML_SLOTS_AND_PARTS: &str = include_str!("../queries/html-slots-and-parts.scm");
const CSS_CUSTOM_PROPERTIES: &str = include_str!("../queries/css-custom-properties.scm");

/// The full query catalog: (grammar, query name, query source).
pub const QUERY_CATALOG: &[(Grammar, &str, &str)] = &[
    (Grammar::TypeScript, "classes", TYPESCRIPT_CLASSES),
    (
        Grammar::TypeScript,
        "classMemberDeclaration",
        TYPESCRIPT_CLASS_MEMBER_DECLARATION,
    ),
    (Grammar::TypeScript, "imports", TYPESCRIPT_IMPORTS),
    (Grammar::TypeScript, "declarations", TYPESCRIPT_DECLARATIONS),
    (Grammar::TypeScript, "typeAliases", TYPESCRIPT_TYPE_ALIASES),
    (
        Grammar::TypeScript,
        "renderTemplate",
        TYPESCRIPT_RENDER_TEMPLATE,
    ),
    (Grammar::TypeScript, "styles", TYPESCRIPT_STYLES),
    (Grammar::Jsdoc, "jsdoc", JSDOC),
    (Grammar::Html, "slotsAndParts", HTML_SLOTS_AND_PARTS),
    (Grammar::Css, "cssCustomProperties", CSS_CUSTOM_PROPERTIES),
];

/// Get the embedded query source for a (grammar, name) pair.
pub fn get_query(grammar: Grammar, name: &str) -> Option<&'static str> {
    QUERY_CATALOG
        .iter()
        .find(|(g, n, _)| *g == grammar && *n == name)
        .map(|(_, _, source)| *source)
}

/// All query names registered for a grammar.
pub fn query_names(grammar: Grammar) -> Vec<&'static str> {
    QUERY_CATALOG
        .iter()
        .filter(|(g, _, _)| *g == grammar)
        .map(|(_, n, _)| *n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        assert!(get_query(Grammar::TypeScript, "classes").is_some());
        assert!(get_query(Grammar::Jsdoc, "jsdoc").is_some());
        assert!(get_query(Grammar::Html, "slotsAndParts").is_some());
        assert!(get_query(Grammar::Css, "cssCustomProperties").is_some());
        assert!(get_query(Grammar::TypeScript, "nonexistent").is_none());
    }

    #[test]
    fn test_every_grammar_has_queries() {
        for grammar in Grammar::all() {
            assert!(
                !query_names(*grammar).is_empty(),
                "no queries for {}",
                grammar
            );
        }
    }

    #[test]
    fn test_catalog_sources_nonempty() {
        for (grammar, name, source) in QUERY_CATALOG {
            assert!(!source.is_empty(), "empty query {}:{}", grammar, name);
        }
    }
}
