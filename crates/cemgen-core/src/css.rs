//! CSS custom property extraction and the parse cache.
//!
//! The extractor walks declarations (`--name: value;`) and use sites
//! (`var(--name, default)`) in one query pass. Occurrences sharing a
//! name fold into one entry: the last occurrence's `startByte` wins and
//! other metadata merges non-empty-wins. A documentation comment
//! immediately preceding an occurrence contributes description, summary,
//! syntax and deprecation through the documentation-comment analyzer.
//!
//! Imported CSS files are parsed once and cached by filesystem path in
//! [`CssParseCache`]; the session evicts entries when the file changes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::capture::capture_groups;
use crate::error::AnalyzerError;
use crate::grammar::Grammar;
use crate::jsdoc::JsdocAnalyzer;
use crate::manifest::CssCustomProperty;
use crate::parser::ParserPool;
use crate::queries::QueryManager;

/// Custom properties keyed by name. BTreeMap keeps merges deterministic.
pub type CssPropertyMap = BTreeMap<String, CssCustomProperty>;

/// Extracts custom properties from CSS text.
pub struct CssExtractor<'a> {
    queries: &'a QueryManager,
    parsers: &'a ParserPool,
}

impl<'a> CssExtractor<'a> {
    pub fn new(queries: &'a QueryManager, parsers: &'a ParserPool) -> Self {
        Self { queries, parsers }
    }

    /// Extract custom properties from CSS text.
    ///
    /// `content_offset` re-bases emitted offsets onto the original
    /// source; pass 0 for standalone CSS files.
    pub fn extract(
        &self,
        css: &str,
        content_offset: usize,
    ) -> Result<CssPropertyMap, AnalyzerError> {
        let content = strip_backticks(css);

        let mut parser = self.parsers.acquire(Grammar::Css)?;
        let tree = parser.parse(content, Path::new("<css>"))?;
        let source = content.as_bytes();

        let comments = self.collect_comments(&tree, source)?;
        let jsdoc = JsdocAnalyzer::new(self.queries, self.parsers);

        let mut map = CssPropertyMap::new();

        // Declarations: --name: value;
        let mut matcher = self
            .queries
            .acquire_matcher(Grammar::Css, "cssCustomProperties")?;
        for group in capture_groups(&mut matcher, tree.root_node(), source, "property") {
            let Some(name) = group.text("property.name") else {
                continue;
            };
            let default = join_values(group.all("property.value"));
            let entry = CssCustomProperty {
                name: name.to_string(),
                default: (!default.is_empty()).then_some(default),
                start_byte: content_offset + group.parent.start_byte,
                ..Default::default()
            };
            let entry = apply_adjacent_comment(
                entry,
                &comments,
                content,
                group.parent.start_byte,
                &jsdoc,
            );
            merge_occurrence(&mut map, entry);
        }

        // Use sites: var(--name, default)
        let mut matcher = self
            .queries
            .acquire_matcher(Grammar::Css, "cssCustomProperties")?;
        for group in capture_groups(&mut matcher, tree.root_node(), source, "var") {
            let Some(name) = group.text("var.name") else {
                continue;
            };
            if !name.starts_with("--") {
                continue;
            }
            let default = join_values(group.all("var.default"));
            let entry = CssCustomProperty {
                name: name.to_string(),
                default: (!default.is_empty()).then_some(default),
                start_byte: content_offset + group.parent.start_byte,
                ..Default::default()
            };
            let entry = apply_adjacent_comment(
                entry,
                &comments,
                content,
                group.parent.start_byte,
                &jsdoc,
            );
            merge_occurrence(&mut map, entry);
        }

        Ok(map)
    }

    fn collect_comments(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
    ) -> Result<Vec<(usize, usize, String)>, AnalyzerError> {
        let mut matcher = self
            .queries
            .acquire_matcher(Grammar::Css, "cssCustomProperties")?;
        let mut comments: Vec<(usize, usize, String)> =
            capture_groups(&mut matcher, tree.root_node(), source, "comment")
                .into_iter()
                .map(|g| (g.parent.start_byte, g.parent.end_byte, g.parent.text))
                .collect();
        comments.sort_by_key(|&(start, _, _)| start);
        Ok(comments)
    }
}

/// Merge an occurrence into the map: last occurrence's startByte wins,
/// other metadata non-empty-wins.
fn merge_occurrence(map: &mut CssPropertyMap, incoming: CssCustomProperty) {
    match map.get_mut(&incoming.name) {
        Some(existing) => {
            existing.start_byte = incoming.start_byte;
            if existing.default.is_none() {
                existing.default = incoming.default;
            }
            if existing.syntax.is_none() {
                existing.syntax = incoming.syntax;
            }
            if existing.description.is_empty() {
                existing.description = incoming.description;
            }
            if existing.summary.is_empty() {
                existing.summary = incoming.summary;
            }
            if existing.deprecated.is_none() {
                existing.deprecated = incoming.deprecated;
            }
        }
        None => {
            map.insert(incoming.name.clone(), incoming);
        }
    }
}

/// Attach documentation from the comment immediately preceding the
/// occurrence, if any.
fn apply_adjacent_comment(
    mut entry: CssCustomProperty,
    comments: &[(usize, usize, String)],
    content: &str,
    site_start: usize,
    jsdoc: &JsdocAnalyzer<'_>,
) -> CssCustomProperty {
    let adjacent = comments.iter().rev().find(|(_, end, _)| {
        *end <= site_start
            && content
                .get(*end..site_start)
                .is_some_and(is_adjacent_gap)
    });
    let Some((_, _, text)) = adjacent else {
        return entry;
    };

    // CSS comments open with /*; promote so tag parsing applies.
    let doc_text = if text.starts_with("/**") {
        text.clone()
    } else if let Some(rest) = text.strip_prefix("/*") {
        format!("/**{}", rest)
    } else {
        text.clone()
    };

    if let Ok(doc) = jsdoc.parse_for_css_property(&doc_text) {
        entry.description = doc.description;
        entry.summary = doc.summary;
        if entry.syntax.is_none() {
            entry.syntax = doc.syntax;
        }
        if entry.deprecated.is_none() {
            entry.deprecated = doc.deprecated;
        }
    }
    entry
}

/// A comment documents the next occurrence site when nothing but
/// whitespace and at most the opening of the enclosing rule separates
/// them. Crossing a declaration (`;`) or a closing brace breaks
/// adjacency.
fn is_adjacent_gap(gap: &str) -> bool {
    !gap.contains(';') && !gap.contains('}') && gap.matches('{').count() <= 1
}

fn join_values(captures: &[crate::capture::Capture]) -> String {
    captures
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn strip_backticks(css: &str) -> &str {
    match css.strip_prefix('`') {
        Some(rest) => rest.strip_suffix('`').unwrap_or(rest),
        None => css,
    }
}

// ============================================================================
// CSS Parse Cache
// ============================================================================

/// Thread-safe cache of parsed CSS property maps keyed by absolute
/// filesystem path. No eviction beyond explicit invalidation; a `get`
/// after a `set` always sees the set.
#[derive(Debug, Default)]
pub struct CssParseCache {
    inner: RwLock<HashMap<PathBuf, CssPropertyMap>>,
}

impl CssParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<CssPropertyMap> {
        self.inner.read().get(path).cloned()
    }

    pub fn set(&self, path: impl Into<PathBuf>, map: CssPropertyMap) {
        self.inner.write().insert(path.into(), map);
    }

    /// Bulk removal for changed files.
    pub fn invalidate(&self, paths: &[PathBuf]) {
        let mut inner = self.inner.write();
        for path in paths {
            inner.remove(path);
        }
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
