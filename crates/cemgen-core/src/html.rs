//! HTML template analysis.
//!
//! Extracts `<slot>` elements and `part="…"` attributes from the raw text
//! of a tagged HTML template literal. Every emitted `startByte` is
//! re-based onto the original source: `content_offset + offset_in_template`.
//!
//! A slot or part may be documented by the immediately preceding HTML
//! comment. The comment payload is first tried as YAML carrying one of
//! the recognized keys (`description`, `summary`, `deprecated`, or nested
//! `slot:` / `part:` sections); anything else is taken verbatim as the
//! description.

use serde::Deserialize;
use tracing::trace;

use crate::capture::{capture_groups, CaptureGroup};
use crate::error::AnalyzerError;
use crate::grammar::Grammar;
use crate::manifest::{CssPart, Deprecated, Slot};
use crate::parser::ParserPool;
use crate::queries::QueryManager;

/// Result of analyzing one HTML template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateExtraction {
    pub slots: Vec<Slot>,
    pub css_parts: Vec<CssPart>,
}

/// Metadata carried by a documenting HTML comment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CommentMeta {
    description: Option<String>,
    summary: Option<String>,
    deprecated: Option<serde_yaml::Value>,
    slot: Option<SectionMeta>,
    part: Option<SectionMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SectionMeta {
    description: Option<String>,
    summary: Option<String>,
    deprecated: Option<serde_yaml::Value>,
}

impl CommentMeta {
    fn is_recognized(&self) -> bool {
        self.description.is_some()
            || self.summary.is_some()
            || self.deprecated.is_some()
            || self.slot.is_some()
            || self.part.is_some()
    }
}

/// Doc fields resolved for one site.
#[derive(Debug, Clone, Default)]
struct SiteDoc {
    description: String,
    summary: String,
    deprecated: Option<Deprecated>,
}

/// A comment's position within the template, for adjacency checks.
#[derive(Debug, Clone)]
struct CommentSpan {
    start_byte: usize,
    end_byte: usize,
    body: String,
}

/// Analyzes tagged HTML template literals.
pub struct HtmlTemplateAnalyzer<'a> {
    queries: &'a QueryManager,
    parsers: &'a ParserPool,
}

impl<'a> HtmlTemplateAnalyzer<'a> {
    pub fn new(queries: &'a QueryManager, parsers: &'a ParserPool) -> Self {
        Self { queries, parsers }
    }

    /// Extract slots and parts from a template.
    ///
    /// `content_offset` is the byte offset of the template's first
    /// content character within the original source (one past the
    /// opening backtick). Backtick delimiters still present on the text
    /// are stripped before parsing.
    pub fn analyze(
        &self,
        template: &str,
        content_offset: usize,
    ) -> Result<TemplateExtraction, AnalyzerError> {
        let content = strip_backticks(template);

        let mut parser = self.parsers.acquire(Grammar::Html)?;
        let tree = parser.parse(content, std::path::Path::new("<template>"))?;
        let source = content.as_bytes();

        let comments = self.collect_comments(&tree, source)?;

        let mut extraction = TemplateExtraction::default();

        let mut matcher = self.queries.acquire_matcher(Grammar::Html, "slotsAndParts")?;
        for group in capture_groups(&mut matcher, tree.root_node(), source, "slot") {
            let name = group.text("slot.name").unwrap_or("").to_string();
            let doc = doc_for_site(&comments, content, group.parent.start_byte, SiteKind::Slot);
            extraction.slots.push(Slot {
                name,
                description: doc.description,
                summary: doc.summary,
                deprecated: doc.deprecated,
                start_byte: content_offset + group.parent.start_byte,
            });
        }

        let mut matcher = self.queries.acquire_matcher(Grammar::Html, "slotsAndParts")?;
        for group in capture_groups(&mut matcher, tree.root_node(), source, "part") {
            let element_start = element_start(&group);
            let doc = doc_for_site(&comments, content, element_start, SiteKind::Part);
            let attribute_start = content_offset + group.parent.start_byte;
            for token in group
                .text("part.tokens")
                .unwrap_or("")
                .split_ascii_whitespace()
            {
                extraction.css_parts.push(CssPart {
                    name: token.to_string(),
                    description: doc.description.clone(),
                    summary: doc.summary.clone(),
                    deprecated: doc.deprecated.clone(),
                    start_byte: attribute_start,
                });
            }
        }

        Ok(extraction)
    }

    fn collect_comments(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
    ) -> Result<Vec<CommentSpan>, AnalyzerError> {
        let mut matcher = self.queries.acquire_matcher(Grammar::Html, "slotsAndParts")?;
        let mut comments: Vec<CommentSpan> =
            capture_groups(&mut matcher, tree.root_node(), source, "comment")
                .into_iter()
                .map(|group| CommentSpan {
                    start_byte: group.parent.start_byte,
                    end_byte: group.parent.end_byte,
                    body: comment_body(&group.parent.text),
                })
                .collect();
        comments.sort_by_key(|c| c.start_byte);
        Ok(comments)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SiteKind {
    Slot,
    Part,
}

/// Find the comment immediately preceding `site_start` (whitespace-only
/// gap) and resolve its documentation for the site kind.
fn doc_for_site(
    comments: &[CommentSpan],
    content: &str,
    site_start: usize,
    kind: SiteKind,
) -> SiteDoc {
    let Some(comment) = comments.iter().rev().find(|c| {
        c.end_byte <= site_start
            && content
                .get(c.end_byte..site_start)
                .is_some_and(|gap| gap.chars().all(char::is_whitespace))
    }) else {
        return SiteDoc::default();
    };

    match serde_yaml::from_str::<CommentMeta>(&comment.body) {
        Ok(meta) if meta.is_recognized() => {
            let section = match kind {
                SiteKind::Slot => meta.slot,
                SiteKind::Part => meta.part,
            };
            match section {
                Some(section) => SiteDoc {
                    description: section.description.unwrap_or_default(),
                    summary: section.summary.unwrap_or_default(),
                    deprecated: section.deprecated.and_then(yaml_deprecated),
                },
                None => SiteDoc {
                    description: meta.description.unwrap_or_default(),
                    summary: meta.summary.unwrap_or_default(),
                    deprecated: meta.deprecated.and_then(yaml_deprecated),
                },
            }
        }
        _ => {
            trace!("comment payload not recognized as YAML, using verbatim");
            SiteDoc {
                description: comment.body.clone(),
                ..Default::default()
            }
        }
    }
}

fn yaml_deprecated(value: serde_yaml::Value) -> Option<Deprecated> {
    match value {
        serde_yaml::Value::Bool(flag) => Some(Deprecated::Flag(flag)),
        serde_yaml::Value::String(reason) => Some(Deprecated::Reason(reason)),
        _ => None,
    }
}

/// Element start for a part group; falls back to the attribute itself.
fn element_start(group: &CaptureGroup) -> usize {
    group
        .first("part.element")
        .map(|c| c.start_byte)
        .unwrap_or(group.parent.start_byte)
}

/// Strip backtick delimiters if both are present.
fn strip_backticks(template: &str) -> &str {
    match template.strip_prefix('`') {
        Some(rest) => rest.strip_suffix('`').unwrap_or(rest),
        None => template,
    }
}

/// The payload between `<!--` and `-->`, trimmed.
fn comment_body(comment: &str) -> String {
    comment
        .trim()
        .strip_prefix("<!--")
        .unwrap_or(comment)
        .strip_suffix("-->")
        .map(str::trim)
        .unwrap_or_else(|| comment.trim())
        .to_string()
}
