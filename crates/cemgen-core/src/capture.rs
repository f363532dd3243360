//! Capture engine: parent-grouped query execution.
//!
//! A single tree walk can yield several concurrent captures for one
//! conceptual unit (a class member's decorators, type, initializer and
//! modifiers, say). Grouping by a designated "parent" capture collapses
//! every match that includes the same parent AST node into one capture
//! group, so downstream extraction sees one group per member, per slot,
//! per property.

use std::collections::HashMap;

use tree_sitter::{Node, StreamingIterator};

use crate::error::AnalyzerError;
use crate::queries::Matcher;

/// One captured node, detached from the tree.
///
/// `start_byte`/`end_byte` are offsets into the text the query ran over;
/// callers re-base them when that text was sliced out of a larger source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub node_id: usize,
    /// Grammar node kind, e.g. "method_definition".
    pub kind: &'static str,
    pub text: String,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Capture {
    fn from_node(node: Node, source: &[u8]) -> Self {
        Self {
            node_id: node.id(),
            kind: node.kind(),
            text: node.utf8_text(source).unwrap_or("").to_string(),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
        }
    }
}

/// All captures aggregated under one parent node, indexed by capture name.
#[derive(Debug, Clone)]
pub struct CaptureGroup {
    /// The parent capture itself.
    pub parent: Capture,
    captures: HashMap<String, Vec<Capture>>,
}

impl CaptureGroup {
    fn new(parent: Capture) -> Self {
        Self {
            parent,
            captures: HashMap::new(),
        }
    }

    fn insert(&mut self, name: &str, capture: Capture) {
        let entries = self.captures.entry(name.to_string()).or_default();
        // Duplicate (name, node) pairs from overlapping matches collapse.
        if !entries.iter().any(|c| c.node_id == capture.node_id) {
            entries.push(capture);
        }
    }

    /// First capture under the name, if any.
    pub fn first(&self, name: &str) -> Option<&Capture> {
        self.captures.get(name).and_then(|c| c.first())
    }

    /// All captures under the name, in discovery order.
    pub fn all(&self, name: &str) -> &[Capture] {
        self.captures.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Text of the first capture under the name.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.first(name).map(|c| c.text.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.captures.contains_key(name)
    }

    /// First capture under the name, or a `MissingCapture` error naming
    /// the capture and the query for diagnosis.
    pub fn require(&self, name: &str, query: &str) -> Result<&Capture, AnalyzerError> {
        self.first(name)
            .ok_or_else(|| AnalyzerError::missing_capture(name, query))
    }

    /// Capture names present in this group.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.captures.keys().map(String::as_str)
    }
}

/// Execute the matcher's query over `root` and group captures by the
/// designated parent capture name.
///
/// Groups are returned in ascending `start_byte` order of the parent
/// node. Matches that do not include the parent capture are skipped.
pub fn capture_groups(
    matcher: &mut Matcher,
    root: Node,
    source: &[u8],
    parent: &str,
) -> Vec<CaptureGroup> {
    let mut groups: HashMap<usize, CaptureGroup> = HashMap::new();
    let mut order: Vec<usize> = Vec::new();

    let (cursor, query) = matcher.parts();
    let capture_names = query.capture_names();

    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        let parent_nodes: Vec<Node> = m
            .captures
            .iter()
            .filter(|c| capture_names[c.index as usize] == parent)
            .map(|c| c.node)
            .collect();
        if parent_nodes.is_empty() {
            continue;
        }

        for parent_node in parent_nodes {
            let id = parent_node.id();
            let group = groups.entry(id).or_insert_with(|| {
                order.push(id);
                CaptureGroup::new(Capture::from_node(parent_node, source))
            });

            for c in m.captures {
                let name = capture_names[c.index as usize];
                if name == parent && c.node.id() == id {
                    continue;
                }
                group.insert(name, Capture::from_node(c.node, source));
            }
        }
    }

    let mut result: Vec<CaptureGroup> = order
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .collect();
    result.sort_by_key(|g| g.parent.start_byte);
    result
}
