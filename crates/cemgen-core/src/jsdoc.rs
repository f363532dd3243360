//! Documentation-comment analysis.
//!
//! `/** … */` blocks are parsed with the JSDoc grammar to split the
//! leading description from the tag list; each tag's payload is then
//! dispatched by name. Payload shapes follow the conventional forms:
//!
//! - `@attr[ibute] [{T}] (name | [name=default]) [- description]`
//! - `@csspart name [- description]`
//! - `@cssprop[erty] [{<syntax>}] (--name | [--name=default]) [- description]`
//! - `@cssstate name [- description]`
//! - `@event|@fires [{T}] name [- description]`
//! - `@slot (name | - description)` (second form is the anonymous slot)
//! - `@param[eter] [{T}] (name | [name=default]) [- description]`
//! - `@return[s] [{T}] [description]`
//! - `@deprecated [reason]`, `@summary text`, `@alias name`,
//!   `@customElement name`, `@demo url [- description]`,
//!   `@example [<caption>…</caption>] code`, `@typedef {T} Name`
//!
//! A malformed comment that the JSDoc grammar rejects degrades to a
//! plain description (best-effort policy).

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::capture::capture_groups;
use crate::error::AnalyzerError;
use crate::grammar::Grammar;
use crate::manifest::{
    Attribute, CssCustomProperty, CssPart, CssState, Demo, Deprecated, Event, Parameter, Privacy,
    ReturnType, Slot, Type,
};
use crate::parser::ParserPool;
use crate::queries::QueryManager;

/// Structured annotations for a class site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassJsdoc {
    pub description: String,
    pub summary: String,
    pub deprecated: Option<Deprecated>,
    pub tag_name: Option<String>,
    pub alias: Option<String>,
    pub attributes: Vec<Attribute>,
    pub css_parts: Vec<CssPart>,
    pub css_properties: Vec<CssCustomProperty>,
    pub css_states: Vec<CssState>,
    pub events: Vec<Event>,
    pub slots: Vec<Slot>,
    pub demos: Vec<Demo>,
    /// `@typedef {T} Name` aliases declared on the comment.
    pub typedefs: Vec<(String, String)>,
}

/// Structured annotations for a method site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodJsdoc {
    pub description: String,
    pub summary: String,
    pub deprecated: Option<Deprecated>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<ReturnType>,
    pub privacy: Option<Privacy>,
}

/// Structured annotations for a property site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyJsdoc {
    pub description: String,
    pub summary: String,
    pub type_: Option<Type>,
    pub deprecated: Option<Deprecated>,
}

/// Structured annotations for a CSS custom property site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CssPropertyJsdoc {
    pub description: String,
    pub summary: String,
    pub syntax: Option<String>,
    pub deprecated: Option<Deprecated>,
}

/// One raw tag: name without the `@`, payload normalized.
#[derive(Debug, Clone, PartialEq)]
struct RawTag {
    name: String,
    payload: String,
}

/// Parses documentation comments through the JSDoc grammar.
pub struct JsdocAnalyzer<'a> {
    queries: &'a QueryManager,
    parsers: &'a ParserPool,
}

impl<'a> JsdocAnalyzer<'a> {
    pub fn new(queries: &'a QueryManager, parsers: &'a ParserPool) -> Self {
        Self { queries, parsers }
    }

    /// Parse annotations relevant to a class declaration.
    pub fn parse_for_class(&self, comment: &str) -> Result<ClassJsdoc, AnalyzerError> {
        let (description, tags) = self.split(comment)?;
        let mut doc = ClassJsdoc {
            description,
            ..Default::default()
        };
        let mut examples: Vec<String> = Vec::new();

        for tag in tags {
            match tag.name.as_str() {
                "attr" | "attribute" => {
                    if let Some(attr) = parse_attr_tag(&tag.payload) {
                        doc.attributes.push(attr);
                    }
                }
                "csspart" => {
                    if let Some((name, desc)) = parse_name_desc(&tag.payload) {
                        doc.css_parts.push(CssPart {
                            name,
                            description: desc,
                            ..Default::default()
                        });
                    }
                }
                "cssprop" | "cssproperty" => {
                    if let Some(prop) = parse_cssprop_tag(&tag.payload) {
                        doc.css_properties.push(prop);
                    }
                }
                "cssstate" => {
                    if let Some((name, desc)) = parse_name_desc(&tag.payload) {
                        doc.css_states.push(CssState {
                            name,
                            description: desc,
                            ..Default::default()
                        });
                    }
                }
                "event" | "fires" => {
                    if let Some(event) = parse_event_tag(&tag.payload) {
                        doc.events.push(event);
                    }
                }
                "slot" => doc.slots.push(parse_slot_tag(&tag.payload)),
                "demo" => {
                    if let Some((url, desc)) = parse_name_desc(&tag.payload) {
                        doc.demos.push(Demo {
                            url,
                            description: desc,
                        });
                    }
                }
                "deprecated" => doc.deprecated = Some(Deprecated::from_reason(&tag.payload)),
                "summary" => doc.summary = tag.payload.trim().to_string(),
                "alias" => doc.alias = first_token(&tag.payload),
                "customElement" | "customelement" | "element" => {
                    doc.tag_name = first_token(&tag.payload)
                }
                "example" => examples.push(tag.payload.trim().to_string()),
                "typedef" => {
                    if let Some((type_, name)) = parse_typedef_tag(&tag.payload) {
                        doc.typedefs.push((name, type_));
                    }
                }
                other => debug!(tag = other, "ignoring unrecognized class tag"),
            }
        }

        for example in examples {
            if !example.is_empty() {
                crate::manifest::merge_description(&mut doc.description, &example);
            }
        }

        Ok(doc)
    }

    /// Parse annotations relevant to a method site.
    pub fn parse_for_method(&self, comment: &str) -> Result<MethodJsdoc, AnalyzerError> {
        let (description, tags) = self.split(comment)?;
        let mut doc = MethodJsdoc {
            description,
            ..Default::default()
        };

        for tag in tags {
            match tag.name.as_str() {
                "param" | "parameter" => {
                    if let Some(param) = parse_param_tag(&tag.payload) {
                        doc.parameters.push(param);
                    }
                }
                "return" | "returns" => doc.return_type = Some(parse_return_tag(&tag.payload)),
                "deprecated" => doc.deprecated = Some(Deprecated::from_reason(&tag.payload)),
                "summary" => doc.summary = tag.payload.trim().to_string(),
                "public" => doc.privacy = Some(Privacy::Public),
                "protected" => doc.privacy = Some(Privacy::Protected),
                "private" => doc.privacy = Some(Privacy::Private),
                other => debug!(tag = other, "ignoring unrecognized method tag"),
            }
        }

        Ok(doc)
    }

    /// Parse annotations relevant to a property site.
    pub fn parse_for_property(&self, comment: &str) -> Result<PropertyJsdoc, AnalyzerError> {
        let (description, tags) = self.split(comment)?;
        let mut doc = PropertyJsdoc {
            description,
            ..Default::default()
        };

        for tag in tags {
            match tag.name.as_str() {
                "type" => doc.type_ = parse_braced_type(&tag.payload).map(Type::new),
                "deprecated" => doc.deprecated = Some(Deprecated::from_reason(&tag.payload)),
                "summary" => doc.summary = tag.payload.trim().to_string(),
                other => debug!(tag = other, "ignoring unrecognized property tag"),
            }
        }

        Ok(doc)
    }

    /// Parse annotations adjacent to a CSS custom property.
    pub fn parse_for_css_property(&self, comment: &str) -> Result<CssPropertyJsdoc, AnalyzerError> {
        let (description, tags) = self.split(comment)?;
        let mut doc = CssPropertyJsdoc {
            description,
            ..Default::default()
        };

        for tag in tags {
            match tag.name.as_str() {
                "syntax" => {
                    let trimmed = tag.payload.trim();
                    if !trimmed.is_empty() {
                        doc.syntax = Some(trimmed.to_string());
                    }
                }
                "deprecated" => doc.deprecated = Some(Deprecated::from_reason(&tag.payload)),
                "summary" => doc.summary = tag.payload.trim().to_string(),
                other => debug!(tag = other, "ignoring unrecognized css property tag"),
            }
        }

        Ok(doc)
    }

    /// Split a raw comment into its normalized description and tag list.
    fn split(&self, comment: &str) -> Result<(String, Vec<RawTag>), AnalyzerError> {
        let mut parser = self.parsers.acquire(Grammar::Jsdoc)?;
        let tree = match parser.parse(comment, std::path::Path::new("<jsdoc>")) {
            Ok(tree) => tree,
            Err(_) => {
                // Malformed comment: degrade to a plain description.
                return Ok((normalize_block(strip_delimiters(comment)), Vec::new()));
            }
        };

        let source = comment.as_bytes();

        let mut matcher = self.queries.acquire_matcher(Grammar::Jsdoc, "jsdoc")?;
        let description = capture_groups(
            &mut matcher,
            tree.root_node(),
            source,
            "doc.description",
        )
        .first()
        .map(|g| normalize_block(&g.parent.text))
        .unwrap_or_default();

        let mut matcher = self.queries.acquire_matcher(Grammar::Jsdoc, "jsdoc")?;
        let tags = capture_groups(&mut matcher, tree.root_node(), source, "tag")
            .into_iter()
            .filter_map(|group| {
                let name_capture = group.first("tag.name")?;
                let name = name_capture.text.trim_start_matches('@').to_string();
                // Payload: tag text after the tag name token.
                let offset = name_capture
                    .end_byte
                    .saturating_sub(group.parent.start_byte);
                let payload = normalize_block(group.parent.text.get(offset..).unwrap_or(""));
                Some(RawTag { name, payload })
            })
            .collect();

        Ok((description, tags))
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Strip the `/** … */` delimiters if present.
fn strip_delimiters(comment: &str) -> &str {
    let trimmed = comment.trim();
    let trimmed = trimmed
        .strip_prefix("/**")
        .or_else(|| trimmed.strip_prefix("/*"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("*/").unwrap_or(trimmed)
}

/// Normalize continuation lines: strip the leading ` * ` prefix, turn a
/// lone `*` into an empty line, and trim the block.
fn normalize_block(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("* ") {
                rest.to_string()
            } else if trimmed == "*" {
                String::new()
            } else if let Some(rest) = trimmed.strip_prefix('*') {
                rest.to_string()
            } else {
                trimmed.to_string()
            }
        })
        .collect();
    lines.join("\n").trim().to_string()
}

// ============================================================================
// Tag payload parsing
// ============================================================================

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)^\s*(?:\{(?P<type>[^}]*)\}\s*)?(?:\[(?P<bname>[^\]=]+?)(?:\s*=\s*(?P<default>[^\]]*))?\]|(?P<name>\S+))\s*(?:-\s*)?(?P<desc>.*)$",
        )
        .expect("attr tag regex")
    })
}

fn name_desc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*(?P<name>\S+)\s*(?:-\s*)?(?P<desc>.*)$").expect("name/desc tag regex")
    })
}

fn typedef_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*\{(?P<type>.*)\}\s*(?P<name>\S+)").expect("typedef tag regex")
    })
}

/// `[{T}] (name | [name=default]) [- description]`
fn parse_attr_tag(payload: &str) -> Option<Attribute> {
    let caps = attr_regex().captures(payload)?;
    let (name, default) = match caps.name("bname") {
        Some(n) => (
            n.as_str().trim().to_string(),
            caps.name("default").map(|d| d.as_str().trim().to_string()),
        ),
        None => (caps.name("name")?.as_str().to_string(), None),
    };
    if name.is_empty() {
        return None;
    }
    Some(Attribute {
        name,
        type_: caps
            .name("type")
            .map(|t| t.as_str().trim())
            .filter(|t| !t.is_empty())
            .map(Type::new),
        default,
        description: caps
            .name("desc")
            .map(|d| d.as_str().trim().to_string())
            .unwrap_or_default(),
        ..Default::default()
    })
}

/// `[{<syntax>}] (--name | [--name=default]) [- description]`
fn parse_cssprop_tag(payload: &str) -> Option<CssCustomProperty> {
    let caps = attr_regex().captures(payload)?;
    let (name, default) = match caps.name("bname") {
        Some(n) => (
            n.as_str().trim().to_string(),
            caps.name("default").map(|d| d.as_str().trim().to_string()),
        ),
        None => (caps.name("name")?.as_str().to_string(), None),
    };
    if !name.starts_with("--") {
        return None;
    }
    Some(CssCustomProperty {
        name,
        syntax: caps
            .name("type")
            .map(|t| t.as_str().trim())
            .filter(|t| !t.is_empty())
            .map(String::from),
        default,
        description: caps
            .name("desc")
            .map(|d| d.as_str().trim().to_string())
            .unwrap_or_default(),
        ..Default::default()
    })
}

/// `[{T}] name [- description]`
fn parse_event_tag(payload: &str) -> Option<Event> {
    let caps = attr_regex().captures(payload)?;
    let name = caps
        .name("name")
        .or(caps.name("bname"))?
        .as_str()
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }
    Some(Event {
        name,
        type_: caps
            .name("type")
            .map(|t| t.as_str().trim())
            .filter(|t| !t.is_empty())
            .map(Type::new),
        description: caps
            .name("desc")
            .map(|d| d.as_str().trim().to_string())
            .unwrap_or_default(),
        ..Default::default()
    })
}

/// `@slot name - description` or `@slot - description` (anonymous).
fn parse_slot_tag(payload: &str) -> Slot {
    let trimmed = payload.trim();
    if let Some(rest) = trimmed.strip_prefix('-') {
        return Slot {
            name: String::new(),
            description: rest.trim().to_string(),
            ..Default::default()
        };
    }
    match parse_name_desc(trimmed) {
        Some((name, description)) => Slot {
            name,
            description,
            ..Default::default()
        },
        None => Slot::default(),
    }
}

/// `name [- description]`, used for `@csspart`, `@cssstate`, `@demo`.
fn parse_name_desc(payload: &str) -> Option<(String, String)> {
    let caps = name_desc_regex().captures(payload)?;
    let name = caps.name("name")?.as_str().to_string();
    let desc = caps
        .name("desc")
        .map(|d| d.as_str().trim().to_string())
        .unwrap_or_default();
    Some((name, desc))
}

/// `[{T}] (name | [name=default]) [- description]`; brackets mark the
/// parameter optional, `=default` records the default.
fn parse_param_tag(payload: &str) -> Option<Parameter> {
    let caps = attr_regex().captures(payload)?;
    let (name, default, optional) = match caps.name("bname") {
        Some(n) => (
            n.as_str().trim().to_string(),
            caps.name("default").map(|d| d.as_str().trim().to_string()),
            true,
        ),
        None => (caps.name("name")?.as_str().to_string(), None, false),
    };
    if name.is_empty() {
        return None;
    }
    Some(Parameter {
        name,
        type_: caps
            .name("type")
            .map(|t| t.as_str().trim())
            .filter(|t| !t.is_empty())
            .map(Type::new),
        default,
        optional: optional || default_is_set(&caps),
        description: caps
            .name("desc")
            .map(|d| d.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

fn default_is_set(caps: &regex::Captures<'_>) -> bool {
    caps.name("default").is_some()
}

/// `[{T}] [description]`
fn parse_return_tag(payload: &str) -> ReturnType {
    let trimmed = payload.trim();
    if let Some(rest) = trimmed.strip_prefix('{') {
        if let Some(close) = rest.find('}') {
            let type_text = rest[..close].trim();
            let desc = rest[close + 1..].trim();
            return ReturnType {
                type_: (!type_text.is_empty()).then(|| Type::new(type_text)),
                description: desc.trim_start_matches('-').trim().to_string(),
            };
        }
    }
    ReturnType {
        type_: None,
        description: trimmed.trim_start_matches('-').trim().to_string(),
    }
}

/// `{T} Name`
fn parse_typedef_tag(payload: &str) -> Option<(String, String)> {
    let caps = typedef_regex().captures(payload)?;
    Some((
        caps.name("type")?.as_str().trim().to_string(),
        caps.name("name")?.as_str().to_string(),
    ))
}

/// `{T}` at the start of the payload.
fn parse_braced_type(payload: &str) -> Option<String> {
    let trimmed = payload.trim();
    let rest = trimmed.strip_prefix('{')?;
    let close = rest.rfind('}')?;
    let text = rest[..close].trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn first_token(payload: &str) -> Option<String> {
    payload
        .split_whitespace()
        .next()
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer_fixtures() -> (QueryManager, ParserPool) {
        (QueryManager::new().unwrap(), ParserPool::new())
    }

    #[test]
    fn test_class_description_and_tags() {
        let (queries, parsers) = analyzer_fixtures();
        let analyzer = JsdocAnalyzer::new(&queries, &parsers);
        let doc = analyzer
            .parse_for_class(
                "/**\n * A toggle button.\n *\n * @cssprop [--my-color=red] - Brand color\n * @slot icon - Leading icon\n * @csspart label - The label\n */",
            )
            .unwrap();
        assert_eq!(doc.description, "A toggle button.");
        assert_eq!(doc.css_properties.len(), 1);
        assert_eq!(doc.css_properties[0].name, "--my-color");
        assert_eq!(doc.css_properties[0].default.as_deref(), Some("red"));
        assert_eq!(doc.css_properties[0].description, "Brand color");
        assert_eq!(doc.slots.len(), 1);
        assert_eq!(doc.slots[0].name, "icon");
        assert_eq!(doc.slots[0].description, "Leading icon");
        assert_eq!(doc.css_parts.len(), 1);
        assert_eq!(doc.css_parts[0].name, "label");
    }

    #[test]
    fn test_attr_tag_with_type_and_default() {
        let attr = parse_attr_tag("{boolean} [open=false] - Whether the panel is open").unwrap();
        assert_eq!(attr.name, "open");
        assert_eq!(attr.type_.as_ref().unwrap().text, "boolean");
        assert_eq!(attr.default.as_deref(), Some("false"));
        assert_eq!(attr.description, "Whether the panel is open");
    }

    #[test]
    fn test_attr_tag_bare_name() {
        let attr = parse_attr_tag("label The accessible label").unwrap();
        assert_eq!(attr.name, "label");
        assert!(attr.type_.is_none());
        assert_eq!(attr.description, "The accessible label");
    }

    #[test]
    fn test_cssprop_requires_double_dash() {
        assert!(parse_cssprop_tag("{<color>} --accent - Accent color").is_some());
        assert!(parse_cssprop_tag("accent - not a custom property").is_none());
        let prop = parse_cssprop_tag("{<color>} --accent - Accent color").unwrap();
        assert_eq!(prop.syntax.as_deref(), Some("<color>"));
    }

    #[test]
    fn test_anonymous_slot() {
        let slot = parse_slot_tag("- Default content");
        assert_eq!(slot.name, "");
        assert_eq!(slot.description, "Default content");

        let named = parse_slot_tag("footer - Sticky footer");
        assert_eq!(named.name, "footer");
        assert_eq!(named.description, "Sticky footer");
    }

    #[test]
    fn test_event_tag() {
        let event = parse_event_tag("{CustomEvent<string>} change - Fired on change").unwrap();
        assert_eq!(event.name, "change");
        assert_eq!(event.type_.as_ref().unwrap().text, "CustomEvent<string>");
        assert_eq!(event.description, "Fired on change");
    }

    #[test]
    fn test_param_optionality() {
        let required = parse_param_tag("{string} name - The name").unwrap();
        assert!(!required.optional);

        let optional = parse_param_tag("{string} [name] - The name").unwrap();
        assert!(optional.optional);
        assert!(optional.default.is_none());

        let with_default = parse_param_tag("{number} [count=3] - Retry count").unwrap();
        assert!(with_default.optional);
        assert_eq!(with_default.default.as_deref(), Some("3"));
    }

    #[test]
    fn test_return_tag() {
        let ret = parse_return_tag("{Promise<void>} resolves when done");
        assert_eq!(ret.type_.as_ref().unwrap().text, "Promise<void>");
        assert_eq!(ret.description, "resolves when done");
    }

    #[test]
    fn test_method_privacy_and_deprecated() {
        let (queries, parsers) = analyzer_fixtures();
        let analyzer = JsdocAnalyzer::new(&queries, &parsers);
        let doc = analyzer
            .parse_for_method("/** Close the panel.\n * @private\n * @deprecated use hide()\n */")
            .unwrap();
        assert_eq!(doc.privacy, Some(Privacy::Private));
        assert_eq!(
            doc.deprecated,
            Some(Deprecated::Reason("use hide()".into()))
        );
    }

    #[test]
    fn test_property_type_override() {
        let (queries, parsers) = analyzer_fixtures();
        let analyzer = JsdocAnalyzer::new(&queries, &parsers);
        let doc = analyzer
            .parse_for_property("/** The size.\n * @type {'small' | 'large'}\n */")
            .unwrap();
        assert_eq!(doc.type_.as_ref().unwrap().text, "'small' | 'large'");
    }

    #[test]
    fn test_css_property_syntax() {
        let (queries, parsers) = analyzer_fixtures();
        let analyzer = JsdocAnalyzer::new(&queries, &parsers);
        let doc = analyzer
            .parse_for_css_property("/** Accent color.\n * @syntax <color>\n */")
            .unwrap();
        assert_eq!(doc.description, "Accent color.");
        assert_eq!(doc.syntax.as_deref(), Some("<color>"));
    }

    #[test]
    fn test_typedef_tag() {
        let (type_, name) = parse_typedef_tag("{'sm' | 'md' | 'lg'} Size").unwrap();
        assert_eq!(type_, "'sm' | 'md' | 'lg'");
        assert_eq!(name, "Size");
    }

    #[test]
    fn test_normalize_block_strips_stars() {
        let text = " * Line one\n * Line two\n *\n * Line three\n *";
        assert_eq!(
            normalize_block(text),
            "Line one\nLine two\n\nLine three"
        );
    }

    #[test]
    fn test_deprecated_without_reason() {
        let (queries, parsers) = analyzer_fixtures();
        let analyzer = JsdocAnalyzer::new(&queries, &parsers);
        let doc = analyzer.parse_for_class("/** Old.\n * @deprecated\n */").unwrap();
        assert_eq!(doc.deprecated, Some(Deprecated::Flag(true)));
    }

    #[test]
    fn test_custom_element_tag() {
        let (queries, parsers) = analyzer_fixtures();
        let analyzer = JsdocAnalyzer::new(&queries, &parsers);
        let doc = analyzer
            .parse_for_class("/** El.\n * @customElement my-widget\n */")
            .unwrap();
        assert_eq!(doc.tag_name.as_deref(), Some("my-widget"));
    }
}
