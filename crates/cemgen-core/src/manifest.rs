//! Custom Elements Manifest schema.
//!
//! The manifest is a tree owned by the session: a `Package` of `Module`s,
//! each holding declarations and exports. Serialization follows the CEM
//! JSON conventions (camelCase keys, `kind` tags, empty collections
//! omitted), and deserializing the serialized form reproduces the value
//! exactly, which is what makes deep copies via round-trip sound.
//!
//! Two sources feed the same entities: syntax-derived facts and
//! documentation-comment annotations. The merge helpers at the bottom of
//! this module implement the single policy both sides go through.

use serde::{Deserialize, Serialize};

/// Manifest schema version emitted in the output.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";

// ============================================================================
// Package and Module
// ============================================================================

/// Top-level manifest: an ordered sequence of modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<Module>,
}

impl Default for Package {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            modules: Vec::new(),
        }
    }
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort modules by path ascending (manifest invariant).
    pub fn sort_modules(&mut self) {
        self.modules.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Find a module by path.
    pub fn module(&self, path: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.path == path)
    }
}

/// One analyzed source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Always "javascript-module".
    pub kind: String,
    /// Resolved module specifier (may differ from the filesystem path
    /// per package-export rules).
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declarations: Vec<Declaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,
}

impl Module {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            kind: "javascript-module".to_string(),
            path: path.into(),
            declarations: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// All custom element declarations in this module.
    pub fn custom_elements_mut(&mut self) -> impl Iterator<Item = &mut ClassDeclaration> {
        self.declarations.iter_mut().filter_map(|d| match d {
            Declaration::Class(c) if c.custom_element => Some(c),
            _ => None,
        })
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A top-level declaration inside a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Declaration {
    #[serde(rename = "class")]
    Class(ClassDeclaration),
    #[serde(rename = "function")]
    Function(FunctionDeclaration),
    #[serde(rename = "variable")]
    Variable(VariableDeclaration),
    #[serde(rename = "mixin")]
    Mixin(MixinDeclaration),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Class(c) => &c.name,
            Declaration::Function(f) => &f.name,
            Declaration::Variable(v) => &v.name,
            Declaration::Mixin(m) => &m.name,
        }
    }

    pub fn start_byte(&self) -> usize {
        match self {
            Declaration::Class(c) => c.start_byte,
            Declaration::Function(f) => f.start_byte,
            Declaration::Variable(v) => v.start_byte,
            Declaration::Mixin(m) => m.start_byte,
        }
    }
}

/// A class, optionally carrying the custom-element extension fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superclass: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ClassMember>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
    pub start_byte: usize,

    /// True when this class defines a custom element; the fields below
    /// are only populated in that case.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub custom_element: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<Slot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub css_parts: Vec<CssPart>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub css_properties: Vec<CssCustomProperty>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub css_states: Vec<CssState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub demos: Vec<Demo>,
}

impl ClassDeclaration {
    pub fn new(name: impl Into<String>, start_byte: usize) -> Self {
        Self {
            name: name.into(),
            start_byte,
            ..Default::default()
        }
    }

    /// Sort members by start byte ascending; ties keep discovery order.
    pub fn sort_members(&mut self) {
        self.members.sort_by_key(ClassMember::start_byte);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub start_byte: usize,
}

/// A mixin: a function taking a class and returning a subclass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MixinDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ClassMember>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    pub start_byte: usize,
}

// ============================================================================
// Class members
// ============================================================================

/// A class member. Fields bound to an HTML attribute carry the binding
/// inline (the `CustomElementField` shape of the schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClassMember {
    #[serde(rename = "field")]
    Field(ClassField),
    #[serde(rename = "method")]
    Method(ClassMethod),
}

impl ClassMember {
    pub fn name(&self) -> &str {
        match self {
            ClassMember::Field(f) => &f.name,
            ClassMember::Method(m) => &m.name,
        }
    }

    pub fn start_byte(&self) -> usize {
        match self {
            ClassMember::Field(f) => f.start_byte,
            ClassMember::Method(m) => m.start_byte,
        }
    }
}

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Protected,
    Private,
}

impl Privacy {
    pub fn is_public(&self) -> bool {
        *self == Privacy::Public
    }
}

fn privacy_is_public(p: &Privacy) -> bool {
    p.is_public()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassField {
    pub name: String,
    #[serde(skip_serializing_if = "privacy_is_public")]
    pub privacy: Privacy,
    #[serde(rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub static_: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub readonly: bool,
    /// Attribute binding; non-empty iff the field is bound to an HTML
    /// attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reflects: bool,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassMethod {
    pub name: String,
    #[serde(skip_serializing_if = "privacy_is_public")]
    pub privacy: Privacy,
    #[serde(rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub static_: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReturnType {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A type as source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    pub text: String,
}

impl Type {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// ============================================================================
// Custom element surface
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attribute {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Slot {
    /// Empty string for the anonymous slot.
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CssPart {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CssState {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CssCustomProperty {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    pub start_byte: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<Type>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Demo {
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

// ============================================================================
// References and exports
// ============================================================================

/// A reference to a declaration, possibly in another package or module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl Reference {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: None,
            module: None,
        }
    }

    pub fn in_package(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: Some(package.into()),
            module: None,
        }
    }
}

/// Where a declaration's source can be viewed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceReference {
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Export {
    #[serde(rename = "js")]
    Js {
        name: String,
        declaration: Reference,
    },
    #[serde(rename = "custom-element-definition")]
    CustomElementDefinition {
        /// The tag name.
        name: String,
        declaration: Reference,
    },
}

impl Export {
    pub fn name(&self) -> &str {
        match self {
            Export::Js { name, .. } => name,
            Export::CustomElementDefinition { name, .. } => name,
        }
    }

    pub fn declaration(&self) -> &Reference {
        match self {
            Export::Js { declaration, .. } => declaration,
            Export::CustomElementDefinition { declaration, .. } => declaration,
        }
    }
}

/// Deprecation marker: boolean-true or an explanatory string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Deprecated {
    Flag(bool),
    Reason(String),
}

impl Deprecated {
    pub fn from_reason(reason: &str) -> Self {
        if reason.trim().is_empty() {
            Deprecated::Flag(true)
        } else {
            Deprecated::Reason(reason.trim().to_string())
        }
    }
}

// ============================================================================
// Merge policy
// ============================================================================

/// Append `incoming` to `existing` with a blank-line separator when both
/// are non-empty; otherwise keep whichever is non-empty.
pub fn merge_description(existing: &mut String, incoming: &str) {
    if incoming.is_empty() {
        return;
    }
    if existing.is_empty() {
        *existing = incoming.to_string();
    } else {
        existing.push_str("\n\n");
        existing.push_str(incoming);
    }
}

/// Fill `slot` from `incoming` only when the slot is empty.
pub fn fill_missing<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

/// Entity that merges by name: documentation augments empty fields on an
/// existing entry; unmatched documentation entries append.
pub trait NamedEntry {
    fn entry_name(&self) -> &str;
    /// Fill this entry's empty fields from `other`.
    fn augment(&mut self, other: &Self);
}

/// Name-keyed merge used for attributes, slots, parts, properties,
/// states and events. Sorted by name afterwards for deterministic
/// output when entries come from documentation alone.
pub fn merge_named<T: NamedEntry + Clone>(existing: &mut Vec<T>, incoming: Vec<T>) {
    for entry in incoming {
        match existing
            .iter_mut()
            .find(|e| e.entry_name() == entry.entry_name())
        {
            Some(found) => found.augment(&entry),
            None => existing.push(entry),
        }
    }
    existing.sort_by(|a, b| a.entry_name().cmp(b.entry_name()));
}

/// Dedup by name keeping the first occurrence by start byte; later
/// occurrences merge-augment absent fields.
pub fn dedup_named<T: NamedEntry + Clone>(entries: &mut Vec<T>, start_byte: impl Fn(&T) -> usize) {
    entries.sort_by_key(&start_byte);
    let mut result: Vec<T> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        match result
            .iter_mut()
            .find(|e| e.entry_name() == entry.entry_name())
        {
            Some(found) => found.augment(&entry),
            None => result.push(entry),
        }
    }
    *entries = result;
}

macro_rules! impl_named_entry {
    ($ty:ty) => {
        impl NamedEntry for $ty {
            fn entry_name(&self) -> &str {
                &self.name
            }

            fn augment(&mut self, other: &Self) {
                if self.description.is_empty() {
                    self.description = other.description.clone();
                }
                if self.summary.is_empty() {
                    self.summary = other.summary.clone();
                }
                if self.deprecated.is_none() {
                    self.deprecated = other.deprecated.clone();
                }
            }
        }
    };
}

impl_named_entry!(Slot);
impl_named_entry!(CssPart);
impl_named_entry!(CssState);

impl NamedEntry for Attribute {
    fn entry_name(&self) -> &str {
        &self.name
    }

    fn augment(&mut self, other: &Self) {
        if self.description.is_empty() {
            self.description = other.description.clone();
        }
        if self.summary.is_empty() {
            self.summary = other.summary.clone();
        }
        if self.deprecated.is_none() {
            self.deprecated = other.deprecated.clone();
        }
        if self.type_.is_none() {
            self.type_ = other.type_.clone();
        }
        if self.default.is_none() {
            self.default = other.default.clone();
        }
        if self.field_name.is_none() {
            self.field_name = other.field_name.clone();
        }
    }
}

impl NamedEntry for CssCustomProperty {
    fn entry_name(&self) -> &str {
        &self.name
    }

    fn augment(&mut self, other: &Self) {
        if self.description.is_empty() {
            self.description = other.description.clone();
        }
        if self.summary.is_empty() {
            self.summary = other.summary.clone();
        }
        if self.deprecated.is_none() {
            self.deprecated = other.deprecated.clone();
        }
        if self.syntax.is_none() {
            self.syntax = other.syntax.clone();
        }
        if self.default.is_none() {
            self.default = other.default.clone();
        }
    }
}

impl NamedEntry for Event {
    fn entry_name(&self) -> &str {
        &self.name
    }

    fn augment(&mut self, other: &Self) {
        if self.description.is_empty() {
            self.description = other.description.clone();
        }
        if self.summary.is_empty() {
            self.summary = other.summary.clone();
        }
        if self.type_.is_none() {
            self.type_ = other.type_.clone();
        }
    }
}
