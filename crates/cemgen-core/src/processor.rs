//! Per-module processing.
//!
//! A processor owns one source file's tree for its lifetime and walks
//! the pipeline `Initialized → ImportsScanned → ClassesProcessed →
//! DeclarationsProcessed → Finalized`. Every step is best-effort: errors
//! join into the aggregate on the result and partial output is kept.

use std::collections::HashMap;

use tracing::{debug, trace};
use tree_sitter::Node;

use crate::capture::{capture_groups, CaptureGroup};
use crate::css::{CssExtractor, CssParseCache, CssPropertyMap};
use crate::error::{AnalyzerError, AnalyzerErrors};
use crate::grammar::Grammar;
use crate::html::HtmlTemplateAnalyzer;
use crate::jsdoc::JsdocAnalyzer;
use crate::manifest::{
    dedup_named, merge_description, merge_named, Attribute, ClassDeclaration, ClassField,
    ClassMember, ClassMethod, Declaration, Export, FunctionDeclaration, MixinDeclaration, Module,
    Parameter, Privacy, Reference, Type, VariableDeclaration,
};
use crate::parser::PooledParser;
use crate::queries::QueryManager;
use crate::typeres::TypeResolver;
use crate::workspace::WorkspaceContext;

/// Superclass names that map to well-known packages.
const WELL_KNOWN_SUPERCLASSES: &[(&str, &str)] = &[
    ("LitElement", "lit"),
    ("ReactiveElement", "@lit/reactive-element"),
    ("HTMLElement", "global:"),
    ("Event", "global:"),
    ("CustomEvent", "global:"),
    ("ErrorEvent", "global:"),
];

/// Lifecycle methods inherited from the HTMLElement family; never
/// emitted as members.
const IGNORED_HTML_ELEMENT_METHODS: &[&str] = &[
    "connectedCallback",
    "disconnectedCallback",
    "adoptedCallback",
    "attributeChangedCallback",
];

/// Lifecycle methods of the reactive-element family.
const IGNORED_REACTIVE_METHODS: &[&str] = &[
    "render",
    "update",
    "updated",
    "firstUpdated",
    "willUpdate",
    "shouldUpdate",
    "performUpdate",
    "createRenderRoot",
    "getUpdateComplete",
    "requestUpdate",
];

/// Framework-reserved static fields; never emitted as members.
const IGNORED_STATIC_FIELDS: &[&str] = &[
    "observedAttributes",
    "styles",
    "shadowRootOptions",
    "formAssociated",
    "properties",
];

/// Processing lifecycle of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Initialized,
    ImportsScanned,
    ClassesProcessed,
    DeclarationsProcessed,
    Finalized,
    Failed,
}

/// A value import: local binding to its original name and specifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBinding {
    pub original: String,
    pub specifier: String,
}

/// Everything produced by processing one module.
#[derive(Debug)]
pub struct ProcessedModule {
    pub module: Module,
    /// Resolved module paths of CSS files this module's styles import.
    pub style_imports: Vec<String>,
    /// Resolved module paths of local value imports.
    pub imported_files: Vec<String>,
    /// Per-module `@typedef` aliases.
    pub type_aliases: HashMap<String, String>,
    /// Tag name to class name registrations seen in this module.
    pub tag_aliases: HashMap<String, String>,
    pub logs: Vec<String>,
    pub errors: AnalyzerErrors,
    pub state: ProcessorState,
}

/// Per-file orchestrator.
pub struct ModuleProcessor<'a> {
    queries: &'a QueryManager,
    css_cache: &'a CssParseCache,
    type_resolver: &'a TypeResolver,
    workspace: &'a dyn WorkspaceContext,
    jsdoc: JsdocAnalyzer<'a>,
    html: HtmlTemplateAnalyzer<'a>,
    css: CssExtractor<'a>,
}

impl<'a> ModuleProcessor<'a> {
    pub fn new(
        queries: &'a QueryManager,
        parsers: &'a crate::parser::ParserPool,
        css_cache: &'a CssParseCache,
        type_resolver: &'a TypeResolver,
        workspace: &'a dyn WorkspaceContext,
    ) -> Self {
        Self {
            queries,
            css_cache,
            type_resolver,
            workspace,
            jsdoc: JsdocAnalyzer::new(queries, parsers),
            html: HtmlTemplateAnalyzer::new(queries, parsers),
            css: CssExtractor::new(queries, parsers),
        }
    }

    /// Process one module. The caller supplies the TypeScript parser it
    /// holds for the worker's lifetime.
    pub fn process(
        &self,
        module_path: &str,
        source: &str,
        parser: &mut PooledParser<'_>,
    ) -> ProcessedModule {
        let mut out = ProcessedModule {
            module: Module::new(module_path),
            style_imports: Vec::new(),
            imported_files: Vec::new(),
            type_aliases: HashMap::new(),
            tag_aliases: HashMap::new(),
            logs: Vec::new(),
            errors: AnalyzerErrors::new(),
            state: ProcessorState::Initialized,
        };

        let fs_path = self.workspace.module_to_fs(module_path);
        let tree = match parser.parse(source, &fs_path) {
            Ok(tree) => tree,
            Err(e) => {
                out.errors.push(e);
                out.state = ProcessorState::Failed;
                return out;
            }
        };
        let root = tree.root_node();

        let imports = self.scan_imports(root, source, module_path, &mut out);
        out.state = ProcessorState::ImportsScanned;

        let mixin_names = self.process_classes(root, source, module_path, &imports, &mut out);
        out.state = ProcessorState::ClassesProcessed;

        self.process_declarations(root, source, &imports, &mixin_names, &mut out);
        out.state = ProcessorState::DeclarationsProcessed;

        for declaration in &mut out.module.declarations {
            if let Declaration::Class(class) = declaration {
                class.sort_members();
            }
        }
        out.logs.push(format!(
            "{}: {} declaration(s), {} export(s)",
            module_path,
            out.module.declarations.len(),
            out.module.exports.len()
        ));
        out.state = ProcessorState::Finalized;
        out
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn scan_imports(
        &self,
        root: Node<'_>,
        source: &str,
        module_path: &str,
        out: &mut ProcessedModule,
    ) -> HashMap<String, ImportBinding> {
        let mut imports = HashMap::new();

        let mut matcher = match self.queries.acquire_matcher(Grammar::TypeScript, "imports") {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return imports;
            }
        };

        for group in capture_groups(&mut matcher, root, source.as_bytes(), "import") {
            let Some(specifier) = group.text("import.specifier") else {
                continue;
            };
            let binding = group
                .text("import.alias")
                .or_else(|| group.text("import.name"))
                .or_else(|| group.text("import.default"))
                .or_else(|| group.text("import.namespace"));
            let Some(binding) = binding else {
                continue;
            };
            let original = group.text("import.name").unwrap_or(binding).to_string();
            imports.insert(
                binding.to_string(),
                ImportBinding {
                    original,
                    specifier: specifier.to_string(),
                },
            );

            if let Some(resolved) = self.workspace.resolve_dependency(module_path, specifier) {
                if !resolved.ends_with(".css") && !out.imported_files.contains(&resolved) {
                    out.imported_files.push(resolved);
                }
            }
        }

        // Side-effect imports carry no binding but still create a
        // dependency edge.
        let mut matcher = match self.queries.acquire_matcher(Grammar::TypeScript, "imports") {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return imports;
            }
        };
        for group in capture_groups(&mut matcher, root, source.as_bytes(), "import.statement") {
            let Some(specifier) = group.text("import.specifier") else {
                continue;
            };
            if let Some(resolved) = self.workspace.resolve_dependency(module_path, specifier) {
                if !resolved.ends_with(".css") && !out.imported_files.contains(&resolved) {
                    out.imported_files.push(resolved);
                }
            }
        }

        trace!(module = module_path, count = imports.len(), "imports scanned");
        imports
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn process_classes(
        &self,
        root: Node<'_>,
        source: &str,
        module_path: &str,
        imports: &HashMap<String, ImportBinding>,
        out: &mut ProcessedModule,
    ) -> Vec<String> {
        let mut mixin_names = Vec::new();

        let mut matcher = match self.queries.acquire_matcher(Grammar::TypeScript, "classes") {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return mixin_names;
            }
        };
        let groups = capture_groups(&mut matcher, root, source.as_bytes(), "class");

        for group in &groups {
            match self.process_class(group, root, source, module_path, imports, out) {
                Ok(class) => out.module.declarations.push(Declaration::Class(class)),
                Err(e) => out.errors.push(e),
            }
        }

        let mut matcher = match self.queries.acquire_matcher(Grammar::TypeScript, "classes") {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return mixin_names;
            }
        };
        for group in capture_groups(&mut matcher, root, source.as_bytes(), "mixin") {
            let Some(name) = group.text("mixin.name") else {
                continue;
            };
            mixin_names.push(name.to_string());
            let mut mixin = MixinDeclaration {
                name: name.to_string(),
                start_byte: group.parent.start_byte,
                ..Default::default()
            };
            if let Some(comment) = leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
            {
                if let Ok(doc) = self.jsdoc.parse_for_method(&comment) {
                    mixin.description = doc.description;
                    mixin.summary = doc.summary;
                    mixin.deprecated = doc.deprecated;
                    mixin.parameters = doc.parameters;
                }
            }
            out.module.declarations.push(Declaration::Mixin(mixin));
        }

        mixin_names
    }

    fn process_class(
        &self,
        group: &CaptureGroup,
        root: Node<'_>,
        source: &str,
        module_path: &str,
        imports: &HashMap<String, ImportBinding>,
        out: &mut ProcessedModule,
    ) -> Result<ClassDeclaration, AnalyzerError> {
        let name = group.require("class.name", "classes")?.text.clone();
        let mut class = ClassDeclaration::new(&name, group.parent.start_byte);

        let class_node = node_at(root, group.parent.start_byte, group.parent.end_byte)
            .ok_or_else(|| AnalyzerError::missing_capture("class", "classes"))?;

        // Heritage: bare identifier or a chain of mixin calls.
        if let Some(superclass) = group.first("class.superclass") {
            if let Some(node) = node_at(root, superclass.start_byte, superclass.end_byte) {
                let (base, mixins) = unwrap_heritage(node, source.as_bytes());
                class.superclass = Some(reference_for(&base, module_path, imports, self.workspace));
                class.mixins = mixins
                    .into_iter()
                    .map(|m| reference_for(&m, module_path, imports, self.workspace))
                    .collect();
                if base == "HTMLElement" {
                    class.custom_element = true;
                }
            }
        }

        // Framework classification: @customElement('tag-name').
        if group.text("class.decorator.name") == Some("customElement") {
            class.custom_element = true;
            if let Some(args) = group.text("class.decorator.arguments") {
                if let Some(tag) = first_string_literal(args) {
                    class.tag_name = Some(tag.clone());
                    out.tag_aliases.insert(tag, name.clone());
                }
            }
        }

        self.process_members(&mut class, class_node, root, source, imports, out);

        // Render template feeds the HTML analyzer.
        self.process_render_template(&mut class, class_node, source, out);

        // Styles feed the CSS extractor, inline or through imported files.
        self.process_styles(&mut class, class_node, source, module_path, imports, out);

        // Class documentation merges last, per the shared policy.
        if let Some(comment) = leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
        {
            match self.jsdoc.parse_for_class(&comment) {
                Ok(doc) => {
                    self.apply_class_jsdoc(&mut class, doc, out);
                }
                Err(e) => out.errors.push(e),
            }
        }

        // Attribute identities settle after both sources contributed.
        dedup_named(&mut class.attributes, |a| a.start_byte);

        Ok(class)
    }

    fn process_members(
        &self,
        class: &mut ClassDeclaration,
        class_node: Node<'_>,
        root: Node<'_>,
        source: &str,
        imports: &HashMap<String, ImportBinding>,
        out: &mut ProcessedModule,
    ) {
        let mut matcher = match self
            .queries
            .acquire_matcher(Grammar::TypeScript, "classMemberDeclaration")
        {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return;
            }
        };
        let groups = capture_groups(&mut matcher, class_node, source.as_bytes(), "member");

        // Accessor pairs collapse by (name, static); discovery order is
        // preserved by the vec.
        let mut fields: Vec<ClassField> = Vec::new();
        let mut methods: Vec<ClassMethod> = Vec::new();

        for group in &groups {
            let Some(name) = group.text("member.name") else {
                continue;
            };
            let is_static = group.has("member.static");
            let kind = group.parent.kind;

            if kind == "public_field_definition" || kind == "required_parameter" {
                if is_static && IGNORED_STATIC_FIELDS.contains(&name) {
                    if name == "observedAttributes" && class.custom_element {
                        self.stub_observed_attributes(class, group);
                    }
                    continue;
                }
                let field = self.build_field(group, root, source, imports, out);
                fields.push(field);
            } else if kind == "method_definition" {
                let is_getter = group.has("member.kind.getter");
                let is_setter = group.has("member.kind.setter");
                if is_getter || is_setter {
                    self.fold_accessor(&mut fields, group, root, source, is_getter, out);
                    continue;
                }
                if name == "constructor" {
                    continue;
                }
                if self.is_ignored_method(class, name) {
                    continue;
                }
                let method = self.build_method(group, root, source, out);
                methods.push(method);
            }
        }

        class
            .members
            .extend(fields.into_iter().map(ClassMember::Field));
        class
            .members
            .extend(methods.into_iter().map(ClassMember::Method));

        // Fields bound to an attribute derive Attribute entries.
        let derived: Vec<Attribute> = class
            .members
            .iter()
            .filter_map(|m| match m {
                ClassMember::Field(f) => f.attribute.as_ref().map(|attr| Attribute {
                    name: attr.clone(),
                    field_name: Some(f.name.clone()),
                    type_: f.type_.clone(),
                    default: f.default.clone(),
                    start_byte: f.start_byte,
                    ..Default::default()
                }),
                ClassMember::Method(_) => None,
            })
            .collect();
        class.attributes.extend(derived);
    }

    fn is_ignored_method(&self, class: &ClassDeclaration, name: &str) -> bool {
        if IGNORED_HTML_ELEMENT_METHODS.contains(&name) {
            return true;
        }
        let reactive_base = class
            .superclass
            .as_ref()
            .is_some_and(|s| s.name == "LitElement" || s.name == "ReactiveElement");
        reactive_base && IGNORED_REACTIVE_METHODS.contains(&name)
    }

    fn build_field(
        &self,
        group: &CaptureGroup,
        root: Node<'_>,
        source: &str,
        imports: &HashMap<String, ImportBinding>,
        out: &mut ProcessedModule,
    ) -> ClassField {
        let name = group.text("member.name").unwrap_or("").to_string();
        let mut field = ClassField {
            name,
            privacy: parse_privacy(group.text("member.privacy")),
            static_: group.has("member.static"),
            readonly: group.has("member.readonly"),
            start_byte: group.parent.start_byte,
            ..Default::default()
        };

        if let Some(type_text) = group.text("member.type") {
            field.type_ = Some(Type::new(type_text));
        }
        if let Some(initializer) = group.text("member.initializer") {
            field.default = Some(initializer.to_string());
            if field.type_.is_none() {
                field.type_ = infer_type_from_initializer(initializer);
            }
        }

        // @property decorator promotes the field to an attribute binding.
        if group.text("member.decorator.name") == Some("property") {
            let options = group.text("member.decorator.arguments").unwrap_or("");
            let decorator = parse_property_options(options);
            if decorator.attribute_enabled {
                field.attribute = Some(
                    decorator
                        .attribute
                        .unwrap_or_else(|| field.name.to_lowercase()),
                );
            }
            field.reflects = decorator.reflects;
            if field.type_.is_none() {
                field.type_ = decorator.type_;
            }
        }

        // A single imported identifier as the type resolves externally.
        if let Some(type_) = &field.type_ {
            if let Some(binding) = imports.get(type_.text.as_str()) {
                if let Some(resolved) = self
                    .type_resolver
                    .resolve(&binding.specifier, &binding.original)
                {
                    debug!(
                        field = %field.name,
                        package = %resolved.package,
                        "inlined external type"
                    );
                    field.type_ = Some(Type::new(resolved.definition));
                }
            }
        }

        self.apply_field_jsdoc(&mut field, root, source, group, out);
        field
    }

    fn apply_field_jsdoc(
        &self,
        field: &mut ClassField,
        root: Node<'_>,
        source: &str,
        group: &CaptureGroup,
        out: &mut ProcessedModule,
    ) {
        let Some(comment) = leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
        else {
            return;
        };
        match self.jsdoc.parse_for_property(&comment) {
            Ok(doc) => {
                merge_description(&mut field.description, &doc.description);
                merge_description(&mut field.summary, &doc.summary);
                if doc.deprecated.is_some() {
                    field.deprecated = doc.deprecated;
                }
                // Documentation types fill in only when syntax gave none.
                if field.type_.is_none() {
                    field.type_ = doc.type_;
                }
            }
            Err(e) => out.errors.push(e),
        }
    }

    fn build_method(
        &self,
        group: &CaptureGroup,
        root: Node<'_>,
        source: &str,
        out: &mut ProcessedModule,
    ) -> ClassMethod {
        let mut method = ClassMethod {
            name: group.text("member.name").unwrap_or("").to_string(),
            privacy: parse_privacy(group.text("member.privacy")),
            static_: group.has("member.static"),
            start_byte: group.parent.start_byte,
            ..Default::default()
        };

        if let Some(params) = group.text("member.parameters") {
            method.parameters = parse_parameters(params);
        }
        if let Some(ret) = group.text("member.return") {
            method.return_type = Some(crate::manifest::ReturnType {
                type_: Some(Type::new(ret)),
                description: String::new(),
            });
        }

        if let Some(comment) = leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
        {
            match self.jsdoc.parse_for_method(&comment) {
                Ok(doc) => {
                    merge_description(&mut method.description, &doc.description);
                    merge_description(&mut method.summary, &doc.summary);
                    if doc.deprecated.is_some() {
                        method.deprecated = doc.deprecated;
                    }
                    if let Some(privacy) = doc.privacy {
                        method.privacy = privacy;
                    }
                    for doc_param in doc.parameters {
                        match method
                            .parameters
                            .iter_mut()
                            .find(|p| p.name == doc_param.name)
                        {
                            Some(param) => {
                                merge_description(&mut param.description, &doc_param.description);
                                if param.type_.is_none() {
                                    param.type_ = doc_param.type_;
                                }
                                if param.default.is_none() {
                                    param.default = doc_param.default;
                                }
                                param.optional |= doc_param.optional;
                            }
                            None => method.parameters.push(doc_param),
                        }
                    }
                    match (&mut method.return_type, doc.return_type) {
                        (Some(existing), Some(doc_ret)) => {
                            merge_description(&mut existing.description, &doc_ret.description);
                            if existing.type_.is_none() {
                                existing.type_ = doc_ret.type_;
                            }
                        }
                        (slot @ None, Some(doc_ret)) => *slot = Some(doc_ret),
                        _ => {}
                    }
                }
                Err(e) => out.errors.push(e),
            }
        }

        method
    }

    /// Fold a getter or setter into the accessor's single field entry.
    fn fold_accessor(
        &self,
        fields: &mut Vec<ClassField>,
        group: &CaptureGroup,
        root: Node<'_>,
        source: &str,
        is_getter: bool,
        out: &mut ProcessedModule,
    ) {
        let name = group.text("member.name").unwrap_or("").to_string();
        let is_static = group.has("member.static");

        let type_ = if is_getter {
            group.text("member.return").map(Type::new)
        } else {
            group
                .text("member.parameters")
                .and_then(setter_parameter_type)
                .map(Type::new)
        };

        let mut doc_description = String::new();
        let mut doc_deprecated = None;
        if let Some(comment) = leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
        {
            match self.jsdoc.parse_for_property(&comment) {
                Ok(doc) => {
                    doc_description = doc.description;
                    doc_deprecated = doc.deprecated;
                }
                Err(e) => out.errors.push(e),
            }
        }

        match fields
            .iter_mut()
            .find(|f| f.name == name && f.static_ == is_static)
        {
            Some(existing) => {
                // Both sides of the pair exist: a writable field.
                existing.readonly = false;
                existing.start_byte = existing.start_byte.min(group.parent.start_byte);
                if existing.type_.is_none() {
                    existing.type_ = type_;
                }
                if existing.description.is_empty() {
                    existing.description = doc_description;
                }
                if existing.deprecated.is_none() {
                    existing.deprecated = doc_deprecated;
                }
            }
            None => fields.push(ClassField {
                name,
                static_: is_static,
                privacy: parse_privacy(group.text("member.privacy")),
                readonly: is_getter,
                type_,
                description: doc_description,
                deprecated: doc_deprecated,
                start_byte: group.parent.start_byte,
                ..Default::default()
            }),
        }
    }

    /// Stub attributes from a static `observedAttributes` array literal.
    fn stub_observed_attributes(&self, class: &mut ClassDeclaration, group: &CaptureGroup) {
        let Some(initializer) = group.text("member.initializer") else {
            return;
        };
        for name in string_literals(initializer) {
            class.attributes.push(Attribute {
                name,
                start_byte: group.parent.start_byte,
                ..Default::default()
            });
        }
    }

    fn process_render_template(
        &self,
        class: &mut ClassDeclaration,
        class_node: Node<'_>,
        source: &str,
        out: &mut ProcessedModule,
    ) {
        let mut matcher = match self
            .queries
            .acquire_matcher(Grammar::TypeScript, "renderTemplate")
        {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return;
            }
        };
        for group in capture_groups(&mut matcher, class_node, source.as_bytes(), "render") {
            if group.text("render.tag") != Some("html") {
                continue;
            }
            let Some(template) = group.first("render.template") else {
                continue;
            };
            // First content character is one past the opening backtick.
            match self.html.analyze(&template.text, template.start_byte + 1) {
                Ok(extraction) => {
                    let mut slots = extraction.slots;
                    let mut parts = extraction.css_parts;
                    dedup_named(&mut slots, |s| s.start_byte);
                    dedup_named(&mut parts, |p| p.start_byte);
                    merge_named(&mut class.slots, slots);
                    merge_named(&mut class.css_parts, parts);
                }
                Err(e) => out.errors.push(e),
            }
        }
    }

    fn process_styles(
        &self,
        class: &mut ClassDeclaration,
        class_node: Node<'_>,
        source: &str,
        module_path: &str,
        imports: &HashMap<String, ImportBinding>,
        out: &mut ProcessedModule,
    ) {
        let mut matcher = match self.queries.acquire_matcher(Grammar::TypeScript, "styles") {
            Ok(m) => m,
            Err(e) => {
                out.errors.push(e);
                return;
            }
        };
        let groups = capture_groups(&mut matcher, class_node, source.as_bytes(), "styles");

        for group in groups {
            let Some(value) = group.first("styles.value") else {
                continue;
            };
            let Some(node) = node_at(class_node, value.start_byte, value.end_byte) else {
                continue;
            };
            for style in collect_style_sources(node, source.as_bytes()) {
                match style {
                    StyleSource::Inline { text, offset } => {
                        match self.css.extract(&text, offset) {
                            Ok(map) => merge_css_properties(class, map),
                            Err(e) => out.errors.push(e),
                        }
                    }
                    StyleSource::Binding(binding) => {
                        let Some(import) = imports.get(&binding) else {
                            continue;
                        };
                        let Some(resolved) = self
                            .workspace
                            .resolve_dependency(module_path, &import.specifier)
                        else {
                            continue;
                        };
                        if !resolved.ends_with(".css") {
                            continue;
                        }
                        let fs_path = self.workspace.module_to_fs(&resolved);
                        let map = match self.css_cache.get(&fs_path) {
                            Some(map) => Some(map),
                            None => match self.workspace.read_file(&fs_path) {
                                Ok(text) => match self.css.extract(&text, 0) {
                                    Ok(map) => {
                                        self.css_cache.set(&fs_path, map.clone());
                                        Some(map)
                                    }
                                    Err(e) => {
                                        out.errors.push(e);
                                        None
                                    }
                                },
                                Err(e) => {
                                    out.errors.push(e);
                                    None
                                }
                            },
                        };
                        if let Some(map) = map {
                            merge_css_properties(class, map);
                        }
                        if !out.style_imports.contains(&resolved) {
                            out.style_imports.push(resolved);
                        }
                    }
                }
            }
        }
    }

    fn apply_class_jsdoc(
        &self,
        class: &mut ClassDeclaration,
        doc: crate::jsdoc::ClassJsdoc,
        out: &mut ProcessedModule,
    ) {
        merge_description(&mut class.description, &doc.description);
        merge_description(&mut class.summary, &doc.summary);
        if doc.deprecated.is_some() {
            class.deprecated = doc.deprecated;
        }
        if let Some(tag) = doc.tag_name {
            class.custom_element = true;
            if class.tag_name.is_none() {
                out.tag_aliases.insert(tag.clone(), class.name.clone());
                class.tag_name = Some(tag);
            } else if class.tag_name.as_deref() != Some(tag.as_str()) {
                debug!(
                    class = %class.name,
                    decorator = ?class.tag_name,
                    documented = %tag,
                    "tag name disagreement, decorator wins"
                );
            }
        }
        if let Some(alias) = doc.alias {
            class.name = alias;
        }
        if !doc.attributes.is_empty()
            || !doc.slots.is_empty()
            || !doc.css_parts.is_empty()
            || !doc.css_properties.is_empty()
            || !doc.css_states.is_empty()
            || !doc.events.is_empty()
        {
            class.custom_element = true;
        }
        merge_named(&mut class.attributes, doc.attributes);
        merge_named(&mut class.slots, doc.slots);
        merge_named(&mut class.css_parts, doc.css_parts);
        merge_named(&mut class.css_properties, doc.css_properties);
        merge_named(&mut class.css_states, doc.css_states);
        merge_named(&mut class.events, doc.events);
        class.demos.extend(doc.demos);
        for (name, type_) in doc.typedefs {
            out.type_aliases.insert(name, type_);
        }
    }

    // ------------------------------------------------------------------
    // Declarations and exports
    // ------------------------------------------------------------------

    fn process_declarations(
        &self,
        root: Node<'_>,
        source: &str,
        imports: &HashMap<String, ImportBinding>,
        mixin_names: &[String],
        out: &mut ProcessedModule,
    ) {
        let class_names: Vec<String> = out
            .module
            .declarations
            .iter()
            .map(|d| d.name().to_string())
            .collect();

        // Variables.
        if let Ok(mut matcher) = self
            .queries
            .acquire_matcher(Grammar::TypeScript, "declarations")
            .map_err(|e| out.errors.push(e))
        {
            for group in capture_groups(&mut matcher, root, source.as_bytes(), "declaration") {
                let Some(name) = group.text("declaration.name") else {
                    continue;
                };
                if class_names.iter().any(|c| c == name) {
                    continue;
                }
                let mut variable = VariableDeclaration {
                    name: name.to_string(),
                    start_byte: group.parent.start_byte,
                    ..Default::default()
                };
                if let Some(value) = group.text("declaration.value") {
                    variable.default = Some(value.to_string());
                    variable.type_ = infer_type_from_initializer(value);
                }
                if let Some(comment) =
                    leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
                {
                    if let Ok(doc) = self.jsdoc.parse_for_property(&comment) {
                        variable.description = doc.description;
                        variable.summary = doc.summary;
                        variable.deprecated = doc.deprecated;
                        if variable.type_.is_none() {
                            variable.type_ = doc.type_;
                        }
                    }
                }
                let exported = is_exported(root, group.parent.start_byte, group.parent.end_byte);
                out.module
                    .declarations
                    .push(Declaration::Variable(variable));
                if exported {
                    out.module.exports.push(Export::Js {
                        name: name.to_string(),
                        declaration: Reference::local(name),
                    });
                }
            }
        }

        // Functions.
        if let Ok(mut matcher) = self
            .queries
            .acquire_matcher(Grammar::TypeScript, "declarations")
            .map_err(|e| out.errors.push(e))
        {
            for group in capture_groups(&mut matcher, root, source.as_bytes(), "function") {
                let Some(name) = group.text("function.name") else {
                    continue;
                };
                if mixin_names.iter().any(|m| m == name) {
                    continue;
                }
                let mut function = FunctionDeclaration {
                    name: name.to_string(),
                    start_byte: group.parent.start_byte,
                    ..Default::default()
                };
                if let Some(comment) =
                    leading_comment(root, source.as_bytes(), group.parent.start_byte, group.parent.end_byte)
                {
                    if let Ok(doc) = self.jsdoc.parse_for_method(&comment) {
                        function.description = doc.description;
                        function.summary = doc.summary;
                        function.deprecated = doc.deprecated;
                        function.parameters = doc.parameters;
                        function.return_type = doc.return_type;
                    }
                }
                let exported = is_exported(root, group.parent.start_byte, group.parent.end_byte);
                out.module
                    .declarations
                    .push(Declaration::Function(function));
                if exported {
                    out.module.exports.push(Export::Js {
                        name: name.to_string(),
                        declaration: Reference::local(name),
                    });
                }
            }
        }

        // Classes and mixins that sit under an export statement.
        for declaration in &out.module.declarations {
            match declaration {
                Declaration::Class(c)
                    if is_exported(root, c.start_byte, c.start_byte + 1) =>
                {
                    out.module.exports.push(Export::Js {
                        name: c.name.clone(),
                        declaration: Reference::local(&c.name),
                    });
                }
                Declaration::Mixin(m)
                    if is_exported(root, m.start_byte, m.start_byte + 1) =>
                {
                    out.module.exports.push(Export::Js {
                        name: m.name.clone(),
                        declaration: Reference::local(&m.name),
                    });
                }
                _ => {}
            }
        }

        // Export clauses.
        if let Ok(mut matcher) = self
            .queries
            .acquire_matcher(Grammar::TypeScript, "declarations")
            .map_err(|e| out.errors.push(e))
        {
            for group in capture_groups(&mut matcher, root, source.as_bytes(), "export") {
                let Some(name) = group.text("export.name") else {
                    continue;
                };
                let exported_as = group.text("export.alias").unwrap_or(name);
                out.module.exports.push(Export::Js {
                    name: exported_as.to_string(),
                    declaration: Reference::local(name),
                });
            }
        }

        // customElements.define registrations.
        if let Ok(mut matcher) = self
            .queries
            .acquire_matcher(Grammar::TypeScript, "declarations")
            .map_err(|e| out.errors.push(e))
        {
            for group in capture_groups(&mut matcher, root, source.as_bytes(), "customElement") {
                let Some(tag) = group.text("customElement.tagName") else {
                    continue;
                };
                let Some(class_name) = group.text("customElement.className") else {
                    continue;
                };
                out.tag_aliases
                    .insert(tag.to_string(), class_name.to_string());

                let mut declared_locally = false;
                for declaration in &mut out.module.declarations {
                    if let Declaration::Class(class) = declaration {
                        if class.name == class_name {
                            class.custom_element = true;
                            if class.tag_name.is_none() {
                                class.tag_name = Some(tag.to_string());
                            }
                            declared_locally = true;
                        }
                    }
                }

                let declaration = if declared_locally {
                    Reference::local(class_name)
                } else if let Some(binding) = imports.get(class_name) {
                    Reference {
                        name: binding.original.clone(),
                        package: None,
                        module: Some(binding.specifier.clone()),
                    }
                } else {
                    Reference::local(class_name)
                };
                out.module.exports.push(Export::CustomElementDefinition {
                    name: tag.to_string(),
                    declaration,
                });
            }
        }
    }
}

// ============================================================================
// Node helpers
// ============================================================================

/// Smallest node spanning exactly the byte range.
fn node_at<'t>(root: Node<'t>, start: usize, end: usize) -> Option<Node<'t>> {
    root.descendant_for_byte_range(start, end)
}

/// The `/** … */` comment immediately preceding a node, looking through
/// enclosing declaration and export statements.
fn leading_comment(root: Node<'_>, source: &[u8], start: usize, end: usize) -> Option<String> {
    let node = root.descendant_for_byte_range(start, end)?;
    let mut target = node;
    while let Some(parent) = target.parent() {
        match parent.kind() {
            "lexical_declaration" | "variable_declaration" | "export_statement" => {
                target = parent;
            }
            _ => break,
        }
    }
    let sibling = target.prev_sibling()?;
    if sibling.kind() != "comment" {
        return None;
    }
    let text = sibling.utf8_text(source).ok()?;
    text.starts_with("/**").then(|| text.to_string())
}

/// Heritage expression: descend call chains. `A(B(Base))` yields
/// `(Base, [B, A])`, mixins in inner-to-outer order.
fn unwrap_heritage(node: Node<'_>, source: &[u8]) -> (String, Vec<String>) {
    match node.kind() {
        "call_expression" => {
            let mixin = node
                .child_by_field_name("function")
                .and_then(|f| f.utf8_text(source).ok())
                .unwrap_or("")
                .to_string();
            let inner = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0));
            match inner {
                Some(inner) => {
                    let (base, mut mixins) = unwrap_heritage(inner, source);
                    mixins.push(mixin);
                    (base, mixins)
                }
                None => (mixin, Vec::new()),
            }
        }
        _ => (
            node.utf8_text(source).unwrap_or("").to_string(),
            Vec::new(),
        ),
    }
}

/// Build a reference for a superclass or mixin name: well-known
/// packages first, then the import map.
fn reference_for(
    name: &str,
    module_path: &str,
    imports: &HashMap<String, ImportBinding>,
    workspace: &dyn WorkspaceContext,
) -> Reference {
    if let Some((_, package)) = WELL_KNOWN_SUPERCLASSES.iter().find(|(n, _)| n == &name) {
        return Reference::in_package(name, *package);
    }
    match imports.get(name) {
        Some(binding) => {
            let module = workspace
                .resolve_dependency(module_path, &binding.specifier)
                .unwrap_or_else(|| binding.specifier.clone());
            if binding.specifier.starts_with('.') {
                Reference {
                    name: binding.original.clone(),
                    package: None,
                    module: Some(module),
                }
            } else {
                Reference::in_package(binding.original.clone(), binding.specifier.clone())
            }
        }
        None => Reference::local(name),
    }
}

/// True when the node spanning the range sits under an export statement.
fn is_exported(root: Node<'_>, start: usize, end: usize) -> bool {
    let Some(node) = root.descendant_for_byte_range(start, end.min(start + 1)) else {
        return false;
    };
    let mut current = node;
    while let Some(parent) = current.parent() {
        if parent.kind() == "export_statement" {
            return true;
        }
        current = parent;
    }
    false
}

// ============================================================================
// Styles walking
// ============================================================================

enum StyleSource {
    Inline { text: String, offset: usize },
    Binding(String),
}

/// Walk a `static styles` value: css-tagged templates inline, arrays
/// recurse, identifiers resolve through the style-import map.
fn collect_style_sources(node: Node<'_>, source: &[u8]) -> Vec<StyleSource> {
    let mut sources = Vec::new();
    collect_style_sources_into(node, source, &mut sources);
    sources
}

fn collect_style_sources_into(node: Node<'_>, source: &[u8], out: &mut Vec<StyleSource>) {
    match node.kind() {
        "call_expression" => {
            let tag = node
                .child_by_field_name("function")
                .and_then(|f| f.utf8_text(source).ok());
            if tag == Some("css") {
                if let Some(template) = node.child_by_field_name("arguments") {
                    if template.kind() == "template_string" {
                        out.push(StyleSource::Inline {
                            text: template.utf8_text(source).unwrap_or("").to_string(),
                            offset: template.start_byte() + 1,
                        });
                    }
                }
            }
        }
        "template_string" => out.push(StyleSource::Inline {
            text: node.utf8_text(source).unwrap_or("").to_string(),
            offset: node.start_byte() + 1,
        }),
        "array" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_style_sources_into(child, source, out);
            }
        }
        "identifier" => out.push(StyleSource::Binding(
            node.utf8_text(source).unwrap_or("").to_string(),
        )),
        _ => {}
    }
}

fn merge_css_properties(class: &mut ClassDeclaration, map: CssPropertyMap) {
    merge_named(&mut class.css_properties, map.into_values().collect());
}

// ============================================================================
// Text helpers
// ============================================================================

fn parse_privacy(text: Option<&str>) -> Privacy {
    match text {
        Some("private") => Privacy::Private,
        Some("protected") => Privacy::Protected,
        _ => Privacy::Public,
    }
}

/// Options of a `@property({ … })` decorator.
struct PropertyOptions {
    attribute: Option<String>,
    attribute_enabled: bool,
    reflects: bool,
    type_: Option<Type>,
}

fn parse_property_options(arguments: &str) -> PropertyOptions {
    let attribute_disabled = regex_find(arguments, r"attribute\s*:\s*false").is_some();
    let attribute = regex_find(arguments, r#"attribute\s*:\s*['"]([^'"]+)['"]"#);
    let reflects = regex_find(arguments, r"reflect\s*:\s*true").is_some();
    let type_ = regex_find(arguments, r"type\s*:\s*([A-Za-z_$][\w$]*)")
        .as_deref()
        .and_then(map_constructor_type);
    PropertyOptions {
        attribute,
        attribute_enabled: !attribute_disabled,
        reflects,
        type_,
    }
}

/// `Boolean` → `boolean` and friends.
fn map_constructor_type(name: &str) -> Option<Type> {
    match name {
        "Boolean" => Some(Type::new("boolean")),
        "String" => Some(Type::new("string")),
        "Number" => Some(Type::new("number")),
        "Array" => Some(Type::new("array")),
        "Object" => Some(Type::new("object")),
        _ => None,
    }
}

fn infer_type_from_initializer(initializer: &str) -> Option<Type> {
    let trimmed = initializer.trim();
    if trimmed == "true" || trimmed == "false" {
        return Some(Type::new("boolean"));
    }
    if trimmed.parse::<f64>().is_ok() {
        return Some(Type::new("number"));
    }
    if (trimmed.starts_with('\'') && trimmed.ends_with('\''))
        || (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || trimmed.starts_with('`')
    {
        return Some(Type::new("string"));
    }
    None
}

/// `(a: string, b?: number = 3)` → parameters with names, types,
/// optionality and defaults.
fn parse_parameters(params: &str) -> Vec<Parameter> {
    let inner = params
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(params);
    split_top_level_commas(inner)
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            let (before_default, default) = match raw.split_once('=') {
                Some((head, tail)) => (head.trim(), Some(tail.trim().to_string())),
                None => (raw, None),
            };
            let (name_part, type_) = match before_default.split_once(':') {
                Some((name, ty)) => (name.trim(), Some(Type::new(ty.trim()))),
                None => (before_default, None),
            };
            let optional = name_part.ends_with('?') || default.is_some();
            let name = name_part.trim_end_matches('?').trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(Parameter {
                name,
                type_,
                optional,
                default,
                description: String::new(),
            })
        })
        .collect()
}

/// The declared type of a setter's single parameter.
fn setter_parameter_type(params: &str) -> Option<String> {
    let inner = params
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))?;
    let (_, type_) = inner.split_once(':')?;
    let type_ = type_.trim();
    (!type_.is_empty()).then(|| type_.to_string())
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '<' | '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn first_string_literal(text: &str) -> Option<String> {
    string_literals(text).into_iter().next()
}

fn string_literals(text: &str) -> Vec<String> {
    let mut literals = Vec::new();
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\'' || c == '"' {
            if let Some(end) = text[i + 1..].find(c) {
                literals.push(text[i + 1..i + 1 + end].to_string());
                // Skip past the literal.
                for _ in 0..end + 1 {
                    chars.next();
                }
            }
        }
    }
    literals
}

fn regex_find(haystack: &str, pattern: &str) -> Option<String> {
    let re = regex::Regex::new(pattern).ok()?;
    let caps = re.captures(haystack)?;
    Some(
        caps.get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default()),
    )
}
