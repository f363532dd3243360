//! Integration tests for cemgen-core manifest generation.
//!
//! Each test builds a small project under a TempDir, runs a session
//! against it, and checks the produced manifest.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use cemgen_core::{
    CancellationToken, ClassMember, Declaration, Export, FsWorkspace, GenerateOptions, Package,
    Session,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn workspace(root: &Path) -> FsWorkspace {
    FsWorkspace::new(
        root,
        GenerateOptions::with_files(vec!["src/**/*.ts".to_string()]),
    )
}

fn generate(root: &Path) -> Package {
    let ws = workspace(root);
    let session = Session::new(root, None).unwrap();
    session
        .generate_full(&ws, &CancellationToken::new())
        .unwrap()
        .package
}

fn only_class(package: &Package, path: &str) -> cemgen_core::ClassDeclaration {
    let module = package.module(path).expect("module present");
    module
        .declarations
        .iter()
        .find_map(|d| match d {
            Declaration::Class(c) => Some(c.clone()),
            _ => None,
        })
        .expect("class declaration present")
}

// ============================================================================
// Simple Lit element
// ============================================================================

#[test]
fn simple_lit_element() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/my-el.ts",
        r#"import { LitElement, html, css } from 'lit';
/** @cssprop [--my-color=red] - Brand color */
class MyEl extends LitElement {
  static styles = css`:host { color: var(--my-color, red); }`;
  @property({ type: Boolean, reflect: true }) open = false;
  render() { return html`<slot name="icon"></slot>`; }
}
customElements.define('my-el', MyEl);
"#,
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/my-el.ts");

    assert!(class.custom_element);
    assert_eq!(class.tag_name.as_deref(), Some("my-el"));

    let superclass = class.superclass.as_ref().expect("superclass");
    assert_eq!(superclass.name, "LitElement");
    assert_eq!(superclass.package.as_deref(), Some("lit"));

    let field = class
        .members
        .iter()
        .find_map(|m| match m {
            ClassMember::Field(f) if f.name == "open" => Some(f),
            _ => None,
        })
        .expect("open field");
    assert_eq!(field.type_.as_ref().unwrap().text, "boolean");
    assert_eq!(field.attribute.as_deref(), Some("open"));
    assert!(field.reflects);
    assert_eq!(field.default.as_deref(), Some("false"));

    assert_eq!(class.slots.len(), 1);
    assert_eq!(class.slots[0].name, "icon");

    let prop = class
        .css_properties
        .iter()
        .find(|p| p.name == "--my-color")
        .expect("--my-color property");
    assert_eq!(prop.default.as_deref(), Some("red"));
    assert_eq!(prop.description, "Brand color");

    let attribute = class
        .attributes
        .iter()
        .find(|a| a.name == "open")
        .expect("derived attribute");
    assert_eq!(attribute.field_name.as_deref(), Some("open"));
}

// ============================================================================
// Mixin chains
// ============================================================================

#[test]
fn mixin_chain_superclass_and_order() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/x.ts",
        r#"import { LitElement } from 'lit';
import { A } from './a.js';
import { B } from './b.js';
class X extends A(B(LitElement)) {}
"#,
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/x.ts");

    let superclass = class.superclass.as_ref().expect("superclass");
    assert_eq!(superclass.name, "LitElement");
    assert_eq!(superclass.package.as_deref(), Some("lit"));

    let mixins: Vec<&str> = class.mixins.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(mixins, vec!["B", "A"]);
    // Imported mixins are annotated with their resolved module.
    assert_eq!(class.mixins[0].module.as_deref(), Some("src/b.js"));
    assert_eq!(class.mixins[1].module.as_deref(), Some("src/a.js"));
}

// ============================================================================
// Accessor pairs
// ============================================================================

#[test]
fn accessor_pair_collapses_to_writable_field() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/acc.ts",
        r#"class Acc {
  get foo(): string { return this._foo; }
  set foo(v: string) { this._foo = v; }
  get bar(): number { return 7; }
}
"#,
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/acc.ts");

    let foo = class
        .members
        .iter()
        .find_map(|m| match m {
            ClassMember::Field(f) if f.name == "foo" => Some(f),
            _ => None,
        })
        .expect("foo accessor field");
    assert!(!foo.readonly);
    assert_eq!(foo.type_.as_ref().unwrap().text, "string");

    let bar = class
        .members
        .iter()
        .find_map(|m| match m {
            ClassMember::Field(f) if f.name == "bar" => Some(f),
            _ => None,
        })
        .expect("bar getter field");
    assert!(bar.readonly);

    // One entry per accessor name.
    let foo_count = class.members.iter().filter(|m| m.name() == "foo").count();
    assert_eq!(foo_count, 1);
}

// ============================================================================
// HTML comment metadata
// ============================================================================

#[test]
fn yaml_comment_documents_template_slot() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/doc.ts",
        "import { LitElement, html } from 'lit';\nclass Doc extends LitElement {\n  render() { return html`<!-- slot: { description: \"Primary\" } -->\n<slot name=\"x\"></slot>`; }\n}\ncustomElements.define('doc-el', Doc);\n",
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/doc.ts");
    assert_eq!(class.slots.len(), 1);
    assert_eq!(class.slots[0].name, "x");
    assert_eq!(class.slots[0].description, "Primary");
}

// ============================================================================
// Imported styles
// ============================================================================

#[test]
fn css_import_feeds_custom_properties() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/button.css",
        "/** Accent color. */\n:host { --button-accent: blue; }\n",
    );
    write(
        tmp.path(),
        "src/button.ts",
        r#"import { LitElement } from 'lit';
import styles from './button.css';
class MyButton extends LitElement {
  static styles = [styles];
}
customElements.define('my-button', MyButton);
"#,
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/button.ts");
    let prop = class
        .css_properties
        .iter()
        .find(|p| p.name == "--button-accent")
        .expect("imported property");
    assert_eq!(prop.default.as_deref(), Some("blue"));
    assert_eq!(prop.description, "Accent color.");
}

// ============================================================================
// Incremental rebuild
// ============================================================================

#[test]
fn incremental_rebuild_touches_only_changed_module() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/a.ts", "export class A { one = 1; }");
    write(tmp.path(), "src/b.ts", "export class B { two = 2; }");

    let ws = workspace(tmp.path());
    let session = Session::new(tmp.path(), None).unwrap();
    let before = session
        .generate_full(&ws, &CancellationToken::new())
        .unwrap()
        .package;

    write(tmp.path(), "src/b.ts", "export class B { three = 3; }");
    let after = session
        .process_changed_files(&ws, &["src/b.ts".to_string()], true, &CancellationToken::new())
        .unwrap()
        .package;

    assert_eq!(before.modules.len(), after.modules.len());
    // The untouched module serializes identically.
    assert_eq!(
        serde_json::to_string(before.module("src/a.ts").unwrap()).unwrap(),
        serde_json::to_string(after.module("src/a.ts").unwrap()).unwrap()
    );
    // The changed module differs.
    assert_ne!(
        serde_json::to_string(before.module("src/b.ts").unwrap()).unwrap(),
        serde_json::to_string(after.module("src/b.ts").unwrap()).unwrap()
    );
    // Modules remain sorted by path.
    let paths: Vec<&str> = after.modules.iter().map(|m| m.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[test]
fn css_change_invalidates_dependent_module() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/card.css", ":host { --card-bg: white; }");
    write(
        tmp.path(),
        "src/card.ts",
        r#"import { LitElement } from 'lit';
import styles from './card.css';
class MyCard extends LitElement {
  static styles = styles;
}
customElements.define('my-card', MyCard);
"#,
    );

    let ws = workspace(tmp.path());
    let session = Session::new(tmp.path(), None).unwrap();
    session.generate_full(&ws, &CancellationToken::new()).unwrap();

    write(tmp.path(), "src/card.css", ":host { --card-bg: black; }");
    let outcome = session
        .process_changed_files(
            &ws,
            &["src/card.css".to_string()],
            true,
            &CancellationToken::new(),
        )
        .unwrap();

    let module = outcome.package.module("src/card.ts").unwrap();
    let Declaration::Class(class) = &module.declarations[0] else {
        panic!("expected class");
    };
    let prop = class
        .css_properties
        .iter()
        .find(|p| p.name == "--card-bg")
        .unwrap();
    assert_eq!(prop.default.as_deref(), Some("black"));
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn empty_source_file_yields_empty_module() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/empty.ts", "");

    let package = generate(tmp.path());
    let module = package.module("src/empty.ts").unwrap();
    assert!(module.declarations.is_empty());
    assert!(module.exports.is_empty());
}

#[test]
fn bare_class_has_empty_surface() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "src/bare.ts", "class Bare {}");

    let package = generate(tmp.path());
    let class = only_class(&package, "src/bare.ts");
    assert!(!class.custom_element);
    assert!(class.members.is_empty());
    assert!(class.attributes.is_empty());
    assert!(class.slots.is_empty());
    assert!(class.description.is_empty());
}

#[test]
fn part_attribute_produces_one_entry_per_token() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/parts.ts",
        "import { LitElement, html } from 'lit';\nclass Parts extends LitElement {\n  render() { return html`<div part=\"a b c\"></div>`; }\n}\ncustomElements.define('my-parts', Parts);\n",
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/parts.ts");
    let names: Vec<&str> = class.css_parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    let start = class.css_parts[0].start_byte;
    assert!(class.css_parts.iter().all(|p| p.start_byte == start));
}

// ============================================================================
// Determinism and invariants
// ============================================================================

#[test]
fn member_start_bytes_are_monotonic() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/order.ts",
        r#"class Ordered {
  alpha = 1;
  beta = 2;
  gamma(): void {}
  delta = 4;
}
"#,
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/order.ts");
    let bytes: Vec<usize> = class.members.iter().map(|m| m.start_byte()).collect();
    let mut sorted = bytes.clone();
    sorted.sort();
    assert_eq!(bytes, sorted);
    assert_eq!(class.members.len(), 4);
}

#[test]
fn repeated_generation_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/one.ts",
        "import { LitElement, html } from 'lit';\n/** One. */\nclass One extends LitElement {\n  render() { return html`<slot></slot>`; }\n}\ncustomElements.define('one-el', One);\n",
    );
    write(tmp.path(), "src/two.ts", "export class Two {}");

    let ws = workspace(tmp.path());
    let session = Session::new(tmp.path(), None).unwrap();

    session.generate_full(&ws, &CancellationToken::new()).unwrap();
    let first = session.serialize_manifest().unwrap();
    session.generate_full(&ws, &CancellationToken::new()).unwrap();
    let second = session.serialize_manifest().unwrap();
    assert_eq!(first, second);
}

#[test]
fn custom_element_names_are_unique() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/dup.ts",
        r#"import { LitElement, html, css } from 'lit';
/**
 * @slot icon - Documented icon slot
 * @cssprop --x - Documented
 */
class Dup extends LitElement {
  static styles = css`:host { color: var(--x, red); }`;
  render() { return html`<slot name="icon"></slot>`; }
}
customElements.define('dup-el', Dup);
"#,
    );

    let package = generate(tmp.path());
    let class = only_class(&package, "src/dup.ts");

    // Slot documented both in the template and the jsdoc: one entry.
    let slot_names: Vec<&str> = class.slots.iter().map(|s| s.name.as_str()).collect();
    let mut unique = slot_names.clone();
    unique.dedup();
    assert_eq!(slot_names, unique);
    assert_eq!(class.slots.len(), 1);
    assert_eq!(class.slots[0].description, "Documented icon slot");

    let prop_names: Vec<&str> = class
        .css_properties
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    let mut unique_props = prop_names.clone();
    unique_props.dedup();
    assert_eq!(prop_names, unique_props);
}

// ============================================================================
// Exports
// ============================================================================

#[test]
fn export_clause_and_definition_exports() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "src/exp.ts",
        r#"import { LitElement } from 'lit';
export class Exp extends LitElement {}
customElements.define('exp-el', Exp);
"#,
    );

    let package = generate(tmp.path());
    let module = package.module("src/exp.ts").unwrap();

    let has_js_export = module
        .exports
        .iter()
        .any(|e| matches!(e, Export::Js { name, .. } if name == "Exp"));
    assert!(has_js_export);

    let definition = module
        .exports
        .iter()
        .find_map(|e| match e {
            Export::CustomElementDefinition { name, declaration } => Some((name, declaration)),
            _ => None,
        })
        .expect("definition export");
    assert_eq!(definition.0, "exp-el");
    assert_eq!(definition.1.name, "Exp");
}
