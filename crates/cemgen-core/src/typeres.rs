//! External type resolution.
//!
//! Given `(importSpecifier, typeName)`, locates the package under the
//! project's package store, finds its type entry point through the
//! package manifest (`exports` with the `types` condition, then
//! `typings`/`types`/`main`), scans top-level type aliases, and resolves
//! alias chains: unions distribute, finite template-literal types expand
//! cartesianly, `string`/`number` holes collapse the template to
//! `string`, `null`/`undefined` branches drop, and primitives are never
//! resolved. Cycles yield the identifier unchanged with a warning.
//!
//! Results are cached by `(package, typeName)`; cache hits are served
//! even if source files later change.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::capture::capture_groups;
use crate::error::AnalyzerError;
use crate::grammar::Grammar;
use crate::jsdoc::JsdocAnalyzer;
use crate::parser::ParserPool;
use crate::queries::QueryManager;

/// Types that are never resolved further.
const PRIMITIVES: &[&str] = &[
    "string", "number", "boolean", "any", "void", "null", "undefined", "never", "unknown",
    "object", "symbol", "bigint",
];

/// A successfully resolved external type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    /// The inlined definition, e.g. `'sm' | 'md' | 'lg'`.
    pub definition: String,
    /// The package the definition came from.
    pub package: String,
}

/// Resolves named type aliases across package boundaries.
pub struct TypeResolver {
    queries: Arc<QueryManager>,
    parsers: Arc<ParserPool>,
    /// Project root containing the package store (`node_modules`).
    root: PathBuf,
    cache: DashMap<(String, String), Option<ResolvedType>>,
}

impl TypeResolver {
    pub fn new(
        queries: Arc<QueryManager>,
        parsers: Arc<ParserPool>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            queries,
            parsers,
            root: root.into(),
            cache: DashMap::new(),
        }
    }

    /// Resolve a named type imported from a package specifier.
    ///
    /// Relative specifiers are rejected: they are project-local and the
    /// module processor handles them through the import map.
    pub fn resolve(&self, specifier: &str, type_name: &str) -> Option<ResolvedType> {
        if specifier.starts_with('.') {
            return None;
        }

        let (package, subpath) = split_specifier(specifier)?;
        let key = (package.clone(), type_name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let result = self.resolve_uncached(&package, &subpath, type_name);
        self.cache.insert(key, result.clone());
        result
    }

    fn resolve_uncached(
        &self,
        package: &str,
        subpath: &str,
        type_name: &str,
    ) -> Option<ResolvedType> {
        let package_dir = self.root.join("node_modules").join(package);
        let manifest_path = package_dir.join("package.json");
        let manifest_text = std::fs::read_to_string(&manifest_path).ok()?;
        let manifest: Value = serde_json::from_str(&manifest_text).ok()?;

        let target = resolve_entry(&manifest, subpath)?;
        let file = locate_type_file(&package_dir, &target)?;

        let aliases = match self.scan_aliases(&file) {
            Ok(aliases) => aliases,
            Err(e) => {
                debug!(package, file = %file.display(), error = %e, "alias scan failed");
                return None;
            }
        };

        if !aliases.contains_key(type_name) {
            return None;
        }

        let mut visited = HashSet::new();
        let definition = self.expand_name(type_name, &aliases, &mut visited);
        Some(ResolvedType {
            definition,
            package: package.to_string(),
        })
    }

    /// Scan top-level type aliases from a located file.
    fn scan_aliases(&self, file: &Path) -> Result<HashMap<String, String>, AnalyzerError> {
        let text = std::fs::read_to_string(file).map_err(|e| AnalyzerError::source_read(file, e))?;

        let is_plain_js = file
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == "js" || ext == "mjs" || ext == "cjs");

        if is_plain_js {
            return Ok(self.scan_typedefs(&text));
        }

        let mut parser = self.parsers.acquire(Grammar::TypeScript)?;
        let tree = parser.parse(&text, file)?;
        let mut matcher = self
            .queries
            .acquire_matcher(Grammar::TypeScript, "typeAliases")?;

        let mut aliases = HashMap::new();
        for group in capture_groups(&mut matcher, tree.root_node(), text.as_bytes(), "alias") {
            if let (Some(name), Some(value)) = (group.text("alias.name"), group.text("alias.value"))
            {
                aliases.insert(name.to_string(), value.to_string());
            }
        }
        Ok(aliases)
    }

    /// `@typedef {T} Name` declarations in a plain JavaScript file.
    fn scan_typedefs(&self, text: &str) -> HashMap<String, String> {
        let jsdoc = JsdocAnalyzer::new(&self.queries, &self.parsers);
        let mut aliases = HashMap::new();
        let mut rest = text;
        while let Some(start) = rest.find("/**") {
            let Some(end) = rest[start..].find("*/") else {
                break;
            };
            let block = &rest[start..start + end + 2];
            if let Ok(doc) = jsdoc.parse_for_class(block) {
                for (name, type_) in doc.typedefs {
                    aliases.insert(name, type_);
                }
            }
            rest = &rest[start + end + 2..];
        }
        aliases
    }

    /// Resolve an alias name to its inlined definition.
    fn expand_name(
        &self,
        name: &str,
        aliases: &HashMap<String, String>,
        visited: &mut HashSet<String>,
    ) -> String {
        if PRIMITIVES.contains(&name) {
            return name.to_string();
        }
        if !visited.insert(name.to_string()) {
            warn!(type_name = name, "type alias cycle detected");
            return name.to_string();
        }
        let result = match aliases.get(name) {
            Some(definition) => {
                let branches = self.expand_type(definition, aliases, visited);
                branches.join(" | ")
            }
            None => name.to_string(),
        };
        visited.remove(name);
        result
    }

    /// Expand a type expression into its union branches.
    fn expand_type(
        &self,
        text: &str,
        aliases: &HashMap<String, String>,
        visited: &mut HashSet<String>,
    ) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for branch in split_top_level_union(text) {
            let branch = branch.trim();
            if branch.is_empty() || branch == "undefined" || branch == "null" {
                continue;
            }
            if branch.starts_with('`') {
                for expanded in self.expand_template(branch, aliases, visited) {
                    push_unique(&mut out, expanded);
                }
            } else if is_identifier(branch) {
                let resolved = self.expand_name(branch, aliases, visited);
                for sub in split_top_level_union(&resolved) {
                    push_unique(&mut out, sub.trim().to_string());
                }
            } else {
                push_unique(&mut out, branch.to_string());
            }
        }
        out
    }

    /// Expand a template-literal type.
    ///
    /// Returns the cartesian product of hole expansions when every hole
    /// reduces to a finite string-literal union; collapses to `string`
    /// when any hole is `string` or `number`; otherwise returns the
    /// template unchanged.
    fn expand_template(
        &self,
        template: &str,
        aliases: &HashMap<String, String>,
        visited: &mut HashSet<String>,
    ) -> Vec<String> {
        let Some(segments) = parse_template_segments(template) else {
            return vec![template.to_string()];
        };

        // Each combination starts as the empty string.
        let mut combinations: Vec<String> = vec![String::new()];
        for segment in segments {
            match segment {
                TemplateSegment::Literal(lit) => {
                    for c in &mut combinations {
                        c.push_str(&lit);
                    }
                }
                TemplateSegment::Hole(expr) => {
                    let branches = self.expand_type(&expr, aliases, visited);
                    if branches
                        .iter()
                        .any(|b| b == "string" || b == "number")
                    {
                        return vec!["string".to_string()];
                    }
                    let mut values: Vec<String> = Vec::new();
                    for branch in &branches {
                        match literal_value(branch) {
                            Some(value) => values.push(value),
                            None => return vec![template.to_string()],
                        }
                    }
                    if values.is_empty() {
                        return vec![template.to_string()];
                    }
                    let mut next = Vec::with_capacity(combinations.len() * values.len());
                    for c in &combinations {
                        for v in &values {
                            next.push(format!("{}{}", c, v));
                        }
                    }
                    combinations = next;
                }
            }
        }

        combinations
            .into_iter()
            .map(|c| format!("'{}'", c))
            .collect()
    }
}

/// Split a specifier into (package, subpath).
fn split_specifier(specifier: &str) -> Option<(String, String)> {
    let mut parts = specifier.splitn(3, '/');
    if specifier.starts_with('@') {
        let scope = parts.next()?;
        let name = parts.next()?;
        let subpath = parts.next().unwrap_or("");
        Some((format!("{}/{}", scope, name), subpath.to_string()))
    } else {
        let name = parts.next()?;
        let subpath = specifier
            .strip_prefix(name)
            .map(|s| s.trim_start_matches('/'))
            .unwrap_or("");
        Some((name.to_string(), subpath.to_string()))
    }
}

/// Resolve the type entry for a subpath via the package manifest.
///
/// Priority: `exports` map (with the `types` condition), `typings`,
/// `types`, `main`. Wildcard subpath patterns (`./lib/*`) substitute the
/// matched segment into the target.
fn resolve_entry(manifest: &Value, subpath: &str) -> Option<String> {
    if let Some(exports) = manifest.get("exports") {
        if let Some(target) = resolve_exports(exports, subpath) {
            return Some(target);
        }
    }
    if !subpath.is_empty() {
        // No exports entry for the subpath: try it as a file path.
        return Some(format!("./{}", subpath));
    }
    for field in ["typings", "types", "main"] {
        if let Some(value) = manifest.get(field).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    None
}

fn resolve_exports(exports: &Value, subpath: &str) -> Option<String> {
    match exports {
        Value::String(target) => subpath.is_empty().then(|| target.clone()),
        Value::Object(map) => {
            let is_subpath_map = map.keys().any(|k| k.starts_with('.'));
            if !is_subpath_map {
                // Bare condition map applies to the root subpath.
                return subpath.is_empty().then(|| resolve_conditions(exports)).flatten();
            }

            let key = if subpath.is_empty() {
                ".".to_string()
            } else {
                format!("./{}", subpath)
            };

            if let Some(entry) = map.get(&key) {
                return resolve_conditions(entry);
            }

            // Wildcard patterns: "./lib/*" -> "./dist/lib/*.js"
            for (pattern, entry) in map {
                let Some(star) = pattern.find('*') else {
                    continue;
                };
                let (prefix, suffix) = (&pattern[..star], &pattern[star + 1..]);
                if key.starts_with(prefix) && key.ends_with(suffix) {
                    let matched = &key[prefix.len()..key.len() - suffix.len()];
                    if let Some(target) = resolve_conditions(entry) {
                        return Some(target.replace('*', matched));
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Pick a target from a conditional export entry, preferring `types`.
fn resolve_conditions(entry: &Value) -> Option<String> {
    match entry {
        Value::String(target) => Some(target.clone()),
        Value::Object(map) => {
            for condition in ["types", "import", "default", "require"] {
                if let Some(value) = map.get(condition) {
                    if let Some(target) = resolve_conditions(value) {
                        return Some(target);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Find the actual file for a resolved target, preferring declaration
/// files over TypeScript over JavaScript.
fn locate_type_file(package_dir: &Path, target: &str) -> Option<PathBuf> {
    let target = target.trim_start_matches("./");
    let base = package_dir.join(target);

    let mut candidates: Vec<PathBuf> = Vec::new();
    if target.ends_with(".d.ts") {
        candidates.push(base.clone());
    } else if let Some(stem) = target.strip_suffix(".js") {
        candidates.push(package_dir.join(format!("{}.d.ts", stem)));
        candidates.push(package_dir.join(format!("{}.ts", stem)));
        candidates.push(base.clone());
    } else {
        candidates.push(package_dir.join(format!("{}.d.ts", target)));
        candidates.push(package_dir.join(format!("{}.ts", target)));
        candidates.push(base.clone());
    }

    candidates.into_iter().find(|c| c.is_file())
}

/// Split on `|` at depth zero, respecting brackets, quotes and
/// template backticks.
fn split_top_level_union(text: &str) -> Vec<String> {
    let mut branches = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '<' | '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                '>' | ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                '|' if depth == 0 => {
                    branches.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    branches.push(current);
    branches
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// The raw value of a string or numeric literal branch.
fn literal_value(branch: &str) -> Option<String> {
    let trimmed = branch.trim();
    if (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
    {
        return Some(trimmed[1..trimmed.len() - 1].to_string());
    }
    // Numeric literals stringify.
    if trimmed.parse::<f64>().is_ok() {
        return Some(trimmed.to_string());
    }
    None
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

#[derive(Debug)]
enum TemplateSegment {
    Literal(String),
    Hole(String),
}

/// Parse `` `a-${B}` `` into literal and hole segments.
fn parse_template_segments(template: &str) -> Option<Vec<TemplateSegment>> {
    let inner = template.strip_prefix('`')?.strip_suffix('`')?;
    let mut segments = Vec::new();
    let mut rest = inner;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(TemplateSegment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = find_matching_brace(after)?;
        segments.push(TemplateSegment::Hole(after[..end].to_string()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(TemplateSegment::Literal(rest.to_string()));
    }
    Some(segments)
}

fn find_matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixtures() -> (Arc<QueryManager>, Arc<ParserPool>) {
        (
            Arc::new(QueryManager::new().unwrap()),
            Arc::new(ParserPool::new()),
        )
    }

    fn write_package(root: &Path, name: &str, manifest: &str, files: &[(&str, &str)]) {
        let dir = root.join("node_modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
        for (path, content) in files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_split_specifier() {
        assert_eq!(
            split_specifier("lit"),
            Some(("lit".to_string(), String::new()))
        );
        assert_eq!(
            split_specifier("@lit/reactive-element/decorators.js"),
            Some((
                "@lit/reactive-element".to_string(),
                "decorators.js".to_string()
            ))
        );
    }

    #[test]
    fn test_relative_specifiers_rejected() {
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), "/nonexistent");
        assert!(resolver.resolve("./local.js", "Size").is_none());
        assert!(resolver.resolve("../up.js", "Size").is_none());
    }

    #[test]
    fn test_resolve_union_alias() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "design-system",
            r#"{"name": "design-system", "types": "index.d.ts"}"#,
            &[(
                "index.d.ts",
                "export type Size = 'sm' | 'md' | 'lg';\nexport type Maybe = Size | undefined;",
            )],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());

        let resolved = resolver.resolve("design-system", "Size").unwrap();
        assert_eq!(resolved.definition, "'sm' | 'md' | 'lg'");
        assert_eq!(resolved.package, "design-system");

        // undefined branches drop.
        let maybe = resolver.resolve("design-system", "Maybe").unwrap();
        assert_eq!(maybe.definition, "'sm' | 'md' | 'lg'");
    }

    #[test]
    fn test_template_literal_expansion() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "tokens",
            r#"{"name": "tokens", "types": "index.d.ts"}"#,
            &[(
                "index.d.ts",
                "export type Tone = 'red' | 'blue';\nexport type Shade = `${Tone}-500`;",
            )],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let resolved = resolver.resolve("tokens", "Shade").unwrap();
        assert_eq!(resolved.definition, "'red-500' | 'blue-500'");
    }

    #[test]
    fn test_template_collapses_on_string_hole() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "tokens",
            r#"{"name": "tokens", "types": "index.d.ts"}"#,
            &[("index.d.ts", "export type Id = `id-${string}`;")],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let resolved = resolver.resolve("tokens", "Id").unwrap();
        assert_eq!(resolved.definition, "string");
    }

    #[test]
    fn test_cycle_yields_identifier() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "loopy",
            r#"{"name": "loopy", "types": "index.d.ts"}"#,
            &[("index.d.ts", "export type A = B;\nexport type B = A;")],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let resolved = resolver.resolve("loopy", "A").unwrap();
        // The chain bottoms out at the cycling identifier.
        assert_eq!(resolved.definition, "A");
    }

    #[test]
    fn test_exports_map_with_types_condition() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "exporty",
            r#"{"name": "exporty", "exports": {".": {"types": "./dist/index.d.ts", "default": "./dist/index.js"}}}"#,
            &[("dist/index.d.ts", "export type Kind = 'a' | 'b';")],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let resolved = resolver.resolve("exporty", "Kind").unwrap();
        assert_eq!(resolved.definition, "'a' | 'b'");
    }

    #[test]
    fn test_exports_wildcard_subpath() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "wild",
            r#"{"name": "wild", "exports": {"./lib/*": "./dist/lib/*.js"}}"#,
            &[("dist/lib/colors.d.ts", "export type Color = 'red' | 'green';")],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let resolved = resolver.resolve("wild/lib/colors", "Color").unwrap();
        assert_eq!(resolved.definition, "'red' | 'green'");
    }

    #[test]
    fn test_typedef_scan_in_js() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "plainjs",
            r#"{"name": "plainjs", "main": "index.js"}"#,
            &[(
                "index.js",
                "/** @typedef {'on' | 'off'} Toggle */\nexport const x = 1;\n",
            )],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let resolved = resolver.resolve("plainjs", "Toggle").unwrap();
        assert_eq!(resolved.definition, "'on' | 'off'");
    }

    #[test]
    fn test_cache_hit_survives_file_change() {
        let tmp = TempDir::new().unwrap();
        write_package(
            tmp.path(),
            "cachy",
            r#"{"name": "cachy", "types": "index.d.ts"}"#,
            &[("index.d.ts", "export type V = 'one';")],
        );
        let (queries, parsers) = fixtures();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let first = resolver.resolve("cachy", "V").unwrap();
        fs::write(
            tmp.path().join("node_modules/cachy/index.d.ts"),
            "export type V = 'two';",
        )
        .unwrap();
        let second = resolver.resolve("cachy", "V").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_split_top_level_union_respects_nesting() {
        let branches = split_top_level_union("Promise<A | B> | 'x|y' | C");
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0].trim(), "Promise<A | B>");
        assert_eq!(branches[1].trim(), "'x|y'");
        assert_eq!(branches[2].trim(), "C");
    }
}
