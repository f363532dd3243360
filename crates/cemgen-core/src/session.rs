//! The analysis session.
//!
//! A session owns the compiled queries, parser pool, caches, dependency
//! tracker and the in-memory manifest. The manifest and its module
//! index are updated together under a single writer lock; readers take
//! the reader lock and never observe partial state. The index maps
//! module path to the module's position in the package's module slice,
//! so an incremental merge replaces a module in place without moving
//! its neighbors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::batch::BatchProcessor;
use crate::cancel::CancellationToken;
use crate::css::CssParseCache;
use crate::deps::DependencyTracker;
use crate::error::{AnalyzerError, AnalyzerErrors};
use crate::manifest::{Module, Package};
use crate::parser::ParserPool;
use crate::queries::QueryManager;
use crate::tokens::{DesignTokenLoader, DesignTokens};
use crate::typeres::TypeResolver;
use crate::workspace::WorkspaceContext;
use crate::demos::DemoMap;

/// Result of a generation: the manifest copy plus non-fatal errors.
#[derive(Debug)]
pub struct GenerateOutcome {
    pub package: Package,
    pub errors: AnalyzerErrors,
}

struct PackageState {
    package: Package,
    /// Module path to position in `package.modules`.
    index: HashMap<String, usize>,
    /// Whether a base manifest has been committed.
    has_manifest: bool,
}

/// Long-lived analysis session.
pub struct Session {
    queries: Arc<QueryManager>,
    parsers: Arc<ParserPool>,
    css_cache: Arc<CssParseCache>,
    deps: Arc<DependencyTracker>,
    type_resolver: Arc<TypeResolver>,
    token_loader: Option<Arc<dyn DesignTokenLoader>>,
    state: RwLock<PackageState>,
}

impl Session {
    /// Create a session rooted at the project directory.
    ///
    /// Fails only on query compilation; everything later is
    /// best-effort.
    pub fn new(
        root: impl Into<PathBuf>,
        token_loader: Option<Arc<dyn DesignTokenLoader>>,
    ) -> Result<Self, AnalyzerError> {
        let queries = Arc::new(QueryManager::new()?);
        let parsers = Arc::new(ParserPool::new());
        let type_resolver = Arc::new(TypeResolver::new(
            Arc::clone(&queries),
            Arc::clone(&parsers),
            root,
        ));
        Ok(Self {
            queries,
            parsers,
            css_cache: Arc::new(CssParseCache::new()),
            deps: Arc::new(DependencyTracker::new()),
            type_resolver,
            token_loader,
            state: RwLock::new(PackageState {
                package: Package::new(),
                index: HashMap::new(),
                has_manifest: false,
            }),
        })
    }

    pub fn dependency_tracker(&self) -> &DependencyTracker {
        &self.deps
    }

    pub fn css_cache(&self) -> &CssParseCache {
        &self.css_cache
    }

    /// Full generation: preprocess, batch-process every included file,
    /// postprocess, and atomically replace the in-memory manifest.
    pub fn generate_full(
        &self,
        ctx: &dyn WorkspaceContext,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome, AnalyzerError> {
        let mut errors = AnalyzerErrors::new();

        // Preprocess.
        cancel.check()?;
        let tokens = self.load_tokens(ctx, &mut errors);
        let jobs = self.expand_inputs(ctx)?;
        info!(modules = jobs.len(), "full generation");

        // Process.
        cancel.check()?;
        let batch = BatchProcessor::new(
            &self.queries,
            &self.parsers,
            &self.css_cache,
            &self.type_resolver,
            ctx,
        );
        let mut result = batch.process(&jobs, cancel);
        if result.errors.is_cancelled() {
            return Err(AnalyzerError::Cancelled);
        }
        errors.join(std::mem::take(&mut result.errors));

        self.record_dependencies(ctx, &result);

        // Postprocess.
        cancel.check()?;
        let mut modules = result.modules;
        self.postprocess(ctx, &mut modules, tokens.as_ref(), false, &mut errors);

        let mut package = Package::new();
        package.modules = modules;
        package.sort_modules();

        // Commit: manifest and index replaced together.
        {
            let mut state = self.state.write();
            state.index = build_index(&package);
            state.package = package;
            state.has_manifest = true;
        }

        Ok(GenerateOutcome {
            package: self.manifest_shallow(),
            errors,
        })
    }

    /// Incremental generation for a set of changed module paths.
    ///
    /// Falls back to a full generation when no base manifest exists or
    /// the affected set exceeds the configured threshold.
    pub fn process_changed_files(
        &self,
        ctx: &dyn WorkspaceContext,
        changed_module_paths: &[String],
        skip_demo_discovery: bool,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome, AnalyzerError> {
        // An empty change set is a no-op on the manifest.
        if changed_module_paths.is_empty() {
            return Ok(GenerateOutcome {
                package: self.manifest_shallow(),
                errors: AnalyzerErrors::new(),
            });
        }

        // Changed CSS files leave the cache before anything re-parses.
        let changed_css: Vec<PathBuf> = changed_module_paths
            .iter()
            .filter(|p| p.ends_with(".css"))
            .map(|p| ctx.module_to_fs(p))
            .collect();
        if !changed_css.is_empty() {
            self.css_cache.invalidate(&changed_css);
        }

        let mut affected = self.deps.modules_affected_by(changed_module_paths);
        for changed in changed_module_paths {
            if !changed.ends_with(".css") && !affected.contains(changed) {
                affected.push(changed.clone());
            }
        }
        affected.sort();

        let threshold = ctx.options().incremental_threshold.max(1);
        let has_manifest = self.state.read().has_manifest;
        if !has_manifest || affected.len() > threshold {
            debug!(
                affected = affected.len(),
                threshold, "falling back to full generation"
            );
            return self.generate_full(ctx, cancel);
        }

        let mut errors = AnalyzerErrors::new();
        cancel.check()?;
        let tokens = self.load_tokens(ctx, &mut errors);

        let batch = BatchProcessor::new(
            &self.queries,
            &self.parsers,
            &self.css_cache,
            &self.type_resolver,
            ctx,
        );
        let mut result = batch.process(&affected, cancel);
        if result.errors.is_cancelled() {
            return Err(AnalyzerError::Cancelled);
        }
        errors.join(std::mem::take(&mut result.errors));

        self.record_dependencies(ctx, &result);

        cancel.check()?;
        let mut modules = result.modules;
        self.postprocess(
            ctx,
            &mut modules,
            tokens.as_ref(),
            skip_demo_discovery,
            &mut errors,
        );

        // Merge: in-place replacement through the index keeps untouched
        // modules untouched; new paths append and re-sort.
        {
            let mut state = self.state.write();
            let mut needs_resort = false;
            for module in modules {
                match state.index.get(&module.path).copied() {
                    Some(slot) => state.package.modules[slot] = module,
                    None => {
                        state.package.modules.push(module);
                        needs_resort = true;
                    }
                }
            }
            if needs_resort {
                state.package.sort_modules();
                state.index = build_index(&state.package);
            }
        }

        Ok(GenerateOutcome {
            package: self.manifest_shallow(),
            errors,
        })
    }

    /// Shallow copy of the committed manifest.
    pub fn manifest_shallow(&self) -> Package {
        self.state.read().package.clone()
    }

    /// Deep copy through serialization, guaranteed isolated from
    /// concurrent writers.
    pub fn manifest_deep(&self) -> Result<Package, AnalyzerError> {
        let json = self.serialize_manifest()?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Serialize the committed manifest for output.
    pub fn serialize_manifest(&self) -> Result<String, AnalyzerError> {
        let state = self.state.read();
        Ok(serde_json::to_string_pretty(&state.package)?)
    }

    /// Number of committed modules.
    pub fn module_count(&self) -> usize {
        self.state.read().package.modules.len()
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn load_tokens(
        &self,
        ctx: &dyn WorkspaceContext,
        errors: &mut AnalyzerErrors,
    ) -> Option<DesignTokens> {
        let loader = self.token_loader.as_ref()?;
        match loader.load(ctx) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "design token loading failed");
                errors.push(e);
                None
            }
        }
    }

    fn expand_inputs(&self, ctx: &dyn WorkspaceContext) -> Result<Vec<String>, AnalyzerError> {
        let mut modules: Vec<String> = Vec::new();
        for pattern in &ctx.options().files {
            for path in ctx.glob(pattern)? {
                let module = ctx.fs_to_module(&path);
                if !modules.contains(&module) {
                    modules.push(module);
                }
            }
        }
        modules.sort();
        Ok(modules)
    }

    fn record_dependencies(&self, ctx: &dyn WorkspaceContext, result: &crate::batch::BatchResult) {
        for module in &result.modules {
            let style_imports = result
                .style_imports
                .get(&module.path)
                .cloned()
                .unwrap_or_default();
            let imported_files = result
                .imported_files
                .get(&module.path)
                .cloned()
                .unwrap_or_default();
            self.deps
                .record_dependencies(&module.path, &style_imports, &imported_files);

            let fs_path = ctx.module_to_fs(&module.path);
            if let Err(e) = self.deps.update_file_hash(&fs_path) {
                debug!(path = %fs_path.display(), error = %e, "hash update failed");
            }
            for css in &style_imports {
                let css_fs = ctx.module_to_fs(css);
                if let Err(e) = self.deps.update_file_hash(&css_fs) {
                    debug!(path = %css_fs.display(), error = %e, "hash update failed");
                }
            }
        }
    }

    fn postprocess(
        &self,
        ctx: &dyn WorkspaceContext,
        modules: &mut [Module],
        tokens: Option<&DesignTokens>,
        skip_demo_discovery: bool,
        errors: &mut AnalyzerErrors,
    ) {
        if let Some(tokens) = tokens {
            let prefix = ctx.options().design_tokens_prefix.clone();
            for module in modules.iter_mut() {
                for class in module.custom_elements_mut() {
                    tokens.merge_into(class, prefix.as_deref());
                }
            }
        }

        if skip_demo_discovery {
            return;
        }
        let Some(glob) = ctx.options().demo_file_glob.clone() else {
            return;
        };
        let tags: Vec<String> = modules
            .iter()
            .flat_map(|m| {
                m.declarations.iter().filter_map(|d| match d {
                    crate::manifest::Declaration::Class(c) => c.tag_name.clone(),
                    _ => None,
                })
            })
            .collect();
        match DemoMap::discover(ctx, &glob, &tags) {
            Ok(demos) => {
                for module in modules.iter_mut() {
                    demos.attach(module);
                }
            }
            Err(e) => errors.push(e),
        }
    }
}

fn build_index(package: &Package) -> HashMap<String, usize> {
    package
        .modules
        .iter()
        .enumerate()
        .map(|(i, m)| (m.path.clone(), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{FsWorkspace, GenerateOptions};
    use std::fs;
    use tempfile::TempDir;

    fn lit_element_source() -> &'static str {
        r#"import { LitElement, html, css } from 'lit';
/** @cssprop [--my-color=red] - Brand color */
class MyEl extends LitElement {
  static styles = css`:host { color: var(--my-color, red); }`;
  open = false;
  render() { return html`<slot name="icon"></slot>`; }
}
customElements.define('my-el', MyEl);
"#
    }

    fn fixture(tmp: &TempDir) -> FsWorkspace {
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/my-el.ts"), lit_element_source()).unwrap();
        FsWorkspace::new(
            tmp.path(),
            GenerateOptions::with_files(vec!["src/**/*.ts".to_string()]),
        )
    }

    #[test]
    fn test_generate_full_commits_manifest() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        let session = Session::new(tmp.path(), None).unwrap();

        let outcome = session
            .generate_full(&ws, &CancellationToken::new())
            .unwrap();
        assert_eq!(outcome.package.modules.len(), 1);
        assert_eq!(session.module_count(), 1);

        let module = &outcome.package.modules[0];
        assert_eq!(module.path, "src/my-el.ts");
        assert!(module
            .exports
            .iter()
            .any(|e| matches!(e, crate::manifest::Export::CustomElementDefinition { name, .. } if name == "my-el")));
    }

    #[test]
    fn test_generate_full_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        let session = Session::new(tmp.path(), None).unwrap();

        session.generate_full(&ws, &CancellationToken::new()).unwrap();
        let first = session.serialize_manifest().unwrap();
        session.generate_full(&ws, &CancellationToken::new()).unwrap();
        let second = session.serialize_manifest().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_change_set_is_noop() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        let session = Session::new(tmp.path(), None).unwrap();
        session.generate_full(&ws, &CancellationToken::new()).unwrap();
        let before = session.serialize_manifest().unwrap();

        session
            .process_changed_files(&ws, &[], false, &CancellationToken::new())
            .unwrap();
        let after = session.serialize_manifest().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_incremental_replaces_only_changed_module() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        fs::write(
            tmp.path().join("src/other.ts"),
            "export class Other {}",
        )
        .unwrap();
        let session = Session::new(tmp.path(), None).unwrap();
        session.generate_full(&ws, &CancellationToken::new()).unwrap();
        assert_eq!(session.module_count(), 2);

        fs::write(
            tmp.path().join("src/other.ts"),
            "/** Changed. */\nexport class Other { fresh = true; }",
        )
        .unwrap();
        let outcome = session
            .process_changed_files(
                &ws,
                &["src/other.ts".to_string()],
                true,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.package.modules.len(), 2);
        let other = outcome.package.module("src/other.ts").unwrap();
        assert_eq!(other.declarations.len(), 1);
        // The untouched module is still present and unchanged.
        assert!(outcome.package.module("src/my-el.ts").is_some());
    }

    #[test]
    fn test_incremental_without_base_runs_full() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        let session = Session::new(tmp.path(), None).unwrap();
        let outcome = session
            .process_changed_files(
                &ws,
                &["src/my-el.ts".to_string()],
                false,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(outcome.package.modules.len(), 1);
    }

    #[test]
    fn test_cancelled_generation_preserves_state() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        let session = Session::new(tmp.path(), None).unwrap();
        session.generate_full(&ws, &CancellationToken::new()).unwrap();
        let before = session.serialize_manifest().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = session.generate_full(&ws, &cancel);
        assert!(matches!(result, Err(AnalyzerError::Cancelled)));
        assert_eq!(session.serialize_manifest().unwrap(), before);
    }

    #[test]
    fn test_design_tokens_merge_in_postprocess() {
        use crate::manifest::Declaration;
        use crate::tokens::{DesignToken, DesignTokens, StaticTokenLoader};
        use std::collections::BTreeMap;

        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);

        let mut tokens = BTreeMap::new();
        tokens.insert(
            "--my-color".to_string(),
            DesignToken {
                value: None,
                description: "Token description".to_string(),
                syntax: Some("<color>".to_string()),
            },
        );
        let loader = StaticTokenLoader(DesignTokens::new(tokens));
        let session = Session::new(tmp.path(), Some(Arc::new(loader))).unwrap();

        let outcome = session
            .generate_full(&ws, &CancellationToken::new())
            .unwrap();
        let module = outcome.package.module("src/my-el.ts").unwrap();
        let Declaration::Class(class) = &module.declarations[0] else {
            panic!("expected class");
        };
        let prop = class
            .css_properties
            .iter()
            .find(|p| p.name == "--my-color")
            .unwrap();
        // The analyzed description wins; the token fills the syntax.
        assert_eq!(prop.description, "Brand color");
        assert_eq!(prop.syntax.as_deref(), Some("<color>"));
    }

    #[test]
    fn test_deep_copy_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let ws = fixture(&tmp);
        let session = Session::new(tmp.path(), None).unwrap();
        session.generate_full(&ws, &CancellationToken::new()).unwrap();

        let deep = session.manifest_deep().unwrap();
        let shallow = session.manifest_shallow();
        assert_eq!(deep, shallow);
        assert_eq!(
            serde_json::to_string(&deep).unwrap(),
            serde_json::to_string(&shallow).unwrap()
        );
    }
}
