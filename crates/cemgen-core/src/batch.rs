//! Batch processing: bounded worker pool over module jobs.
//!
//! The pool is sized `min(job count, available CPUs)` so incremental
//! runs of one or two files never over-allocate. Each worker holds one
//! pooled TypeScript parser for its lifetime and returns it when the
//! pool drains. Cancellation is observed between jobs.
//!
//! Aggregation carries no cross-worker ordering; the session sorts
//! modules by path afterwards.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use rayon::prelude::*;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::css::CssParseCache;
use crate::error::{AnalyzerError, AnalyzerErrors};
use crate::grammar::Grammar;
use crate::manifest::Module;
use crate::parser::ParserPool;
use crate::processor::{ModuleProcessor, ProcessedModule};
use crate::queries::QueryManager;
use crate::typeres::TypeResolver;
use crate::workspace::WorkspaceContext;

/// Aggregated output of one batch run.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub modules: Vec<Module>,
    /// Per-module resolved CSS dependencies.
    pub style_imports: HashMap<String, Vec<String>>,
    /// Per-module resolved value-import dependencies.
    pub imported_files: HashMap<String, Vec<String>>,
    /// Per-module `@typedef` aliases.
    pub type_aliases: HashMap<String, HashMap<String, String>>,
    /// Tag registrations merged across all modules.
    pub tag_aliases: HashMap<String, String>,
    pub logs: Vec<String>,
    pub errors: AnalyzerErrors,
}

/// Runs module processors across a set of files in parallel.
pub struct BatchProcessor<'a> {
    queries: &'a QueryManager,
    parsers: &'a ParserPool,
    css_cache: &'a CssParseCache,
    type_resolver: &'a TypeResolver,
    workspace: &'a dyn WorkspaceContext,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        queries: &'a QueryManager,
        parsers: &'a ParserPool,
        css_cache: &'a CssParseCache,
        type_resolver: &'a TypeResolver,
        workspace: &'a dyn WorkspaceContext,
    ) -> Self {
        Self {
            queries,
            parsers,
            css_cache,
            type_resolver,
            workspace,
        }
    }

    /// Process the given module paths, observing cancellation between
    /// jobs.
    pub fn process(&self, jobs: &[String], cancel: &CancellationToken) -> BatchResult {
        let mut result = BatchResult::default();
        if jobs.is_empty() {
            return result;
        }

        let cpus = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let workers = jobs.len().min(cpus).max(1);
        debug!(jobs = jobs.len(), workers, "starting batch");

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                result.errors.push(AnalyzerError::Resolve {
                    specifier: String::new(),
                    name: String::new(),
                    message: format!("failed to build worker pool: {}", e),
                });
                return result;
            }
        };

        let outputs: Vec<Option<ProcessedModule>> = pool.install(|| {
            jobs.par_iter()
                .map_init(
                    || self.parsers.acquire(Grammar::TypeScript),
                    |parser, job| {
                        // Drain without starting new jobs once cancelled.
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let parser = match parser {
                            Ok(parser) => parser,
                            Err(_) => return None,
                        };
                        Some(self.process_one(job, parser))
                    },
                )
                .collect()
        });

        if cancel.is_cancelled() {
            result.errors.push(AnalyzerError::Cancelled);
        }

        for output in outputs.into_iter().flatten() {
            let path = output.module.path.clone();
            result.modules.push(output.module);
            if !output.style_imports.is_empty() {
                result.style_imports.insert(path.clone(), output.style_imports);
            }
            if !output.imported_files.is_empty() {
                result
                    .imported_files
                    .insert(path.clone(), output.imported_files);
            }
            if !output.type_aliases.is_empty() {
                result.type_aliases.insert(path.clone(), output.type_aliases);
            }
            result.tag_aliases.extend(output.tag_aliases);
            result.logs.extend(output.logs);
            result.errors.join(output.errors);
        }

        result
    }

    fn process_one(
        &self,
        module_path: &str,
        parser: &mut crate::parser::PooledParser<'_>,
    ) -> ProcessedModule {
        let processor = ModuleProcessor::new(
            self.queries,
            self.parsers,
            self.css_cache,
            self.type_resolver,
            self.workspace,
        );
        let fs_path = self.workspace.module_to_fs(module_path);
        match self.workspace.read_file(&fs_path) {
            Ok(source) => processor.process(module_path, &source, parser),
            Err(e) => {
                let mut failed = processor.process(module_path, "", parser);
                failed.errors.push(e);
                failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{FsWorkspace, GenerateOptions};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn batch_fixture(tmp: &TempDir) -> (Arc<QueryManager>, Arc<ParserPool>, FsWorkspace) {
        let queries = Arc::new(QueryManager::new().unwrap());
        let parsers = Arc::new(ParserPool::new());
        let workspace = FsWorkspace::new(
            tmp.path(),
            GenerateOptions::with_files(vec!["src/**/*.ts".to_string()]),
        );
        (queries, parsers, workspace)
    }

    #[test]
    fn test_batch_processes_all_jobs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/a.ts"), "export class A {}").unwrap();
        fs::write(tmp.path().join("src/b.ts"), "export class B {}").unwrap();

        let (queries, parsers, workspace) = batch_fixture(&tmp);
        let css_cache = CssParseCache::new();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let batch = BatchProcessor::new(&queries, &parsers, &css_cache, &resolver, &workspace);

        let jobs = vec!["src/a.ts".to_string(), "src/b.ts".to_string()];
        let result = batch.process(&jobs, &CancellationToken::new());

        assert_eq!(result.modules.len(), 2);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_cancelled_batch_reports_cancellation() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/a.ts"), "export class A {}").unwrap();

        let (queries, parsers, workspace) = batch_fixture(&tmp);
        let css_cache = CssParseCache::new();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let batch = BatchProcessor::new(&queries, &parsers, &css_cache, &resolver, &workspace);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = batch.process(&["src/a.ts".to_string()], &cancel);
        assert!(result.errors.is_cancelled());
        assert!(result.modules.is_empty());
    }

    #[test]
    fn test_missing_file_is_best_effort() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/good.ts"), "export class Good {}").unwrap();

        let (queries, parsers, workspace) = batch_fixture(&tmp);
        let css_cache = CssParseCache::new();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let batch = BatchProcessor::new(&queries, &parsers, &css_cache, &resolver, &workspace);

        let jobs = vec!["src/good.ts".to_string(), "src/missing.ts".to_string()];
        let result = batch.process(&jobs, &CancellationToken::new());

        // Both modules appear; the missing one carries an error.
        assert_eq!(result.modules.len(), 2);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let tmp = TempDir::new().unwrap();
        let (queries, parsers, workspace) = batch_fixture(&tmp);
        let css_cache = CssParseCache::new();
        let resolver = TypeResolver::new(queries.clone(), parsers.clone(), tmp.path());
        let batch = BatchProcessor::new(&queries, &parsers, &css_cache, &resolver, &workspace);
        let result = batch.process(&[], &CancellationToken::new());
        assert!(result.modules.is_empty());
        assert!(result.errors.is_empty());
    }
}
