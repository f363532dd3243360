//! cemgen Core - Custom Elements Manifest generation using tree-sitter
//!
//! This crate provides the analysis engine behind cemgen:
//! - Tree-sitter parsing of TypeScript/JavaScript component sources,
//!   with HTML and CSS template literals analyzed by their own grammars
//! - A declarative capture-group query layer over compiled SCM queries
//! - Per-module processing folding syntax and documentation comments
//!   under one merge policy
//! - Bounded-worker batch processing and content-hash dependency
//!   tracking for incremental rebuilds
//! - A hash-debounced filesystem watcher with self-write suppression

pub mod batch;
pub mod cancel;
pub mod capture;
pub mod css;
pub mod demos;
pub mod deps;
pub mod embedded_queries;
pub mod error;
pub mod grammar;
pub mod html;
pub mod jsdoc;
pub mod manifest;
pub mod parser;
pub mod processor;
pub mod queries;
pub mod session;
pub mod tokens;
pub mod typeres;
pub mod watcher;
pub mod workspace;

// Re-exports for convenience
pub use batch::{BatchProcessor, BatchResult};
pub use cancel::CancellationToken;
pub use capture::{capture_groups, Capture, CaptureGroup};
pub use css::{CssExtractor, CssParseCache, CssPropertyMap};
pub use demos::DemoMap;
pub use deps::{hash_bytes, hash_file, DependencyTracker, ModuleDeps};
pub use error::{AnalyzerError, AnalyzerErrors};
pub use grammar::Grammar;
pub use html::{HtmlTemplateAnalyzer, TemplateExtraction};
pub use jsdoc::{ClassJsdoc, CssPropertyJsdoc, JsdocAnalyzer, MethodJsdoc, PropertyJsdoc};
pub use manifest::{
    Attribute, ClassDeclaration, ClassField, ClassMember, ClassMethod, CssCustomProperty, CssPart,
    CssState, Declaration, Demo, Deprecated, Event, Export, FunctionDeclaration, MixinDeclaration,
    Module, Package, Parameter, Privacy, Reference, ReturnType, Slot, Type, VariableDeclaration,
    MANIFEST_SCHEMA_VERSION,
};
pub use parser::{ParserPool, PooledParser, SourceParser};
pub use processor::{ImportBinding, ModuleProcessor, ProcessedModule, ProcessorState};
pub use queries::{Matcher, QueryManager};
pub use session::{GenerateOutcome, Session};
pub use tokens::{DesignToken, DesignTokenLoader, DesignTokens, JsonTokenLoader};
pub use typeres::{ResolvedType, TypeResolver};
pub use watcher::FileWatcher;
pub use workspace::{FsWorkspace, GenerateOptions, PackageManifest, WorkspaceContext};
