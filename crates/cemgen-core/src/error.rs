//! Error types for the analysis engine.
//!
//! Per-module analysis is best-effort: individual failures are collected
//! into an [`AnalyzerErrors`] aggregate and returned alongside partial
//! results. Only setup failures (query compilation) abort construction.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// I/O or decoding failure on a source file
    #[error("failed to read source file '{path}': {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syntax tree could not be constructed
    #[error("failed to parse {path}")]
    Parse { path: PathBuf },

    /// Failed to set parser language
    #[error("failed to set parser language: {0}")]
    LanguageSet(String),

    /// Failed to compile a query (construction-time only)
    #[error("failed to compile query '{grammar}:{name}': {message}")]
    QueryCompile {
        grammar: &'static str,
        name: String,
        message: String,
    },

    /// No query registered under the requested name
    #[error("no query '{grammar}:{name}' in the catalog")]
    UnknownQuery {
        grammar: &'static str,
        name: String,
    },

    /// A required capture was absent where the grammar guaranteed it
    #[error("missing capture '{capture}' in query '{query}'")]
    MissingCapture { capture: String, query: String },

    /// External type or import could not be resolved
    #[error("failed to resolve '{name}' from '{specifier}': {message}")]
    Resolve {
        specifier: String,
        name: String,
        message: String,
    },

    /// Design-token loader failure or wrong type returned
    #[error("design token loading failed: {0}")]
    DesignTokens(String),

    /// Propagated from a cancellation signal; non-fatal to committed state
    #[error("generation cancelled")]
    Cancelled,

    /// IO error outside of source reading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest serialization failure
    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl AnalyzerError {
    /// Create a new SourceRead error.
    pub fn source_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceRead {
            path: path.into(),
            source,
        }
    }

    /// Create a new MissingCapture error.
    pub fn missing_capture(capture: impl Into<String>, query: impl Into<String>) -> Self {
        Self::MissingCapture {
            capture: capture.into(),
            query: query.into(),
        }
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Aggregate of per-module errors collected during best-effort analysis.
///
/// An empty aggregate means full success. Joining preserves insertion
/// order so warnings print in processing order.
#[derive(Debug, Default)]
pub struct AnalyzerErrors {
    errors: Vec<AnalyzerError>,
}

impl AnalyzerErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single error.
    pub fn push(&mut self, error: AnalyzerError) {
        self.errors.push(error);
    }

    /// Absorb another aggregate.
    pub fn join(&mut self, other: AnalyzerErrors) {
        self.errors.extend(other.errors);
    }

    /// Record the error of a failed result, passing successes through.
    pub fn collect<T>(&mut self, result: Result<T, AnalyzerError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether any collected error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.errors.iter().any(AnalyzerError::is_cancelled)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalyzerError> {
        self.errors.iter()
    }

    /// Convert into a `Result`: `Ok(())` when empty.
    pub fn into_result(self) -> Result<(), AnalyzerErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AnalyzerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} analysis error(s):", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AnalyzerErrors {}

impl From<AnalyzerError> for AnalyzerErrors {
    fn from(error: AnalyzerError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}
