//! Tree-sitter parser pool.
//!
//! Parsers are expensive to construct relative to a parse, so the engine
//! keeps a per-grammar pool of reusable parsers. A parser is exclusive to
//! one thread between acquire and release; the RAII guard returns it to
//! the pool on every exit path.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use tree_sitter::{Parser, Tree};

use crate::error::AnalyzerError;
use crate::grammar::Grammar;

/// A tree-sitter parser bound to a grammar.
pub struct SourceParser {
    parser: Parser,
    grammar: Grammar,
}

impl SourceParser {
    /// Create a new parser for the specified grammar.
    pub fn new(grammar: Grammar) -> Result<Self, AnalyzerError> {
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.tree_sitter_language())
            .map_err(|e| AnalyzerError::LanguageSet(e.to_string()))?;
        Ok(Self { parser, grammar })
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Parse source text into a syntax tree.
    pub fn parse(&mut self, source: &str, path: &Path) -> Result<Tree, AnalyzerError> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| AnalyzerError::Parse {
                path: path.to_path_buf(),
            })
    }

    /// Parse with an existing tree for incremental re-parsing.
    pub fn parse_with_old_tree(
        &mut self,
        source: &str,
        old_tree: Option<&Tree>,
        path: &Path,
    ) -> Result<Tree, AnalyzerError> {
        self.parser
            .parse(source, old_tree)
            .ok_or_else(|| AnalyzerError::Parse {
                path: path.to_path_buf(),
            })
    }
}

/// Bounded pool of reusable parsers, keyed by grammar.
///
/// All methods take `&self`; the free list is protected by a Mutex.
pub struct ParserPool {
    free: Mutex<HashMap<Grammar, Vec<SourceParser>>>,
}

impl Default for ParserPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a parser for the grammar, creating one if the pool is empty.
    ///
    /// The returned guard gives the parser back on drop.
    pub fn acquire(&self, grammar: Grammar) -> Result<PooledParser<'_>, AnalyzerError> {
        let pooled = self
            .free
            .lock()
            .get_mut(&grammar)
            .and_then(|parsers| parsers.pop());

        let parser = match pooled {
            Some(parser) => parser,
            None => SourceParser::new(grammar)?,
        };

        Ok(PooledParser {
            pool: self,
            parser: Some(parser),
        })
    }

    fn release(&self, parser: SourceParser) {
        self.free
            .lock()
            .entry(parser.grammar())
            .or_default()
            .push(parser);
    }

    /// Number of parsers currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.free.lock().values().map(Vec::len).sum()
    }
}

/// RAII guard for a borrowed parser. Returns the parser on drop.
pub struct PooledParser<'a> {
    pool: &'a ParserPool,
    parser: Option<SourceParser>,
}

impl PooledParser<'_> {
    pub fn grammar(&self) -> Grammar {
        self.parser.as_ref().expect("parser present until drop").grammar()
    }

    /// Parse source text into a syntax tree.
    pub fn parse(&mut self, source: &str, path: &Path) -> Result<Tree, AnalyzerError> {
        self.parser
            .as_mut()
            .expect("parser present until drop")
            .parse(source, path)
    }

    /// Parse with an existing tree for incremental re-parsing.
    pub fn parse_with_old_tree(
        &mut self,
        source: &str,
        old_tree: Option<&Tree>,
        path: &Path,
    ) -> Result<Tree, AnalyzerError> {
        self.parser
            .as_mut()
            .expect("parser present until drop")
            .parse_with_old_tree(source, old_tree, path)
    }
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.release(parser);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_simple_source() {
        let mut parser = SourceParser::new(Grammar::TypeScript).unwrap();
        let tree = parser
            .parse("class Foo {}", &PathBuf::from("foo.ts"))
            .unwrap();
        assert_eq!(tree.root_node().kind(), "program");
    }

    #[test]
    fn test_pool_reuses_released_parsers() {
        let pool = ParserPool::new();
        assert_eq!(pool.idle_count(), 0);
        {
            let mut parser = pool.acquire(Grammar::TypeScript).unwrap();
            parser
                .parse("const x = 1;", &PathBuf::from("x.ts"))
                .unwrap();
        }
        assert_eq!(pool.idle_count(), 1);
        {
            let _parser = pool.acquire(Grammar::TypeScript).unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_pool_separates_grammars() {
        let pool = ParserPool::new();
        {
            let _ts = pool.acquire(Grammar::TypeScript).unwrap();
            let _css = pool.acquire(Grammar::Css).unwrap();
        }
        assert_eq!(pool.idle_count(), 2);
        {
            let html = pool.acquire(Grammar::Html).unwrap();
            assert_eq!(html.grammar(), Grammar::Html);
        }
        assert_eq!(pool.idle_count(), 3);
    }
}
