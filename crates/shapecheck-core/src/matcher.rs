//! Pattern matching seam and the default XPath implementation.

use std::sync::Arc;

use thiserror::Error;

use crate::query::{Selection, XPath};
use crate::source::SourceFile;
use crate::tree::SyntaxTree;
use crate::types::MatchRecord;

/// A pattern that cannot be compiled or evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern `{expression}`: {message}")]
pub struct ExpressionError {
    /// The offending expression.
    pub expression: String,
    /// What went wrong, including the offset for syntax errors.
    pub message: String,
}

impl ExpressionError {
    /// Creates an error for `expression`.
    #[must_use]
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// A compiled pattern, evaluated once per file.
pub trait Pattern: Send + Sync {
    /// The source expression.
    fn expression(&self) -> &str;

    /// Selects matching nodes in `tree`, the parsed form of `file`.
    ///
    /// Must be side-effect free: the same inputs give the same records.
    ///
    /// # Errors
    ///
    /// Returns an [`ExpressionError`] when evaluation fails.
    fn find(&self, file: &SourceFile, tree: &SyntaxTree)
        -> Result<Vec<MatchRecord>, ExpressionError>;
}

/// Turns expression text into [`Pattern`]s.
///
/// Implement this to plug in a different structural query engine.
pub trait PatternMatcher: Send + Sync {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns an [`ExpressionError`] for invalid expressions.
    fn compile(&self, expression: &str) -> Result<Arc<dyn Pattern>, ExpressionError>;

    /// Compiles and evaluates `expression` against a single file.
    ///
    /// # Errors
    ///
    /// Returns an [`ExpressionError`] if compilation or evaluation fails.
    fn find(
        &self,
        file: &SourceFile,
        tree: &SyntaxTree,
        expression: &str,
    ) -> Result<Vec<MatchRecord>, ExpressionError> {
        self.compile(expression)?.find(file, tree)
    }
}

/// XPath 1.0 subset matcher over [`SyntaxTree`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct XPathMatcher;

impl XPathMatcher {
    /// Creates the matcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PatternMatcher for XPathMatcher {
    fn compile(&self, expression: &str) -> Result<Arc<dyn Pattern>, ExpressionError> {
        let query = XPath::compile(expression)
            .map_err(|e| ExpressionError::new(expression, e.to_string()))?;
        Ok(Arc::new(XPathPattern { query }))
    }
}

struct XPathPattern {
    query: XPath,
}

impl Pattern for XPathPattern {
    fn expression(&self) -> &str {
        self.query.as_str()
    }

    fn find(
        &self,
        file: &SourceFile,
        tree: &SyntaxTree,
    ) -> Result<Vec<MatchRecord>, ExpressionError> {
        let selected = self
            .query
            .select(tree)
            .map_err(|e| ExpressionError::new(self.query.as_str(), e.to_string()))?;
        Ok(selected
            .into_iter()
            .map(|s| to_record(file, tree, s))
            .collect())
    }
}

fn to_record(file: &SourceFile, tree: &SyntaxTree, selection: Selection) -> MatchRecord {
    let span = tree.location_of(selection.node);
    let node = match selection.attribute {
        Some(index) => tree
            .attributes(selection.node)
            .get(index)
            .map_or_else(|| "@".to_string(), |a| format!("@{}", a.name)),
        None if tree.is_document(selection.node) => "/".to_string(),
        None => tree.tag(selection.node).to_string(),
    };
    MatchRecord {
        file: file.path().to_path_buf(),
        line: span.start.line,
        column: span.start.column + 1,
        end_line: span.end.line,
        end_column: span.end.column + 1,
        node,
        snippet: file
            .line_text(span.start.line)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}
