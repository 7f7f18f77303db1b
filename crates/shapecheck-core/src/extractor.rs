//! Language extraction seam.
//!
//! `Extractor` is the extension point for adding new languages. Implement it
//! to turn source text into a [`SyntaxTree`] that patterns can query.

use std::path::Path;

use crate::tree::SyntaxTree;

/// Failure to turn source text into a tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct SyntaxError {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column (1-indexed).
    pub column: usize,
    /// What the parser reported.
    pub message: String,
}

impl SyntaxError {
    /// Creates a syntax error at a position.
    #[must_use]
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Trait for language-specific tree extraction.
///
/// Extraction must be pure: the same text always yields the same tree.
pub trait Extractor: Send + Sync {
    /// Language identifier (e.g., `"python"`).
    fn language_id(&self) -> &'static str;

    /// File name suffixes this extractor handles (e.g., `&[".py"]`).
    fn extensions(&self) -> &'static [&'static str];

    /// Parses source text into a tree.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] when the text is not valid for the language.
    fn extract(&self, source: &str) -> Result<SyntaxTree, SyntaxError>;

    /// Whether this extractor handles `path`, judged by its file name.
    fn handles(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.extensions().iter().any(|ext| name.ends_with(ext)))
    }
}

/// Boxed extractor for dynamic dispatch.
pub type ExtractorBox = Box<dyn Extractor>;
