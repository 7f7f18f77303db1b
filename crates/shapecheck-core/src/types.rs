//! Match records and per-file parse errors.

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Serialize;
use std::path::PathBuf;

/// One node selected by a rule's pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MatchRecord {
    /// Absolute path of the file.
    pub file: PathBuf,
    /// Start line (1-indexed).
    pub line: usize,
    /// Start column (1-indexed).
    pub column: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed, exclusive).
    pub end_column: usize,
    /// Tag of the selected node, or `@name` for an attribute.
    pub node: String,
    /// The trimmed source line where the match starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl std::fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.node
        )?;
        if let Some(snippet) = &self.snippet {
            write!(f, " `{snippet}`")?;
        }
        Ok(())
    }
}

/// Why a file produced no tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorKind {
    /// The file could not be read or is not UTF-8.
    Read,
    /// The file is not valid source for its language.
    Syntax,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Syntax => write!(f, "syntax"),
        }
    }
}

/// A file excluded from matching because it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParseError {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Line of the failure (1-indexed, 0 when unknown).
    pub line: usize,
    /// Column of the failure (1-indexed, 0 when unknown).
    pub column: usize,
    /// Human-readable message.
    pub message: String,
    /// Read or syntax failure.
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Creates a read error with no position.
    #[must_use]
    pub fn read(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            path,
            line: 0,
            column: 0,
            message: message.into(),
            kind: ParseErrorKind::Read,
        }
    }

    /// Creates a syntax error at a position.
    #[must_use]
    pub fn syntax(path: PathBuf, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            path,
            line,
            column,
            message: message.into(),
            kind: ParseErrorKind::Syntax,
        }
    }

    /// Builds a labelled diagnostic against the file's source text.
    #[must_use]
    pub fn to_diagnostic(&self, source: String) -> SyntaxDiagnostic {
        let offset = byte_offset(&source, self.line, self.column);
        let length = usize::from(offset < source.len());
        SyntaxDiagnostic {
            message: format!("{} error in {}", self.kind, self.path.display()),
            src: NamedSource::new(self.path.display().to_string(), source),
            span: SourceSpan::from((offset, length)),
            label_message: self.message.clone(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ParseErrorKind::Read => write!(f, "{}: {}", self.path.display(), self.message),
            ParseErrorKind::Syntax => write!(
                f,
                "{}:{}:{}: {}",
                self.path.display(),
                self.line,
                self.column,
                self.message
            ),
        }
    }
}

/// Renders a [`ParseError`] with source context through miette.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(shapecheck::parse))]
pub struct SyntaxDiagnostic {
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("{label_message}")]
    span: SourceSpan,
    label_message: String,
}

fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            return offset + column.saturating_sub(1).min(text.len());
        }
        offset += text.len();
    }
    source.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_points_at_error_column() {
        let err = ParseError::syntax(PathBuf::from("bad.py"), 2, 5, "invalid syntax");
        let source = "x = 1\ndef (:\n".to_string();
        assert_eq!(byte_offset(&source, 2, 5), 10);
        let diag = err.to_diagnostic(source);
        assert_eq!(diag.to_string(), "syntax error in bad.py");
    }

    #[test]
    fn offsets_past_end_are_clamped() {
        assert_eq!(byte_offset("abc", 9, 1), 3);
        assert_eq!(byte_offset("abc\n", 1, 40), 4);
        assert_eq!(byte_offset("abc", 0, 0), 0);
    }

    #[test]
    fn display_formats() {
        let syntax = ParseError::syntax(PathBuf::from("a.py"), 3, 1, "expected ':'");
        assert_eq!(syntax.to_string(), "a.py:3:1: expected ':'");
        let read = ParseError::read(PathBuf::from("b.py"), "stream did not contain valid UTF-8");
        assert_eq!(read.to_string(), "b.py: stream did not contain valid UTF-8");
    }
}
