//! Source files loaded for one run.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::extractor::Extractor;
use crate::tree::SyntaxTree;
use crate::types::ParseError;

/// A discovered file with its text and parse outcome.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    text: String,
    parsed: Result<SyntaxTree, ParseError>,
}

impl SourceFile {
    /// Reads and parses `path` with `extractor`.
    ///
    /// Never fails: read and syntax problems are kept as the file's
    /// [`ParseError`].
    #[must_use]
    pub fn load(path: PathBuf, extractor: &dyn Extractor) -> Self {
        let text = match std::fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    let error = ParseError::read(path.clone(), e.to_string());
                    return Self::failed(path, error);
                }
            },
            Err(e) => {
                let error = ParseError::read(path.clone(), e.to_string());
                return Self::failed(path, error);
            }
        };
        Self::from_text(path, text, extractor)
    }

    /// Parses already-loaded text as if it were the contents of `path`.
    #[must_use]
    pub fn from_text(path: PathBuf, text: String, extractor: &dyn Extractor) -> Self {
        let text = match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        };
        let parsed = extractor.extract(&text).map_err(|e| {
            ParseError::syntax(path.clone(), e.line, e.column, e.message)
        });
        Self { path, text, parsed }
    }

    fn failed(path: PathBuf, error: ParseError) -> Self {
        Self {
            path,
            text: String::new(),
            parsed: Err(error),
        }
    }

    /// Absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source text (empty when unreadable).
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed tree, if parsing succeeded.
    #[must_use]
    pub fn tree(&self) -> Option<&SyntaxTree> {
        self.parsed.as_ref().ok()
    }

    /// The parse error, if parsing failed.
    #[must_use]
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parsed.as_ref().err()
    }

    /// The trimmed text of a 1-indexed line.
    #[must_use]
    pub fn line_text(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|index| self.text.lines().nth(index))
            .map(str::trim)
    }
}

/// The interrupt flag was raised while loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Every file of a run, each parsed exactly once, in path order.
#[derive(Debug, Default)]
pub struct SourceSet {
    files: Vec<SourceFile>,
    index: HashMap<PathBuf, usize>,
}

impl SourceSet {
    /// Loads and parses `paths` in parallel on the current rayon pool.
    ///
    /// Each path is handled by the first extractor that claims it; paths no
    /// extractor claims are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] if `interrupt` is set before every file is
    /// loaded. No partial set is returned.
    pub fn load(
        paths: &BTreeSet<PathBuf>,
        extractors: &[Box<dyn Extractor>],
        interrupt: Option<&AtomicBool>,
    ) -> Result<Self, Interrupted> {
        let paths: Vec<&PathBuf> = paths.iter().collect();
        let loaded: Option<Vec<Option<SourceFile>>> = paths
            .par_iter()
            .map(|path| {
                if interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return None;
                }
                let Some(extractor) = extractors.iter().find(|e| e.handles(path)) else {
                    debug!("No extractor for {}", path.display());
                    return Some(None);
                };
                debug!("Parsing {} as {}", path.display(), extractor.language_id());
                let file = SourceFile::load((*path).clone(), extractor.as_ref());
                if let Some(err) = file.parse_error() {
                    warn!("Failed to parse {err}");
                }
                Some(Some(file))
            })
            .collect();

        let files = loaded.ok_or(Interrupted)?;
        Ok(Self::from_files(files.into_iter().flatten().collect()))
    }

    /// Builds a set from already-loaded files, keeping the first of duplicates.
    #[must_use]
    pub fn from_files(mut files: Vec<SourceFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|later, earlier| later.path == earlier.path);
        let index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path.clone(), i))
            .collect();
        Self { files, index }
    }

    /// Looks up a file by its path.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&SourceFile> {
        self.index.get(path).map(|i| &self.files[*i])
    }

    /// All files in path order.
    #[must_use]
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Files whose parse succeeded, in path order.
    pub fn parsed(&self) -> impl Iterator<Item = (&SourceFile, &SyntaxTree)> {
        self.files.iter().filter_map(|f| f.tree().map(|t| (f, t)))
    }

    /// Parse errors in path order, one per failing file.
    #[must_use]
    pub fn parse_errors(&self) -> Vec<ParseError> {
        self.files
            .iter()
            .filter_map(|f| f.parse_error().cloned())
            .collect()
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::SyntaxError;
    use crate::tree::{NodeId, TreeBuilder};
    use crate::types::ParseErrorKind;

    struct LineExtractor;

    impl Extractor for LineExtractor {
        fn language_id(&self) -> &'static str {
            "lines"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &[".txt"]
        }

        fn extract(&self, source: &str) -> Result<SyntaxTree, SyntaxError> {
            if source.contains("!!") {
                return Err(SyntaxError::new(1, 1, "bang"));
            }
            let mut b = TreeBuilder::new();
            b.element(NodeId::DOCUMENT, "Doc");
            Ok(b.finish())
        }
    }

    #[test]
    fn loads_each_file_once_and_records_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let bad = dir.path().join("bad.txt");
        let binary = dir.path().join("binary.txt");
        let other = dir.path().join("skip.md");
        std::fs::write(&good, "hello").unwrap();
        std::fs::write(&bad, "!!").unwrap();
        std::fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(&other, "ignored").unwrap();

        let paths: BTreeSet<PathBuf> = [&good, &bad, &binary, &other]
            .into_iter()
            .cloned()
            .collect();
        let extractors: Vec<Box<dyn Extractor>> = vec![Box::new(LineExtractor)];
        let set = SourceSet::load(&paths, &extractors, None).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.parsed().count(), 1);
        let errors = set.parse_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, bad);
        assert_eq!(errors[0].kind, ParseErrorKind::Syntax);
        assert_eq!(errors[1].path, binary);
        assert_eq!(errors[1].kind, ParseErrorKind::Read);
        assert!(set.get(&good).and_then(SourceFile::tree).is_some());
    }

    #[test]
    fn interrupt_discards_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let paths: BTreeSet<PathBuf> = std::iter::once(file).collect();
        let extractors: Vec<Box<dyn Extractor>> = vec![Box::new(LineExtractor)];
        let flag = AtomicBool::new(true);
        assert_eq!(
            SourceSet::load(&paths, &extractors, Some(&flag)).unwrap_err(),
            Interrupted
        );
    }

    #[test]
    fn byte_order_mark_is_stripped() {
        let file = SourceFile::from_text(
            PathBuf::from("a.txt"),
            "\u{feff}  first  \nsecond".to_string(),
            &LineExtractor,
        );
        assert_eq!(file.line_text(1), Some("first"));
        assert_eq!(file.line_text(2), Some("second"));
        assert_eq!(file.line_text(0), None);
    }
}
