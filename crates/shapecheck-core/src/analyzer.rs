//! Core analyzer for orchestrating a run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::extractor::{Extractor, ExtractorBox};
use crate::locator::SourceLocator;
use crate::matcher::{PatternMatcher, XPathMatcher};
use crate::rule::{ModelError, Rule, RuleSet};
use crate::source::{Interrupted, SourceSet};
use crate::verdict::{RuleResult, RunReport};

/// Errors that can occur while configuring an [`Analyzer`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// No extractor was registered.
    #[error("no language extractor registered")]
    NoExtractor,

    /// An exclude pattern is not a valid glob.
    #[error("Invalid glob pattern `{pattern}`: {source}")]
    Glob {
        /// The offending pattern.
        pattern: String,
        /// Underlying glob error.
        source: glob::PatternError,
    },

    /// Two rules share a `code`/`id` pair.
    #[error("invalid rule set: {0}")]
    Rules(#[from] ModelError),

    /// The worker pool could not be created.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors that abort a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    /// The interrupt flag was raised; no report is produced.
    #[error("analysis interrupted")]
    Interrupted,
}

impl From<Interrupted> for AnalyzerError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

/// Builder for configuring an [`Analyzer`].
#[derive(Default)]
pub struct AnalyzerBuilder {
    roots: Vec<PathBuf>,
    rules: Vec<Rule>,
    extractors: Vec<ExtractorBox>,
    matcher: Option<Arc<dyn PatternMatcher>>,
    exclude_patterns: Vec<String>,
    respect_gitignore: bool,
    parallelism: Option<usize>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl AnalyzerBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root directory to scan.
    #[must_use]
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    /// Adds several root directories, in order.
    #[must_use]
    pub fn roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Adds a rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Adds every rule of a validated set, in declaration order.
    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Registers a language extractor.
    #[must_use]
    pub fn extractor<E: Extractor + 'static>(mut self, extractor: E) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    /// Replaces the default [`XPathMatcher`].
    #[must_use]
    pub fn matcher<M: PatternMatcher + 'static>(mut self, matcher: M) -> Self {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    /// Adds an exclude glob pattern.
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Adds multiple exclude glob patterns.
    #[must_use]
    pub fn excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Sets whether `.gitignore` files are honored (default: false).
    #[must_use]
    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Sets the number of worker threads (default: one per core).
    #[must_use]
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }

    /// Sets a flag that aborts the run when raised.
    #[must_use]
    pub fn interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Builds the analyzer.
    ///
    /// # Errors
    ///
    /// Returns an error if no extractor is registered, two rules share a
    /// key, an exclude pattern is invalid, or the worker pool cannot start.
    pub fn build(self) -> Result<Analyzer, BuildError> {
        if self.extractors.is_empty() {
            return Err(BuildError::NoExtractor);
        }
        let rules = RuleSet::new(self.rules)?;

        let exclude = self
            .exclude_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|source| BuildError::Glob {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let extensions = self
            .extractors
            .iter()
            .flat_map(|e| e.extensions().iter().copied())
            .collect::<Vec<_>>();
        let locator = SourceLocator::new(extensions)
            .exclude(exclude)
            .respect_gitignore(self.respect_gitignore);

        let mut pool = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.parallelism {
            pool = pool.num_threads(threads);
        }

        Ok(Analyzer {
            roots: self.roots,
            rules: rules.into_iter().collect(),
            extractors: self.extractors,
            matcher: self.matcher.unwrap_or_else(|| Arc::new(XPathMatcher)),
            locator,
            pool: pool.build()?,
            interrupt: self.interrupt,
        })
    }
}

/// Discovers, parses and checks source files against rules.
///
/// Use [`Analyzer::builder()`] to construct an instance.
pub struct Analyzer {
    roots: Vec<PathBuf>,
    rules: Vec<Rule>,
    extractors: Vec<ExtractorBox>,
    matcher: Arc<dyn PatternMatcher>,
    locator: SourceLocator,
    pool: rayon::ThreadPool,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Analyzer {
    /// Creates a new builder for configuring an analyzer.
    #[must_use]
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::new()
    }

    /// Returns the roots to scan.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Returns the number of registered rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Runs every rule over every discovered file.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::Interrupted`] if the interrupt flag is raised
    /// before the report is composed.
    pub fn analyze(&self) -> Result<RunReport, AnalyzerError> {
        info!("Starting analysis of {} root(s)", self.roots.len());

        let located = self.locator.locate(&self.roots);
        for root in &located.rejected {
            warn!("Rejected root: {}", root.display());
        }
        info!("Found {} files to analyze", located.files.len());
        self.check_interrupt()?;

        let flag = self.interrupt.as_deref();
        let sources = self
            .pool
            .install(|| SourceSet::load(&located.files, &self.extractors, flag))?;
        let parse_errors = sources.parse_errors();
        debug!(
            "Parsed {} file(s), {} failed",
            sources.len(),
            parse_errors.len()
        );
        self.check_interrupt()?;

        let mut aggregator = Aggregator::new(self.matcher.as_ref(), &sources);
        if let Some(flag) = flag {
            aggregator = aggregator.interrupt(flag);
        }
        let results = self.pool.install(|| {
            self.rules
                .par_iter()
                .map(|rule| aggregator.evaluate(rule))
                .collect::<Result<Vec<RuleResult>, Interrupted>>()
        })?;
        self.check_interrupt()?;

        let report = RunReport::compose(
            results,
            parse_errors,
            located.rejected,
            located.files.len(),
        );
        let summary = report.summary();
        info!(
            "Analysis complete: {} passed, {} failed, {} errored in {} file(s)",
            summary.passed, summary.failed, summary.errored, report.files_scanned
        );
        Ok(report)
    }

    fn check_interrupt(&self) -> Result<(), AnalyzerError> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(AnalyzerError::Interrupted),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::SyntaxError;
    use crate::tree::{NodeId, SyntaxTree, TreeBuilder};

    struct TagExtractor;

    impl Extractor for TagExtractor {
        fn language_id(&self) -> &'static str {
            "tags"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &[".tag"]
        }

        fn extract(&self, source: &str) -> Result<SyntaxTree, SyntaxError> {
            let mut b = TreeBuilder::new();
            let root = b.element(NodeId::DOCUMENT, "Module");
            for word in source.split_whitespace() {
                b.element(root, word);
            }
            Ok(b.finish())
        }
    }

    #[test]
    fn build_requires_an_extractor() {
        assert!(matches!(
            Analyzer::builder().root(".").build(),
            Err(BuildError::NoExtractor)
        ));
    }

    #[test]
    fn duplicate_rule_keys_are_a_build_error() {
        let err = Analyzer::builder()
            .extractor(TagExtractor)
            .rule(Rule::new("first", "T", "1", "//A").unwrap())
            .rule(Rule::new("second", "T", "1", "//B").unwrap())
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BuildError::Rules(ModelError::DuplicateRule { .. })
        ));
        assert_eq!(err.to_string(), "invalid rule set: duplicate rule T/1");
    }

    #[test]
    fn invalid_exclude_glob_is_a_build_error() {
        let err = Analyzer::builder()
            .extractor(TagExtractor)
            .exclude("[")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::Glob { .. }));
    }

    #[test]
    fn analyze_preserves_rule_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tag"), "A B B").unwrap();
        let analyzer = Analyzer::builder()
            .root(dir.path())
            .extractor(TagExtractor)
            .rule(Rule::new("bs", "T", "2", "//B").unwrap())
            .rule(Rule::new("as", "T", "1", "//A").unwrap())
            .parallelism(2)
            .build()
            .unwrap();

        let report = analyzer.analyze().unwrap();
        assert_eq!(report.rules[0].id, "2");
        assert_eq!(report.rules[0].total, 2);
        assert_eq!(report.rules[1].id, "1");
        assert!(report.passed);
        assert_eq!(report.files_scanned, 1);
    }

    #[test]
    fn raised_interrupt_discards_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let analyzer = Analyzer::builder()
            .root(dir.path())
            .extractor(TagExtractor)
            .interrupt(Arc::clone(&flag))
            .build()
            .unwrap();
        assert_eq!(analyzer.analyze().unwrap_err(), AnalyzerError::Interrupted);
    }
}
