//! Runs one rule across every parsed file.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::matcher::PatternMatcher;
use crate::rule::Rule;
use crate::source::{Interrupted, SourceSet};
use crate::verdict::RuleResult;

/// Evaluates rules against a loaded [`SourceSet`].
pub struct Aggregator<'a> {
    matcher: &'a dyn PatternMatcher,
    sources: &'a SourceSet,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a> Aggregator<'a> {
    /// Creates an aggregator over `sources`.
    #[must_use]
    pub fn new(matcher: &'a dyn PatternMatcher, sources: &'a SourceSet) -> Self {
        Self {
            matcher,
            sources,
            interrupt: None,
        }
    }

    /// Polls `flag` before each file.
    #[must_use]
    pub fn interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Matches `rule` against every parsed file and applies its bounds.
    ///
    /// Files that failed to parse are skipped. An invalid pattern yields an
    /// errored result rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] if the interrupt flag is raised mid-rule.
    pub fn evaluate(&self, rule: &Rule) -> Result<RuleResult, Interrupted> {
        let pattern = match self.matcher.compile(rule.pattern()) {
            Ok(pattern) => pattern,
            Err(e) => {
                debug!("Rule {} has an invalid pattern: {e}", rule.key());
                return Ok(RuleResult::errored(rule, e.to_string()));
            }
        };

        let mut matches = Vec::new();
        for (file, tree) in self.sources.parsed() {
            if self.interrupt.is_some_and(|f| f.load(Ordering::Relaxed)) {
                return Err(Interrupted);
            }
            match pattern.find(file, tree) {
                Ok(found) => matches.extend(found),
                Err(e) => {
                    debug!(
                        "Rule {} failed on {}: {e}",
                        rule.key(),
                        file.path().display()
                    );
                    return Ok(RuleResult::errored(rule, e.to_string()));
                }
            }
        }

        let result = RuleResult::from_matches(rule, matches);
        debug!("Rule {}: {} match(es)", rule.key(), result.total);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{Extractor, SyntaxError};
    use crate::matcher::XPathMatcher;
    use crate::rule::{Bound, Cardinality};
    use crate::source::SourceFile;
    use crate::tree::{NodeId, SyntaxTree, TreeBuilder};
    use crate::verdict::RuleOutcome;
    use std::path::PathBuf;

    /// Each word becomes an element named after it; `?` is a syntax error.
    struct WordExtractor;

    impl Extractor for WordExtractor {
        fn language_id(&self) -> &'static str {
            "words"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &[".w"]
        }

        fn extract(&self, source: &str) -> Result<SyntaxTree, SyntaxError> {
            if source.contains('?') {
                return Err(SyntaxError::new(1, 1, "question"));
            }
            let mut b = TreeBuilder::new();
            let root = b.element(NodeId::DOCUMENT, "Module");
            for word in source.split_whitespace() {
                b.element(root, word);
            }
            Ok(b.finish())
        }
    }

    fn sources(files: &[(&str, &str)]) -> SourceSet {
        SourceSet::from_files(
            files
                .iter()
                .map(|(path, text)| {
                    SourceFile::from_text(PathBuf::from(path), (*text).to_string(), &WordExtractor)
                })
                .collect(),
        )
    }

    fn rule(pattern: &str) -> Rule {
        Rule::new("r", "T", "1", pattern).unwrap()
    }

    #[test]
    fn sums_matches_across_files_in_path_order() {
        let set = sources(&[("/b.w", "Class"), ("/a.w", "Class Class")]);
        let result = Aggregator::new(&XPathMatcher, &set)
            .evaluate(&rule("//Class"))
            .unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.matches[0].file, PathBuf::from("/a.w"));
        assert_eq!(result.matches[2].file, PathBuf::from("/b.w"));
        assert!(result.passed());
    }

    #[test]
    fn unparsable_files_contribute_nothing() {
        let set = sources(&[("/a.w", "Class ?"), ("/b.w", "Other")]);
        let result = Aggregator::new(&XPathMatcher, &set)
            .evaluate(&rule("//Class"))
            .unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(result.violated(), Some(Bound::Min));
        assert_eq!(set.parse_errors().len(), 1);
    }

    #[test]
    fn invalid_pattern_marks_the_rule_errored() {
        let set = sources(&[("/a.w", "Class")]);
        let result = Aggregator::new(&XPathMatcher, &set)
            .evaluate(&rule("//Class["))
            .unwrap();
        assert!(matches!(result.outcome, RuleOutcome::Errored { .. }));
    }

    #[test]
    fn pattern_errors_do_not_depend_on_the_files() {
        let empty = sources(&[]);
        for pattern in ["count(//Class)", "1 + 1", "//Class[re:test(@name, '(')]"] {
            let result = Aggregator::new(&XPathMatcher, &empty)
                .evaluate(&rule(pattern))
                .unwrap();
            assert!(result.is_errored(), "{pattern}");
        }
    }

    #[test]
    fn ceiling_is_enforced() {
        let set = sources(&[("/a.w", "Class Class")]);
        let bounded = rule("//Class").with_count(Cardinality::new(Some(0), Some(1)).unwrap());
        let result = Aggregator::new(&XPathMatcher, &set)
            .evaluate(&bounded)
            .unwrap();
        assert_eq!(result.violated(), Some(Bound::Max));
    }

    #[test]
    fn raised_flag_interrupts() {
        let set = sources(&[("/a.w", "Class")]);
        let flag = AtomicBool::new(true);
        let outcome = Aggregator::new(&XPathMatcher, &set)
            .interrupt(&flag)
            .evaluate(&rule("//Class"));
        assert_eq!(outcome.unwrap_err(), Interrupted);
    }
}
