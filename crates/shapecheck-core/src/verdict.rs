//! Per-rule results and the composed run report.

use std::path::PathBuf;

use serde::Serialize;

use crate::rule::{Bound, Cardinality, Rule};
use crate::types::{MatchRecord, ParseError};

/// How a rule ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RuleOutcome {
    /// The match count is within bounds.
    Passed,
    /// The match count breached a bound.
    Failed {
        /// The breached bound.
        violated: Bound,
    },
    /// The pattern could not be compiled or evaluated.
    Errored {
        /// The expression error message.
        message: String,
    },
}

/// The evaluation of one rule across all parsed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    /// Rule identifier.
    pub id: String,
    /// Rule category code.
    pub code: String,
    /// Human label.
    pub name: String,
    /// Pattern expression.
    pub pattern: String,
    /// Configured bounds.
    pub count: Cardinality,
    /// Total matches across files.
    pub total: u64,
    /// Matches, file by file in path order, then document order.
    pub matches: Vec<MatchRecord>,
    /// Pass, fail or error.
    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

impl RuleResult {
    /// Applies `rule`'s cardinality to `matches`.
    #[must_use]
    pub fn from_matches(rule: &Rule, matches: Vec<MatchRecord>) -> Self {
        let total = matches.len() as u64;
        let outcome = match rule.count().check(total) {
            Some(violated) => RuleOutcome::Failed { violated },
            None => RuleOutcome::Passed,
        };
        Self::with_outcome(rule, matches, outcome)
    }

    /// A result for a rule whose pattern errored.
    #[must_use]
    pub fn errored(rule: &Rule, message: impl Into<String>) -> Self {
        Self::with_outcome(
            rule,
            Vec::new(),
            RuleOutcome::Errored {
                message: message.into(),
            },
        )
    }

    fn with_outcome(rule: &Rule, matches: Vec<MatchRecord>, outcome: RuleOutcome) -> Self {
        Self {
            id: rule.id().to_string(),
            code: rule.code().to_string(),
            name: rule.name().to_string(),
            pattern: rule.pattern().to_string(),
            count: rule.count(),
            total: matches.len() as u64,
            matches,
            outcome,
        }
    }

    /// Whether the rule passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == RuleOutcome::Passed
    }

    /// Whether the rule's pattern errored.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        matches!(self.outcome, RuleOutcome::Errored { .. })
    }

    /// The breached bound, for failed rules.
    #[must_use]
    pub fn violated(&self) -> Option<Bound> {
        match self.outcome {
            RuleOutcome::Failed { violated } => Some(violated),
            _ => None,
        }
    }
}

/// Process exit status for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Everything passed.
    Success,
    /// A rule failed or errored, a file did not parse, or a root was rejected.
    Failure,
}

impl ExitStatus {
    /// Numeric process exit code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

/// Counts of rule outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Rules that passed.
    pub passed: usize,
    /// Rules that failed their bounds.
    pub failed: usize,
    /// Rules whose pattern errored.
    pub errored: usize,
}

/// The complete outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Rule results in declaration order.
    pub rules: Vec<RuleResult>,
    /// Files that could not be parsed, in path order.
    pub parse_errors: Vec<ParseError>,
    /// Rejected roots in encounter order.
    pub rejected: Vec<PathBuf>,
    /// Number of files discovered.
    pub files_scanned: usize,
    /// Overall verdict.
    pub passed: bool,
}

impl RunReport {
    /// Composes the final report.
    ///
    /// The run passes only if no root was rejected, every file parsed, no
    /// pattern errored and every rule passed.
    #[must_use]
    pub fn compose(
        rules: Vec<RuleResult>,
        mut parse_errors: Vec<ParseError>,
        rejected: Vec<PathBuf>,
        files_scanned: usize,
    ) -> Self {
        parse_errors.sort_by(|a, b| a.path.cmp(&b.path));
        let passed = rejected.is_empty()
            && parse_errors.is_empty()
            && rules.iter().all(RuleResult::passed);
        Self {
            rules,
            parse_errors,
            rejected,
            files_scanned,
            passed,
        }
    }

    /// Exit status for the calling process.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        if self.passed {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }

    /// Counts rule outcomes.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for rule in &self.rules {
            match rule.outcome {
                RuleOutcome::Passed => summary.passed += 1,
                RuleOutcome::Failed { .. } => summary.failed += 1,
                RuleOutcome::Errored { .. } => summary.errored += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(min: Option<u64>, max: Option<u64>) -> Rule {
        Rule::new("classes", "CDF", "C001", ".//ClassDef")
            .unwrap()
            .with_count(Cardinality::new(min, max).unwrap())
    }

    fn record(line: usize) -> MatchRecord {
        MatchRecord {
            file: PathBuf::from("/p/a.py"),
            line,
            column: 1,
            end_line: line,
            end_column: 5,
            node: "ClassDef".into(),
            snippet: None,
        }
    }

    #[test]
    fn default_bounds_need_one_match() {
        let failed = RuleResult::from_matches(&rule(None, None), Vec::new());
        assert_eq!(failed.violated(), Some(Bound::Min));
        let passed = RuleResult::from_matches(&rule(None, None), vec![record(1)]);
        assert!(passed.passed());
        assert_eq!(passed.total, 1);
    }

    #[test]
    fn floor_only_never_fails_on_many_matches() {
        let many = (1..=500).map(record).collect();
        assert!(RuleResult::from_matches(&rule(Some(1), None), many).passed());
    }

    #[test]
    fn max_breach_is_reported() {
        let result = RuleResult::from_matches(&rule(Some(0), Some(1)), vec![record(1), record(2)]);
        assert_eq!(result.violated(), Some(Bound::Max));
    }

    #[test]
    fn any_problem_fails_the_run() {
        let ok = RuleResult::from_matches(&rule(None, None), vec![record(1)]);
        assert!(RunReport::compose(vec![ok.clone()], Vec::new(), Vec::new(), 1).passed);

        let rejected = RunReport::compose(vec![ok.clone()], Vec::new(), vec!["/nope".into()], 1);
        assert!(!rejected.passed);
        assert_eq!(rejected.exit_status().code(), 1);

        let parse = ParseError::syntax("/p/b.py".into(), 1, 1, "invalid syntax");
        assert!(!RunReport::compose(vec![ok.clone()], vec![parse], Vec::new(), 2).passed);

        let errored = RuleResult::errored(&rule(None, None), "bad");
        let report = RunReport::compose(vec![ok, errored], Vec::new(), Vec::new(), 1);
        assert!(!report.passed);
        assert_eq!(
            report.summary(),
            Summary {
                passed: 1,
                failed: 0,
                errored: 1
            }
        );
    }

    #[test]
    fn empty_rule_list_passes_when_clean() {
        let report = RunReport::compose(Vec::new(), Vec::new(), Vec::new(), 0);
        assert!(report.passed);
        assert_eq!(report.exit_status(), ExitStatus::Success);
    }

    #[test]
    fn outcome_serializes_inline() {
        let result = RuleResult::from_matches(&rule(None, None), Vec::new());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["violated"], "min");
        assert_eq!(json["count"]["min"], serde_json::Value::Null);
    }
}
