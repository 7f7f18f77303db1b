//! Validated rule model.
//!
//! This module contains no serde and no I/O. Checks loaders build [`Rule`]s
//! through the constructors here, which enforce every invariant once.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────

/// Invariant violations detected while building rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A required text field is empty.
    #[error("`{field}` must not be empty")]
    EmptyField {
        /// Field name (`name`, `code`, `id`, `pattern`).
        field: &'static str,
    },

    /// `min` is greater than `max`.
    #[error("min ({min}) must not exceed max ({max})")]
    InvertedBounds {
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// Two rules share the same `code`/`id` pair.
    #[error("duplicate rule {key}")]
    DuplicateRule {
        /// The repeated key.
        key: RuleKey,
    },
}

// ────────────────────────────────────────────
// Cardinality
// ────────────────────────────────────────────

/// The permitted range for a rule's total match count.
///
/// An absent `min` means "at least one"; an absent `max` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Cardinality {
    /// Lower bound as configured.
    pub min: Option<u64>,
    /// Upper bound as configured.
    pub max: Option<u64>,
}

/// Which side of a [`Cardinality`] a count fell outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    /// Fewer matches than `min`.
    Min,
    /// More matches than `max`.
    Max,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

impl Cardinality {
    /// The default lower bound when `min` is absent.
    pub const DEFAULT_MIN: u64 = 1;

    /// Creates a cardinality, rejecting `min > max`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvertedBounds`] when both bounds are present
    /// and `min` exceeds `max`.
    pub fn new(min: Option<u64>, max: Option<u64>) -> Result<Self, ModelError> {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(ModelError::InvertedBounds { min, max });
            }
        }
        Ok(Self { min, max })
    }

    /// The lower bound actually applied.
    #[must_use]
    pub fn effective_min(&self) -> u64 {
        self.min.unwrap_or(Self::DEFAULT_MIN)
    }

    /// Returns the bound `count` violates, if any. `min` is checked first.
    #[must_use]
    pub fn check(&self, count: u64) -> Option<Bound> {
        if count < self.effective_min() {
            return Some(Bound::Min);
        }
        match self.max {
            Some(max) if count > max => Some(Bound::Max),
            _ => None,
        }
    }

    /// Whether no count can satisfy this range.
    ///
    /// Only possible when `min` is absent and `max` is below the default.
    #[must_use]
    pub fn is_unsatisfiable(&self) -> bool {
        self.max.is_some_and(|max| max < self.effective_min())
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {max}]", self.effective_min()),
            None => write!(f, "[{}, ∞)", self.effective_min()),
        }
    }
}

// ────────────────────────────────────────────
// Rule
// ────────────────────────────────────────────

/// Identity of a rule: its `code`/`id` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RuleKey {
    /// Category code, e.g. `CDF`.
    pub code: String,
    /// Identifier, e.g. `C001`.
    pub id: String,
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.code, self.id)
    }
}

/// A structural check: a pattern and how often it must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    name: String,
    key: RuleKey,
    pattern: String,
    count: Cardinality,
}

impl Rule {
    /// Creates a rule requiring at least one match.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyField`] if any text field is empty or
    /// whitespace.
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        id: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let name = non_empty("name", name.into())?;
        let code = non_empty("code", code.into())?;
        let id = non_empty("id", id.into())?;
        let pattern = non_empty("pattern", pattern.into())?;
        Ok(Self {
            name,
            key: RuleKey { code, id },
            pattern,
            count: Cardinality::default(),
        })
    }

    /// Replaces the cardinality constraint.
    #[must_use]
    pub fn with_count(mut self, count: Cardinality) -> Self {
        self.count = count;
        self
    }

    /// Human label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.key.code
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// The `code`/`id` pair.
    #[must_use]
    pub fn key(&self) -> &RuleKey {
        &self.key
    }

    /// Pattern expression text.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Cardinality constraint.
    #[must_use]
    pub fn count(&self) -> Cardinality {
        self.count
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, ModelError> {
    if value.trim().is_empty() {
        Err(ModelError::EmptyField { field })
    } else {
        Ok(value)
    }
}

// ────────────────────────────────────────────
// RuleSet
// ────────────────────────────────────────────

/// Rules in declaration order with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Creates a rule set, rejecting duplicate `code`/`id` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateRule`] for the first repeated key.
    pub fn new(rules: Vec<Rule>) -> Result<Self, ModelError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.key()) {
                return Err(ModelError::DuplicateRule {
                    key: rule.key().clone(),
                });
            }
        }
        Ok(Self { rules })
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates rules in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(code: &str, id: &str) -> Rule {
        Rule::new("classes", code, id, ".//ClassDef").unwrap()
    }

    #[test]
    fn absent_min_requires_one_match() {
        let count = Cardinality::default();
        assert_eq!(count.check(0), Some(Bound::Min));
        assert_eq!(count.check(1), None);
        assert_eq!(count.check(10_000), None);
    }

    #[test]
    fn explicit_zero_min_without_max_always_passes() {
        let count = Cardinality::new(Some(0), None).unwrap();
        assert_eq!(count.check(0), None);
        assert_eq!(count.check(u64::MAX), None);
        assert!(!count.is_unsatisfiable());
    }

    #[test]
    fn max_is_inclusive() {
        let count = Cardinality::new(Some(1), Some(2)).unwrap();
        assert_eq!(count.check(2), None);
        assert_eq!(count.check(3), Some(Bound::Max));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert_eq!(
            Cardinality::new(Some(3), Some(2)),
            Err(ModelError::InvertedBounds { min: 3, max: 2 })
        );
    }

    #[test]
    fn max_below_default_min_is_unsatisfiable() {
        let count = Cardinality::new(None, Some(0)).unwrap();
        assert!(count.is_unsatisfiable());
        assert_eq!(count.check(0), Some(Bound::Min));
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert_eq!(
            Rule::new("x", "C", "1", "  "),
            Err(ModelError::EmptyField { field: "pattern" })
        );
        assert_eq!(
            Rule::new("", "C", "1", ".//If"),
            Err(ModelError::EmptyField { field: "name" })
        );
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = RuleSet::new(vec![rule("CDF", "C001"), rule("CDF", "C001")]).unwrap_err();
        assert_eq!(err.to_string(), "duplicate rule CDF/C001");
        assert!(RuleSet::new(vec![rule("CDF", "C001"), rule("CDF", "C002")]).is_ok());
    }

    #[test]
    fn cardinality_display() {
        assert_eq!(Cardinality::default().to_string(), "[1, ∞)");
        assert_eq!(
            Cardinality::new(Some(0), Some(3)).unwrap().to_string(),
            "[0, 3]"
        );
    }
}
