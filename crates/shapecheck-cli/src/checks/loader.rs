//! DTO → rule conversion with validation.

use std::path::{Path, PathBuf};

use shapecheck_core::{Cardinality, ModelError, Rule, RuleSet};

use super::dto::{CheckDto, ChecksFileDto, CountDto};

/// Errors while loading checks files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The checks file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not a valid checks document.
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// The checks file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// A field-level validation error.
    #[error("{context}: {source}")]
    Validation {
        /// Where the error occurred (e.g., "checks[2].count").
        context: String,
        /// The underlying model error.
        source: ModelError,
    },

    /// A bound was negative.
    #[error("{context}: must be a non-negative integer, got {value}")]
    Negative {
        /// Where the error occurred (e.g., "checks[0].count.min").
        context: String,
        /// The offending value.
        value: i64,
    },

    /// An error inside a specific checks file.
    #[error("{}: {source}", path.display())]
    InFile {
        /// The checks file.
        path: PathBuf,
        /// What went wrong.
        source: Box<LoadError>,
    },
}

/// Converts a checks document to validated rules in declaration order.
fn convert(dto: ChecksFileDto) -> Result<Vec<Rule>, LoadError> {
    dto.checks
        .into_iter()
        .enumerate()
        .map(|(i, check)| convert_check(check, i))
        .collect()
}

fn parse(text: &str, path: &Path) -> Result<ChecksFileDto, LoadError> {
    serde_yaml::from_str(text).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and concatenates checks files in order.
///
/// # Errors
///
/// Returns the first read, parse or validation error. Duplicate keys are
/// detected across all files.
pub fn load_files(paths: &[PathBuf]) -> Result<RuleSet, LoadError> {
    let mut rules = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let dto = parse(&text, path)?;
        let converted = convert(dto).map_err(|e| LoadError::InFile {
            path: path.clone(),
            source: Box::new(e),
        })?;
        tracing::debug!("Loaded {} check(s) from {}", converted.len(), path.display());
        rules.extend(converted);
    }
    RuleSet::new(rules).map_err(|source| LoadError::Validation {
        context: "checks".to_string(),
        source,
    })
}

fn convert_check(dto: CheckDto, index: usize) -> Result<Rule, LoadError> {
    let ctx = format!("checks[{index}]");
    let count = dto
        .count
        .map(|c| convert_count(c, &ctx))
        .transpose()?
        .unwrap_or_default();

    if count.is_unsatisfiable() {
        tracing::warn!(
            "{ctx}: count {count} can never be satisfied; rule `{}` will always fail",
            dto.name
        );
    }

    let rule = Rule::new(dto.name, dto.code, dto.id, dto.pattern).map_err(|source| {
        let context = match &source {
            ModelError::EmptyField { field } => format!("{ctx}.{field}"),
            _ => ctx.clone(),
        };
        LoadError::Validation { context, source }
    })?;
    Ok(rule.with_count(count))
}

fn convert_count(dto: CountDto, ctx: &str) -> Result<Cardinality, LoadError> {
    let min = non_negative(dto.min, || format!("{ctx}.count.min"))?;
    let max = non_negative(dto.max, || format!("{ctx}.count.max"))?;
    Cardinality::new(min, max).map_err(|source| LoadError::Validation {
        context: format!("{ctx}.count"),
        source,
    })
}

fn non_negative(
    value: Option<i64>,
    context: impl FnOnce() -> String,
) -> Result<Option<u64>, LoadError> {
    match value {
        Some(v) => u64::try_from(v).map(Some).map_err(|_| LoadError::Negative {
            context: context(),
            value: v,
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(yaml: &str) -> Result<RuleSet, LoadError> {
        let rules = convert(parse(yaml, Path::new("checks.yml"))?)?;
        RuleSet::new(rules).map_err(|source| LoadError::Validation {
            context: "checks".to_string(),
            source,
        })
    }

    #[test]
    fn absent_count_defaults_to_at_least_one() {
        let rules = load_str(
            "checks:\n  - {name: classes, code: CDF, id: C001, pattern: './/ClassDef'}\n",
        )
        .unwrap();
        let rule = &rules.rules()[0];
        assert_eq!(rule.count(), Cardinality::default());
        assert_eq!(rule.count().effective_min(), 1);
        assert_eq!(rule.pattern(), ".//ClassDef");
    }

    #[test]
    fn explicit_nulls_match_absent_bounds() {
        let rules = load_str(
            "checks:\n  - {name: a, code: A, id: '1', pattern: '//X', count: {min: null, max: null}}\n",
        )
        .unwrap();
        assert_eq!(rules.rules()[0].count(), Cardinality::default());
    }

    #[test]
    fn negative_bound_reports_its_location() {
        let err = load_str(
            "checks:\n  - {name: a, code: A, id: '1', pattern: '//X'}\n  - {name: b, code: A, id: '2', pattern: '//Y', count: {min: -1}}\n",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "checks[1].count.min: must be a non-negative integer, got -1"
        );
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = load_str(
            "checks:\n  - {name: a, code: A, id: '1', pattern: '//X', count: {min: 3, max: 1}}\n",
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("checks[0].count:"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let err = load_str("checks:\n  - {name: a, code: A, id: '1', pattern: '  '}\n").unwrap_err();
        assert_eq!(err.to_string(), "checks[0].pattern: `pattern` must not be empty");
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = load_str(
            "checks:\n  - {name: a, code: A, id: '1', pattern: '//X'}\n  - {name: b, code: A, id: '1', pattern: '//Y'}\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Validation {
                source: ModelError::DuplicateRule { .. },
                ..
            }
        ));
    }

    #[test]
    fn unsatisfiable_range_still_loads() {
        let rules =
            load_str("checks:\n  - {name: a, code: A, id: '1', pattern: '//X', count: {max: 0}}\n")
                .unwrap();
        assert!(rules.rules()[0].count().is_unsatisfiable());
    }

    #[test]
    fn empty_checks_list_is_legal() {
        assert!(load_str("checks: []\n").unwrap().is_empty());
    }

    #[test]
    fn files_concatenate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yml");
        let second = dir.path().join("b.yml");
        std::fs::write(&first, "checks:\n  - {name: a, code: A, id: '1', pattern: '//X'}\n")
            .unwrap();
        std::fs::write(&second, "checks:\n  - {name: b, code: B, id: '1', pattern: '//Y'}\n")
            .unwrap();

        let rules = load_files(&[second, first]).unwrap();
        let codes: Vec<&str> = rules.iter().map(Rule::code).collect();
        assert_eq!(codes, vec!["B", "A"]);
    }

    #[test]
    fn errors_name_the_offending_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        std::fs::write(&path, "checks:\n  - {name: '', code: A, id: '1', pattern: '//X'}\n")
            .unwrap();

        let err = load_files(&[path]).unwrap_err();
        assert!(matches!(err, LoadError::InFile { .. }));
        assert!(err.to_string().contains("bad.yml: checks[0].name"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_files(&[PathBuf::from("/nonexistent/checks.yml")]).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
