//! YAML deserialization types for checks files.
//!
//! These types exist solely for serde deserialization.
//! They are converted to validated rules via the loader.

use serde::Deserialize;

/// Raw representation of a checks file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecksFileDto {
    /// Ordered rule definitions.
    pub checks: Vec<CheckDto>,
}

/// One rule as written in YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckDto {
    /// Human label.
    pub name: String,
    /// Short category code (e.g., "CDF").
    pub code: String,
    /// Identifier, unique together with `code` (e.g., "C001").
    pub id: String,
    /// Structural query expression.
    pub pattern: String,
    /// Optional match-count bounds.
    #[serde(default)]
    pub count: Option<CountDto>,
}

/// Raw bounds. Signed so negative values can be reported with context.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CountDto {
    /// Lower bound; `null` or absent means the default.
    #[serde(default)]
    pub min: Option<i64>,
    /// Upper bound; `null` or absent means unbounded.
    #[serde(default)]
    pub max: Option<i64>,
}
