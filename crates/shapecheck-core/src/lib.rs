//! # shapecheck-core
//!
//! Rule evaluation engine for structural style checks.
//!
//! Source files are parsed into element trees by an [`Extractor`], rules
//! select nodes with path patterns through a [`PatternMatcher`], and each
//! rule's total match count is checked against its [`Cardinality`]. The
//! outcome of a run is a [`RunReport`].
//!
//! - [`Analyzer`] orchestrates discovery, parsing, matching and verdicts
//! - [`Rule`] and [`RuleSet`] hold validated checks
//! - [`XPathMatcher`] is the default pattern engine (XPath 1.0 subset)
//! - [`SyntaxTree`] is the queryable tree model
//!
//! ## Example
//!
//! ```ignore
//! use shapecheck_core::{Analyzer, Rule};
//! use shapecheck_python::PythonExtractor;
//!
//! let analyzer = Analyzer::builder()
//!     .root("./src")
//!     .extractor(PythonExtractor::new())
//!     .rule(Rule::new("classes", "CDF", "C001", ".//ClassDef")?)
//!     .build()?;
//!
//! let report = analyzer.analyze()?;
//! std::process::exit(report.exit_status().code());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod aggregator;
mod analyzer;
mod extractor;
mod locator;
mod matcher;
mod rule;
mod source;
mod types;
mod verdict;

/// Tree-query engine.
pub mod query;
/// Element tree model.
pub mod tree;

pub use aggregator::Aggregator;
pub use analyzer::{Analyzer, AnalyzerBuilder, AnalyzerError, BuildError};
pub use extractor::{Extractor, ExtractorBox, SyntaxError};
pub use locator::{Located, SourceLocator};
pub use matcher::{ExpressionError, Pattern, PatternMatcher, XPathMatcher};
pub use rule::{Bound, Cardinality, ModelError, Rule, RuleKey, RuleSet};
pub use source::{Interrupted, SourceFile, SourceSet};
pub use tree::{NodeId, SyntaxTree, TreeBuilder};
pub use types::{MatchRecord, ParseError, ParseErrorKind, SyntaxDiagnostic};
pub use verdict::{ExitStatus, RuleOutcome, RuleResult, RunReport, Summary};
