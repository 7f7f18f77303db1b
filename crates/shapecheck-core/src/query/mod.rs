//! Tree-query engine implementing a subset of XPath 1.0.
//!
//! Expressions are compiled once into an [`XPath`] and evaluated against any
//! number of [`SyntaxTree`]s. Evaluation starts at the tree's top element, so
//! `.//ClassDef` and `//ClassDef` select the same nodes.
//!
//! ```
//! use shapecheck_core::query::XPath;
//! use shapecheck_core::tree::{NodeId, TreeBuilder};
//!
//! let mut builder = TreeBuilder::new();
//! let module = builder.element(NodeId::DOCUMENT, "Module");
//! let class = builder.element(module, "ClassDef");
//! builder.attribute(class, "name", "Widget");
//! let tree = builder.finish();
//!
//! let query = XPath::compile(".//ClassDef[@name = 'Widget']").unwrap();
//! assert_eq!(query.select(&tree).unwrap().len(), 1);
//! ```

mod eval;
mod functions;
mod lexer;
mod parser;

use std::fmt;

use crate::tree::{NodeId, SyntaxTree};
use eval::{Evaluator, NodeRef, Value};
use parser::{BinaryOp, Expr, Step};

/// Error raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// What went wrong.
    pub message: String,
    /// Byte offset in the expression, when the error is syntactic.
    pub offset: Option<usize>,
}

impl QueryError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset: Some(offset),
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at offset {offset})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for QueryError {}

/// A node selected by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// The selected element, or the element owning the selected attribute.
    pub node: NodeId,
    /// Index into the owner's attributes when an attribute was selected.
    pub attribute: Option<usize>,
}

/// A compiled query expression.
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    /// Parses `source` and checks every function call it contains.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] for syntax errors, unsupported constructs,
    /// calls to unknown functions or with the wrong number of arguments,
    /// invalid literal regexes, and expressions that cannot yield a node-set.
    pub fn compile(source: &str) -> Result<Self, QueryError> {
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(&tokens, source.len())?;
        check_functions(&expr)?;
        if let Some(found) = scalar_kind(&expr) {
            return Err(QueryError::eval(format!(
                "expression evaluates to a {found}, not a node-set"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The expression text this query was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluates the query and returns the selected nodes in document order.
    ///
    /// # Errors
    ///
    /// Fails when the expression does not produce a node-set, or when a
    /// runtime check (type mismatch, invalid regex) fails.
    pub fn select(&self, tree: &SyntaxTree) -> Result<Vec<Selection>, QueryError> {
        let evaluator = Evaluator::new(tree);
        let value = evaluator.evaluate_root(&self.expr)?;
        let Value::Nodes(mut nodes) = value else {
            return Err(QueryError::eval(format!(
                "expression evaluates to a {}, not a node-set",
                kind(&value)
            )));
        };
        evaluator.sort_dedup(&mut nodes);
        Ok(nodes
            .into_iter()
            .map(|n| match n {
                NodeRef::Node(node) => Selection {
                    node,
                    attribute: None,
                },
                NodeRef::Attr(node, index) => Selection {
                    node,
                    attribute: Some(index as usize),
                },
            })
            .collect())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Nodes(_) => "node-set",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
    }
}

fn check_functions(expr: &Expr) -> Result<(), QueryError> {
    match expr {
        Expr::Binary(_, left, right) => {
            check_functions(left)?;
            check_functions(right)
        }
        Expr::Negate(inner) => check_functions(inner),
        Expr::Literal(_) | Expr::Number(_) => Ok(()),
        Expr::Function(name, args) => {
            functions::check_call(name, args.len()).map_err(QueryError::eval)?;
            if matches!(name.as_str(), "re:test" | "re:match") {
                check_regex_literals(args)?;
            }
            args.iter().try_for_each(check_functions)
        }
        Expr::Path { steps, .. } => check_steps(steps),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            check_functions(primary)?;
            predicates.iter().try_for_each(check_functions)?;
            check_steps(steps)
        }
    }
}

/// Literal pattern and flag arguments are compiled up front.
fn check_regex_literals(args: &[Expr]) -> Result<(), QueryError> {
    let flags = match args.get(2) {
        None => "",
        Some(Expr::Literal(flags)) => flags,
        Some(_) => return Ok(()),
    };
    let pattern = match args.get(1) {
        Some(Expr::Literal(pattern)) => pattern,
        _ => "",
    };
    eval::build_regex(pattern, flags).map(|_| ())
}

/// The static type of `expr` when it can never be a node-set.
///
/// No supported function returns a node-set, so any call, literal or
/// operator other than `|` is scalar.
fn scalar_kind(expr: &Expr) -> Option<&'static str> {
    match expr {
        Expr::Path { .. } => None,
        Expr::Filter { primary, .. } => scalar_kind(primary),
        Expr::Binary(BinaryOp::Union, left, right) => scalar_kind(left).or(scalar_kind(right)),
        Expr::Binary(
            BinaryOp::Or
            | BinaryOp::And
            | BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge,
            ..,
        ) => Some("boolean"),
        Expr::Binary(..) | Expr::Negate(_) | Expr::Number(_) => Some("number"),
        Expr::Literal(_) => Some("string"),
        Expr::Function(name, _) => Some(functions::result_kind(name)),
    }
}

fn check_steps(steps: &[Step]) -> Result<(), QueryError> {
    steps
        .iter()
        .flat_map(|s| s.predicates.iter())
        .try_for_each(check_functions)
}
