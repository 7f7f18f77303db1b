//! Expression evaluation over a [`SyntaxTree`].

use std::cell::RefCell;
use std::collections::HashMap;

use regex::Regex;

use super::functions;
use super::parser::{Axis, BinaryOp, Expr, NodeTest, Step};
use super::QueryError;
use crate::tree::{NodeId, SyntaxTree};

/// A node reachable by the evaluator: an element (or the document) or one of
/// an element's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NodeRef {
    Node(NodeId),
    Attr(NodeId, u32),
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Nodes(Vec<NodeRef>),
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    pub node: NodeRef,
    pub position: usize,
    pub size: usize,
}

pub(crate) struct Evaluator<'t> {
    pub tree: &'t SyntaxTree,
    regexes: RefCell<HashMap<String, Regex>>,
}

impl<'t> Evaluator<'t> {
    pub fn new(tree: &'t SyntaxTree) -> Self {
        Self {
            tree,
            regexes: RefCell::new(HashMap::new()),
        }
    }

    /// Evaluates `expr` with the tree's top element as context node.
    pub fn evaluate_root(&self, expr: &Expr) -> Result<Value, QueryError> {
        let start = self
            .tree
            .root_element()
            .unwrap_or_else(|| self.tree.document());
        let ctx = Context {
            node: NodeRef::Node(start),
            position: 1,
            size: 1,
        };
        self.eval(expr, &ctx)
    }

    pub fn eval(&self, expr: &Expr, ctx: &Context) -> Result<Value, QueryError> {
        match expr {
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Negate(inner) => {
                let value = self.eval(inner, ctx)?;
                Ok(Value::Number(-self.to_number(&value)))
            }
            Expr::Function(name, args) => functions::call(self, name, args, ctx),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    NodeRef::Node(self.tree.document())
                } else {
                    ctx.node
                };
                Ok(Value::Nodes(self.eval_steps(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let value = self.eval(primary, ctx)?;
                let Value::Nodes(mut nodes) = value else {
                    return Err(QueryError::eval(
                        "predicates and paths can only follow a node-set",
                    ));
                };
                self.sort_dedup(&mut nodes);
                for predicate in predicates {
                    nodes = self.apply_predicate(nodes, predicate)?;
                }
                Ok(Value::Nodes(self.eval_steps(nodes, steps)?))
            }
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, ctx),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ctx: &Context,
    ) -> Result<Value, QueryError> {
        match op {
            BinaryOp::Or => {
                let l = self.eval(left, ctx)?;
                if self.to_bool(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval(right, ctx)?;
                Ok(Value::Bool(self.to_bool(&r)))
            }
            BinaryOp::And => {
                let l = self.eval(left, ctx)?;
                if !self.to_bool(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval(right, ctx)?;
                Ok(Value::Bool(self.to_bool(&r)))
            }
            BinaryOp::Union => {
                let (Value::Nodes(mut l), Value::Nodes(r)) =
                    (self.eval(left, ctx)?, self.eval(right, ctx)?)
                else {
                    return Err(QueryError::eval("`|` operands must be node-sets"));
                };
                l.extend(r);
                self.sort_dedup(&mut l);
                Ok(Value::Nodes(l))
            }
            BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                Ok(Value::Bool(self.compare(op, &l, &r)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                let (a, b) = (self.to_number(&l), self.to_number(&r));
                Ok(Value::Number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
        }
    }

    fn eval_steps(&self, start: Vec<NodeRef>, steps: &[Step]) -> Result<Vec<NodeRef>, QueryError> {
        let mut current = start;
        for step in steps {
            let mut next = Vec::new();
            for node in &current {
                let mut candidates: Vec<NodeRef> = self
                    .axis(*node, step.axis)
                    .into_iter()
                    .filter(|n| self.node_test(*n, step))
                    .collect();
                for predicate in &step.predicates {
                    candidates = self.apply_predicate(candidates, predicate)?;
                }
                next.extend(candidates);
            }
            self.sort_dedup(&mut next);
            current = next;
        }
        Ok(current)
    }

    fn apply_predicate(
        &self,
        nodes: Vec<NodeRef>,
        predicate: &Expr,
    ) -> Result<Vec<NodeRef>, QueryError> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, &ctx)? {
                #[allow(clippy::cast_precision_loss)]
                Value::Number(n) => (n - (i + 1) as f64).abs() < f64::EPSILON,
                other => self.to_bool(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes along `axis` from `node`, in proximity order.
    fn axis(&self, node: NodeRef, axis: Axis) -> Vec<NodeRef> {
        let tree = self.tree;
        let wrap = |ids: &[NodeId]| ids.iter().map(|n| NodeRef::Node(*n)).collect::<Vec<_>>();
        match (axis, node) {
            (Axis::SelfAxis, _) => vec![node],
            (Axis::Child, NodeRef::Node(id)) => wrap(tree.children(id)),
            (Axis::Descendant, NodeRef::Node(id)) => wrap(tree.descendants(id)),
            (Axis::DescendantOrSelf, NodeRef::Node(id)) => {
                let mut out = vec![node];
                out.extend(wrap(tree.descendants(id)));
                out
            }
            (Axis::DescendantOrSelf, NodeRef::Attr(..)) => vec![node],
            (Axis::Parent, NodeRef::Node(id)) => {
                tree.parent(id).map(NodeRef::Node).into_iter().collect()
            }
            (Axis::Parent, NodeRef::Attr(owner, _)) => vec![NodeRef::Node(owner)],
            (Axis::Ancestor | Axis::AncestorOrSelf, _) => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(node);
                }
                let mut current = match node {
                    NodeRef::Node(id) => tree.parent(id),
                    NodeRef::Attr(owner, _) => Some(owner),
                };
                while let Some(id) = current {
                    out.push(NodeRef::Node(id));
                    current = tree.parent(id);
                }
                out
            }
            (Axis::FollowingSibling | Axis::PrecedingSibling, NodeRef::Node(id)) => {
                let Some(parent) = tree.parent(id) else {
                    return Vec::new();
                };
                let siblings = tree.children(parent);
                let Some(index) = siblings.iter().position(|s| *s == id) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    wrap(&siblings[index + 1..])
                } else {
                    siblings[..index]
                        .iter()
                        .rev()
                        .map(|n| NodeRef::Node(*n))
                        .collect()
                }
            }
            (Axis::Following, NodeRef::Node(id)) => wrap(tree.following(id)),
            (Axis::Following, NodeRef::Attr(owner, _)) => {
                let mut out = wrap(tree.descendants(owner));
                out.extend(wrap(tree.following(owner)));
                out
            }
            (Axis::Preceding, NodeRef::Node(id) | NodeRef::Attr(id, _)) => {
                wrap(&tree.preceding(id))
            }
            (Axis::Attribute, NodeRef::Node(id)) if !tree.is_document(id) => {
                let count = u32::try_from(tree.attributes(id).len()).unwrap_or(u32::MAX);
                (0..count).map(|i| NodeRef::Attr(id, i)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn node_test(&self, node: NodeRef, step: &Step) -> bool {
        match (&step.test, node) {
            (NodeTest::AnyNode, _) => true,
            (NodeTest::Never, _) => false,
            (NodeTest::Wildcard, NodeRef::Attr(..)) => step.axis == Axis::Attribute,
            (NodeTest::Name(name), NodeRef::Attr(owner, index)) => {
                step.axis == Axis::Attribute && self.attr_name(owner, index) == name
            }
            (_, NodeRef::Node(id)) if step.axis == Axis::Attribute || self.tree.is_document(id) => {
                false
            }
            (NodeTest::Wildcard, NodeRef::Node(_)) => true,
            (NodeTest::Name(name), NodeRef::Node(id)) => self.tree.tag(id) == name,
        }
    }

    fn attr_name(&self, owner: NodeId, index: u32) -> &str {
        self.tree
            .attributes(owner)
            .get(index as usize)
            .map_or("", |a| a.name.as_str())
    }

    fn order_key(&self, node: NodeRef) -> (u32, u32) {
        match node {
            NodeRef::Node(id) => (self.tree.rank(id), 0),
            NodeRef::Attr(id, index) => (self.tree.rank(id), index + 1),
        }
    }

    pub fn sort_dedup(&self, nodes: &mut Vec<NodeRef>) {
        nodes.sort_by_key(|n| self.order_key(*n));
        nodes.dedup();
    }

    /// Name of a node as reported by `name()`.
    pub fn node_name(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Node(id) => self.tree.tag(id).to_string(),
            NodeRef::Attr(owner, index) => self.attr_name(owner, index).to_string(),
        }
    }

    /// String-value of a node. Elements carry no text, only attributes do.
    pub fn string_value(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Node(_) => String::new(),
            NodeRef::Attr(owner, index) => self
                .tree
                .attributes(owner)
                .get(index as usize)
                .map_or_else(String::new, |a| a.value.clone()),
        }
    }

    pub fn to_bool(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => parse_number(s),
            Value::Nodes(_) => parse_number(&self.to_string_value(value)),
        }
    }

    pub fn to_string_value(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Nodes(nodes) => {
                let mut sorted = nodes.clone();
                self.sort_dedup(&mut sorted);
                sorted
                    .first()
                    .map_or_else(String::new, |n| self.string_value(*n))
            }
        }
    }

    fn compare(&self, op: BinaryOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
                let sx = self.string_value(*x);
                b.iter().any(|y| compare_strings(op, &sx, &self.string_value(*y)))
            }),
            (Value::Nodes(nodes), other) => self.compare_nodes(op, nodes, other),
            (other, Value::Nodes(nodes)) => self.compare_nodes(flip(op), nodes, other),
            _ => self.compare_atomic(op, left, right),
        }
    }

    fn compare_nodes(&self, op: BinaryOp, nodes: &[NodeRef], other: &Value) -> bool {
        match other {
            Value::Bool(b) => compare_atomic_bool(op, !nodes.is_empty(), *b),
            Value::Number(n) => nodes
                .iter()
                .any(|x| compare_numbers(op, parse_number(&self.string_value(*x)), *n)),
            Value::Str(s) => nodes
                .iter()
                .any(|x| compare_strings(op, &self.string_value(*x), s)),
            Value::Nodes(_) => false,
        }
    }

    fn compare_atomic(&self, op: BinaryOp, left: &Value, right: &Value) -> bool {
        if matches!(op, BinaryOp::Eq | BinaryOp::Neq) {
            if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
                return compare_atomic_bool(op, self.to_bool(left), self.to_bool(right));
            }
            if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                return compare_numbers(op, self.to_number(left), self.to_number(right));
            }
            return compare_strings(op, &self.to_string_value(left), &self.to_string_value(right));
        }
        compare_numbers(op, self.to_number(left), self.to_number(right))
    }

    /// Compiles (once per evaluation) and returns a regex.
    pub fn regex(&self, pattern: &str, flags: &str) -> Result<Regex, QueryError> {
        let key = format!("{flags}\u{0}{pattern}");
        if let Some(re) = self.regexes.borrow().get(&key) {
            return Ok(re.clone());
        }
        let re = build_regex(pattern, flags)?;
        self.regexes.borrow_mut().insert(key, re.clone());
        Ok(re)
    }
}

/// Builds a regex for `re:test`/`re:match` with XPath-style flags.
pub(crate) fn build_regex(pattern: &str, flags: &str) -> Result<Regex, QueryError> {
    let mut builder = regex::RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'g' => &mut builder,
            other => {
                return Err(QueryError::eval(format!("unknown regex flag `{other}`")));
            }
        };
    }
    builder
        .build()
        .map_err(|e| QueryError::eval(format!("invalid regex `{pattern}`: {e}")))
}

fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    }
}

fn compare_strings(op: BinaryOp, a: &str, b: &str) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Neq => a != b,
        _ => compare_numbers(op, parse_number(a), parse_number(b)),
    }
}

fn compare_atomic_bool(op: BinaryOp, a: bool, b: bool) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Neq => a != b,
        _ => compare_numbers(op, f64::from(u8::from(a)), f64::from(u8::from(b))),
    }
}

#[allow(clippy::float_cmp)]
fn compare_numbers(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Neq => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        _ => false,
    }
}

/// XPath `number()` conversion: optional sign, digits, optional fraction.
pub(crate) fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits != ".";
    if !valid {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// XPath number-to-string conversion.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        return format!("{}", n as i64);
    }
    format!("{n}")
}
