//! Lowers tree-sitter-python concrete trees into `ast`-shaped element trees.
//!
//! Element names follow Python's `ast` classes and their fields. Node lists
//! and single-node fields become wrapper elements (`body`, `orelse`, `value`,
//! ...) that are only emitted when non-empty; scalar fields and positions
//! become attributes.

use shapecheck_core::tree::{NodeId, Position, Span, SyntaxTree, TreeBuilder};
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Load,
    Store,
    Del,
}

impl Ctx {
    fn tag(self) -> &'static str {
        match self {
            Self::Load => "Load",
            Self::Store => "Store",
            Self::Del => "Del",
        }
    }
}

pub(crate) fn lower(root: Node<'_>, source: &str) -> SyntaxTree {
    let mut lowerer = Lowerer {
        src: source.as_bytes(),
        b: TreeBuilder::new(),
    };
    let module = lowerer.b.element(NodeId::DOCUMENT, "Module");
    lowerer.b.set_span(module, span_of(root));
    lowerer.field(module, "body", |l, body| l.statements(body, root));
    lowerer.b.finish()
}

fn span_of(node: Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(
        Position::new(start.row + 1, start.column),
        Position::new(end.row + 1, end.column),
    )
}

fn is_trivia(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "line_continuation")
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| !is_trivia(*c))
        .collect()
}

fn all_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, name: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(name, &mut cursor)
        .filter(|c| c.is_named() && !is_trivia(*c))
        .collect()
}

/// Named children paired with the grammar field they occupy.
fn fielded_children(node: Node<'_>) -> Vec<(Option<&'static str>, Node<'_>)> {
    let mut cursor = node.walk();
    let mut out = Vec::new();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() && !is_trivia(child) {
                out.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    all_children(node).iter().any(|c| c.kind() == token)
}

fn binary_op(token: &str) -> Option<&'static str> {
    Some(match token {
        "+" => "Add",
        "-" => "Sub",
        "*" => "Mult",
        "@" => "MatMult",
        "/" => "Div",
        "%" => "Mod",
        "**" => "Pow",
        "<<" => "LShift",
        ">>" => "RShift",
        "|" => "BitOr",
        "^" => "BitXor",
        "&" => "BitAnd",
        "//" => "FloorDiv",
        _ => return None,
    })
}

fn compare_op(token: &str) -> Option<&'static str> {
    Some(match token {
        "<" => "Lt",
        "<=" => "LtE",
        "==" => "Eq",
        "!=" | "<>" => "NotEq",
        ">" => "Gt",
        ">=" => "GtE",
        "in" => "In",
        "not in" => "NotIn",
        "is" => "Is",
        "is not" => "IsNot",
        _ => return None,
    })
}

/// `snake_case` grammar kinds to `CamelCase` tags for nodes without a
/// dedicated lowering.
fn camel_case(kind: &str) -> String {
    kind.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

/// Integer literal in decimal, as Python's `ast` reports it.
fn normalize_int(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u128::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u128::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u128::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<u128>().ok()
    };
    parsed.map_or(cleaned, |n| n.to_string())
}

/// Decodes backslash escapes of a non-raw string literal.
fn decode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == width => out.push(decoded),
                    _ => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&hex);
                    }
                }
            }
            '0'..='7' => {
                let mut digits = String::from(next);
                while digits.len() < 3 && chars.peek().is_some_and(|d| ('0'..='7').contains(d)) {
                    if let Some(d) = chars.next() {
                        digits.push(d);
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

enum Piece<'t> {
    Text(String),
    Interpolation(Node<'t>),
}

#[derive(Default)]
struct Params<'t> {
    posonly: Vec<Param<'t>>,
    args: Vec<Param<'t>>,
    vararg: Option<Param<'t>>,
    kwonly: Vec<Param<'t>>,
    kw_defaults: Vec<Node<'t>>,
    kwarg: Option<Param<'t>>,
    defaults: Vec<Node<'t>>,
}

#[derive(Clone, Copy)]
struct Param<'t> {
    node: Node<'t>,
    name: Node<'t>,
    annotation: Option<Node<'t>>,
}

struct Lowerer<'s> {
    src: &'s [u8],
    b: TreeBuilder,
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.src).unwrap_or("")
    }

    /// A positioned element.
    fn node(&mut self, parent: NodeId, tag: &str, node: Node<'_>) -> NodeId {
        let el = self.b.element(parent, tag);
        let span = span_of(node);
        self.b.attribute(el, "lineno", span.start.line.to_string());
        self.b.attribute(el, "col_offset", span.start.column.to_string());
        self.b.attribute(el, "end_lineno", span.end.line.to_string());
        self.b.attribute(el, "end_col_offset", span.end.column.to_string());
        self.b.set_span(el, span);
        el
    }

    /// A wrapper element that is dropped again if `fill` adds nothing.
    fn field<F>(&mut self, parent: NodeId, name: &str, fill: F)
    where
        F: FnOnce(&mut Self, NodeId),
    {
        let wrapper = self.b.element(parent, name);
        fill(self, wrapper);
        self.b.discard_if_empty(wrapper);
    }

    fn field_expr(&mut self, parent: NodeId, name: &str, node: Option<Node<'_>>, ctx: Ctx) {
        if let Some(node) = node {
            self.field(parent, name, |l, w| l.expr(w, node, ctx));
        }
    }

    fn field_exprs(&mut self, parent: NodeId, name: &str, nodes: &[Node<'_>], ctx: Ctx) {
        self.field(parent, name, |l, w| {
            for node in nodes {
                l.expr(w, *node, ctx);
            }
        });
    }

    fn field_block(&mut self, parent: NodeId, name: &str, block: Option<Node<'_>>) {
        if let Some(block) = block {
            self.field(parent, name, |l, w| l.statements(w, block));
        }
    }

    fn ctx(&mut self, parent: NodeId, ctx: Ctx) {
        let wrapper = self.b.element(parent, "ctx");
        self.b.element(wrapper, ctx.tag());
    }

    fn op(&mut self, parent: NodeId, tag: &str) {
        let wrapper = self.b.element(parent, "op");
        self.b.element(wrapper, tag);
    }

    /// `<name><item value="..."/></name>` for lists of identifiers.
    fn string_list(&mut self, parent: NodeId, name: &str, values: &[&str]) {
        self.field(parent, name, |l, w| {
            for value in values {
                let item = l.b.element(w, "item");
                l.b.attribute(item, "value", *value);
            }
        });
    }

    // ────────────────────────────────────────────
    // Statements
    // ────────────────────────────────────────────

    fn statements(&mut self, parent: NodeId, container: Node<'_>) {
        for child in named_children(container) {
            self.statement(parent, child);
        }
    }

    fn statement(&mut self, parent: NodeId, node: Node<'_>) {
        match node.kind() {
            "expression_statement" => self.expression_statement(parent, node),
            "return_statement" => {
                let el = self.node(parent, "Return", node);
                let value = named_children(node).into_iter().next();
                self.field_expr(el, "value", value, Ctx::Load);
            }
            "pass_statement" => {
                self.node(parent, "Pass", node);
            }
            "break_statement" => {
                self.node(parent, "Break", node);
            }
            "continue_statement" => {
                self.node(parent, "Continue", node);
            }
            "import_statement" => {
                let el = self.node(parent, "Import", node);
                let names = field_children(node, "name");
                self.field(el, "names", |l, w| {
                    for name in names {
                        l.alias(w, name);
                    }
                });
            }
            "import_from_statement" | "future_import_statement" => self.import_from(parent, node),
            "raise_statement" => {
                let el = self.node(parent, "Raise", node);
                let cause = node.child_by_field_name("cause");
                let exc = named_children(node)
                    .into_iter()
                    .find(|c| Some(*c) != cause);
                self.field_expr(el, "exc", exc, Ctx::Load);
                self.field_expr(el, "cause", cause, Ctx::Load);
            }
            "assert_statement" => {
                let el = self.node(parent, "Assert", node);
                let parts = named_children(node);
                self.field_expr(el, "test", parts.first().copied(), Ctx::Load);
                self.field_expr(el, "msg", parts.get(1).copied(), Ctx::Load);
            }
            "global_statement" | "nonlocal_statement" => {
                let tag = if node.kind() == "global_statement" {
                    "Global"
                } else {
                    "Nonlocal"
                };
                let el = self.node(parent, tag, node);
                let names: Vec<&str> = named_children(node)
                    .into_iter()
                    .map(|c| self.text(c))
                    .collect();
                self.string_list(el, "names", &names);
            }
            "delete_statement" => {
                let el = self.node(parent, "Delete", node);
                let targets: Vec<Node<'_>> = named_children(node)
                    .into_iter()
                    .flat_map(|c| {
                        if c.kind() == "expression_list" {
                            named_children(c)
                        } else {
                            vec![c]
                        }
                    })
                    .collect();
                self.field_exprs(el, "targets", &targets, Ctx::Del);
            }
            "if_statement" => {
                let alternatives = field_children(node, "alternative");
                self.if_chain(
                    parent,
                    node,
                    node.child_by_field_name("condition"),
                    node.child_by_field_name("consequence"),
                    &alternatives,
                );
            }
            "for_statement" => {
                let tag = if has_token(node, "async") { "AsyncFor" } else { "For" };
                let el = self.node(parent, tag, node);
                self.field_expr(el, "target", node.child_by_field_name("left"), Ctx::Store);
                self.field_expr(el, "iter", node.child_by_field_name("right"), Ctx::Load);
                self.field_block(el, "body", node.child_by_field_name("body"));
                self.else_clause(el, node.child_by_field_name("alternative"));
            }
            "while_statement" => {
                let el = self.node(parent, "While", node);
                self.field_expr(el, "test", node.child_by_field_name("condition"), Ctx::Load);
                self.field_block(el, "body", node.child_by_field_name("body"));
                self.else_clause(el, node.child_by_field_name("alternative"));
            }
            "try_statement" => self.try_statement(parent, node),
            "with_statement" => self.with_statement(parent, node),
            "function_definition" => self.function(parent, node, &[]),
            "class_definition" => self.class(parent, node, &[]),
            "decorated_definition" => {
                let decorators: Vec<Node<'_>> = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() == "decorator")
                    .filter_map(|d| named_children(d).into_iter().next())
                    .collect();
                match node.child_by_field_name("definition") {
                    Some(def) if def.kind() == "class_definition" => {
                        self.class(parent, def, &decorators);
                    }
                    Some(def) => self.function(parent, def, &decorators),
                    None => self.generic(parent, node),
                }
            }
            "match_statement" => self.match_statement(parent, node),
            "type_alias_statement" => {
                let el = self.node(parent, "TypeAlias", node);
                self.field_expr(el, "name", node.child_by_field_name("left"), Ctx::Store);
                self.field_expr(el, "value", node.child_by_field_name("right"), Ctx::Load);
            }
            "block" => self.statements(parent, node),
            _ => self.generic(parent, node),
        }
    }

    fn expression_statement(&mut self, parent: NodeId, node: Node<'_>) {
        let parts = named_children(node);
        match parts.as_slice() {
            [single] if single.kind() == "assignment" => self.assignment(parent, *single),
            [single] if single.kind() == "augmented_assignment" => {
                let el = self.node(parent, "AugAssign", *single);
                self.field_expr(el, "target", single.child_by_field_name("left"), Ctx::Store);
                if let Some(op) = single
                    .child_by_field_name("operator")
                    .and_then(|o| binary_op(o.kind().trim_end_matches('=')))
                {
                    self.op(el, op);
                }
                self.field_expr(el, "value", single.child_by_field_name("right"), Ctx::Load);
            }
            [single] => {
                let el = self.node(parent, "Expr", node);
                self.field_expr(el, "value", Some(*single), Ctx::Load);
            }
            [] => {}
            many => {
                let el = self.node(parent, "Expr", node);
                self.field(el, "value", |l, w| {
                    let tuple = l.node(w, "Tuple", node);
                    l.field_exprs(tuple, "elts", many, Ctx::Load);
                    l.ctx(tuple, Ctx::Load);
                });
            }
        }
    }

    fn assignment(&mut self, parent: NodeId, node: Node<'_>) {
        if let Some(annotation) = node.child_by_field_name("type") {
            let el = self.node(parent, "AnnAssign", node);
            let target = node.child_by_field_name("left");
            self.field_expr(el, "target", target, Ctx::Store);
            self.field_expr(el, "annotation", Some(annotation), Ctx::Load);
            self.field_expr(el, "value", node.child_by_field_name("right"), Ctx::Load);
            let simple = target.is_some_and(|t| t.kind() == "identifier");
            self.b.attribute(el, "simple", u8::from(simple).to_string());
            return;
        }

        // `a = b = c` nests assignments on the right-hand side.
        let mut targets = Vec::new();
        let mut current = node;
        let value = loop {
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(left);
            }
            match current.child_by_field_name("right") {
                Some(right)
                    if right.kind() == "assignment"
                        && right.child_by_field_name("type").is_none() =>
                {
                    current = right;
                }
                other => break other,
            }
        };
        let el = self.node(parent, "Assign", node);
        self.field_exprs(el, "targets", &targets, Ctx::Store);
        self.field_expr(el, "value", value, Ctx::Load);
    }

    fn import_from(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "ImportFrom", node);
        let mut level = 0;
        if node.kind() == "future_import_statement" {
            self.b.attribute(el, "module", "__future__");
        } else if let Some(module) = node.child_by_field_name("module_name") {
            if module.kind() == "relative_import" {
                for part in named_children(module) {
                    if part.kind() == "import_prefix" {
                        level = self.text(part).chars().filter(|c| *c == '.').count();
                    } else {
                        let name = dotted(self.text(part));
                        self.b.attribute(el, "module", name);
                    }
                }
            } else {
                let name = dotted(self.text(module));
                self.b.attribute(el, "module", name);
            }
        }
        let names = field_children(node, "name");
        let wildcard = named_children(node)
            .into_iter()
            .find(|c| c.kind() == "wildcard_import");
        self.field(el, "names", |l, w| {
            for name in names {
                l.alias(w, name);
            }
            if let Some(star) = wildcard {
                let alias = l.node(w, "alias", star);
                l.b.attribute(alias, "name", "*");
            }
        });
        self.b.attribute(el, "level", level.to_string());
    }

    fn alias(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "alias", node);
        if node.kind() == "aliased_import" {
            if let Some(name) = node.child_by_field_name("name") {
                let name = dotted(self.text(name));
                self.b.attribute(el, "name", name);
            }
            if let Some(asname) = node.child_by_field_name("alias") {
                let asname = self.text(asname);
                self.b.attribute(el, "asname", asname);
            }
        } else {
            let name = dotted(self.text(node));
            self.b.attribute(el, "name", name);
        }
    }

    fn if_chain(
        &mut self,
        parent: NodeId,
        node: Node<'_>,
        condition: Option<Node<'_>>,
        consequence: Option<Node<'_>>,
        rest: &[Node<'_>],
    ) {
        let el = self.node(parent, "If", node);
        self.field_expr(el, "test", condition, Ctx::Load);
        self.field_block(el, "body", consequence);
        self.field(el, "orelse", |l, w| match rest.split_first() {
            Some((elif, tail)) if elif.kind() == "elif_clause" => l.if_chain(
                w,
                *elif,
                elif.child_by_field_name("condition"),
                elif.child_by_field_name("consequence"),
                tail,
            ),
            Some((other, _)) => {
                if let Some(body) = other.child_by_field_name("body") {
                    l.statements(w, body);
                }
            }
            None => {}
        });
    }

    fn else_clause(&mut self, parent: NodeId, clause: Option<Node<'_>>) {
        let body = clause.and_then(|c| c.child_by_field_name("body"));
        self.field_block(parent, "orelse", body);
    }

    fn try_statement(&mut self, parent: NodeId, node: Node<'_>) {
        let children = named_children(node);
        let star = children.iter().any(|c| c.kind() == "except_group_clause");
        let el = self.node(parent, if star { "TryStar" } else { "Try" }, node);
        self.field_block(el, "body", node.child_by_field_name("body"));
        self.field(el, "handlers", |l, w| {
            for clause in children
                .iter()
                .filter(|c| matches!(c.kind(), "except_clause" | "except_group_clause"))
            {
                l.except_handler(w, *clause);
            }
        });
        let orelse = children
            .iter()
            .find(|c| c.kind() == "else_clause")
            .and_then(|c| c.child_by_field_name("body"));
        self.field_block(el, "orelse", orelse);
        let finalbody = children
            .iter()
            .find(|c| c.kind() == "finally_clause")
            .and_then(|c| named_children(*c).into_iter().find(|b| b.kind() == "block"));
        self.field_block(el, "finalbody", finalbody);
    }

    fn except_handler(&mut self, parent: NodeId, clause: Node<'_>) {
        let el = self.node(parent, "ExceptHandler", clause);
        let parts = named_children(clause);
        let body = parts.iter().rev().find(|c| c.kind() == "block").copied();
        let exprs: Vec<Node<'_>> = parts
            .into_iter()
            .filter(|c| c.kind() != "block")
            .collect();
        let (kind, name) = match exprs.as_slice() {
            [pattern] if pattern.kind() == "as_pattern" => {
                let inner = named_children(*pattern);
                let alias = pattern.child_by_field_name("alias");
                (inner.first().copied(), alias)
            }
            [kind, name, ..] => (Some(*kind), Some(*name)),
            [kind] => (Some(*kind), None),
            [] => (None, None),
        };
        self.field_expr(el, "type", kind, Ctx::Load);
        if let Some(name) = name {
            let text = self.text(name);
            self.b.attribute(el, "name", text);
        }
        self.field_block(el, "body", body);
    }

    fn with_statement(&mut self, parent: NodeId, node: Node<'_>) {
        let tag = if has_token(node, "async") { "AsyncWith" } else { "With" };
        let el = self.node(parent, tag, node);
        let items: Vec<Node<'_>> = named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "with_clause")
            .flat_map(named_children)
            .filter(|c| c.kind() == "with_item")
            .collect();
        self.field(el, "items", |l, w| {
            for item in items {
                let withitem = l.b.element(w, "withitem");
                match item.child_by_field_name("value") {
                    Some(value) if value.kind() == "as_pattern" => {
                        let context = named_children(value).into_iter().next();
                        l.field_expr(withitem, "context_expr", context, Ctx::Load);
                        l.field_expr(
                            withitem,
                            "optional_vars",
                            value.child_by_field_name("alias"),
                            Ctx::Store,
                        );
                    }
                    value => l.field_expr(withitem, "context_expr", value, Ctx::Load),
                }
            }
        });
        self.field_block(el, "body", node.child_by_field_name("body"));
    }

    fn function(&mut self, parent: NodeId, node: Node<'_>, decorators: &[Node<'_>]) {
        let tag = if has_token(node, "async") {
            "AsyncFunctionDef"
        } else {
            "FunctionDef"
        };
        let el = self.node(parent, tag, node);
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.b.attribute(el, "name", name);
        }
        let params = node.child_by_field_name("parameters");
        self.field(el, "args", |l, w| l.arguments(w, params));
        self.field_block(el, "body", node.child_by_field_name("body"));
        self.field_exprs(el, "decorator_list", decorators, Ctx::Load);
        self.field_expr(el, "returns", node.child_by_field_name("return_type"), Ctx::Load);
    }

    fn class(&mut self, parent: NodeId, node: Node<'_>, decorators: &[Node<'_>]) {
        let el = self.node(parent, "ClassDef", node);
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.b.attribute(el, "name", name);
        }
        let supers = node
            .child_by_field_name("superclasses")
            .map(named_children)
            .unwrap_or_default();
        let (keywords, bases): (Vec<Node<'_>>, Vec<Node<'_>>) = supers
            .into_iter()
            .partition(|c| matches!(c.kind(), "keyword_argument" | "dictionary_splat"));
        self.field_exprs(el, "bases", &bases, Ctx::Load);
        self.field(el, "keywords", |l, w| {
            for keyword in keywords {
                l.keyword(w, keyword);
            }
        });
        self.field_block(el, "body", node.child_by_field_name("body"));
        self.field_exprs(el, "decorator_list", decorators, Ctx::Load);
    }

    fn match_statement(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "Match", node);
        let subjects = field_children(node, "subject");
        match subjects.as_slice() {
            [single] => self.field_expr(el, "subject", Some(*single), Ctx::Load),
            many => self.field(el, "subject", |l, w| {
                let tuple = l.b.element(w, "Tuple");
                l.field_exprs(tuple, "elts", many, Ctx::Load);
                l.ctx(tuple, Ctx::Load);
            }),
        }
        let cases: Vec<Node<'_>> = node
            .child_by_field_name("body")
            .map(named_children)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.kind() == "case_clause")
            .collect();
        self.field(el, "cases", |l, w| {
            for case in cases {
                let el = l.b.element(w, "match_case");
                let consequence = case.child_by_field_name("consequence");
                let guard = case.child_by_field_name("guard");
                let patterns: Vec<Node<'_>> = named_children(case)
                    .into_iter()
                    .filter(|c| Some(*c) != consequence && Some(*c) != guard)
                    .collect();
                l.field(el, "pattern", |l, p| {
                    for pattern in patterns {
                        l.generic(p, pattern);
                    }
                });
                let guard = guard.and_then(|g| named_children(g).into_iter().next());
                l.field_expr(el, "guard", guard, Ctx::Load);
                l.field_block(el, "body", consequence);
            }
        });
    }

    // ────────────────────────────────────────────
    // Parameters
    // ────────────────────────────────────────────

    fn arguments(&mut self, parent: NodeId, params: Option<Node<'_>>) {
        let el = self.b.element(parent, "arguments");
        let Some(params) = params else {
            return;
        };
        let params = collect_params(params);
        self.field(el, "posonlyargs", |l, w| {
            for p in &params.posonly {
                l.arg(w, *p);
            }
        });
        self.field(el, "args", |l, w| {
            for p in &params.args {
                l.arg(w, *p);
            }
        });
        if let Some(vararg) = params.vararg {
            self.field(el, "vararg", |l, w| l.arg(w, vararg));
        }
        self.field(el, "kwonlyargs", |l, w| {
            for p in &params.kwonly {
                l.arg(w, *p);
            }
        });
        self.field_exprs(el, "kw_defaults", &params.kw_defaults, Ctx::Load);
        if let Some(kwarg) = params.kwarg {
            self.field(el, "kwarg", |l, w| l.arg(w, kwarg));
        }
        self.field_exprs(el, "defaults", &params.defaults, Ctx::Load);
    }

    fn arg(&mut self, parent: NodeId, param: Param<'_>) {
        let el = self.node(parent, "arg", param.node);
        let name = self.text(param.name);
        self.b.attribute(el, "arg", name);
        self.field_expr(el, "annotation", param.annotation, Ctx::Load);
    }

    fn keyword(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "keyword", node);
        if node.kind() == "dictionary_splat" {
            let value = named_children(node).into_iter().next();
            self.field_expr(el, "value", value, Ctx::Load);
            return;
        }
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.b.attribute(el, "arg", name);
        }
        self.field_expr(el, "value", node.child_by_field_name("value"), Ctx::Load);
    }

    // ────────────────────────────────────────────
    // Expressions
    // ────────────────────────────────────────────

    /// Kind to lower `node` as. Aliased `as_pattern_target` nodes keep the
    /// structure of the expression they rename.
    fn kind_of(&self, node: Node<'_>) -> &'static str {
        if node.kind() != "as_pattern_target" {
            return node.kind();
        }
        if node.child_by_field_name("attribute").is_some() {
            "attribute"
        } else if node.child_by_field_name("subscript").is_some() {
            "subscript"
        } else if named_children(node).is_empty() {
            "identifier"
        } else if self.text(node).starts_with('[') {
            "list"
        } else {
            "tuple"
        }
    }

    #[allow(clippy::too_many_lines)]
    fn expr(&mut self, parent: NodeId, node: Node<'_>, ctx: Ctx) {
        match self.kind_of(node) {
            "identifier" | "keyword_identifier" => {
                let el = self.node(parent, "Name", node);
                let id = self.text(node);
                self.b.attribute(el, "id", id);
                self.ctx(el, ctx);
            }
            "attribute" => {
                let el = self.node(parent, "Attribute", node);
                self.field_expr(el, "value", node.child_by_field_name("object"), Ctx::Load);
                if let Some(attr) = node.child_by_field_name("attribute") {
                    let attr = self.text(attr);
                    self.b.attribute(el, "attr", attr);
                }
                self.ctx(el, ctx);
            }
            "subscript" => {
                let el = self.node(parent, "Subscript", node);
                self.field_expr(el, "value", node.child_by_field_name("value"), Ctx::Load);
                let slices = field_children(node, "subscript");
                match slices.as_slice() {
                    [single] => self.field_expr(el, "slice", Some(*single), Ctx::Load),
                    many => self.field(el, "slice", |l, w| {
                        let tuple = l.b.element(w, "Tuple");
                        l.field_exprs(tuple, "elts", many, Ctx::Load);
                        l.ctx(tuple, Ctx::Load);
                    }),
                }
                self.ctx(el, ctx);
            }
            "call" => self.call(parent, node),
            "string" => self.string(parent, node, &[node]),
            "concatenated_string" => {
                let parts = named_children(node);
                self.string(parent, node, &parts);
            }
            "integer" => {
                let el = self.node(parent, "Constant", node);
                let value = normalize_int(self.text(node));
                self.b.attribute(el, "value", value);
            }
            "float" => {
                let el = self.node(parent, "Constant", node);
                let value: String = self.text(node).chars().filter(|c| *c != '_').collect();
                self.b.attribute(el, "value", value);
            }
            "true" | "false" | "none" | "ellipsis" => {
                let value = match node.kind() {
                    "true" => "True",
                    "false" => "False",
                    "none" => "None",
                    _ => "Ellipsis",
                };
                let el = self.node(parent, "Constant", node);
                self.b.attribute(el, "value", value);
            }
            "binary_operator" => {
                let el = self.node(parent, "BinOp", node);
                self.field_expr(el, "left", node.child_by_field_name("left"), Ctx::Load);
                if let Some(op) = node
                    .child_by_field_name("operator")
                    .and_then(|o| binary_op(o.kind()))
                {
                    self.op(el, op);
                }
                self.field_expr(el, "right", node.child_by_field_name("right"), Ctx::Load);
            }
            "boolean_operator" => {
                let op = node
                    .child_by_field_name("operator")
                    .map_or("and", |o| o.kind());
                let el = self.node(parent, "BoolOp", node);
                self.op(el, if op == "or" { "Or" } else { "And" });
                let mut values = Vec::new();
                flatten_bool(node, op, &mut values);
                self.field_exprs(el, "values", &values, Ctx::Load);
            }
            "not_operator" => {
                let el = self.node(parent, "UnaryOp", node);
                self.op(el, "Not");
                self.field_expr(el, "operand", node.child_by_field_name("argument"), Ctx::Load);
            }
            "unary_operator" => {
                let el = self.node(parent, "UnaryOp", node);
                let op = match node.child_by_field_name("operator").map(|o| o.kind()) {
                    Some("-") => "USub",
                    Some("~") => "Invert",
                    _ => "UAdd",
                };
                self.op(el, op);
                self.field_expr(el, "operand", node.child_by_field_name("argument"), Ctx::Load);
            }
            "comparison_operator" => self.compare(parent, node),
            "lambda" => {
                let el = self.node(parent, "Lambda", node);
                let params = node.child_by_field_name("parameters");
                self.field(el, "args", |l, w| l.arguments(w, params));
                self.field_expr(el, "body", node.child_by_field_name("body"), Ctx::Load);
            }
            "conditional_expression" => {
                let el = self.node(parent, "IfExp", node);
                let parts = named_children(node);
                self.field_expr(el, "test", parts.get(1).copied(), Ctx::Load);
                self.field_expr(el, "body", parts.first().copied(), Ctx::Load);
                self.field_expr(el, "orelse", parts.get(2).copied(), Ctx::Load);
            }
            "named_expression" => {
                let el = self.node(parent, "NamedExpr", node);
                self.field_expr(el, "target", node.child_by_field_name("name"), Ctx::Store);
                self.field_expr(el, "value", node.child_by_field_name("value"), Ctx::Load);
            }
            "list" | "list_pattern" => self.sequence(parent, node, "List", ctx),
            "tuple" | "expression_list" | "pattern_list" | "tuple_pattern" => {
                self.sequence(parent, node, "Tuple", ctx);
            }
            "set" => self.sequence(parent, node, "Set", ctx),
            "dictionary" => self.dict(parent, node),
            "list_comprehension" => self.comprehension(parent, node, "ListComp"),
            "set_comprehension" => self.comprehension(parent, node, "SetComp"),
            "generator_expression" => self.comprehension(parent, node, "GeneratorExp"),
            "dictionary_comprehension" => self.comprehension(parent, node, "DictComp"),
            "await" => {
                let el = self.node(parent, "Await", node);
                let value = named_children(node).into_iter().next();
                self.field_expr(el, "value", value, Ctx::Load);
            }
            "yield" => {
                let tag = if has_token(node, "from") { "YieldFrom" } else { "Yield" };
                let el = self.node(parent, tag, node);
                let value = named_children(node).into_iter().next();
                self.field_expr(el, "value", value, Ctx::Load);
            }
            "list_splat" | "list_splat_pattern" => {
                let el = self.node(parent, "Starred", node);
                let value = named_children(node).into_iter().next();
                self.field_expr(el, "value", value, ctx);
                self.ctx(el, ctx);
            }
            "parenthesized_expression" | "type" => {
                match named_children(node).into_iter().next() {
                    Some(inner) => self.expr(parent, inner, ctx),
                    None => self.generic(parent, node),
                }
            }
            "slice" => self.slice(parent, node),
            "keyword_argument" | "dictionary_splat" => self.keyword(parent, node),
            _ => self.generic(parent, node),
        }
    }

    fn sequence(&mut self, parent: NodeId, node: Node<'_>, tag: &str, ctx: Ctx) {
        let el = self.node(parent, tag, node);
        let elements = named_children(node);
        self.field_exprs(el, "elts", &elements, ctx);
        if tag != "Set" {
            self.ctx(el, ctx);
        }
    }

    fn call(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "Call", node);
        self.field_expr(el, "func", node.child_by_field_name("function"), Ctx::Load);
        let (args, keywords) = match node.child_by_field_name("arguments") {
            Some(arguments) if arguments.kind() == "generator_expression" => {
                (vec![arguments], Vec::new())
            }
            Some(arguments) => named_children(arguments)
                .into_iter()
                .partition(|c| !matches!(c.kind(), "keyword_argument" | "dictionary_splat")),
            None => (Vec::new(), Vec::new()),
        };
        self.field_exprs(el, "args", &args, Ctx::Load);
        self.field(el, "keywords", |l, w| {
            for keyword in keywords {
                l.keyword(w, keyword);
            }
        });
    }

    fn compare(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "Compare", node);
        let mut operands = Vec::new();
        let mut ops = Vec::new();
        // `not in` and `is not` may arrive as two tokens.
        let mut pending: Option<&str> = None;
        for child in all_children(node) {
            if child.is_named() {
                if !is_trivia(child) {
                    operands.push(child);
                }
                pending = None;
                continue;
            }
            let op = match (pending.take(), child.kind()) {
                (Some("is"), "not") => Some("IsNot"),
                (Some("not"), "in") => Some("NotIn"),
                (_, "not") => {
                    pending = Some("not");
                    None
                }
                (_, token) => {
                    if token == "is" {
                        pending = Some("is");
                    }
                    compare_op(token)
                }
            };
            match op {
                Some("IsNot") => {
                    ops.pop();
                    ops.push("IsNot");
                }
                Some(op) => ops.push(op),
                None => {}
            }
        }
        let (left, comparators) = match operands.split_first() {
            Some((left, rest)) => (Some(*left), rest.to_vec()),
            None => (None, Vec::new()),
        };
        self.field_expr(el, "left", left, Ctx::Load);
        self.field(el, "ops", |l, w| {
            for op in ops {
                l.b.element(w, op);
            }
        });
        self.field_exprs(el, "comparators", &comparators, Ctx::Load);
    }

    fn dict(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "Dict", node);
        let entries = named_children(node);
        self.field(el, "keys", |l, w| {
            for entry in &entries {
                if entry.kind() == "pair" {
                    if let Some(key) = entry.child_by_field_name("key") {
                        l.expr(w, key, Ctx::Load);
                    }
                }
            }
        });
        self.field(el, "values", |l, w| {
            for entry in &entries {
                let value = if entry.kind() == "pair" {
                    entry.child_by_field_name("value")
                } else {
                    named_children(*entry).into_iter().next()
                };
                if let Some(value) = value {
                    l.expr(w, value, Ctx::Load);
                }
            }
        });
    }

    fn comprehension(&mut self, parent: NodeId, node: Node<'_>, tag: &str) {
        let el = self.node(parent, tag, node);
        let body = node.child_by_field_name("body");
        if tag == "DictComp" {
            self.field_expr(el, "key", body.and_then(|b| b.child_by_field_name("key")), Ctx::Load);
            self.field_expr(
                el,
                "value",
                body.and_then(|b| b.child_by_field_name("value")),
                Ctx::Load,
            );
        } else {
            self.field_expr(el, "elt", body, Ctx::Load);
        }
        let clauses: Vec<Node<'_>> = named_children(node)
            .into_iter()
            .filter(|c| Some(*c) != body)
            .collect();
        self.field(el, "generators", |l, w| {
            let mut current: Option<(NodeId, Option<NodeId>)> = None;
            for clause in clauses {
                match clause.kind() {
                    "for_in_clause" => {
                        let generator = l.b.element(w, "comprehension");
                        l.field_expr(generator, "target", clause.child_by_field_name("left"), Ctx::Store);
                        let iters = field_children(clause, "right");
                        match iters.as_slice() {
                            [single] => l.field_expr(generator, "iter", Some(*single), Ctx::Load),
                            many => l.field(generator, "iter", |l, w| {
                                let tuple = l.b.element(w, "Tuple");
                                l.field_exprs(tuple, "elts", many, Ctx::Load);
                                l.ctx(tuple, Ctx::Load);
                            }),
                        }
                        let is_async = has_token(clause, "async");
                        l.b.attribute(generator, "is_async", u8::from(is_async).to_string());
                        current = Some((generator, None));
                    }
                    "if_clause" => {
                        let Some((generator, ifs)) = current.as_mut() else {
                            continue;
                        };
                        let wrapper = *ifs.get_or_insert_with(|| l.b.element(*generator, "ifs"));
                        if let Some(test) = named_children(clause).into_iter().next() {
                            l.expr(wrapper, test, Ctx::Load);
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    fn slice(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "Slice", node);
        let mut parts: [Option<Node<'_>>; 3] = [None, None, None];
        let mut index = 0;
        for child in all_children(node) {
            if child.kind() == ":" {
                index = (index + 1).min(2);
            } else if child.is_named() && !is_trivia(child) {
                parts[index] = Some(child);
            }
        }
        self.field_expr(el, "lower", parts[0], Ctx::Load);
        self.field_expr(el, "upper", parts[1], Ctx::Load);
        self.field_expr(el, "step", parts[2], Ctx::Load);
    }

    /// Lowers one or more adjacent string literals into a `Constant`, or a
    /// `JoinedStr` when any of them is an f-string.
    fn string(&mut self, parent: NodeId, node: Node<'_>, literals: &[Node<'_>]) {
        let mut pieces: Vec<Piece<'_>> = Vec::new();
        let mut formatted = false;
        for literal in literals {
            let mut raw = false;
            for child in all_children(*literal) {
                match child.kind() {
                    "string_start" => {
                        let prefix = self.text(child).to_ascii_lowercase();
                        raw = prefix.contains('r');
                        formatted |= prefix.contains('f');
                    }
                    "string_content" | "escape_sequence" => {
                        let text = self.text(child);
                        let decoded = if raw {
                            text.to_string()
                        } else {
                            decode_escapes(text)
                        };
                        pieces.push(Piece::Text(decoded));
                    }
                    "interpolation" => pieces.push(Piece::Interpolation(child)),
                    _ => {}
                }
            }
        }

        if !formatted {
            let el = self.node(parent, "Constant", node);
            let value: String = pieces
                .into_iter()
                .filter_map(|p| match p {
                    Piece::Text(text) => Some(text),
                    Piece::Interpolation(_) => None,
                })
                .collect();
            self.b.attribute(el, "value", value);
            return;
        }

        let el = self.node(parent, "JoinedStr", node);
        self.field(el, "values", |l, w| {
            let mut text = String::new();
            for piece in pieces {
                match piece {
                    Piece::Text(part) => text.push_str(&part.replace("{{", "{").replace("}}", "}")),
                    Piece::Interpolation(interp) => {
                        if !text.is_empty() {
                            let constant = l.b.element(w, "Constant");
                            l.b.attribute(constant, "value", std::mem::take(&mut text));
                        }
                        l.formatted_value(w, interp);
                    }
                }
            }
            if !text.is_empty() {
                let constant = l.b.element(w, "Constant");
                l.b.attribute(constant, "value", text);
            }
        });
    }

    fn formatted_value(&mut self, parent: NodeId, node: Node<'_>) {
        let el = self.node(parent, "FormattedValue", node);
        self.field_expr(el, "value", node.child_by_field_name("expression"), Ctx::Load);
        let conversion = node
            .child_by_field_name("type_conversion")
            .map_or(-1, |c| match self.text(c).trim_start_matches('!') {
                "s" => 115,
                "r" => 114,
                "a" => 97,
                _ => -1,
            });
        self.b.attribute(el, "conversion", conversion.to_string());
        if let Some(spec) = node.child_by_field_name("format_specifier") {
            let text = self.text(spec).trim_start_matches(':').to_string();
            self.field(el, "format_spec", |l, w| {
                let joined = l.b.element(w, "JoinedStr");
                let values = l.b.element(joined, "values");
                let constant = l.b.element(values, "Constant");
                l.b.attribute(constant, "value", text);
            });
        }
    }

    /// Lowering for grammar nodes without a dedicated `ast` counterpart:
    /// a `CamelCase` tag, grammar fields as wrappers, leaves keep their text.
    fn generic(&mut self, parent: NodeId, node: Node<'_>) {
        let tag = camel_case(node.kind());
        let el = self.node(parent, if tag.is_empty() { "Node" } else { tag.as_str() }, node);
        let children = fielded_children(node);
        if children.is_empty() {
            let text = self.text(node);
            self.b.attribute(el, "value", text);
            return;
        }
        for (field, child) in children {
            let lower_child = |l: &mut Self, target: NodeId| {
                if child.kind() == "block" {
                    l.field(target, "body", |l, w| l.statements(w, child));
                } else {
                    l.expr(target, child, Ctx::Load);
                }
            };
            match field {
                Some(name) => self.field(el, name, lower_child),
                None => lower_child(self, el),
            }
        }
    }
}

fn collect_params<'t>(params: Node<'t>) -> Params<'t> {
    let mut out = Params::default();
    let mut keyword_only = false;
    for child in named_children(params) {
        let plain = |name: Node<'t>, annotation| Param {
            node: child,
            name,
            annotation,
        };
        match child.kind() {
            "identifier" => push_param(&mut out, keyword_only, plain(child, None), None),
            "typed_parameter" => {
                let annotation = child.child_by_field_name("type");
                let Some(inner) = named_children(child)
                    .into_iter()
                    .find(|c| Some(*c) != annotation)
                else {
                    continue;
                };
                match inner.kind() {
                    "list_splat_pattern" => {
                        keyword_only = true;
                        out.vararg = splat_name(inner).map(|n| plain(n, annotation));
                    }
                    "dictionary_splat_pattern" => {
                        out.kwarg = splat_name(inner).map(|n| plain(n, annotation));
                    }
                    _ => push_param(&mut out, keyword_only, plain(inner, annotation), None),
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = child.child_by_field_name("name") {
                    let annotation = child.child_by_field_name("type");
                    let default = child.child_by_field_name("value");
                    let param = Param {
                        node: name,
                        name,
                        annotation,
                    };
                    push_param(&mut out, keyword_only, param, default);
                }
            }
            "list_splat_pattern" => {
                keyword_only = true;
                out.vararg = splat_name(child).map(|n| plain(n, None));
            }
            "dictionary_splat_pattern" => {
                out.kwarg = splat_name(child).map(|n| plain(n, None));
            }
            "keyword_separator" => keyword_only = true,
            "positional_separator" => out.posonly.append(&mut out.args),
            _ => {}
        }
    }
    out
}

fn push_param<'t>(
    out: &mut Params<'t>,
    keyword_only: bool,
    param: Param<'t>,
    default: Option<Node<'t>>,
) {
    if keyword_only {
        out.kwonly.push(param);
        out.kw_defaults.extend(default);
    } else {
        out.args.push(param);
        out.defaults.extend(default);
    }
}

fn splat_name(node: Node<'_>) -> Option<Node<'_>> {
    named_children(node).into_iter().next()
}

fn flatten_bool<'t>(node: Node<'t>, op: &str, out: &mut Vec<Node<'t>>) {
    for side in ["left", "right"] {
        let Some(child) = node.child_by_field_name(side) else {
            continue;
        };
        let same_op = child.kind() == "boolean_operator"
            && child
                .child_by_field_name("operator")
                .is_some_and(|o| o.kind() == op);
        if same_op {
            flatten_bool(child, op, out);
        } else {
            out.push(child);
        }
    }
}

fn dotted(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
