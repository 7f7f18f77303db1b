//! Element tree that patterns are evaluated against.
//!
//! A [`SyntaxTree`] is an arena of nodes. Node 0 is the document node; every
//! other node is an element with a tag, ordered attributes and an optional
//! source span. Language extractors build trees through [`TreeBuilder`].

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Index of a node inside a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The document node of every tree.
    pub const DOCUMENT: Self = Self(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Byte column within the line (0-indexed).
    pub column: usize,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Start and end of a node in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Where the node starts.
    pub start: Position,
    /// Where the node ends (exclusive column).
    pub end: Position,
}

impl Span {
    /// Creates a span from start and end positions.
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A name/value attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name (e.g. `name`, `lineno`).
    pub name: String,
    /// Attribute value as text.
    pub value: String,
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attributes: Vec<Attribute>,
    span: Option<Span>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Incrementally builds a [`SyntaxTree`].
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<NodeData>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// Creates a builder holding only the document node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                tag: String::new(),
                attributes: Vec::new(),
                span: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Appends a new element as the last child of `parent`.
    pub fn element(&mut self, parent: NodeId, tag: impl Into<String>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(NodeData {
            tag: tag.into(),
            attributes: Vec::new(),
            span: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Sets the source span of an element.
    pub fn set_span(&mut self, node: NodeId, span: Span) {
        self.nodes[node.index()].span = Some(span);
    }

    /// Appends an attribute to an element, replacing an existing one of the same name.
    pub fn attribute(&mut self, node: NodeId, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let attrs = &mut self.nodes[node.index()].attributes;
        if let Some(existing) = attrs.iter_mut().find(|a| a.name == name) {
            existing.value = value;
        } else {
            attrs.push(Attribute { name, value });
        }
    }

    /// Number of children currently attached to `node`.
    #[must_use]
    pub fn child_count(&self, node: NodeId) -> usize {
        self.nodes[node.index()].children.len()
    }

    /// Detaches `node` from its parent if it has no children.
    ///
    /// Used to drop field wrappers that ended up empty. The node stays in the
    /// arena but is unreachable from the document.
    pub fn discard_if_empty(&mut self, node: NodeId) {
        if !self.nodes[node.index()].children.is_empty() {
            return;
        }
        if let Some(parent) = self.nodes[node.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|c| *c != node);
        }
    }

    /// Finalizes the tree and computes document order.
    #[must_use]
    pub fn finish(self) -> SyntaxTree {
        let len = self.nodes.len();
        let mut order = Vec::with_capacity(len);
        let mut rank = vec![u32::MAX; len];
        let mut last = vec![0u32; len];

        // Iterative pre-order walk; exit markers record subtree extent.
        let mut stack: Vec<(NodeId, bool)> = vec![(NodeId::DOCUMENT, false)];
        while let Some((node, exiting)) = stack.pop() {
            if exiting {
                last[node.index()] = u32::try_from(order.len() - 1).unwrap_or(u32::MAX);
                continue;
            }
            rank[node.index()] = u32::try_from(order.len()).unwrap_or(u32::MAX);
            order.push(node);
            stack.push((node, true));
            for child in self.nodes[node.index()].children.iter().rev() {
                stack.push((*child, false));
            }
        }

        SyntaxTree {
            nodes: self.nodes,
            order,
            rank,
            last,
        }
    }
}

/// An immutable element tree with precomputed document order.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<NodeData>,
    order: Vec<NodeId>,
    rank: Vec<u32>,
    last: Vec<u32>,
}

impl SyntaxTree {
    /// The document node.
    #[must_use]
    pub fn document(&self) -> NodeId {
        NodeId::DOCUMENT
    }

    /// The first element under the document, if any (e.g. `Module`).
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[0].children.first().copied()
    }

    /// Number of nodes reachable from the document, including it.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the tree holds nothing but the document node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.len() <= 1
    }

    /// Tag of an element (empty for the document node).
    #[must_use]
    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.index()].tag
    }

    /// Whether `node` is the document node.
    #[must_use]
    pub fn is_document(&self, node: NodeId) -> bool {
        node == NodeId::DOCUMENT
    }

    /// Attributes of an element in insertion order.
    #[must_use]
    pub fn attributes(&self, node: NodeId) -> &[Attribute] {
        &self.nodes[node.index()].attributes
    }

    /// Looks up an attribute value by name.
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Source span of an element, if it has one.
    #[must_use]
    pub fn span(&self, node: NodeId) -> Option<Span> {
        self.nodes[node.index()].span
    }

    /// Parent of a node (`None` for the document).
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    /// Children in document order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.index()].children
    }

    /// Pre-order rank of a node; lower ranks come first in document order.
    #[must_use]
    pub fn rank(&self, node: NodeId) -> u32 {
        self.rank[node.index()]
    }

    /// All descendants of `node` in document order, excluding `node`.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> &[NodeId] {
        let start = self.rank[node.index()] as usize + 1;
        let end = self.last[node.index()] as usize + 1;
        if start >= end {
            return &[];
        }
        &self.order[start..end]
    }

    /// Nodes after `node` in document order that are not its descendants.
    #[must_use]
    pub fn following(&self, node: NodeId) -> &[NodeId] {
        let start = self.last[node.index()] as usize + 1;
        if start >= self.order.len() {
            return &[];
        }
        &self.order[start..]
    }

    /// Nodes before `node` in document order, excluding its ancestors.
    ///
    /// Returned in reverse document order (nearest first).
    #[must_use]
    pub fn preceding(&self, node: NodeId) -> Vec<NodeId> {
        let rank = self.rank[node.index()];
        self.order[..rank as usize]
            .iter()
            .rev()
            .copied()
            .filter(|n| self.last[n.index()] < rank)
            .collect()
    }

    /// Whether `ancestor` is a proper ancestor of `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let a = self.rank[ancestor.index()];
        let n = self.rank[node.index()];
        a < n && n <= self.last[ancestor.index()]
    }

    /// Nearest span for reporting a node: its own, else the closest
    /// positioned ancestor's, else the start of the file.
    #[must_use]
    pub fn location_of(&self, node: NodeId) -> Span {
        let mut current = Some(node);
        while let Some(n) = current {
            if let Some(span) = self.span(n) {
                return span;
            }
            current = self.parent(n);
        }
        let origin = Position::new(1, 0);
        Span::new(origin, origin)
    }

    /// Renders the tree as indented XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for child in self.children(NodeId::DOCUMENT) {
            self.write_xml(*child, 0, &mut out);
        }
        out
    }

    fn write_xml(&self, node: NodeId, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}<{}", self.tag(node));
        for attr in self.attributes(node) {
            let _ = write!(out, " {}=\"{}\"", attr.name, escape_xml(&attr.value));
        }
        let children = self.children(node);
        if children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push_str(">\n");
        for child in children {
            self.write_xml(*child, depth + 1, out);
        }
        let _ = writeln!(out, "{indent}</{}>", self.tag(node));
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SyntaxTree {
        let mut b = TreeBuilder::new();
        let module = b.element(NodeId::DOCUMENT, "Module");
        let body = b.element(module, "body");
        let class = b.element(body, "ClassDef");
        b.attribute(class, "name", "Foo");
        b.set_span(class, Span::new(Position::new(1, 0), Position::new(2, 8)));
        let inner = b.element(class, "body");
        b.element(inner, "Pass");
        b.element(body, "Expr");
        b.finish()
    }

    #[test]
    fn document_order_is_preorder() {
        let tree = sample();
        let tags: Vec<&str> = tree
            .descendants(NodeId::DOCUMENT)
            .iter()
            .map(|n| tree.tag(*n))
            .collect();
        assert_eq!(tags, vec!["Module", "body", "ClassDef", "body", "Pass", "Expr"]);
    }

    #[test]
    fn following_and_preceding_exclude_relatives() {
        let tree = sample();
        let class = tree.descendants(NodeId::DOCUMENT)[2];
        let following: Vec<&str> = tree.following(class).iter().map(|n| tree.tag(*n)).collect();
        assert_eq!(following, vec!["Expr"]);

        let expr = tree.descendants(NodeId::DOCUMENT)[5];
        let preceding: Vec<&str> = tree.preceding(expr).iter().map(|n| tree.tag(*n)).collect();
        assert_eq!(preceding, vec!["Pass", "body", "ClassDef"]);
    }

    #[test]
    fn location_falls_back_to_ancestor_span() {
        let tree = sample();
        let pass = tree.descendants(NodeId::DOCUMENT)[4];
        assert_eq!(tree.location_of(pass).start, Position::new(1, 0));
        let expr = tree.descendants(NodeId::DOCUMENT)[5];
        assert_eq!(tree.location_of(expr).start, Position::new(1, 0));
    }

    #[test]
    fn discarded_wrappers_are_unreachable() {
        let mut b = TreeBuilder::new();
        let module = b.element(NodeId::DOCUMENT, "Module");
        let body = b.element(module, "body");
        b.discard_if_empty(body);
        let tree = b.finish();
        assert_eq!(tree.len(), 2);
        assert!(tree.children(tree.root_element().unwrap()).is_empty());
    }

    #[test]
    fn xml_rendering_escapes_attributes() {
        let mut b = TreeBuilder::new();
        let module = b.element(NodeId::DOCUMENT, "Module");
        let c = b.element(module, "Constant");
        b.attribute(c, "value", "a<\"b\"");
        let tree = b.finish();
        assert_eq!(
            tree.to_xml(),
            "<Module>\n  <Constant value=\"a&lt;&quot;b&quot;\"/>\n</Module>\n"
        );
    }
}
