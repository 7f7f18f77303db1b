//! Recursive-descent parser producing the expression tree.

use super::lexer::{Spanned, Token};
use super::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "following" => Self::Following,
            "preceding" => Self::Preceding,
            "attribute" => Self::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    /// Any node of the axis' principal type (`*`).
    Wildcard,
    /// A specific name.
    Name(String),
    /// `node()`
    AnyNode,
    /// `text()`, `comment()`, `processing-instruction()`: never present in trees.
    Never,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    /// A location path; `absolute` paths start at the document node.
    Path { absolute: bool, steps: Vec<Step> },
    /// A primary expression with predicates and optional trailing steps.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

pub(crate) fn parse(tokens: &[Spanned], source_len: usize) -> Result<Expr, QueryError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        source_len,
    };
    if tokens.is_empty() {
        return Err(QueryError::new("empty expression", 0));
    }
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(QueryError::new(
            format!("unexpected {}", describe(&extra.token)),
            extra.offset,
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    source_len: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|s| &s.token)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source_len, |s| s.offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|s| &s.token);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), QueryError> {
        if self.eat(expected) {
            return Ok(());
        }
        let found = self
            .peek()
            .map_or_else(|| "end of expression".to_string(), describe);
        Err(QueryError::new(
            format!("expected {}, found {found}", describe(expected)),
            self.offset(),
        ))
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, QueryError>,
    ) -> Result<Expr, QueryError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn or_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(&[(Token::And, BinaryOp::And)], Self::equality_expr)
    }

    fn equality_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[(Token::Eq, BinaryOp::Eq), (Token::Neq, BinaryOp::Neq)],
            Self::relational_expr,
        )
    }

    fn relational_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::additive_expr,
        )
    }

    fn additive_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::multiplicative_expr,
        )
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(
            &[
                (Token::Multiply, BinaryOp::Mul),
                (Token::Div, BinaryOp::Div),
                (Token::Mod, BinaryOp::Mod),
            ],
            Self::unary_expr,
        )
    }

    fn unary_expr(&mut self) -> Result<Expr, QueryError> {
        if self.eat(&Token::Minus) {
            let inner = self.unary_expr()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<Expr, QueryError> {
        self.binary_level(&[(Token::Pipe, BinaryOp::Union)], Self::path_expr)
    }

    fn path_expr(&mut self) -> Result<Expr, QueryError> {
        match self.peek() {
            Some(Token::Literal(_) | Token::Number(_) | Token::LParen | Token::Variable(_)) => {
                self.filter_expr()
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(name) =>
            {
                self.filter_expr()
            }
            _ => self.location_path(),
        }
    }

    fn filter_expr(&mut self) -> Result<Expr, QueryError> {
        let primary = self.primary_expr()?;
        let predicates = self.predicates()?;
        let steps = if matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
            self.trailing_steps()?
        } else {
            Vec::new()
        };
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn primary_expr(&mut self) -> Result<Expr, QueryError> {
        let offset = self.offset();
        match self.advance().cloned() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Variable(name)) => Err(QueryError::new(
                format!("variables are not supported (`${name}`)"),
                offset,
            )),
            Some(Token::Name(name)) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            other => Err(QueryError::new(
                format!(
                    "expected an expression, found {}",
                    other.as_ref().map_or("end of expression".to_string(), describe)
                ),
                offset,
            )),
        }
    }

    fn trailing_steps(&mut self) -> Result<Vec<Step>, QueryError> {
        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    fn location_path(&mut self) -> Result<Expr, QueryError> {
        if self.eat(&Token::Slash) {
            let steps = if self.starts_step() {
                let mut steps = vec![self.step()?];
                steps.extend(self.trailing_steps()?);
                steps
            } else {
                Vec::new()
            };
            return Ok(Expr::Path {
                absolute: true,
                steps,
            });
        }
        if self.eat(&Token::DoubleSlash) {
            let mut steps = vec![Step::descendant_or_self(), self.step()?];
            steps.extend(self.trailing_steps()?);
            return Ok(Expr::Path {
                absolute: true,
                steps,
            });
        }
        let mut steps = vec![self.step()?];
        steps.extend(self.trailing_steps()?);
        Ok(Expr::Path {
            absolute: false,
            steps,
        })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::Wildcard
                    | Token::Name(_)
                    | Token::PrefixWildcard(_)
            )
        )
    }

    fn step(&mut self) -> Result<Step, QueryError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::DoubleColon)) =
            (self.peek(), self.peek_at(1))
        {
            let offset = self.offset();
            let name = name.clone();
            self.pos += 2;
            if name == "namespace" {
                return Err(QueryError::new("the namespace axis is not supported", offset));
            }
            Axis::from_name(&name)
                .ok_or_else(|| QueryError::new(format!("unknown axis `{name}`"), offset))?
        } else {
            Axis::Child
        };

        let test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, QueryError> {
        let offset = self.offset();
        match self.advance().cloned() {
            Some(Token::Wildcard) => Ok(NodeTest::Wildcard),
            Some(Token::PrefixWildcard(prefix)) => Err(QueryError::new(
                format!("namespace prefixes are not supported (`{prefix}:*`)"),
                offset,
            )),
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) && is_node_type(&name) {
                    self.pos += 1;
                    if name == "processing-instruction" {
                        if let Some(Token::Literal(_)) = self.peek() {
                            self.pos += 1;
                        }
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(if name == "node" {
                        NodeTest::AnyNode
                    } else {
                        NodeTest::Never
                    });
                }
                Ok(NodeTest::Name(name))
            }
            other => Err(QueryError::new(
                format!(
                    "expected a node test, found {}",
                    other.as_ref().map_or("end of expression".to_string(), describe)
                ),
                offset,
            )),
        }
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, QueryError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(
        name,
        "node" | "text" | "comment" | "processing-instruction"
    )
}

fn describe(token: &Token) -> String {
    match token {
        Token::Slash => "`/`".into(),
        Token::DoubleSlash => "`//`".into(),
        Token::LBracket => "`[`".into(),
        Token::RBracket => "`]`".into(),
        Token::LParen => "`(`".into(),
        Token::RParen => "`)`".into(),
        Token::At => "`@`".into(),
        Token::Comma => "`,`".into(),
        Token::DoubleColon => "`::`".into(),
        Token::Dot => "`.`".into(),
        Token::DotDot => "`..`".into(),
        Token::Pipe => "`|`".into(),
        Token::Plus => "`+`".into(),
        Token::Minus => "`-`".into(),
        Token::Eq => "`=`".into(),
        Token::Neq => "`!=`".into(),
        Token::Lt => "`<`".into(),
        Token::Le => "`<=`".into(),
        Token::Gt => "`>`".into(),
        Token::Ge => "`>=`".into(),
        Token::Wildcard | Token::Multiply => "`*`".into(),
        Token::And => "`and`".into(),
        Token::Or => "`or`".into(),
        Token::Div => "`div`".into(),
        Token::Mod => "`mod`".into(),
        Token::Literal(s) => format!("string \"{s}\""),
        Token::Number(n) => format!("number {n}"),
        Token::Name(n) => format!("name `{n}`"),
        Token::PrefixWildcard(p) => format!("`{p}:*`"),
        Token::Variable(v) => format!("variable `${v}`"),
    }
}
