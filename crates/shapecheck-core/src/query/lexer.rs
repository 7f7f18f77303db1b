//! Tokenizer for the path-query language.
//!
//! Applies the XPath 1.0 disambiguation rules: `*` and the names `and`,
//! `or`, `div`, `mod` are operators only when the previous token can end an
//! operand.

use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    DoubleColon,
    Dot,
    DotDot,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    /// `*` as a name test.
    Wildcard,
    /// `*` as multiplication.
    Multiply,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    /// A (possibly prefixed) name such as `FunctionDef` or `re:test`.
    Name(String),
    /// `prefix:*` name test.
    PrefixWildcard(String),
    Variable(String),
}

impl Token {
    /// Whether an operator may follow this token (it ends an operand).
    fn ends_operand(&self) -> bool {
        !matches!(
            self,
            Self::At
                | Self::DoubleColon
                | Self::LParen
                | Self::LBracket
                | Self::Comma
                | Self::Slash
                | Self::DoubleSlash
                | Self::Pipe
                | Self::Plus
                | Self::Minus
                | Self::Eq
                | Self::Neq
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::Multiply
                | Self::And
                | Self::Or
                | Self::Div
                | Self::Mod
        )
    }
}

/// A token with its byte offset in the expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, QueryError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let after_operand = tokens.last().is_some_and(|t| t.token.ends_operand());
        let peek = chars.get(i + 1).map(|(_, c)| *c);

        let (token, width) = match c {
            '/' if peek == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '@' => (Token::At, 1),
            ',' => (Token::Comma, 1),
            '|' => (Token::Pipe, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '=' => (Token::Eq, 1),
            '!' if peek == Some('=') => (Token::Neq, 2),
            '<' if peek == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if peek == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            ':' if peek == Some(':') => (Token::DoubleColon, 2),
            '*' if after_operand => (Token::Multiply, 1),
            '*' => (Token::Wildcard, 1),
            '.' if peek == Some('.') => (Token::DotDot, 2),
            '.' if peek.is_some_and(|p| p.is_ascii_digit()) => {
                let (number, width) = read_number(&chars, i);
                (Token::Number(number), width)
            }
            '.' => (Token::Dot, 1),
            '"' | '\'' => {
                let start = i + 1;
                let Some(end) = chars[start..].iter().position(|(_, ch)| *ch == c) else {
                    return Err(QueryError::new("unterminated string literal", offset));
                };
                let literal: String = chars[start..start + end].iter().map(|(_, ch)| *ch).collect();
                (Token::Literal(literal), end + 2)
            }
            '$' => {
                let (name, width) = read_name(&chars, i + 1);
                if name.is_empty() {
                    return Err(QueryError::new("expected variable name after `$`", offset));
                }
                (Token::Variable(name), width + 1)
            }
            c if c.is_ascii_digit() => {
                let (number, width) = read_number(&chars, i);
                (Token::Number(number), width)
            }
            c if is_name_start(c) => {
                let (name, width) = read_name(&chars, i);
                let next = chars.get(i + width).map(|(_, c)| *c);
                if next == Some(':')
                    && chars.get(i + width + 1).map(|(_, c)| *c) == Some('*')
                {
                    (Token::PrefixWildcard(name), width + 2)
                } else if after_operand {
                    match name.as_str() {
                        "and" => (Token::And, width),
                        "or" => (Token::Or, width),
                        "div" => (Token::Div, width),
                        "mod" => (Token::Mod, width),
                        _ => {
                            return Err(QueryError::new(
                                format!("expected an operator, found `{name}`"),
                                offset,
                            ))
                        }
                    }
                } else {
                    (Token::Name(name), width)
                }
            }
            other => {
                return Err(QueryError::new(
                    format!("unexpected character `{other}`"),
                    offset,
                ))
            }
        };

        tokens.push(Spanned { token, offset });
        i += width;
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Reads a name, allowing one `prefix:local` colon when followed by a name start.
fn read_name(chars: &[(usize, char)], start: usize) -> (String, usize) {
    let mut name = String::new();
    let mut i = start;
    let mut seen_colon = false;
    while let Some((_, c)) = chars.get(i) {
        if is_name_char(*c) && (i > start || is_name_start(*c)) {
            name.push(*c);
            i += 1;
        } else if *c == ':'
            && !seen_colon
            && !name.is_empty()
            && chars.get(i + 1).is_some_and(|(_, n)| is_name_start(*n))
        {
            seen_colon = true;
            name.push(':');
            i += 1;
        } else {
            break;
        }
    }
    (name, i - start)
}

fn read_number(chars: &[(usize, char)], start: usize) -> (f64, usize) {
    let mut text = String::new();
    let mut i = start;
    let mut seen_dot = false;
    while let Some((_, c)) = chars.get(i) {
        if c.is_ascii_digit() {
            text.push(*c);
        } else if *c == '.' && !seen_dot && chars.get(i + 1).map(|(_, n)| *n) != Some('.') {
            seen_dot = true;
            text.push('.');
        } else {
            break;
        }
        i += 1;
    }
    (text.parse().unwrap_or(f64::NAN), i - start)
}
