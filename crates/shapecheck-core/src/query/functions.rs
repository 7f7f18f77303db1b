//! Core function library plus the `re:` regex extensions.

use super::eval::{format_number, Context, Evaluator, NodeRef, Value};
use super::parser::Expr;
use super::QueryError;

/// Accepted argument counts per function; `None` means unbounded.
fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    Some(match name {
        "last" | "position" | "true" | "false" => (0, Some(0)),
        "count" | "boolean" | "not" | "sum" | "floor" | "ceiling" | "round" | "lang" => {
            (1, Some(1))
        }
        "name" | "local-name" | "namespace-uri" | "string" | "string-length"
        | "normalize-space" | "number" => (0, Some(1)),
        "concat" => (2, None),
        "starts-with" | "ends-with" | "contains" | "substring-before" | "substring-after" => {
            (2, Some(2))
        }
        "substring" => (2, Some(3)),
        "translate" => (3, Some(3)),
        "re:test" | "re:match" => (2, Some(3)),
        _ => return None,
    })
}

/// The type a function call evaluates to.
pub(crate) fn result_kind(name: &str) -> &'static str {
    match name {
        "last" | "position" | "count" | "sum" | "floor" | "ceiling" | "round" | "number"
        | "string-length" => "number",
        "boolean" | "not" | "true" | "false" | "lang" | "starts-with" | "ends-with"
        | "contains" | "re:test" | "re:match" => "boolean",
        _ => "string",
    }
}

/// Rejects unknown functions and wrong argument counts before evaluation.
pub(crate) fn check_call(name: &str, argc: usize) -> Result<(), String> {
    let Some((min, max)) = arity(name) else {
        return Err(format!("unknown function `{name}()`"));
    };
    if argc < min || max.is_some_and(|max| argc > max) {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        return Err(format!(
            "`{name}()` takes {expected} argument(s), found {argc}"
        ));
    }
    Ok(())
}

pub(crate) fn call(
    ev: &Evaluator<'_>,
    name: &str,
    args: &[Expr],
    ctx: &Context,
) -> Result<Value, QueryError> {
    let arg = |i: usize| ev.eval(&args[i], ctx);
    let string_arg = |i: usize| -> Result<String, QueryError> {
        Ok(ev.to_string_value(&arg(i)?))
    };
    // Zero-argument string functions default to the context node.
    let string_or_context = |i: usize| -> Result<String, QueryError> {
        if args.len() > i {
            string_arg(i)
        } else {
            Ok(ev.string_value(ctx.node))
        }
    };
    let number_arg = |i: usize| -> Result<f64, QueryError> { Ok(ev.to_number(&arg(i)?)) };

    #[allow(clippy::cast_precision_loss)]
    let value = match name {
        "last" => Value::Number(ctx.size as f64),
        "position" => Value::Number(ctx.position as f64),
        "count" => Value::Number(node_set(ev, arg(0)?, name)?.len() as f64),
        "name" | "local-name" => {
            let node = if args.is_empty() {
                Some(ctx.node)
            } else {
                first_node(ev, node_set(ev, arg(0)?, name)?)
            };
            let full = node.map(|n| ev.node_name(n)).unwrap_or_default();
            if name == "local-name" {
                Value::Str(full.rsplit(':').next().unwrap_or_default().to_string())
            } else {
                Value::Str(full)
            }
        }
        "namespace-uri" => Value::Str(String::new()),
        "string" => Value::Str(string_or_context(0)?),
        "concat" => {
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(&string_arg(i)?);
            }
            Value::Str(out)
        }
        "starts-with" => Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?)),
        "ends-with" => Value::Bool(string_arg(0)?.ends_with(&string_arg(1)?)),
        "contains" => Value::Bool(string_arg(0)?.contains(&string_arg(1)?)),
        "substring-before" => {
            let (s, needle) = (string_arg(0)?, string_arg(1)?);
            Value::Str(s.find(&needle).map_or_else(String::new, |i| s[..i].to_string()))
        }
        "substring-after" => {
            let (s, needle) = (string_arg(0)?, string_arg(1)?);
            Value::Str(
                s.find(&needle)
                    .map_or_else(String::new, |i| s[i + needle.len()..].to_string()),
            )
        }
        "substring" => {
            let s = string_arg(0)?;
            let start = round(number_arg(1)?);
            let length = if args.len() > 2 {
                Some(round(number_arg(2)?))
            } else {
                None
            };
            Value::Str(substring(&s, start, length))
        }
        "string-length" => Value::Number(string_or_context(0)?.chars().count() as f64),
        "normalize-space" => Value::Str(
            string_or_context(0)?
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "translate" => {
            let (s, from, to) = (string_arg(0)?, string_arg(1)?, string_arg(2)?);
            Value::Str(translate(&s, &from, &to))
        }
        "boolean" => Value::Bool(ev.to_bool(&arg(0)?)),
        "not" => Value::Bool(!ev.to_bool(&arg(0)?)),
        "true" => Value::Bool(true),
        "false" | "lang" => Value::Bool(false),
        "number" => {
            if args.is_empty() {
                Value::Number(ev.to_number(&Value::Str(ev.string_value(ctx.node))))
            } else {
                Value::Number(number_arg(0)?)
            }
        }
        "sum" => {
            let nodes = node_set(ev, arg(0)?, name)?;
            Value::Number(
                nodes
                    .iter()
                    .map(|n| ev.to_number(&Value::Str(ev.string_value(*n))))
                    .sum(),
            )
        }
        "floor" => Value::Number(number_arg(0)?.floor()),
        "ceiling" => Value::Number(number_arg(0)?.ceil()),
        "round" => Value::Number(round(number_arg(0)?)),
        "re:test" | "re:match" => {
            let input = string_arg(0)?;
            let pattern = string_arg(1)?;
            let flags = if args.len() > 2 {
                string_arg(2)?
            } else {
                String::new()
            };
            Value::Bool(ev.regex(&pattern, &flags)?.is_match(&input))
        }
        other => return Err(QueryError::eval(format!("unknown function `{other}()`"))),
    };
    Ok(value)
}

fn node_set(ev: &Evaluator<'_>, value: Value, function: &str) -> Result<Vec<NodeRef>, QueryError> {
    match value {
        Value::Nodes(mut nodes) => {
            ev.sort_dedup(&mut nodes);
            Ok(nodes)
        }
        other => Err(QueryError::eval(format!(
            "`{function}()` expects a node-set, found {}",
            describe(ev, &other)
        ))),
    }
}

fn first_node(ev: &Evaluator<'_>, mut nodes: Vec<NodeRef>) -> Option<NodeRef> {
    ev.sort_dedup(&mut nodes);
    nodes.first().copied()
}

fn describe(ev: &Evaluator<'_>, value: &Value) -> String {
    match value {
        Value::Nodes(_) => "a node-set".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {}", format_number(*n)),
        Value::Str(_) => format!("string \"{}\"", ev.to_string_value(value)),
    }
}

fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// `substring()` with XPath's rounded, 1-based character positions.
fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            #[allow(clippy::cast_precision_loss)]
            let position = (*i + 1) as f64;
            position >= start && length.map_or(true, |len| position < start + len)
        })
        .map(|(_, c)| c)
        .collect()
}

fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}
