//! Heuristic conversion of raw argument text into sandbox values.
//!
//! Each [`Heuristic`] is tried in chain order and the first one that yields a
//! value wins. [`Heuristic::Opaque`] always matches, so materialization never
//! fails: text nothing else understands is passed through as a string.

use std::fmt;

use rquickjs::Value;

use crate::normalize::strip_types;
use crate::sandbox::Scope;

/// One step of the coercion chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heuristic {
    /// Blank text becomes `undefined`.
    Missing,
    /// Text (or its declared type) carries type syntax: erase it, then evaluate.
    AnnotatedExpression,
    /// Evaluate as an expression against the defined program.
    Expression,
    /// Strict JSON for text starting with `{` or `[`.
    StructuredData,
    /// `true`, `false`, `null`, `undefined`, `NaN`, `Infinity`, `-Infinity`.
    LiteralKeyword,
    /// Decimal, exponent, hex, octal or binary number text.
    Numeric,
    /// Text fully wrapped in matching quotes or backticks.
    QuotedString,
    /// The text itself as a string.
    Opaque,
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Heuristic::Missing => "missing",
            Heuristic::AnnotatedExpression => "annotated-expression",
            Heuristic::Expression => "expression",
            Heuristic::StructuredData => "structured-data",
            Heuristic::LiteralKeyword => "literal-keyword",
            Heuristic::Numeric => "numeric",
            Heuristic::QuotedString => "quoted-string",
            Heuristic::Opaque => "opaque",
        };
        write!(f, "{name}")
    }
}

/// Precedence used for primary call arguments.
pub const ARGUMENT_CHAIN: &[Heuristic] = &[
    Heuristic::Missing,
    Heuristic::AnnotatedExpression,
    Heuristic::Expression,
    Heuristic::StructuredData,
    Heuristic::LiteralKeyword,
    Heuristic::Numeric,
    Heuristic::QuotedString,
    Heuristic::Opaque,
];

/// Precedence used for follow-up arguments passed to a returned function.
pub const FOLLOW_UP_CHAIN: &[Heuristic] = &[
    Heuristic::LiteralKeyword,
    Heuristic::Numeric,
    Heuristic::QuotedString,
    Heuristic::Opaque,
];

/// Convert `raw` into a value, returning it with the heuristic that matched.
///
/// Every heuristic sees the trimmed text except the opaque fallback, which
/// keeps `raw` verbatim.
pub fn materialize<'js>(
    scope: &Scope<'js>,
    raw: &str,
    declared_type: &str,
    chain: &[Heuristic],
) -> (Value<'js>, Heuristic) {
    let text = raw.trim();
    for &heuristic in chain {
        if let Some(value) = attempt(scope, heuristic, raw, declared_type) {
            tracing::trace!(raw = %text, %heuristic, "Argument materialized");
            return (value, heuristic);
        }
    }
    (opaque(scope, raw), Heuristic::Opaque)
}

fn attempt<'js>(
    scope: &Scope<'js>,
    heuristic: Heuristic,
    raw: &str,
    declared_type: &str,
) -> Option<Value<'js>> {
    let ctx = &scope.ctx;
    let text = raw.trim();
    match heuristic {
        Heuristic::Missing => text
            .is_empty()
            .then(|| Value::new_undefined(ctx.clone())),
        Heuristic::AnnotatedExpression => {
            if text.is_empty() || !carries_type_syntax(text, declared_type) {
                return None;
            }
            let erased = strip_types(&format!("({text})"));
            scope.try_expression(erased.trim())
        }
        Heuristic::Expression => {
            if text.is_empty() {
                return None;
            }
            scope.try_expression(text)
        }
        Heuristic::StructuredData => {
            if !(text.starts_with('{') || text.starts_with('[')) {
                return None;
            }
            ctx.json_parse(text).map_err(|e| scope.fault(e)).ok()
        }
        Heuristic::LiteralKeyword => keyword(text).map(|k| match k {
            Keyword::Bool(b) => Value::new_bool(ctx.clone(), b),
            Keyword::Null => Value::new_null(ctx.clone()),
            Keyword::Undefined => Value::new_undefined(ctx.clone()),
            Keyword::Number(n) => Value::new_number(ctx.clone(), n),
        }),
        Heuristic::Numeric => parse_numeric(text).map(|n| Value::new_number(ctx.clone(), n)),
        Heuristic::QuotedString => unquote(text).map(|inner| opaque(scope, inner)),
        Heuristic::Opaque => Some(opaque(scope, raw)),
    }
}

fn opaque<'js>(scope: &Scope<'js>, text: &str) -> Value<'js> {
    match rquickjs::String::from_str(scope.ctx.clone(), text) {
        Ok(s) => s.into_value(),
        Err(e) => {
            let _ = scope.fault(e);
            Value::new_undefined(scope.ctx.clone())
        }
    }
}

/// Whether raw text or its declared type needs type erasure before evaluation.
fn carries_type_syntax(text: &str, declared_type: &str) -> bool {
    let declared = declared_type.trim();
    if declared.contains("=>") || declared.contains(" is ") || declared.starts_with("asserts ") {
        return true;
    }
    if text.contains(" as ") || text.contains(" satisfies ") || text.contains("!.") {
        return true;
    }
    if text.starts_with('<') {
        return true;
    }
    // `(x: number) => ...`
    match text.find("=>") {
        Some(arrow) => {
            let head = text[..arrow].trim();
            head.starts_with('(') && head.contains(':')
        }
        None => false,
    }
}

/// A recognised keyword literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Keyword {
    Bool(bool),
    Null,
    Undefined,
    Number(f64),
}

pub(crate) fn keyword(text: &str) -> Option<Keyword> {
    Some(match text {
        "true" => Keyword::Bool(true),
        "false" => Keyword::Bool(false),
        "null" => Keyword::Null,
        "undefined" => Keyword::Undefined,
        "NaN" => Keyword::Number(f64::NAN),
        "Infinity" => Keyword::Number(f64::INFINITY),
        "-Infinity" => Keyword::Number(f64::NEG_INFINITY),
        _ => return None,
    })
}

/// Parse the whole of `text` as a number.
///
/// Accepts decimal and exponent forms plus `0x`, `0o` and `0b` integers,
/// each with an optional sign. Anything else, including `Infinity`, is
/// `None`.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let sign = if negative { -1.0 } else { 1.0 };

    let prefixed = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
    for (prefix, radix) in prefixed {
        if let Some(digits) = body.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .ok()
                .map(|n| sign * n as f64);
        }
    }

    let numeric_chars = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric_chars || !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Inner text of a string fully wrapped in `'`, `"` or a backtick.
pub fn unquote(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if !matches!(first, '\'' | '"' | '`') || text.len() < 2 {
        return None;
    }
    text.strip_prefix(first)?.strip_suffix(first)
}

/// Split `text` on commas that sit outside brackets and quotes.
///
/// Pieces are trimmed. Blank input yields no pieces and a single trailing
/// comma is ignored.
pub fn split_top_level(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth <= 0 => {
                pieces.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let last = current.trim();
    if !last.is_empty() || pieces.is_empty() {
        pieces.push(last.to_string());
    }
    pieces
}
