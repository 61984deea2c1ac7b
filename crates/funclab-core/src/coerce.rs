//! Best-effort coercion of raw text into a typed value, outside any
//! execution sandbox.
//!
//! Candidate literals are first checked syntactically; only text that is a
//! single object, array or function expression is handed to a scratch
//! QuickJS context, so validation never runs user code.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::json;

use crate::extract::{Dialect, parse_tree};
use crate::materialize::{Keyword, keyword, parse_numeric, split_top_level, unquote};
use crate::normalize::strip_types;
use crate::sandbox::{Sandbox, SandboxConfig};

/// A coerced value.
#[derive(Debug, Clone, PartialEq)]
pub enum LabValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Object or array data.
    Data(serde_json::Value),
    /// Function literal, as evaluable JavaScript.
    Function { source: String },
    Date(DateTime<Utc>),
    /// `new Class(args...)`.
    Construct { class: String, args: Vec<LabValue> },
}

impl LabValue {
    /// Render as JavaScript source that evaluates to this value.
    pub fn to_source(&self) -> String {
        match self {
            LabValue::Undefined => "undefined".to_string(),
            LabValue::Null => "null".to_string(),
            LabValue::Bool(b) => b.to_string(),
            LabValue::Number(n) => number_source(*n),
            LabValue::String(s) => quote(s),
            LabValue::Data(data) => data.to_string(),
            LabValue::Function { source } => source.clone(),
            LabValue::Date(at) => format!("new Date({})", quote(&at.to_rfc3339())),
            LabValue::Construct { class, args } => {
                let args: Vec<String> = args.iter().map(LabValue::to_source).collect();
                format!("new {class}({})", args.join(", "))
            }
        }
    }

    /// Render as JSON, labelling values JSON cannot express.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LabValue::Undefined => json!("undefined"),
            LabValue::Null => serde_json::Value::Null,
            LabValue::Bool(b) => json!(b),
            LabValue::Number(n) if n.is_finite() => {
                if n.fract() == 0.0 && n.abs() < 9e15 {
                    json!(*n as i64)
                } else {
                    json!(n)
                }
            }
            LabValue::Number(n) => json!(number_source(*n)),
            LabValue::String(s) => json!(s),
            LabValue::Data(data) => data.clone(),
            LabValue::Function { source } => json!({"type": "function", "source": source}),
            LabValue::Date(at) => json!(at.to_rfc3339()),
            LabValue::Construct { class, args } => json!({
                "type": "construct",
                "class": class,
                "args": args.iter().map(LabValue::to_json).collect::<Vec<_>>(),
            }),
        }
    }
}

impl fmt::Display for LabValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_source())
    }
}

fn number_source(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

/// Coerce `raw` according to `declared_type`. Never fails.
pub fn coerce(raw: &str, declared_type: &str) -> LabValue {
    let text = raw.trim();
    if text.is_empty() {
        return LabValue::Undefined;
    }
    let mut scratch = Scratch::default();

    if let Some(data) = structured(text, &mut scratch) {
        return LabValue::Data(data);
    }
    if let Some(source) = function_literal(text, &mut scratch) {
        return LabValue::Function { source };
    }
    if names_date(declared_type)
        && let Some(at) = date(unquote(text).unwrap_or(text))
    {
        return LabValue::Date(at);
    }
    if let Some((class, args)) = construct(text) {
        return LabValue::Construct { class, args };
    }
    if let Some(k) = keyword(text) {
        return match k {
            Keyword::Bool(b) => LabValue::Bool(b),
            Keyword::Null => LabValue::Null,
            Keyword::Undefined => LabValue::Undefined,
            Keyword::Number(n) => LabValue::Number(n),
        };
    }
    if let Some(n) = parse_numeric(text) {
        return LabValue::Number(n);
    }
    if let Some(inner) = unquote(text) {
        return LabValue::String(inner.to_string());
    }
    LabValue::String(text.to_string())
}

// ── Structured data ─────────────────────────────────────────────────────

fn structured(text: &str, scratch: &mut Scratch) -> Option<serde_json::Value> {
    if !(text.starts_with('{') || text.starts_with('[')) {
        return None;
    }
    if let Ok(data) = serde_json::from_str(text) {
        return Some(data);
    }
    // Relaxed literals (`{a: 1, 'b': [2,]}`) must not contain calls,
    // accessors or template interpolation.
    if text.contains('(') || text.contains('`') {
        return None;
    }
    if !matches!(
        single_expression(text).as_deref(),
        Some("object" | "array")
    ) {
        return None;
    }
    let json = scratch.json_of(text)?;
    serde_json::from_str(&json).ok()
}

// ── Function literals ───────────────────────────────────────────────────

fn function_literal(text: &str, scratch: &mut Scratch) -> Option<String> {
    let looks_callable =
        text.starts_with("function") || text.starts_with("async") || text.contains("=>");
    if !looks_callable {
        return None;
    }

    let erased = strip_types(&format!("({text})"));
    let erased = erased.trim();
    let erased = erased
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(erased)
        .trim()
        .to_string();
    let candidates = [Some(text.to_string()), Some(erased), rebuild_arrow(text)];

    candidates
        .into_iter()
        .flatten()
        .find(|candidate| is_function_expression(candidate) && scratch.is_function(candidate))
}

fn is_function_expression(text: &str) -> bool {
    matches!(
        single_expression(text).as_deref(),
        Some("arrow_function" | "function_expression" | "function" | "generator_function")
    )
}

/// Rebuild `(a: T, b?: U) => expr` as `(a, b) => expr`.
///
/// Only single-expression arrows with simple parameter names are handled.
pub fn rebuild_arrow(text: &str) -> Option<String> {
    let (head, body) = text.split_once("=>")?;
    let head = head.trim();
    let body = body.trim().trim_end_matches(';').trim();
    if body.is_empty() || body.starts_with('{') {
        return None;
    }

    let inner = match head.strip_prefix('(') {
        Some(rest) => rest.rfind(')').map(|close| &rest[..close])?,
        None => head,
    };
    let mut names = Vec::new();
    for piece in split_parameters(inner) {
        if piece.trim().is_empty() {
            continue;
        }
        let name = piece
            .split([':', '='])
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches('?')
            .trim();
        let simple = name
            .trim_start_matches("...")
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if name.is_empty() || !simple {
            return None;
        }
        names.push(name.to_string());
    }
    Some(format!("({}) => {body}", names.join(", ")))
}

/// Split a parameter list on commas outside brackets and type arguments.
fn split_parameters(inner: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth == 0 => {
                pieces.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&inner[start..]);
    pieces
}

// ── Dates ───────────────────────────────────────────────────────────────

/// Type names that read raw text as a point in time.
const DATE_TYPES: &[&str] = &["Date", "DateTime", "Dayjs", "Moment"];

/// Whether any whole identifier in `declared_type` is a date type, so
/// `Date | null` matches while `UpdateCount` does not.
fn names_date(declared_type: &str) -> bool {
    declared_type
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .any(|ident| DATE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(ident)))
}

fn date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
            return Some(at.and_utc());
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|at| at.and_utc());
    }
    if text.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return text
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis);
    }
    None
}

// ── Constructor calls ───────────────────────────────────────────────────

fn construct(text: &str) -> Option<(String, Vec<LabValue>)> {
    let rest = text.strip_prefix("new ")?.trim_start();
    let name_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.'))
        .unwrap_or(rest.len());
    let class = &rest[..name_end];
    if class.is_empty() || class.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let tail = rest[name_end..].trim();
    if tail.is_empty() {
        return Some((class.to_string(), Vec::new()));
    }
    let inner = tail.strip_prefix('(')?.strip_suffix(')')?;
    let args = split_top_level(inner)
        .iter()
        .map(|piece| coerce(piece, "any"))
        .collect();
    Some((class.to_string(), args))
}

// ── Syntax gate and scratch context ─────────────────────────────────────

/// Kind of the lone expression in `(text)`, if the text is exactly one
/// well-formed expression.
fn single_expression(text: &str) -> Option<String> {
    let wrapped = format!("({text}\n)");
    let tree = parse_tree(&wrapped, Dialect::TypeScript).ok()?;
    let root = tree.root_node();
    if root.has_error() || root.named_child_count() != 1 {
        return None;
    }
    let statement = root.named_child(0)?;
    if statement.kind() != "expression_statement" {
        return None;
    }
    let parenthesized = statement.named_child(0)?;
    if parenthesized.kind() != "parenthesized_expression" || parenthesized.named_child_count() != 1 {
        return None;
    }
    parenthesized.named_child(0).map(|n| n.kind().to_string())
}

/// Lazily created QuickJS context used to validate literals.
#[derive(Default)]
struct Scratch {
    sandbox: Option<Sandbox>,
    unavailable: bool,
}

impl Scratch {
    fn sandbox(&mut self) -> Option<&Sandbox> {
        if self.sandbox.is_none() && !self.unavailable {
            match Sandbox::new(SandboxConfig::new("coerce-scratch")) {
                Ok(sandbox) => self.sandbox = Some(sandbox),
                Err(e) => {
                    tracing::warn!(error = %e, "Scratch context unavailable");
                    self.unavailable = true;
                }
            }
        }
        self.sandbox.as_ref()
    }

    /// `JSON.stringify` of the evaluated literal.
    fn json_of(&mut self, literal: &str) -> Option<String> {
        let sandbox = self.sandbox()?;
        sandbox
            .scope(|scope| {
                let value = scope.try_expression(literal)?;
                scope
                    .ctx
                    .json_stringify(value)
                    .map_err(|e| scope.fault(e))
                    .ok()
                    .flatten()
                    .and_then(|s| s.to_string().ok())
            })
            .ok()
            .flatten()
    }

    fn is_function(&mut self, candidate: &str) -> bool {
        let Some(sandbox) = self.sandbox() else {
            return false;
        };
        sandbox
            .scope(|scope| {
                scope
                    .try_expression(candidate)
                    .is_some_and(|value| value.is_function())
            })
            .unwrap_or(false)
    }
}
