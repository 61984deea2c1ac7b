//! Rendering sandbox values as JSON for the outcome.

use rquickjs::Value;
use serde_json::json;

use crate::sandbox::Scope;

/// Hint attached to serialized functions.
pub const FUNCTION_HINT: &str = "returned a function; supply follow-up arguments to invoke it";

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert a sandbox value into its outcome JSON.
///
/// Never fails: anything that cannot be copied structurally degrades to its
/// string form.
pub fn serialize<'js>(scope: &Scope<'js>, value: Value<'js>, preview_chars: usize) -> serde_json::Value {
    if value.is_undefined() {
        return json!("undefined");
    }
    if value.is_null() {
        return json!("null");
    }
    if let Some(b) = value.as_bool() {
        return json!(b);
    }
    if let Some(i) = value.as_int() {
        return json!(i);
    }
    if let Some(f) = value.as_float() {
        return number(f);
    }
    if let Some(s) = value.as_string() {
        return match s.to_string() {
            Ok(s) => json!(s),
            Err(e) => degraded(scope, value.clone(), e),
        };
    }
    if value.is_big_int() || value.is_symbol() {
        return json!(display(scope, value));
    }
    if value.is_function() {
        return function(scope, value, preview_chars);
    }
    if value.is_error() {
        return error(scope, value);
    }
    structural(scope, value)
}

fn number(f: f64) -> serde_json::Value {
    if f.is_nan() {
        json!("NaN")
    } else if f.is_infinite() {
        json!(if f > 0.0 { "Infinity" } else { "-Infinity" })
    } else if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        json!(f as i64)
    } else {
        json!(f)
    }
}

fn function<'js>(scope: &Scope<'js>, value: Value<'js>, preview_chars: usize) -> serde_json::Value {
    let name = value
        .as_function()
        .and_then(|f| f.get::<_, Option<String>>("name").ok().flatten())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());
    let source = scope.harness.source_of(value).unwrap_or_else(|e| {
        let _ = scope.fault(e);
        String::new()
    });
    json!({
        "type": "function",
        "name": name,
        "preview": preview(&source, preview_chars),
        "hint": FUNCTION_HINT,
    })
}

/// Truncate `source` to `limit` characters, marking the cut with `…`.
pub fn preview(source: &str, limit: usize) -> String {
    if source.chars().count() <= limit {
        return source.to_string();
    }
    let mut cut: String = source.chars().take(limit).collect();
    cut.push('…');
    cut
}

fn error<'js>(scope: &Scope<'js>, value: Value<'js>) -> serde_json::Value {
    let info = match scope.harness.error_info(value.clone()) {
        Ok(info) => info,
        Err(e) => return degraded(scope, value, e),
    };
    let field = |name: &str| -> String { info.get::<_, String>(name).unwrap_or_default() };
    json!({
        "kind": field("kind"),
        "message": field("message"),
        "trace": field("trace"),
    })
}

fn structural<'js>(scope: &Scope<'js>, value: Value<'js>) -> serde_json::Value {
    let copied = scope
        .harness
        .replacer()
        .and_then(|replacer| scope.ctx.json_stringify_replacer(value.clone(), replacer))
        .and_then(|text| text.map(|t| t.to_string()).transpose());
    match copied {
        Ok(Some(text)) => match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Structured copy produced invalid JSON");
                json!(display(scope, value))
            }
        },
        Ok(None) => json!(display(scope, value)),
        Err(e) => degraded(scope, value, e),
    }
}

fn degraded<'js>(scope: &Scope<'js>, value: Value<'js>, error: rquickjs::Error) -> serde_json::Value {
    let reason = scope.fault(error);
    tracing::warn!(%reason, "Value degraded to its string form");
    json!(display(scope, value))
}

fn display<'js>(scope: &Scope<'js>, value: Value<'js>) -> String {
    scope.harness.display(value).unwrap_or_else(|e| {
        let _ = scope.fault(e);
        "[unprintable]".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Sandbox, SandboxConfig};
    use pretty_assertions::assert_eq;

    fn render(expression: &str, preview_chars: usize) -> serde_json::Value {
        let sandbox = Sandbox::new(SandboxConfig::new("serialize-test")).unwrap();
        sandbox
            .scope(|scope| {
                let value = scope.try_expression(expression).unwrap();
                serialize(&scope, value, preview_chars)
            })
            .unwrap()
    }

    #[test]
    fn test_primitives() {
        assert_eq!(render("undefined", 100), json!("undefined"));
        assert_eq!(render("null", 100), json!("null"));
        assert_eq!(render("true", 100), json!(true));
        assert_eq!(render("40 + 2", 100), json!(42));
        assert_eq!(render("2.5", 100), json!(2.5));
        assert_eq!(render("8 / 2", 100), json!(4));
        assert_eq!(render("'text'", 100), json!("text"));
    }

    #[test]
    fn test_non_finite_numbers_use_names() {
        assert_eq!(render("0 / 0", 100), json!("NaN"));
        assert_eq!(render("1 / 0", 100), json!("Infinity"));
        assert_eq!(render("-1 / 0", 100), json!("-Infinity"));
    }

    #[test]
    fn test_big_int_as_string() {
        assert_eq!(render("10n ** 20n", 100), json!("100000000000000000000"));
    }

    #[test]
    fn test_structures() {
        assert_eq!(
            render("({ a: 1, f() {}, n: NaN, list: [1, undefined] })", 100),
            json!({"a": 1, "n": "NaN", "list": [1, null]})
        );
        assert_eq!(render("new Map([['a', 1], ['b', 2]])", 100), json!({"a": 1, "b": 2}));
        assert_eq!(render("new Set([3, 3, 4])", 100), json!([3, 4]));
        assert_eq!(render("({ big: 5n })", 100), json!({"big": "5"}));
    }

    #[test]
    fn test_cyclic_structure_degrades_to_string() {
        let value = render("(() => { const o = {}; o.self = o; return o; })()", 100);
        assert_eq!(value, json!("[object Object]"));
    }

    #[test]
    fn test_function_summary() {
        let value = render("function add(a, b) { return a + b; }", 12);
        assert_eq!(value["type"], "function");
        assert_eq!(value["name"], "add");
        assert_eq!(value["preview"], "function add…");
        assert_eq!(value["hint"], FUNCTION_HINT);

        let value = render("(x) => x", 100);
        assert_eq!(value["name"], "anonymous");
        assert_eq!(value["preview"], "(x) => x");
    }

    #[test]
    fn test_error_summary() {
        let value = render("new RangeError('out of range')", 100);
        assert_eq!(value["kind"], "RangeError");
        assert_eq!(value["message"], "out of range");
        assert!(value["trace"].is_string());
    }

    #[test]
    fn test_nested_error_keeps_details() {
        let value = render("({ e: new TypeError('m'), list: [new Error('n')] })", 100);
        assert_eq!(value["e"]["kind"], "TypeError");
        assert_eq!(value["e"]["message"], "m");
        assert!(value["e"]["trace"].is_string());
        assert_eq!(value["list"][0]["kind"], "Error");
        assert_eq!(value["list"][0]["message"], "n");
    }

    #[test]
    fn test_preview_counts_characters() {
        assert_eq!(preview("héllo", 10), "héllo");
        assert_eq!(preview("héllo", 2), "hé…");
    }
}
