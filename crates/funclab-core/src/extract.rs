//! Signature extractor: TypeScript/JavaScript source → callable descriptors.
//!
//! Parses the whole file with tree-sitter and walks the top-level statements,
//! emitting one [`FunctionDescriptor`] per recognized callable in document
//! order:
//!
//! | Shape | Descriptor |
//! |-------|-----------|
//! | `function f() {}` / `function* g() {}` | `function` |
//! | `const f = () => {}` / `let f = function () {}` | `arrow-or-expression-binding` |
//! | `class C { constructor() {} m() {} }` | `constructor` `C`, then `method` `C.m` |
//!
//! `export` and `export default` wrappers are looked through. Accessors,
//! `#private` members and computed member names are skipped. Unrecognized
//! statements are ignored; a file with any syntax error is rejected as a
//! whole so callers can keep their previous descriptor list.

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::descriptor::{CallableKind, FunctionDescriptor, Parameter, SourceSpan, UNTYPED};

/// Errors from a full extraction pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("parser setup failed: {0}")]
    Language(String),

    #[error("parser produced no tree for {0}")]
    Aborted(String),

    #[error("syntax error in {file} at line {line}, column {column}")]
    Syntax { file: String, line: u32, column: u32 },
}

/// Grammar used to parse a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `.ts`, `.mts`, `.cts`, `.js`, `.mjs`, `.cjs` and anything unknown.
    #[default]
    TypeScript,
    /// `.tsx` and `.jsx`.
    Tsx,
}

impl Dialect {
    /// Pick a grammar from a file identifier's extension.
    pub fn from_identifier(file: &str) -> Self {
        let ext = Path::new(file)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "tsx" | "jsx" => Dialect::Tsx,
            _ => Dialect::TypeScript,
        }
    }

    fn language(self) -> tree_sitter::Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// Parse `source` into a syntax tree, errors included.
pub(crate) fn parse_tree(source: &str, dialect: Dialect) -> Result<Tree, ExtractError> {
    let mut parser = Parser::new();
    parser
        .set_language(&dialect.language())
        .map_err(|e| ExtractError::Language(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ExtractError::Aborted(format!("{dialect:?} source")))
}

/// Extract every top-level callable from `source`.
///
/// `file` is only used to pick the grammar and to label errors.
pub fn extract(source: &str, file: &str) -> Result<Vec<FunctionDescriptor>, ExtractError> {
    let tree = parse_tree(source, Dialect::from_identifier(file))?;
    let root = tree.root_node();

    if root.has_error() {
        let at = first_error(root).unwrap_or(root).start_position();
        let err = ExtractError::Syntax {
            file: file.to_string(),
            line: at.row as u32 + 1,
            column: at.column as u32 + 1,
        };
        tracing::warn!(file, error = %err, "Extraction rejected");
        return Err(err);
    }

    let src = source.as_bytes();
    let mut descriptors = Vec::new();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        visit_statement(statement, src, &mut descriptors);
    }

    tracing::debug!(file, count = descriptors.len(), "Extracted descriptors");
    Ok(descriptors)
}

/// First error or missing node in document order, found with a cursor so
/// deeply nested trees cannot exhaust the stack.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn visit_statement(node: Node<'_>, src: &[u8], out: &mut Vec<FunctionDescriptor>) {
    match node.kind() {
        "export_statement" => {
            if let Some(declaration) = node.child_by_field_name("declaration") {
                visit_statement(declaration, src, out);
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(descriptor) = function_declaration(node, src) {
                out.push(descriptor);
            }
        }
        "lexical_declaration" | "variable_declaration" => bindings(node, src, out),
        "class_declaration" | "abstract_class_declaration" => class(node, src, out),
        other => tracing::trace!(kind = other, "Skipping statement"),
    }
}

fn function_declaration(node: Node<'_>, src: &[u8]) -> Option<FunctionDescriptor> {
    let name = text(node.child_by_field_name("name")?, src)?;
    Some(FunctionDescriptor {
        name: name.to_string(),
        parameters: parameters(node, src),
        return_type: return_type(node, src),
        span: span(node),
        source_text: text(node, src)?.to_string(),
        is_async: has_token(node, "async"),
        kind: CallableKind::Function,
        owner: None,
    })
}

fn bindings(statement: Node<'_>, src: &[u8], out: &mut Vec<FunctionDescriptor>) {
    let Some(source_text) = text(statement, src) else {
        return;
    };
    let mut cursor = statement.walk();
    for declarator in statement.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(value) = declarator.child_by_field_name("value") else {
            continue;
        };
        if !matches!(
            value.kind(),
            "arrow_function" | "function_expression" | "generator_function"
        ) {
            continue;
        }
        let Some(name) = declarator
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
            .and_then(|n| text(n, src))
        else {
            continue;
        };
        out.push(FunctionDescriptor {
            name: name.to_string(),
            parameters: parameters(value, src),
            return_type: return_type(value, src),
            span: span(statement),
            source_text: source_text.to_string(),
            is_async: has_token(value, "async"),
            kind: CallableKind::Binding,
            owner: None,
        });
    }
}

fn class(node: Node<'_>, src: &[u8], out: &mut Vec<FunctionDescriptor>) {
    let (Some(class_name), Some(body), Some(class_text)) = (
        node.child_by_field_name("name").and_then(|n| text(n, src)),
        node.child_by_field_name("body"),
        text(node, src),
    ) else {
        return;
    };

    let mut constructor_params = Vec::new();
    let mut methods = Vec::new();
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        if member.kind() != "method_definition" {
            continue;
        }
        let Some(member_name) = member
            .child_by_field_name("name")
            .filter(|n| n.kind() == "property_identifier")
            .and_then(|n| text(n, src))
        else {
            continue;
        };
        if member_name == "constructor" {
            constructor_params = parameters(member, src);
            continue;
        }
        if has_token(member, "get") || has_token(member, "set") {
            continue;
        }
        methods.push(FunctionDescriptor {
            name: format!("{class_name}.{member_name}"),
            parameters: parameters(member, src),
            return_type: return_type(member, src),
            span: span(member),
            source_text: class_text.to_string(),
            is_async: has_token(member, "async"),
            kind: CallableKind::Method,
            owner: Some(class_name.to_string()),
        });
    }

    out.push(FunctionDescriptor {
        name: class_name.to_string(),
        parameters: constructor_params,
        return_type: class_name.to_string(),
        span: span(node),
        source_text: class_text.to_string(),
        is_async: false,
        kind: CallableKind::Constructor,
        owner: Some(class_name.to_string()),
    });
    out.extend(methods);
}

// ── Parameters ──────────────────────────────────────────────────────────

fn parameters(callable: Node<'_>, src: &[u8]) -> Vec<Parameter> {
    // `x => ...` carries its single parameter in its own field.
    if let Some(single) = callable.child_by_field_name("parameter") {
        return text(single, src)
            .map(|name| vec![Parameter::new(name)])
            .unwrap_or_default();
    }
    let Some(list) = callable.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut cursor = list.walk();
    list.named_children(&mut cursor)
        .filter(|p| matches!(p.kind(), "required_parameter" | "optional_parameter"))
        .filter_map(|p| parameter(p, src))
        .collect()
}

fn parameter(node: Node<'_>, src: &[u8]) -> Option<Parameter> {
    let pattern = node.child_by_field_name("pattern")?;
    if pattern.kind() == "this" {
        return None;
    }
    let (binding, rest) = if pattern.kind() == "rest_pattern" {
        (pattern.named_child(0)?, true)
    } else {
        (pattern, false)
    };
    let ty = node
        .child_by_field_name("type")
        .and_then(|t| annotation(t, src))
        .unwrap_or(UNTYPED);

    let mut param = Parameter::new(text(binding, src)?).with_type(ty);
    if node.kind() == "optional_parameter" || node.child_by_field_name("value").is_some() {
        param = param.optional();
    }
    if rest {
        param = param.rest();
    }
    Some(param)
}

fn return_type(callable: Node<'_>, src: &[u8]) -> String {
    callable
        .child_by_field_name("return_type")
        .and_then(|t| annotation(t, src))
        .unwrap_or(UNTYPED)
        .to_string()
}

/// Annotation text without its leading `:`.
fn annotation<'s>(node: Node<'_>, src: &'s [u8]) -> Option<&'s str> {
    let raw = text(node, src)?.trim();
    let stripped = raw.strip_prefix(':').unwrap_or(raw).trim();
    (!stripped.is_empty()).then_some(stripped)
}

// ── Node helpers ────────────────────────────────────────────────────────

fn text<'s>(node: Node<'_>, src: &'s [u8]) -> Option<&'s str> {
    node.utf8_text(src).ok()
}

fn span(node: Node<'_>) -> SourceSpan {
    SourceSpan {
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
    }
}

/// Whether `node` has an anonymous child token `keyword` (e.g. `async`).
fn has_token(node: Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(descriptors: &[FunctionDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_extract_function_declarations_in_order() {
        let code = "function a() {}\nfunction b(x) { return x; }\n\nfunction c(x, y) {\n  return x + y;\n}\n";
        let found = extract(code, "math.ts").unwrap();
        assert_eq!(names(&found), vec!["a", "b", "c"]);
        assert!(found.iter().all(|d| d.kind == CallableKind::Function));
        assert_eq!(found[2].span, SourceSpan { start_line: 4, end_line: 6 });
        assert_eq!(found[2].source_text, "function c(x, y) {\n  return x + y;\n}");
    }

    #[test]
    fn test_extract_typed_parameters() {
        let code = "export function greet(name: string, times?: number, loud = false): string { return name; }";
        let found = extract(code, "greet.ts").unwrap();
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.return_type, "string");
        assert_eq!(
            d.parameters,
            vec![
                Parameter::new("name").with_type("string"),
                Parameter::new("times").with_type("number").optional(),
                Parameter::new("loud").optional(),
            ]
        );
        assert!(d.source_text.starts_with("function greet"));
    }

    #[test]
    fn test_extract_rest_and_destructured_parameters() {
        let code = "function f({ a, b }: Opts, ...rest: number[]) {}";
        let found = extract(code, "f.ts").unwrap();
        let params = &found[0].parameters;
        assert_eq!(params[0].name, "{ a, b }");
        assert_eq!(params[0].ty, "Opts");
        assert_eq!(params[1], Parameter::new("rest").with_type("number[]").rest());
        assert!(found[0].is_variadic());
    }

    #[test]
    fn test_extract_skips_this_parameter() {
        let code = "function handler(this: Window, event: Event) {}";
        let found = extract(code, "h.ts").unwrap();
        assert_eq!(found[0].parameters, vec![Parameter::new("event").with_type("Event")]);
    }

    #[test]
    fn test_extract_bindings() {
        let code = "const double = (x: number): number => x * 2;\nlet shout = async function (s) { return s; };\nvar id = v => v;\nconst notAFunction = 3;\n";
        let found = extract(code, "b.ts").unwrap();
        assert_eq!(names(&found), vec!["double", "shout", "id"]);
        assert!(found.iter().all(|d| d.kind == CallableKind::Binding));
        assert_eq!(found[0].return_type, "number");
        assert_eq!(found[0].source_text, "const double = (x: number): number => x * 2;");
        assert!(found[1].is_async);
        assert_eq!(found[2].parameters, vec![Parameter::new("v")]);
    }

    #[test]
    fn test_extract_class_constructor_then_methods() {
        let code = r#"class Counter {
  private count = 0;
  constructor(start: number) {
    this.count = start;
  }
  increment(by: number = 1): number {
    this.count += by;
    return this.count;
  }
  async reset() {
    this.count = 0;
  }
  get value() { return this.count; }
  #secret() {}
}
"#;
        let found = extract(code, "counter.ts").unwrap();
        assert_eq!(names(&found), vec!["Counter", "Counter.increment", "Counter.reset"]);

        let ctor = &found[0];
        assert_eq!(ctor.kind, CallableKind::Constructor);
        assert_eq!(ctor.return_type, "Counter");
        assert_eq!(ctor.owner.as_deref(), Some("Counter"));
        assert_eq!(ctor.parameters, vec![Parameter::new("start").with_type("number")]);
        assert_eq!(ctor.span, SourceSpan { start_line: 1, end_line: 15 });

        let inc = &found[1];
        assert_eq!(inc.kind, CallableKind::Method);
        assert_eq!(inc.span, SourceSpan { start_line: 6, end_line: 9 });
        assert_eq!(inc.source_text, code.trim_end());
        assert!(found[2].is_async);
    }

    #[test]
    fn test_extract_class_without_constructor() {
        let code = "export default class Shape { area() { return 0; } }";
        let found = extract(code, "shape.ts").unwrap();
        assert_eq!(names(&found), vec!["Shape", "Shape.area"]);
        assert!(found[0].parameters.is_empty());
    }

    #[test]
    fn test_extract_abstract_class_skips_abstract_members() {
        let code = "abstract class Base {\n  abstract run(): void;\n  describe() { return 'base'; }\n}";
        let found = extract(code, "base.ts").unwrap();
        assert_eq!(names(&found), vec!["Base", "Base.describe"]);
    }

    #[test]
    fn test_extract_ignores_nested_and_unrecognized() {
        let code = "interface I { f(): void }\ntype T = () => void;\nfunction outer() { function inner() {} }\nif (true) { function hidden() {} }\n";
        let found = extract(code, "n.ts").unwrap();
        assert_eq!(names(&found), vec!["outer"]);
    }

    #[test]
    fn test_extract_generator_declaration() {
        let code = "function* ids() { yield 1; }\nasync function load() {}";
        let found = extract(code, "gen.js").unwrap();
        assert_eq!(names(&found), vec!["ids", "load"]);
        assert!(!found[0].is_async);
        assert!(found[1].is_async);
    }

    #[test]
    fn test_extract_syntax_error_is_fatal() {
        let code = "function ok() {}\nfunction broken( {\n";
        let err = extract(code, "broken.ts").unwrap_err();
        match err {
            ExtractError::Syntax { file, line, .. } => {
                assert_eq!(file, "broken.ts");
                assert!(line >= 2);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_empty_source() {
        assert!(extract("", "empty.ts").unwrap().is_empty());
    }

    #[test]
    fn test_dialect_from_identifier() {
        assert_eq!(Dialect::from_identifier("view.tsx"), Dialect::Tsx);
        assert_eq!(Dialect::from_identifier("app.jsx"), Dialect::Tsx);
        assert_eq!(Dialect::from_identifier("lib.mjs"), Dialect::TypeScript);
        assert_eq!(Dialect::from_identifier("untitled"), Dialect::TypeScript);
    }

    #[test]
    fn test_extract_tsx_component() {
        let code = "export const Hello = ({ name }: { name: string }) => <div>{name}</div>;";
        let found = extract(code, "hello.tsx").unwrap();
        assert_eq!(names(&found), vec!["Hello"]);
        assert_eq!(found[0].parameters[0].ty, "{ name: string }");
    }
}
