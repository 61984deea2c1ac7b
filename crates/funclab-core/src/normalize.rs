//! Best-effort TypeScript → JavaScript type eraser.
//!
//! Type-only syntax is overwritten with spaces (line breaks are kept) so the
//! erased program has the same line and column layout as the original. Two
//! constructs need real code instead of blanks: `enum` declarations become a
//! `var` object with reverse numeric mappings, and constructor parameter
//! properties (`constructor(private x: T)`) get `this.x = x;` injected at the
//! start of the constructor body.
//!
//! Erasure never fails. Syntax the eraser does not model is left untouched,
//! so invalid input simply produces invalid output for the evaluator to
//! report.

use std::cmp::Reverse;

use tree_sitter::Node;

use crate::extract::{Dialect, parse_tree};

/// Erase type syntax from TypeScript `source`.
pub fn strip_types(source: &str) -> String {
    let tree = match parse_tree(source, Dialect::TypeScript) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::warn!(error = %e, "Type erasure skipped");
            return source.to_string();
        }
    };
    let mut eraser = Eraser {
        src: source.as_bytes(),
        edits: Vec::new(),
    };
    eraser.visit(tree.root_node());
    let edits = eraser.edits.len();
    let erased = apply(source, eraser.edits);
    tracing::trace!(edits, "Erased type syntax");
    erased
}

/// Statements and members that carry no runtime code.
const TYPE_ONLY_NODES: &[&str] = &[
    "interface_declaration",
    "type_alias_declaration",
    "ambient_declaration",
    "function_signature",
    "method_signature",
    "abstract_method_signature",
    "index_signature",
    "import_statement",
    "internal_module",
    "module",
    "decorator",
    "type_annotation",
    "type_parameters",
    "type_arguments",
    "type_predicate_annotation",
    "asserts_annotation",
    "omitting_type_annotation",
    "adding_type_annotation",
    "opting_type_annotation",
    "implements_clause",
    "accessibility_modifier",
    "override_modifier",
];

/// Anonymous modifier keywords that are dropped wherever they appear.
const TYPE_ONLY_KEYWORDS: &[&str] = &["readonly", "declare", "abstract"];

/// Parents whose `?` / `!` marker tokens are type-only.
const MARKER_PARENTS: &[&str] = &[
    "optional_parameter",
    "method_definition",
    "public_field_definition",
    "variable_declarator",
];

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Eraser<'s> {
    src: &'s [u8],
    edits: Vec<Edit>,
}

impl<'s> Eraser<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.src).unwrap_or("")
    }

    fn blank(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let original = String::from_utf8_lossy(&self.src[start..end]);
        let text = original
            .chars()
            .map(|c| if c == '\n' || c == '\r' { c } else { ' ' })
            .collect();
        self.edits.push(Edit { start, end, text });
    }

    fn blank_node(&mut self, node: Node<'_>) {
        self.blank(node.start_byte(), node.end_byte());
    }

    fn insert(&mut self, at: usize, text: String) {
        self.edits.push(Edit {
            start: at,
            end: at,
            text,
        });
    }

    /// Walk the tree with an explicit stack; nesting depth is bounded only by
    /// the heap.
    fn visit<'t>(&mut self, root: Node<'t>) {
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            self.step(node, &mut pending);
        }
    }

    fn step<'t>(&mut self, node: Node<'t>, pending: &mut Vec<Node<'t>>) {
        let kind = node.kind();

        if !node.is_named() {
            if TYPE_ONLY_KEYWORDS.contains(&kind) {
                self.blank_node(node);
            } else if (kind == "?" || kind == "!")
                && node
                    .parent()
                    .is_some_and(|p| MARKER_PARENTS.contains(&p.kind()))
            {
                self.blank_node(node);
            }
            return;
        }

        if TYPE_ONLY_NODES.contains(&kind) {
            self.blank_node(node);
            return;
        }

        match kind {
            "export_statement" => self.export(node, pending),
            "enum_declaration" => self.enumeration(node),
            "public_field_definition" if has_keyword(node, &["declare", "abstract"]) => {
                self.blank_node(node);
            }
            "required_parameter" | "optional_parameter" if is_this_parameter(node) => {
                self.this_parameter(node);
            }
            "as_expression" | "satisfies_expression" | "non_null_expression" => {
                if let Some(inner) = node.named_child(0) {
                    self.blank(inner.end_byte(), node.end_byte());
                    pending.push(inner);
                }
            }
            "method_definition" => {
                self.parameter_properties(node);
                push_children(node, pending);
            }
            _ => push_children(node, pending),
        }
    }

    fn export<'t>(&mut self, node: Node<'t>, pending: &mut Vec<Node<'t>>) {
        let body = node
            .child_by_field_name("declaration")
            .or_else(|| node.child_by_field_name("value"));
        match body {
            Some(body) => {
                self.blank(node.start_byte(), body.start_byte());
                pending.push(body);
            }
            // `export { a }`, `export * from "x"`, `export = a`
            None => self.blank_node(node),
        }
    }

    fn this_parameter(&mut self, node: Node<'_>) {
        let mut end = node.end_byte();
        if let Some(comma) = node.next_sibling().filter(|s| s.kind() == ",") {
            end = comma.end_byte();
        }
        self.blank(node.start_byte(), end);
    }

    /// `constructor(private x: T)` → inject `this.x = x;` into the body.
    fn parameter_properties(&mut self, method: Node<'_>) {
        let is_constructor = method
            .child_by_field_name("name")
            .is_some_and(|n| self.text(n) == "constructor");
        let (true, Some(params), Some(body)) = (
            is_constructor,
            method.child_by_field_name("parameters"),
            method.child_by_field_name("body"),
        ) else {
            return;
        };

        let mut assignments = String::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let promoted = has_named_child(param, "accessibility_modifier")
                || has_named_child(param, "override_modifier")
                || has_keyword(param, &["readonly"]);
            if !promoted {
                continue;
            }
            let Some(pattern) = param
                .child_by_field_name("pattern")
                .filter(|p| p.kind() == "identifier")
            else {
                continue;
            };
            let name = self.text(pattern);
            assignments.push_str(&format!(" this.{name} = {name};"));
        }
        if assignments.is_empty() {
            return;
        }

        // After a leading `super(...)` call, otherwise right after `{`.
        let mut at = body.start_byte() + 1;
        if let Some(first) = body.named_child(0)
            && first.kind() == "expression_statement"
            && self.text(first).trim_start().starts_with("super")
        {
            at = first.end_byte();
        }
        self.insert(at, assignments);
    }

    /// `enum E { A, B = 5, C = "c" }` → `var E; (function (E) { ... })(E || (E = {}));`
    fn enumeration(&mut self, node: Node<'_>) {
        let (Some(name_node), Some(body)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("body"),
        ) else {
            return;
        };
        let name = self.text(name_node);

        let mut members = String::new();
        let mut previous: Option<String> = None;
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let (key_node, value) = match member.kind() {
                "enum_assignment" => (
                    member.child_by_field_name("name"),
                    member.child_by_field_name("value"),
                ),
                "comment" => continue,
                _ => (Some(member), None),
            };
            let Some(key_node) = key_node else {
                continue;
            };
            let key = enum_key(self.text(key_node));
            let quoted = serde_json::to_string(&key).unwrap_or_else(|_| format!("\"{key}\""));

            match value {
                Some(v) if matches!(v.kind(), "string" | "template_string") => {
                    members.push_str(&format!(" {name}[{quoted}] = {};", self.text(v)));
                }
                Some(v) => {
                    members.push_str(&format!(
                        " {name}[{name}[{quoted}] = ({})] = {quoted};",
                        self.text(v)
                    ));
                }
                None => {
                    let value = match &previous {
                        Some(prev) => format!("{name}[{prev}] + 1"),
                        None => "0".to_string(),
                    };
                    members.push_str(&format!(
                        " {name}[{name}[{quoted}] = {value}] = {quoted};"
                    ));
                }
            }
            previous = Some(quoted);
        }

        let newlines = "\n".repeat(self.text(node).matches('\n').count());
        let text = format!("var {name}; (function ({name}) {{{members} }})({name} || ({name} = {{}}));{newlines}");
        self.edits.push(Edit {
            start: node.start_byte(),
            end: node.end_byte(),
            text,
        });
    }
}

/// Queue children so they pop in document order.
fn push_children<'t>(node: Node<'t>, pending: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    let first = pending.len();
    pending.extend(node.children(&mut cursor));
    pending[first..].reverse();
}

fn enum_key(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    trimmed.to_string()
}

fn has_keyword(node: Node<'_>, keywords: &[&str]) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| !c.is_named() && keywords.contains(&c.kind()))
}

fn has_named_child(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).any(|c| c.kind() == kind)
}

fn is_this_parameter(node: Node<'_>) -> bool {
    node.child_by_field_name("pattern")
        .is_some_and(|p| p.kind() == "this")
}

/// Apply non-overlapping edits; when two overlap the outer one wins.
fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.start, Reverse(e.end)));
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);
    out
}
