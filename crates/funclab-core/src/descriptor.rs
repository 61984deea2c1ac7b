//! Callable descriptors produced by the extractor.
//!
//! A [`FunctionDescriptor`] is a plain value object: it carries everything a
//! host needs to list a callable, navigate to it, and hand its source text to
//! the execution engine. Field names serialize in camelCase to match the
//! boundary JSON shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel used when a parameter or return type carries no annotation.
pub const UNTYPED: &str = "any";

/// Shape of a discovered callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallableKind {
    /// `function name(...) {}` (including generators).
    #[serde(rename = "function")]
    Function,
    /// `const name = (...) => ...` or `const name = function (...) {}`.
    #[serde(rename = "arrow-or-expression-binding")]
    Binding,
    /// Synthetic descriptor for a class's constructor.
    #[serde(rename = "constructor")]
    Constructor,
    /// A declared class method.
    #[serde(rename = "method")]
    Method,
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallableKind::Function => write!(f, "function"),
            CallableKind::Binding => write!(f, "arrow-or-expression-binding"),
            CallableKind::Constructor => write!(f, "constructor"),
            CallableKind::Method => write!(f, "method"),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Identifier, or the literal text of a destructuring pattern.
    pub name: String,
    /// Verbatim annotation text, or `"any"`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Written `name?` or carries a default value.
    pub optional: bool,
    /// Written `...name`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub rest: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Parameter {
    /// A required, unannotated parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: UNTYPED.to_string(),
            optional: false,
            rest: false,
        }
    }

    /// Builder: set the declared type text.
    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.ty = ty.into();
        self
    }

    /// Builder: mark optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Builder: mark as a rest parameter.
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rest {
            write!(f, "...")?;
        }
        write!(f, "{}", self.name)?;
        if self.optional {
            write!(f, "?")?;
        }
        write!(f, ": {}", self.ty)
    }
}

/// 1-based inclusive line span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub start_line: u32,
    pub end_line: u32,
}

/// A callable discovered in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    /// Declared name; `Owner.method` for class methods.
    pub name: String,
    /// Parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// Verbatim return annotation, `"any"`, or the class name for constructors.
    pub return_type: String,
    /// Lines covered by the declaration.
    #[serde(flatten)]
    pub span: SourceSpan,
    /// Source slice that can be re-evaluated standalone.
    pub source_text: String,
    /// Declared `async`.
    pub is_async: bool,
    /// Shape of the callable.
    pub kind: CallableKind,
    /// Owning class for constructors and methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl FunctionDescriptor {
    /// One-line signature, e.g. `async fetch(url: string): Promise<T>`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        let prefix = if self.is_async { "async " } else { "" };
        format!(
            "{prefix}{}({}): {}",
            self.name,
            params.join(", "),
            self.return_type
        )
    }

    /// Whether the final parameter is variadic.
    pub fn is_variadic(&self) -> bool {
        self.parameters.last().is_some_and(|p| p.rest)
    }
}

/// Resolve an entry name to its descriptor's start line.
///
/// The first descriptor in document order wins when names repeat.
pub fn locate(descriptors: &[FunctionDescriptor], entry_name: &str) -> Option<u32> {
    descriptors
        .iter()
        .find(|d| d.name == entry_name)
        .map(|d| d.span.start_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(name: &str, line: u32) -> FunctionDescriptor {
        FunctionDescriptor {
            name: name.to_string(),
            parameters: vec![
                Parameter::new("a").with_type("number"),
                Parameter::new("rest").with_type("number[]").rest(),
            ],
            return_type: "number".to_string(),
            span: SourceSpan {
                start_line: line,
                end_line: line + 2,
            },
            source_text: format!("function {name}(a: number, ...rest: number[]) {{}}"),
            is_async: false,
            kind: CallableKind::Function,
            owner: None,
        }
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let json = serde_json::to_value(sample("sum", 3)).unwrap();
        assert_eq!(json["startLine"], 3);
        assert_eq!(json["endLine"], 5);
        assert_eq!(json["returnType"], "number");
        assert_eq!(json["isAsync"], false);
        assert_eq!(json["kind"], "function");
        assert_eq!(json["parameters"][0]["type"], "number");
        assert!(json["parameters"][0].get("rest").is_none());
        assert_eq!(json["parameters"][1]["rest"], true);
        assert!(json.get("owner").is_none());
    }

    #[test]
    fn test_kind_wire_names() {
        let kinds = [
            CallableKind::Function,
            CallableKind::Binding,
            CallableKind::Constructor,
            CallableKind::Method,
        ];
        for kind in kinds {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.to_string()));
        }
    }

    #[test]
    fn test_signature_and_variadic() {
        let d = sample("sum", 1);
        assert_eq!(d.signature(), "sum(a: number, ...rest: number[]): number");
        assert!(d.is_variadic());
    }

    #[test]
    fn test_locate_first_match() {
        let descriptors = vec![sample("a", 1), sample("b", 10), sample("b", 20)];
        assert_eq!(locate(&descriptors, "b"), Some(10));
        assert_eq!(locate(&descriptors, "missing"), None);
    }
}
