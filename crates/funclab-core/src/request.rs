//! Boundary types for the execution engine.

use serde::{Deserialize, Serialize};

use crate::descriptor::UNTYPED;
use crate::sandbox::ConsoleLine;

/// One raw argument as typed by the user, with its parameter's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSpec {
    pub raw: String,
    #[serde(default = "default_declared_type")]
    pub declared_type: String,
}

fn default_declared_type() -> String {
    UNTYPED.to_string()
}

impl ArgumentSpec {
    pub fn new(raw: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            declared_type: declared_type.into(),
        }
    }

    /// An argument whose parameter has no annotation.
    pub fn untyped(raw: impl Into<String>) -> Self {
        Self::new(raw, UNTYPED)
    }
}

/// Everything needed for one sandboxed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// Program text that defines the entry (a descriptor's source, or a whole file).
    pub source_text: String,
    /// `Name` or `Owner.member`.
    pub entry_name: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    #[serde(default)]
    pub is_async: bool,
    /// Comma-separated arguments for a returned function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_arguments: Option<String>,
}

impl ExecuteRequest {
    pub fn new(source_text: impl Into<String>, entry_name: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            entry_name: entry_name.into(),
            arguments: Vec::new(),
            is_async: false,
            follow_up_arguments: None,
        }
    }

    /// Builder: append one argument.
    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Builder: append untyped arguments.
    pub fn with_raw_arguments<I, S>(mut self, raws: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments
            .extend(raws.into_iter().map(ArgumentSpec::untyped));
        self
    }

    /// Builder: settle the result even if it does not look awaitable.
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Builder: arguments for a follow-up call on a returned function.
    pub fn with_follow_up(mut self, arguments: impl Into<String>) -> Self {
        self.follow_up_arguments = Some(arguments.into());
        self
    }
}

/// Result of one execution. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub elapsed_ms: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<ConsoleLine>,
}

impl ExecutionOutcome {
    pub fn success(value: serde_json::Value, elapsed_ms: f64) -> Self {
        Self {
            success: true,
            value: Some(value),
            error_message: None,
            elapsed_ms,
            console: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            success: false,
            value: None,
            error_message: Some(message.into()),
            elapsed_ms,
            console: Vec::new(),
        }
    }

    pub fn with_console(mut self, console: Vec<ConsoleLine>) -> Self {
        self.console = console;
        self
    }
}
