#![deny(unsafe_code)]

//! funclab core: callable discovery and sandboxed invocation.
//!
//! The extractor turns TypeScript/JavaScript source into
//! [`FunctionDescriptor`]s. The engine evaluates a descriptor's source inside
//! a fresh QuickJS sandbox, converts raw argument text into runtime values,
//! invokes the entry (and optionally the function it returns), and reports a
//! serialized [`ExecutionOutcome`] with timing.

/// Sandbox-independent coercion of raw text into typed values.
pub mod coerce;
/// Callable descriptors and navigation lookup.
pub mod descriptor;
/// Two-phase execution engine.
pub mod engine;
/// Signature extraction over tree-sitter syntax trees.
pub mod extract;
/// Raw argument text → sandbox values.
pub mod materialize;
/// Type-syntax eraser.
pub mod normalize;
/// Execute request and outcome types.
pub mod request;
/// Capability-restricted QuickJS runtime.
pub mod sandbox;
/// Sandbox value → outcome JSON.
pub mod serialize;

pub use coerce::{LabValue, coerce};
pub use descriptor::{CallableKind, FunctionDescriptor, Parameter, SourceSpan, locate};
pub use engine::{Engine, ExecutionError, Phase};
pub use extract::{Dialect, ExtractError, extract};
pub use materialize::Heuristic;
pub use normalize::strip_types;
pub use request::{ArgumentSpec, ExecuteRequest, ExecutionOutcome};
pub use sandbox::{ConsoleLevel, ConsoleLine, Sandbox, SandboxConfig, SandboxError, ScriptError};
