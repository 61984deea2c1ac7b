//! Two-phase sandboxed execution.
//!
//! Every call builds a fresh [`Sandbox`], evaluates the type-erased program
//! once (define), then resolves the entry, materializes the arguments and
//! invokes it in the same context (invoke). A callable result can be invoked
//! once more with follow-up arguments. Each call yields a fresh
//! [`ExecutionOutcome`]; failures never escape as errors.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rquickjs::{Function, Value};

use crate::descriptor::UNTYPED;
use crate::extract::extract;
use crate::materialize::{ARGUMENT_CHAIN, FOLLOW_UP_CHAIN, materialize, split_top_level};
use crate::normalize::strip_types;
use crate::request::{ExecuteRequest, ExecutionOutcome};
use crate::sandbox::{Sandbox, SandboxConfig, SandboxError, Scope, ScriptError};
use crate::serialize::serialize;

/// Errors that end an execution early. Each becomes a failed outcome.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("sandbox unavailable: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("definition failed: {0}")]
    Definition(ScriptError),

    #[error("{0}")]
    Invocation(ScriptError),

    #[error("{0}")]
    FollowUp(ScriptError),

    #[error("invalid entry name {0:?}")]
    Entry(String),

    #[error("{0} is not a function")]
    NotCallable(String),
}

// ── Phases ──────────────────────────────────────────────────────────────

/// Lifecycle of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Defining,
    Invoking,
    FollowUpInvoking,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Defining)
                | (Defining, Invoking)
                | (Defining, Failed)
                | (Invoking, FollowUpInvoking)
                | (Invoking, Done)
                | (Invoking, Failed)
                | (FollowUpInvoking, Done)
                | (FollowUpInvoking, Failed)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Defining => write!(f, "defining"),
            Phase::Invoking => write!(f, "invoking"),
            Phase::FollowUpInvoking => write!(f, "follow-up-invoking"),
            Phase::Done => write!(f, "done"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

struct PhaseTracker<'a> {
    entry: &'a str,
    phase: Phase,
}

impl<'a> PhaseTracker<'a> {
    fn new(entry: &'a str) -> Self {
        Self {
            entry,
            phase: Phase::Idle,
        }
    }

    fn advance(&mut self, next: Phase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(entry = %self.entry, from = %self.phase, to = %next, "Unexpected phase transition");
        }
        tracing::debug!(entry = %self.entry, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }
}

impl Drop for PhaseTracker<'_> {
    fn drop(&mut self) {
        if !self.phase.is_terminal() {
            tracing::warn!(entry = %self.entry, phase = %self.phase, "Execution left without a terminal phase");
        }
    }
}

// ── Entry names ─────────────────────────────────────────────────────────

/// `Name` or `Owner.member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    pub head: String,
    pub member: Option<String>,
}

impl EntryName {
    pub fn parse(entry: &str) -> Result<Self, ExecutionError> {
        let entry = entry.trim();
        let mut parts = entry.split('.');
        let head = parts.next().unwrap_or_default();
        let member = parts.next();
        let valid = parts.next().is_none()
            && is_identifier(head)
            && member.is_none_or(is_identifier);
        if !valid {
            return Err(ExecutionError::Entry(entry.to_string()));
        }
        Ok(Self {
            head: head.to_string(),
            member: member.map(str::to_string),
        })
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

// ── Engine ──────────────────────────────────────────────────────────────

/// Runs execute requests, one isolated sandbox per call.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: SandboxConfig,
}

impl Engine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &funclab_config::LabConfig) -> Self {
        Self::new(SandboxConfig::from_lab_config(config))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute on the current thread. Runs to completion.
    pub fn execute_blocking(&self, request: &ExecuteRequest) -> ExecutionOutcome {
        self.run(request, Arc::new(AtomicBool::new(false)))
    }

    /// Execute on a blocking worker.
    ///
    /// Dropping the returned future interrupts the running script, so a
    /// caller can race it against a timeout.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecutionOutcome {
        let started = Instant::now();
        let interrupt = Arc::new(AtomicBool::new(false));
        let _guard = InterruptOnDrop(Arc::clone(&interrupt));
        let engine = self.clone();
        match tokio::task::spawn_blocking(move || engine.run(&request, interrupt)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Execution worker failed");
                ExecutionOutcome::failure(format!("execution worker failed: {e}"), elapsed_ms(started))
            }
        }
    }

    fn run(&self, request: &ExecuteRequest, interrupt: Arc<AtomicBool>) -> ExecutionOutcome {
        let started = Instant::now();
        let mut phases = PhaseTracker::new(&request.entry_name);
        phases.advance(Phase::Defining);

        let sandbox = match Sandbox::with_interrupt(self.config.clone(), interrupt) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                phases.advance(Phase::Failed);
                let error = ExecutionError::from(e);
                tracing::warn!(entry = %request.entry_name, %error, "Execution failed");
                return ExecutionOutcome::failure(error.to_string(), elapsed_ms(started));
            }
        };

        let preview_chars = self.config.preview_chars;
        let result = sandbox
            .scope(|scope| {
                let (value, elapsed) = invoke(&scope, request, &mut phases, started)?;
                Ok::<_, ExecutionError>((serialize(&scope, value, preview_chars), elapsed))
            })
            .map_err(ExecutionError::from)
            .and_then(|inner| inner);

        let console = sandbox.console();
        if console.dropped() > 0 {
            tracing::debug!(dropped = console.dropped(), "Console lines evicted");
        }

        let outcome = match result {
            Ok((value, elapsed)) => {
                phases.advance(Phase::Done);
                ExecutionOutcome::success(value, elapsed)
            }
            Err(error) => {
                phases.advance(Phase::Failed);
                tracing::warn!(entry = %request.entry_name, %error, "Execution failed");
                ExecutionOutcome::failure(error.to_string(), elapsed_ms(started))
            }
        };
        tracing::info!(
            entry = %request.entry_name,
            success = outcome.success,
            elapsed_ms = outcome.elapsed_ms,
            "Execution finished"
        );
        outcome.with_console(console.lines())
    }
}

/// Sets the interrupt flag when the owning future goes away.
struct InterruptOnDrop(Arc<AtomicBool>);

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Define, invoke and optionally follow up. Returns the final value and the
/// elapsed time at the moment it became available.
fn invoke<'js>(
    scope: &Scope<'js>,
    request: &ExecuteRequest,
    phases: &mut PhaseTracker<'_>,
    started: Instant,
) -> Result<(Value<'js>, f64), ExecutionError> {
    let program = strip_types(&request.source_text);
    scope
        .eval_script(&program)
        .map_err(ExecutionError::Definition)?;

    phases.advance(Phase::Invoking);
    let entry = EntryName::parse(&request.entry_name)?;
    let target = scope
        .lookup(&entry.head)
        .map_err(ExecutionError::Invocation)?;
    let (callable, origin) = scope
        .harness
        .entry(target, entry.member.as_deref())
        .map_err(|e| ExecutionError::Invocation(scope.fault(e)))?
        .ok_or_else(|| ExecutionError::NotCallable(request.entry_name.clone()))?;

    let variadic = declared_variadic(&request.source_text, &request.entry_name)
        .unwrap_or_else(|| {
            let source = scope.harness.source_of(origin).unwrap_or_default();
            params_are_variadic(&source)
        });

    let mut args: Vec<Value<'js>> = request
        .arguments
        .iter()
        .map(|arg| materialize(scope, &arg.raw, &arg.declared_type, ARGUMENT_CHAIN).0)
        .collect();
    if variadic
        && args.len() == 1
        && let Some(array) = args[0].clone().into_array()
    {
        args = scope
            .array_items(&array)
            .map_err(ExecutionError::Invocation)?;
    }

    let mut result = settle(scope, scope.call(&callable, args), request.is_async)
        .map_err(ExecutionError::Invocation)?;

    let follow_up = request
        .follow_up_arguments
        .as_deref()
        .filter(|text| !text.trim().is_empty());
    if let Some(text) = follow_up
        && let Some(returned) = result.as_function().cloned()
    {
        phases.advance(Phase::FollowUpInvoking);
        result = follow(scope, &returned, text).map_err(ExecutionError::FollowUp)?;
    }

    Ok((result, elapsed_ms(started)))
}

fn follow<'js>(
    scope: &Scope<'js>,
    returned: &Function<'js>,
    text: &str,
) -> Result<Value<'js>, ScriptError> {
    let args = split_top_level(text)
        .iter()
        .map(|piece| materialize(scope, piece, UNTYPED, FOLLOW_UP_CHAIN).0)
        .collect();
    settle(scope, scope.call(returned, args), false)
}

/// Await `called` when asked to, or when it exposes a callable `then`.
fn settle<'js>(
    scope: &Scope<'js>,
    called: Result<Value<'js>, ScriptError>,
    force: bool,
) -> Result<Value<'js>, ScriptError> {
    let value = called?;
    let awaitable = force
        || scope
            .harness
            .is_awaitable(&value)
            .map_err(|e| scope.fault(e))?;
    if awaitable {
        scope.await_value(value)
    } else {
        Ok(value)
    }
}

/// Rest-parameter flag from the extractor, when the entry is declared in
/// `source` and the source parses.
fn declared_variadic(source: &str, entry_name: &str) -> Option<bool> {
    let descriptors = extract(source, "entry.ts").ok()?;
    descriptors
        .iter()
        .find(|d| d.name == entry_name.trim())
        .map(|d| d.is_variadic())
}

/// Whether a function's runtime source ends its parameter list with `...`.
///
/// Classes are read through their `constructor(` list; an arrow with a bare
/// parameter (`x => ...`) is never variadic.
pub fn params_are_variadic(source: &str) -> bool {
    let source = source.trim_start();
    let from = if source.starts_with("class") {
        match source.find("constructor(") {
            Some(at) => at + "constructor".len(),
            None => return false,
        }
    } else {
        let Some(open) = source.find('(') else {
            return false;
        };
        if source.find("=>").is_some_and(|arrow| arrow < open) {
            return false;
        }
        open
    };

    let mut depth = 0usize;
    let mut end = None;
    for (i, c) in source[from..].char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(from + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(end) = end else {
        return false;
    };
    split_top_level(&source[from + 1..end])
        .last()
        .is_some_and(|last| last.starts_with("..."))
}
