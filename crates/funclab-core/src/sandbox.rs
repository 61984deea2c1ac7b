//! Isolated QuickJS evaluation contexts.
//!
//! Every execute call gets its own [`Sandbox`]: a fresh QuickJS runtime plus a
//! context built from an explicit allow-list of intrinsics. Nothing that
//! reaches the outer process is installed: no module loader, no file or
//! network access. The host contributes a capturing `console`, timers and
//! `queueMicrotask`, all implemented by a small script harness that also
//! exposes the helpers the engine uses to resolve entries, drive awaitables
//! and serialize results.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ SandboxConfig (declarative)                   │
//! │   memory limit · stack limit · console ring   │
//! └──────────────────┬────────────────────────────┘
//!                    │ Sandbox::new()
//! ┌──────────────────▼────────────────────────────┐
//! │ Sandbox                                       │
//! │   Runtime ── Context (allow-listed intrinsics)│
//! │                 │ scope()                     │
//! │   ┌─────────────▼───────────────────────┐     │
//! │   │ Scope<'js>: Ctx + Harness helpers   │     │
//! │   └─────────────────────────────────────┘     │
//! └───────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rquickjs::context::{EvalOptions, intrinsic};
use rquickjs::function::Rest;
use rquickjs::promise::PromiseState;
use rquickjs::{Array, Context, Ctx, Function, Object, Promise, Runtime, Value};
use serde::{Deserialize, Serialize};

const HARNESS: &str = include_str!("harness.js");

/// Longest single sleep while waiting for a timer, so host interrupts are
/// noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Intrinsics installed into every sandbox context on top of the base
/// objects (Object, Function, Array, the Error hierarchy, Math, String,
/// Number, Boolean, Symbol).
type Capabilities = (
    intrinsic::Date,
    intrinsic::Eval,
    intrinsic::RegExpCompiler,
    intrinsic::RegExp,
    intrinsic::Json,
    intrinsic::MapSet,
    intrinsic::Promise,
    intrinsic::BigInt,
    intrinsic::TypedArrays,
    intrinsic::WeakRef,
    intrinsic::Proxy,
);

/// Errors from sandbox construction.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox creation failed: {0}")]
    Create(String),

    #[error("invalid sandbox config: {0}")]
    Config(String),

    #[error("host capability install failed: {0}")]
    Install(String),
}

/// Failures raised by script evaluated inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// The script threw, or an awaitable rejected; carries the thrown message.
    #[error("{0}")]
    Thrown(String),

    #[error("awaitable never settled: no pending jobs or timers remain")]
    Stalled,

    #[error("execution interrupted by host")]
    Interrupted,
}

// ── Configuration ───────────────────────────────────────────────────────

/// Declarative sandbox configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Human-readable label (used in logs).
    pub label: String,
    /// QuickJS heap ceiling in bytes.
    pub memory_limit_bytes: usize,
    /// QuickJS stack ceiling in bytes.
    pub max_stack_bytes: usize,
    /// Captured console lines kept per call; oldest lines are evicted first.
    pub console_capacity: usize,
    /// Characters of function source kept in a serialized function preview.
    pub preview_chars: usize,
}

impl SandboxConfig {
    /// Create a configuration with default limits.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            memory_limit_bytes: 64 * 1024 * 1024, // 64 MiB
            max_stack_bytes: 1024 * 1024,         // 1 MiB
            console_capacity: 200,
            preview_chars: 100,
        }
    }

    /// Build from the `[sandbox]` and `[output]` sections of a loaded config.
    pub fn from_lab_config(config: &funclab_config::LabConfig) -> Self {
        Self::new("funclab")
            .with_memory_limit(config.sandbox.memory_limit_bytes)
            .with_max_stack(config.sandbox.max_stack_bytes)
            .with_console_capacity(config.output.console_capacity)
            .with_preview_chars(config.output.function_preview_chars)
    }

    /// Builder: set the heap ceiling.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Builder: set the stack ceiling.
    pub fn with_max_stack(mut self, bytes: usize) -> Self {
        self.max_stack_bytes = bytes;
        self
    }

    /// Builder: set the console ring capacity.
    pub fn with_console_capacity(mut self, lines: usize) -> Self {
        self.console_capacity = lines;
        self
    }

    /// Builder: set the function preview length.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Validate the configuration for obvious errors.
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.label.is_empty() {
            return Err(SandboxError::Config(
                "sandbox label must not be empty".to_string(),
            ));
        }
        if self.memory_limit_bytes == 0 {
            return Err(SandboxError::Config(
                "memory limit must be non-zero".to_string(),
            ));
        }
        if self.max_stack_bytes < 64 * 1024 {
            return Err(SandboxError::Config(format!(
                "stack limit must be at least 65536 bytes, got {}",
                self.max_stack_bytes
            )));
        }
        if self.console_capacity == 0 {
            return Err(SandboxError::Config(
                "console capacity must be at least 1".to_string(),
            ));
        }
        if self.preview_chars == 0 {
            return Err(SandboxError::Config(
                "preview length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new("funclab")
    }
}

// ── Console capture ─────────────────────────────────────────────────────

/// Severity of a captured console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    /// Map a `console` method name to a level; unknown names read as `log`.
    pub fn parse(name: &str) -> Self {
        match name {
            "info" => ConsoleLevel::Info,
            "warn" => ConsoleLevel::Warn,
            "error" => ConsoleLevel::Error,
            "debug" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Log,
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleLevel::Log => write!(f, "log"),
            ConsoleLevel::Info => write!(f, "info"),
            ConsoleLevel::Warn => write!(f, "warn"),
            ConsoleLevel::Error => write!(f, "error"),
            ConsoleLevel::Debug => write!(f, "debug"),
        }
    }
}

/// One line written through the sandbox `console`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub message: String,
}

#[derive(Debug)]
struct ConsoleBuffer {
    lines: VecDeque<ConsoleLine>,
    capacity: usize,
    dropped: usize,
}

impl ConsoleBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    fn push(&mut self, level: ConsoleLevel, message: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(ConsoleLine { level, message });
    }
}

/// Shared handle to the console ring buffer of one sandbox.
#[derive(Debug, Clone)]
pub struct ConsoleCapture {
    buffer: Arc<Mutex<ConsoleBuffer>>,
}

impl ConsoleCapture {
    /// Create an empty capture with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(ConsoleBuffer::new(capacity))),
        }
    }

    /// Record one line.
    pub fn push(&self, level: ConsoleLevel, message: String) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(level, message);
        }
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.buffer
            .lock()
            .map(|buf| buf.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of lines evicted because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.buffer.lock().map(|buf| buf.dropped).unwrap_or(0)
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.lines.len()).unwrap_or(0)
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Sandbox ─────────────────────────────────────────────────────────────

/// A fresh, capability-restricted QuickJS runtime and context.
///
/// Dropping the sandbox releases the runtime and everything defined in it.
pub struct Sandbox {
    config: SandboxConfig,
    context: Context,
    _runtime: Runtime,
    console: ConsoleCapture,
    interrupt: Arc<AtomicBool>,
}

impl Sandbox {
    /// Create a sandbox that can only be stopped by finishing its work.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        Self::with_interrupt(config, Arc::new(AtomicBool::new(false)))
    }

    /// Create a sandbox whose running script aborts once `interrupt` is set.
    pub fn with_interrupt(
        config: SandboxConfig,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Self, SandboxError> {
        config.validate()?;

        let runtime = Runtime::new().map_err(|e| SandboxError::Create(e.to_string()))?;
        runtime.set_memory_limit(config.memory_limit_bytes);
        runtime.set_max_stack_size(config.max_stack_bytes);
        let flag = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::Relaxed))));

        let context = Context::custom::<Capabilities>(&runtime)
            .map_err(|e| SandboxError::Create(e.to_string()))?;

        tracing::debug!(
            label = %config.label,
            memory_limit = config.memory_limit_bytes,
            max_stack = config.max_stack_bytes,
            "Sandbox created"
        );

        Ok(Self {
            console: ConsoleCapture::new(config.console_capacity),
            config,
            context,
            _runtime: runtime,
            interrupt,
        })
    }

    /// The configuration this sandbox was built from.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Console output captured so far.
    pub fn console(&self) -> &ConsoleCapture {
        &self.console
    }

    /// Enter the context, install host capabilities, and run `f`.
    ///
    /// Bindings created inside one scope stay visible to later scripts in the
    /// same scope; host capabilities are reinstalled on every entry.
    pub fn scope<F, R>(&self, f: F) -> Result<R, SandboxError>
    where
        F: for<'js> FnOnce(Scope<'js>) -> R,
    {
        self.context.with(|ctx| {
            let harness = Harness::install(&ctx, &self.console)
                .map_err(|e| SandboxError::Install(describe_install_error(&ctx, e)))?;
            Ok(f(Scope {
                ctx,
                harness,
                interrupt: Arc::clone(&self.interrupt),
            }))
        })
    }
}

fn describe_install_error(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    if error.is_exception() {
        let thrown = ctx.catch();
        format!("{thrown:?}")
    } else {
        error.to_string()
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

/// Typed view over the helper object returned by the script harness.
#[derive(Clone)]
pub struct Harness<'js> {
    helpers: Object<'js>,
}

impl<'js> Harness<'js> {
    fn install(ctx: &Ctx<'js>, console: &ConsoleCapture) -> rquickjs::Result<Self> {
        let factory: Function = ctx.eval(HARNESS)?;
        let capture = console.clone();
        let emit = Function::new(ctx.clone(), move |level: String, message: String| {
            capture.push(ConsoleLevel::parse(&level), message);
        })?;
        let helpers: Object = factory.call((emit,))?;
        Ok(Self { helpers })
    }

    fn helper(&self, name: &str) -> rquickjs::Result<Function<'js>> {
        self.helpers.get(name)
    }

    /// Resolve `target` (optionally `target.member`) to `(callable, origin)`.
    ///
    /// `origin` is the unbound function (or class) whose source describes the
    /// callable's parameters.
    pub fn entry(
        &self,
        target: Value<'js>,
        member: Option<&str>,
    ) -> rquickjs::Result<Option<(Function<'js>, Value<'js>)>> {
        let found: Value = self
            .helper("entry")?
            .call((target, member.map(str::to_owned)))?;
        let Some(pair) = found.into_array() else {
            return Ok(None);
        };
        Ok(Some((pair.get(0)?, pair.get(1)?)))
    }

    /// Whether `value` exposes a callable `then`.
    pub fn is_awaitable(&self, value: &Value<'js>) -> rquickjs::Result<bool> {
        self.helper("isAwaitable")?.call((value.clone(),))
    }

    /// `Promise.resolve(value)`.
    pub fn adopt(&self, value: Value<'js>) -> rquickjs::Result<Promise<'js>> {
        self.helper("adopt")?.call((value,))
    }

    /// Milliseconds until the next timer is due, or `None` without timers.
    pub fn next_delay(&self) -> rquickjs::Result<Option<f64>> {
        let delay: f64 = self.helper("nextDelay")?.call(())?;
        Ok((delay >= 0.0).then_some(delay))
    }

    /// Run every due timer; returns how many fired.
    pub fn run_due(&self) -> rquickjs::Result<u32> {
        self.helper("runDue")?.call(())
    }

    /// Message of a thrown value (`error.message` or its string form).
    pub fn message_of(&self, thrown: Value<'js>) -> rquickjs::Result<String> {
        self.helper("messageOf")?.call((thrown,))
    }

    /// `Function.prototype.toString` of `value`, or empty.
    pub fn source_of(&self, value: Value<'js>) -> rquickjs::Result<String> {
        self.helper("sourceOf")?.call((value,))
    }

    /// `String(value)` with a tag fallback.
    pub fn display(&self, value: Value<'js>) -> rquickjs::Result<String> {
        self.helper("display")?.call((value,))
    }

    /// `{kind, message, trace}` of an error object.
    pub fn error_info(&self, error: Value<'js>) -> rquickjs::Result<Object<'js>> {
        self.helper("errorInfo")?.call((error,))
    }

    /// `JSON.stringify` replacer that keeps Maps, Sets, BigInts and
    /// non-finite numbers.
    pub fn replacer(&self) -> rquickjs::Result<Function<'js>> {
        self.helper("replacer")
    }
}

// ── Scope ───────────────────────────────────────────────────────────────

/// An entered sandbox: the live context plus harness helpers.
pub struct Scope<'js> {
    pub ctx: Ctx<'js>,
    pub harness: Harness<'js>,
    interrupt: Arc<AtomicBool>,
}

impl<'js> Scope<'js> {
    /// Whether the host asked the running script to stop.
    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Evaluate a program as global, non-strict script code.
    pub fn eval_script(&self, source: &str) -> Result<Value<'js>, ScriptError> {
        let mut options = EvalOptions::default();
        options.strict = false;
        let result = self.ctx.eval_with_options::<Value, _>(source, options);
        result.map_err(|e| self.fault(e))
    }

    /// Evaluate `source` as a single expression; any failure reads as `None`
    /// and leaves no exception pending.
    pub fn try_expression(&self, source: &str) -> Option<Value<'js>> {
        self.eval_script(&format!("({source}\n)")).ok()
    }

    /// Read a global binding (including top-level `let`, `const` and `class`).
    ///
    /// `name` must already be a plain identifier.
    pub fn lookup(&self, name: &str) -> Result<Value<'js>, ScriptError> {
        self.eval_script(&format!(
            "typeof {name} === \"undefined\" ? undefined : {name}"
        ))
    }

    /// Call `callable` with positional arguments.
    pub fn call(
        &self,
        callable: &Function<'js>,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>, ScriptError> {
        callable
            .call::<_, Value>((Rest(args),))
            .map_err(|e| self.fault(e))
    }

    /// Drive the job queue and timers until `value` settles.
    ///
    /// Non-promise awaitables are adopted first. Fails with
    /// [`ScriptError::Stalled`] when nothing is left that could settle it.
    pub fn settle(&self, value: Value<'js>) -> Result<Value<'js>, ScriptError> {
        let promise = match value.into_promise() {
            Some(promise) => promise,
            None => return Err(ScriptError::Thrown("value is not awaitable".to_string())),
        };
        self.drive(promise)
    }

    /// Adopt `value` as a promise (`Promise.resolve`) and settle it.
    pub fn await_value(&self, value: Value<'js>) -> Result<Value<'js>, ScriptError> {
        if value.is_promise() {
            return self.settle(value);
        }
        let promise = self.harness.adopt(value).map_err(|e| self.fault(e))?;
        self.drive(promise)
    }

    fn drive(&self, promise: Promise<'js>) -> Result<Value<'js>, ScriptError> {
        loop {
            if self.interrupted() {
                return Err(ScriptError::Interrupted);
            }
            match promise.state() {
                PromiseState::Resolved | PromiseState::Rejected => {
                    return match promise.result::<Value>() {
                        Some(result) => result.map_err(|e| self.fault(e)),
                        None => Err(ScriptError::Stalled),
                    };
                }
                PromiseState::Pending => {}
            }
            if self.ctx.execute_pending_job() {
                continue;
            }
            let Some(delay) = self.harness.next_delay().map_err(|e| self.fault(e))? else {
                return Err(ScriptError::Stalled);
            };
            self.sleep(Duration::from_secs_f64(delay / 1000.0));
            if self.interrupted() {
                return Err(ScriptError::Interrupted);
            }
            self.harness.run_due().map_err(|e| self.fault(e))?;
        }
    }

    fn sleep(&self, mut remaining: Duration) {
        while !remaining.is_zero() && !self.interrupted() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }

    /// Convert an engine error into a [`ScriptError`], clearing any pending
    /// exception.
    pub fn fault(&self, error: rquickjs::Error) -> ScriptError {
        let message = if error.is_exception() {
            let thrown = self.ctx.catch();
            self.harness
                .message_of(thrown)
                .unwrap_or_else(|_| "uncaught exception".to_string())
        } else {
            error.to_string()
        };
        if self.interrupted() {
            ScriptError::Interrupted
        } else {
            ScriptError::Thrown(message)
        }
    }

    /// Copy the items of a JS array into a vector.
    pub fn array_items(&self, array: &Array<'js>) -> Result<Vec<Value<'js>>, ScriptError> {
        array
            .iter::<Value>()
            .collect::<rquickjs::Result<Vec<_>>>()
            .map_err(|e| self.fault(e))
    }
}
