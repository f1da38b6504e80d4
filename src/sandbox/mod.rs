//! Evaluates object literals cut out of the game bundle inside an embedded
//! QuickJS runtime.
//!
//! The source runs inside a `with` block over a scope proxy that answers every
//! identifier: caller bindings first, then a short list of safe built-ins,
//! otherwise a placeholder whose properties read back as their own names, so
//! `Foo.Bar` yields `"Bar"` when `Foo` is unknown. Results leave the runtime
//! through `JSON.stringify`.

pub mod enums;

use crate::error::EvalError;
use rquickjs::{Context, Runtime};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

const SCOPE_PRELUDE: &str = include_str!("scope.js");
const MEMORY_LIMIT: usize = 256 * 1024 * 1024;
const MAX_STACK_SIZE: usize = 1024 * 1024;

/// What an identifier is bound to before evaluation starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Real(Value),
    Placeholder,
}

/// Caller-supplied bindings plus a time budget. Cheap to build and `Send`;
/// a fresh runtime is created for every `eval`.
#[derive(Debug, Clone)]
pub struct Sandbox {
    bindings: HashMap<String, Binding>,
    timeout: Duration,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct Outcome {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    syntax: bool,
    #[serde(default)]
    message: String,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { bindings: HashMap::new(), timeout }
    }

    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) -> &mut Self {
        self.bindings.insert(name.into(), binding);
        self
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluates `source` as a single expression and projects the result to JSON.
    pub fn eval(&self, source: &str) -> Result<Value, EvalError> {
        let (real, placeholders) = self.split_bindings()?;

        let runtime = Runtime::new().map_err(|e| EvalError::runtime(format!("runtime: {}", e)))?;
        runtime.set_memory_limit(MEMORY_LIMIT);
        runtime.set_max_stack_size(MAX_STACK_SIZE);

        let expired = Arc::new(AtomicBool::new(false));
        let flag = expired.clone();
        let deadline = Instant::now() + self.timeout;
        runtime.set_interrupt_handler(Some(Box::new(move || {
            let hit = Instant::now() >= deadline;
            if hit {
                flag.store(true, Ordering::Relaxed);
            }
            hit
        })));

        let context = Context::full(&runtime).map_err(|e| EvalError::runtime(format!("context: {}", e)))?;
        let raw = context.with(|ctx| -> Result<String, EvalError> {
            let globals = ctx.globals();
            let seed = globals
                .set("__mg_source", source)
                .and_then(|_| globals.set("__mg_bindings", real.as_str()))
                .and_then(|_| globals.set("__mg_placeholders", placeholders.as_str()));
            seed.map_err(|e| EvalError::runtime(e.to_string()))?;

            ctx.eval::<String, _>(SCOPE_PRELUDE).map_err(|err| {
                if expired.load(Ordering::Relaxed) {
                    return EvalError::Timeout { limit_ms: self.timeout.as_millis() };
                }
                match err {
                    rquickjs::Error::Exception => {
                        let caught = ctx.catch();
                        let message = caught
                            .as_exception()
                            .and_then(|e| e.message())
                            .unwrap_or_else(|| "uncaught exception".to_string());
                        EvalError::runtime(message)
                    }
                    other => EvalError::runtime(other.to_string()),
                }
            })
        })?;

        let outcome: Outcome =
            serde_json::from_str(&raw).map_err(|e| EvalError::runtime(format!("result is not JSON: {}", e)))?;
        match outcome {
            Outcome { ok: true, value, .. } => Ok(value),
            _ if expired.load(Ordering::Relaxed) => Err(EvalError::Timeout { limit_ms: self.timeout.as_millis() }),
            Outcome { syntax: true, message, .. } => Err(EvalError::Syntax(message)),
            Outcome { message, .. } => Err(EvalError::Runtime(message)),
        }
    }

    /// Wraps an object-literal span in parentheses and evaluates it.
    pub fn eval_literal(&self, literal: &str) -> Result<Value, EvalError> {
        self.eval(&format!("({})", literal))
    }

    fn split_bindings(&self) -> Result<(String, String), EvalError> {
        let mut real = Map::new();
        let mut placeholders = Vec::new();
        for (name, binding) in &self.bindings {
            match binding {
                Binding::Real(value) => {
                    real.insert(name.clone(), value.clone());
                }
                Binding::Placeholder => placeholders.push(name.as_str()),
            }
        }
        let real = serde_json::to_string(&real).map_err(|e| EvalError::runtime(e.to_string()))?;
        let placeholders = serde_json::to_string(&placeholders).map_err(|e| EvalError::runtime(e.to_string()))?;
        Ok((real, placeholders))
    }
}
