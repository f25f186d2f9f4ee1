//! Builtin operations
//!
//! Builtins run in-process, without a shell. An implementation returns
//! `Ok(exit_code)` for a normal outcome; an `Err` means the implementation
//! itself broke and is reported as a `BuiltinFailure`.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{CancelToken, ResolvedEnv, Verbosity};
use crate::task::BuiltinArgs;
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What a builtin can see of the running step
pub struct BuiltinContext<'a> {
    pub task: &'a str,
    pub step: usize,
    /// Effective working directory of the step
    pub cwd: &'a Path,
    /// Merged environment of the task
    pub env: &'a ResolvedEnv,
    pub verbosity: Verbosity,
    /// Long-running builtins must poll this
    pub cancel: &'a CancelToken,
}

impl BuiltinContext<'_> {
    /// Resolve a path argument against the step's working directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.cwd.join(path)
    }
}

/// A named in-process operation
pub trait Builtin {
    fn run(&self, args: &BuiltinArgs, ctx: &BuiltinContext<'_>) -> anyhow::Result<i32>;
}

struct FnBuiltin<F>(F);

impl<F> Builtin for FnBuiltin<F>
where
    F: Fn(&BuiltinArgs, &BuiltinContext<'_>) -> anyhow::Result<i32>,
{
    fn run(&self, args: &BuiltinArgs, ctx: &BuiltinContext<'_>) -> anyhow::Result<i32> {
        (self.0)(args, ctx)
    }
}

/// Fetch a required argument
pub fn required_arg<'a>(args: &'a BuiltinArgs, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing required argument '{}'", key))
}

/// Name → builtin implementation
#[derive(Default)]
pub struct BuiltinRegistry {
    builtins: BTreeMap<String, Box<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the stock library (`sync-file`, `make-dir`, `remove-glob`)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::runner::library::register_defaults(&mut registry);
        registry
    }

    /// Register an implementation, replacing any previous one with that name
    pub fn register<B>(&mut self, name: impl Into<String>, builtin: B) -> &mut Self
    where
        B: Builtin + 'static,
    {
        let name = name.into();
        if self.builtins.insert(name.clone(), Box::new(builtin)).is_some() {
            tracing::debug!(builtin = %name, "builtin replaced");
        }
        self
    }

    /// Register a closure as a builtin
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&BuiltinArgs, &BuiltinContext<'_>) -> anyhow::Result<i32> + 'static,
    {
        self.register(name, FnBuiltin(f))
    }

    /// Look up a builtin for the given step
    pub fn resolve(&self, name: &str, task: &str, step: usize) -> ExecutionResult<&dyn Builtin> {
        self.builtins
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| ExecutionError::UnknownBuiltin {
                task: task.to_string(),
                step,
                builtin: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.builtins.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("builtins", &self.names())
            .finish()
    }
}
