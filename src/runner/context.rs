//! Execution context for task running
//!
//! The context tracks all the state needed during one `run` invocation.

use colored::Colorize;
use indexmap::IndexMap;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag used to interrupt a running task tree
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context that tracks state during task execution
pub struct Context {
    /// Project root; task and step `cwd` values are resolved against it
    pub working_dir: PathBuf,

    /// Environment inherited from the host process
    pub ambient_env: IndexMap<String, String>,

    /// Interpreter for shell commands (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Stack of tasks being executed (for detecting cycles)
    pub task_stack: Vec<String>,

    /// Verbosity level
    pub verbosity: Verbosity,

    /// Set from outside to interrupt the run
    pub cancel: CancelToken,
}

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

impl Context {
    /// Create a new context with default settings
    pub fn new() -> Self {
        Context {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            ambient_env: env::vars().collect(),
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            task_stack: Vec::new(),
            verbosity: Verbosity::Normal,
            cancel: CancelToken::new(),
        }
    }

    /// Create a context with a specific working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Replace the inherited environment
    pub fn with_ambient_env(mut self, env: IndexMap<String, String>) -> Self {
        self.ambient_env = env;
        self
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        if !interpreter.is_empty() {
            self.interpreter = interpreter;
        }
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Push a task onto the execution stack
    pub fn push_task(&mut self, task_name: String) {
        self.task_stack.push(task_name);
    }

    /// Pop a task from the execution stack
    pub fn pop_task(&mut self) -> Option<String> {
        self.task_stack.pop()
    }

    /// Check if a task is in the execution stack (detect cycles)
    pub fn is_task_in_stack(&self, task_name: &str) -> bool {
        self.task_stack.iter().any(|t| t == task_name)
    }

    /// Get the current task name (top of stack)
    pub fn current_task(&self) -> Option<&String> {
        self.task_stack.last()
    }

    /// The current stack followed by `task_name`, as reported for a cycle
    pub fn cycle_path(&self, task_name: &str) -> Vec<String> {
        let mut path = self.task_stack.clone();
        path.push(task_name.to_string());
        path
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {}", "[INFO]".green(), message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "[ERROR]".red().bold(), message);
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn print_debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{} {}", "[DEBUG]".dimmed(), message);
        }
    }

    /// Echo a command before it runs, prefixed with the task path
    pub fn print_command(&self, command: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {}", format!("{} |", self.task_stack.join(" » ")).magenta(), command);
        }
    }

    /// Print the message of a `say` step
    pub fn print_say(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "👾".bold(), message);
        }
    }

    /// Print task start message
    pub fn print_task_start(&self, task_name: &str) {
        self.print_debug(&format!("Running task: {}", task_name));
    }

    /// Print task complete message
    pub fn print_task_complete(&self, task_name: &str) {
        self.print_debug(&format!("Task completed: {}", task_name));
    }

    /// Print task skip message
    pub fn print_task_skip(&self, task_name: &str, reason: &str) {
        self.print_info(&format!("Skipping task '{}': {}", task_name, reason));
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
