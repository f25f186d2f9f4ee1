//! Taskforge - composable project tasks
//!
//! Projects declare named tasks made of ordered steps: shell commands,
//! invocations of other tasks, registered built-ins and messages. Tasks can
//! be run directly, exported as a JSON manifest, or dispatched from the
//! command line with one subcommand per task.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod project;
pub mod runner;
pub mod task;

// Re-export commonly used types
pub use error::{Result, TaskforgeError};

/// Current version of Taskforge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
