//! Task execution engine
//!
//! This module handles the execution of tasks: environment layering,
//! command running, builtins, and spawn recursion with cycle detection.

pub mod builtin;
pub mod command;
pub mod context;
pub mod env;
pub mod library;
pub mod runtime;

// Re-export main types
pub use builtin::*;
pub use command::*;
pub use context::*;
pub use env::*;
pub use runtime::*;
