//! CLI interface and argument parsing
//!
//! This module handles command-line interface parsing, help generation,
//! shell completion and Ctrl-C cancellation.

pub mod app;
pub mod signal;

// Re-export main types
pub use app::*;
