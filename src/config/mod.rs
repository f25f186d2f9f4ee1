//! Project file parsing and validation
//!
//! This module handles parsing of taskforge.yml project files into a
//! [`Project`](crate::project::Project) and validation of the result.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
