//! Task object model
//!
//! Tasks are declared in code (or loaded from a project file) and stored in
//! a per-project [`TaskRegistry`].

pub mod model;
pub mod registry;

pub use model::*;
pub use registry::*;
