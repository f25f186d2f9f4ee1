//! Common test utilities

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use taskforge::error::ExecutionResult;
use taskforge::project::Project;
use taskforge::runner::{BuiltinRegistry, Context, Outcome, Runtime, Verbosity};
use tempfile::TempDir;

/// Create a temporary directory with a taskforge.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("taskforge.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Create a test config in a subdirectory
pub fn create_test_config_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("taskforge.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&config_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, config_path, sub_dir)
}

/// A silent context rooted at `dir`
pub fn silent_context(dir: &Path) -> Context {
    Context::new()
        .with_working_dir(dir.to_path_buf())
        .with_verbosity(Verbosity::Silent)
}

/// Run a task of `project` with the stock built-ins
pub fn run_task(project: &Project, name: &str, args: &[String]) -> ExecutionResult<Outcome> {
    let builtins = BuiltinRegistry::with_defaults();
    let mut runtime = Runtime::new(project, &builtins, silent_context(project.outdir()));
    runtime.run(name, args)
}

/// Lines of a file written by the tasks under test
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
