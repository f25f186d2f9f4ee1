//! Per-project task registry

use crate::error::{ConfigError, ConfigResult};
use crate::task::Task;
use std::collections::BTreeMap;

/// Store of a project's tasks, keyed and ordered by name
///
/// Re-declaring a task is idempotent only when the new definition is
/// identical to the registered one; a differing definition is rejected with
/// [`ConfigError::DuplicateTask`]. Once [`TaskRegistry::lock`] has been
/// called (the manifest export does this) no task can be added, changed or
/// removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
    locked: bool,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, or return the existing one if it is identical
    pub fn add_task(&mut self, task: Task) -> ConfigResult<&mut Task> {
        if self.locked {
            return Err(ConfigError::RegistryLocked(task.name().to_string()));
        }

        let name = task.name().to_string();
        if let Some(existing) = self.tasks.get(&name) {
            if *existing != task {
                return Err(ConfigError::DuplicateTask(name));
            }
            tracing::debug!(task = %name, "task re-declared with identical definition");
            return self.task_mut(&name);
        }

        tracing::debug!(task = %name, "task registered");
        Ok(self.tasks.entry(name).or_insert(task))
    }

    /// Register an empty task by name
    pub fn add(&mut self, name: impl Into<String>) -> ConfigResult<&mut Task> {
        self.add_task(Task::new(name)?)
    }

    pub fn try_find(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Mutable access for collaborators that extend or redefine a task
    pub fn task_mut(&mut self, name: &str) -> ConfigResult<&mut Task> {
        if self.locked {
            return Err(ConfigError::RegistryLocked(name.to_string()));
        }
        self.tasks
            .get_mut(name)
            .ok_or_else(|| ConfigError::TaskNotFound(name.to_string()))
    }

    /// Remove a task. Removing an unknown task is a no-op.
    ///
    /// Spawn steps referring to the removed task are left in place and fail
    /// at run time.
    pub fn remove_task(&mut self, name: &str) -> ConfigResult<Option<Task>> {
        if self.locked {
            return Err(ConfigError::RegistryLocked(name.to_string()));
        }
        Ok(self.tasks.remove(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in name order
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// Freeze the registry
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_task(command: &str) -> Task {
        let mut task = Task::new("build").unwrap();
        task.exec(command);
        task
    }

    #[test]
    fn test_identical_redeclaration_returns_existing() {
        let mut registry = TaskRegistry::new();
        registry.add_task(build_task("cargo build")).unwrap();

        let existing = registry.add_task(build_task("cargo build")).unwrap();
        assert_eq!(existing.steps().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_differing_redeclaration_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.add_task(build_task("cargo build")).unwrap();

        let result = registry.add_task(build_task("make"));
        assert!(matches!(result, Err(ConfigError::DuplicateTask(name)) if name == "build"));
        assert_eq!(registry.try_find("build").unwrap().steps()[0].label(), "cargo build");
    }

    #[test]
    fn test_remove_then_find() {
        let mut registry = TaskRegistry::new();
        registry.add_task(build_task("cargo build")).unwrap();

        assert!(registry.remove_task("build").unwrap().is_some());
        assert!(registry.try_find("build").is_none());
        assert!(registry.remove_task("build").unwrap().is_none());
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = TaskRegistry::new();
        for name in ["test", "build", "lint"] {
            registry.add(name).unwrap();
        }
        assert_eq!(registry.names(), vec!["build", "lint", "test"]);
    }

    #[test]
    fn test_task_mut_unknown() {
        let mut registry = TaskRegistry::new();
        assert!(matches!(registry.task_mut("x"), Err(ConfigError::TaskNotFound(_))));
    }

    #[test]
    fn test_locked_registry_rejects_changes() {
        let mut registry = TaskRegistry::new();
        registry.add("build").unwrap();
        registry.lock();

        assert!(registry.is_locked());
        assert!(matches!(registry.add("test"), Err(ConfigError::RegistryLocked(_))));
        assert!(matches!(registry.task_mut("build"), Err(ConfigError::RegistryLocked(_))));
        assert!(matches!(registry.remove_task("build"), Err(ConfigError::RegistryLocked(_))));
        assert!(registry.try_find("build").is_some());
    }
}
