//! Project validation
//!
//! Checks the parts of a loaded project the type system can't: empty
//! commands, malformed spawn targets and an empty interpreter. Spawn targets
//! that don't exist are only warned about, since a task may be added later
//! and a cycle is only an error once it is actually run.

use crate::error::{ConfigError, ConfigResult};
use crate::project::Project;
use crate::task::{validate_task_name, Step, Task};

/// Validate a project and its sub-projects
pub fn validate_project(project: &Project) -> ConfigResult<()> {
    if let Some(interpreter) = project.interpreter() {
        if interpreter.is_empty() || interpreter[0].trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "project '{}' has an empty interpreter",
                project.name()
            )));
        }
    }

    for task in project.tasks().iter() {
        validate_task(task)?;
    }

    for (task, target) in dangling_spawns(project) {
        tracing::warn!(
            project = %project.name(),
            task,
            spawn = target,
            "spawn target is not defined"
        );
    }

    for sub in project.subprojects() {
        validate_project(sub)?;
    }

    Ok(())
}

/// Validate the steps of a single task
pub fn validate_task(task: &Task) -> ConfigResult<()> {
    for (index, step) in task.steps().iter().enumerate() {
        let invalid = |what: &str| {
            ConfigError::Invalid(format!("task '{}' step {}: {}", task.name(), index, what))
        };

        match step {
            Step::Exec(exec) if exec.exec.trim().is_empty() => {
                return Err(invalid("empty command"));
            }
            Step::Builtin(builtin) if builtin.builtin.trim().is_empty() => {
                return Err(invalid("empty builtin name"));
            }
            Step::Spawn(spawn) => {
                validate_task_name(&spawn.spawn)
                    .map_err(|_| invalid(&format!("invalid spawn target '{}'", spawn.spawn)))?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// `(task, target)` pairs for spawn steps naming a task that isn't registered
pub fn dangling_spawns(project: &Project) -> Vec<(&str, &str)> {
    project
        .tasks()
        .iter()
        .flat_map(|task| {
            task.steps().iter().filter_map(move |step| match step {
                Step::Spawn(spawn) if !project.tasks().contains(&spawn.spawn) => {
                    Some((task.name(), spawn.spawn.as_str()))
                }
                _ => None,
            })
        })
        .collect()
}
