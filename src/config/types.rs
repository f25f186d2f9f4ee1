//! Project file types
//!
//! This module defines the data structures of a `taskforge.yml` file. They
//! are more lenient than the task model: a step can be a bare command
//! string and env values can be any YAML scalar.

use crate::error::ConfigResult;
use crate::task::{EnvMap, ExecStep, Step, Task};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Top-level project file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name (defaults to the directory name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Shown at the top of `--help`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Interpreter for commands (e.g., ["bash", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// Project-wide environment, applied beneath every task's env
    #[serde(
        default,
        deserialize_with = "deserialize_env",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub env: EnvMap,

    /// dotenv file loaded into the project env before `env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,

    /// Tasks in declaration order
    #[serde(default)]
    pub tasks: IndexMap<String, TaskConfig>,

    /// Directories (or project files) of nested projects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subprojects: Vec<String>,
}

/// A task definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_env",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub env: EnvMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_env: Vec<String>,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default, deserialize_with = "deserialize_steps", skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,

    /// Load the task definition from another YAML file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
}

impl TaskConfig {
    /// Build the model task
    pub fn into_task(self, name: &str) -> ConfigResult<Task> {
        let mut task = Task::new(name)?;

        if let Some(description) = self.description {
            task.set_description(description);
        }
        if let Some(condition) = self.condition {
            task.set_condition(condition);
        }
        for (key, value) in self.env {
            match value {
                Some(value) => task.set_env(key, value),
                None => task.unset_env(key),
            };
        }
        if let Some(cwd) = self.cwd {
            task.set_cwd(cwd);
        }
        for name in self.required_env {
            task.require_env(name);
        }
        task.set_continue_on_error(self.continue_on_error);
        for step in self.steps {
            task.add_step(step);
        }

        Ok(task)
    }
}

/// Render a YAML scalar as an env string; `~` is the unset sentinel
fn scalar_to_env(value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(format!("expected a scalar value, found {:?}", other)),
    }
}

fn convert_env_mapping(value: Value) -> Result<EnvMap, String> {
    match value {
        Value::Null => Ok(EnvMap::new()),
        Value::Mapping(mapping) => {
            let mut env = EnvMap::new();
            for (key, value) in mapping {
                let key = match key {
                    Value::String(key) => key,
                    other => return Err(format!("env keys must be strings, found {:?}", other)),
                };
                env.insert(key, scalar_to_env(value)?);
            }
            Ok(env)
        }
        _ => Err("env must be a mapping".to_string()),
    }
}

/// Custom deserializer for env mappings that accepts any scalar value
fn deserialize_env<'de, D>(deserializer: D) -> Result<EnvMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    convert_env_mapping(value).map_err(D::Error::custom)
}

/// Stringify the scalars of a step's `env` and `args` mappings in place
fn normalize_step_mapping(value: &mut Value) {
    let Value::Mapping(mapping) = value else {
        return;
    };
    for key in ["env", "args"] {
        if let Some(Value::Mapping(inner)) = mapping.get_mut(key) {
            for (_, v) in inner.iter_mut() {
                let rendered = match v {
                    Value::Bool(b) => Some(b.to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                if let Some(s) = rendered {
                    *v = Value::String(s);
                }
            }
        }
    }
}

/// Custom deserializer for steps that handles a single command, or a list
/// mixing command strings and step mappings
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<Step>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;

    match value {
        // Single string command
        Value::String(s) => Ok(vec![Step::Exec(ExecStep::new(s))]),
        // Array of steps
        Value::Sequence(seq) => {
            let mut steps = Vec::new();
            for item in seq {
                let step = match item {
                    Value::String(s) => Step::Exec(ExecStep::new(s)),
                    mut mapping @ Value::Mapping(_) => {
                        normalize_step_mapping(&mut mapping);
                        Step::deserialize(mapping).map_err(|e| {
                            D::Error::custom(format!(
                                "invalid step (expected exec, spawn, builtin or say): {}",
                                e
                            ))
                        })?
                    }
                    _ => return Err(D::Error::custom("step must be a string or a mapping")),
                };
                steps.push(step);
            }
            Ok(steps)
        }
        // Null or not present
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("steps must be a string or array")),
    }
}
