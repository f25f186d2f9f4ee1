//! Task and step types
//!
//! A [`Task`] is a named, ordered list of [`Step`]s with an optional guard
//! condition and environment overrides. The same types are serialized into
//! the task manifest, so every optional field keeps its presence on a
//! round-trip.

use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Ordered environment overrides. `None` is the "unset" sentinel: it removes
/// the variable instead of setting it to an empty string.
pub type EnvMap = IndexMap<String, Option<String>>;

/// Arguments passed to a builtin step
pub type BuiltinArgs = IndexMap<String, String>;

/// Check that a task name is a project-scoped identifier
pub fn validate_task_name(name: &str) -> ConfigResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidTaskName(name.to_string()))
    }
}

fn deserialize_task_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let name = String::deserialize(deserializer)?;
    validate_task_name(&name).map_err(D::Error::custom)?;
    Ok(name)
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A named unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Task {
    #[serde(deserialize_with = "deserialize_task_name")]
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Shell expression; a non-zero exit skips the whole task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    env: EnvMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_env: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    continue_on_error: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    steps: Vec<Step>,
}

impl Task {
    /// Create an empty task, validating its name
    pub fn new(name: impl Into<String>) -> ConfigResult<Self> {
        let name = name.into();
        validate_task_name(&name)?;

        Ok(Task {
            name,
            description: None,
            condition: None,
            env: EnvMap::new(),
            cwd: None,
            required_env: Vec::new(),
            continue_on_error: false,
            steps: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn set_condition(&mut self, condition: impl Into<String>) -> &mut Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Set a task-level variable. Re-setting a key keeps its original position.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    /// Remove a variable inherited from the ambient or project environment
    pub fn unset_env(&mut self, key: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), None);
        self
    }

    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    pub fn set_cwd(&mut self, cwd: impl Into<String>) -> &mut Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn required_env(&self) -> &[String] {
        &self.required_env
    }

    /// Fail the task before any step runs unless `name` is set
    pub fn require_env(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.required_env.contains(&name) {
            self.required_env.push(name);
        }
        self
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    pub fn set_continue_on_error(&mut self, continue_on_error: bool) -> &mut Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Append a shell command
    pub fn exec(&mut self, command: impl Into<String>) -> &mut Self {
        self.add_step(ExecStep::new(command))
    }

    /// Append a call to another task, resolved by name at run time
    pub fn spawn(&mut self, task: impl Into<String>) -> &mut Self {
        self.add_step(SpawnStep::new(task))
    }

    /// Append an in-process builtin operation
    pub fn builtin(&mut self, name: impl Into<String>, args: BuiltinArgs) -> &mut Self {
        self.add_step(BuiltinStep::new(name).with_args(args))
    }

    /// Append a message printed by the runner
    pub fn say(&mut self, message: impl Into<String>) -> &mut Self {
        self.add_step(SayStep::new(message))
    }

    pub fn add_step(&mut self, step: impl Into<Step>) -> &mut Self {
        self.steps.push(step.into());
        self
    }

    /// Insert a shell command before every existing step
    pub fn prepend_exec(&mut self, command: impl Into<String>) -> &mut Self {
        self.prepend_step(ExecStep::new(command))
    }

    /// Insert a task call before every existing step
    pub fn prepend_spawn(&mut self, task: impl Into<String>) -> &mut Self {
        self.prepend_step(SpawnStep::new(task))
    }

    pub fn prepend_step(&mut self, step: impl Into<Step>) -> &mut Self {
        self.steps.insert(0, step.into());
        self
    }

    pub fn insert_step(&mut self, index: usize, step: impl Into<Step>) -> ConfigResult<&mut Self> {
        if index > self.steps.len() {
            return Err(ConfigError::Invalid(format!(
                "cannot insert step at {} in task '{}' with {} steps",
                index,
                self.name,
                self.steps.len()
            )));
        }
        self.steps.insert(index, step.into());
        Ok(self)
    }

    pub fn remove_step(&mut self, index: usize) -> Option<Step> {
        if index < self.steps.len() {
            Some(self.steps.remove(index))
        } else {
            None
        }
    }

    /// Clear steps and condition so the task can be redefined from scratch
    pub fn reset(&mut self) -> &mut Self {
        self.steps.clear();
        self.condition = None;
        self
    }
}

/// One unit of a task's work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Exec(ExecStep),
    Spawn(SpawnStep),
    Builtin(BuiltinStep),
    Say(SayStep),
}

impl Step {
    /// Display name, if one was given
    pub fn name(&self) -> Option<&str> {
        match self {
            Step::Exec(s) => s.name.as_deref(),
            Step::Spawn(s) => s.name.as_deref(),
            Step::Builtin(s) => s.name.as_deref(),
            Step::Say(s) => s.name.as_deref(),
        }
    }

    /// Step-level guard; a non-zero exit skips only this step
    pub fn condition(&self) -> Option<&str> {
        match self {
            Step::Exec(s) => s.condition.as_deref(),
            Step::Spawn(s) => s.condition.as_deref(),
            Step::Builtin(s) => s.condition.as_deref(),
            Step::Say(s) => s.condition.as_deref(),
        }
    }

    /// Step-level `continueOnError`; either this or the task flag tolerates a failure
    pub fn continue_on_error(&self) -> Option<bool> {
        match self {
            Step::Exec(s) => s.continue_on_error,
            Step::Spawn(s) => s.continue_on_error,
            Step::Builtin(s) => s.continue_on_error,
            Step::Say(_) => None,
        }
    }

    /// Short human-readable description used in logs and `--inspect`
    pub fn label(&self) -> String {
        if let Some(name) = self.name() {
            return name.to_string();
        }
        match self {
            Step::Exec(s) => s.exec.clone(),
            Step::Spawn(s) => format!("spawn {}", s.spawn),
            Step::Builtin(s) => format!("builtin {}", s.builtin),
            Step::Say(s) => format!("say {}", s.say),
        }
    }
}

/// Run a shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecStep {
    pub exec: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Relative to the task's working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvMap>,

    /// Append the task's extra arguments to the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_args: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
}

impl ExecStep {
    pub fn new(command: impl Into<String>) -> Self {
        ExecStep {
            exec: command.into(),
            name: None,
            condition: None,
            cwd: None,
            env: None,
            receive_args: None,
            continue_on_error: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(EnvMap::new)
            .insert(key.into(), Some(value.into()));
        self
    }

    pub fn with_unset_env(mut self, key: impl Into<String>) -> Self {
        self.env.get_or_insert_with(EnvMap::new).insert(key.into(), None);
        self
    }

    pub fn receive_args(mut self, receive: bool) -> Self {
        self.receive_args = Some(receive);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = Some(continue_on_error);
        self
    }
}

/// Invoke another task by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpawnStep {
    pub spawn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Extra arguments handed to the spawned task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Also forward the parent invocation's extra arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_args: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
}

impl SpawnStep {
    pub fn new(task: impl Into<String>) -> Self {
        SpawnStep {
            spawn: task.into(),
            name: None,
            condition: None,
            args: None,
            receive_args: None,
            continue_on_error: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn receive_args(mut self, receive: bool) -> Self {
        self.receive_args = Some(receive);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = Some(continue_on_error);
        self
    }
}

/// Run a registered in-process operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuiltinStep {
    pub builtin: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<BuiltinArgs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
}

impl BuiltinStep {
    pub fn new(builtin: impl Into<String>) -> Self {
        BuiltinStep {
            builtin: builtin.into(),
            name: None,
            condition: None,
            args: None,
            continue_on_error: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_args(mut self, args: BuiltinArgs) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args
            .get_or_insert_with(BuiltinArgs::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = Some(continue_on_error);
        self
    }
}

/// Print a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SayStep {
    pub say: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl SayStep {
    pub fn new(message: impl Into<String>) -> Self {
        SayStep {
            say: message.into(),
            name: None,
            condition: None,
        }
    }
}

impl From<ExecStep> for Step {
    fn from(step: ExecStep) -> Self {
        Step::Exec(step)
    }
}

impl From<SpawnStep> for Step {
    fn from(step: SpawnStep) -> Self {
        Step::Spawn(step)
    }
}

impl From<BuiltinStep> for Step {
    fn from(step: BuiltinStep) -> Self {
        Step::Builtin(step)
    }
}

impl From<SayStep> for Step {
    fn from(step: SayStep) -> Self {
        Step::Say(step)
    }
}
