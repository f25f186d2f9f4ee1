//! Task execution
//!
//! [`Runtime::run`] resolves a task by name, builds its environment, checks
//! its condition and runs its steps strictly in order. Spawn steps recurse
//! into `run`; the call stack kept in the [`Context`] is the only place
//! cycles are detected, because step lists stay mutable until a run starts.

use crate::error::{ExecutionError, ExecutionResult};
use crate::project::Project;
use crate::runner::{
    append_args, apply_layer, check_command, execute_command, BuiltinContext, BuiltinRegistry,
    Context, ResolvedEnv,
};
use crate::task::{BuiltinArgs, EnvMap, Step, Task, TaskRegistry};
use std::path::{Path, PathBuf};

/// Lifecycle of one task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    EvaluatingCondition,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Record of one executed (or skipped) step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Position in the task's step list
    pub index: usize,
    pub label: String,
    pub status: StepStatus,
    pub exit_code: i32,
    /// Outcome of the spawned task, for spawn steps that ran
    pub spawned: Option<Box<Outcome>>,
}

/// Result of running a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub task: String,
    /// One of the terminal states
    pub state: TaskState,
    pub exit_code: i32,
    pub steps: Vec<StepResult>,
    /// Index of the step that stopped the task
    pub failed_step: Option<usize>,
}

impl Outcome {
    fn finished(task: &str, state: TaskState, steps: Vec<StepResult>) -> Self {
        Outcome {
            task: task.to_string(),
            state,
            exit_code: 0,
            steps,
            failed_step: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a failed outcome into a `StepFailure` error
    pub fn into_result(self) -> ExecutionResult<Outcome> {
        match self.failed_step {
            Some(step) if !self.is_success() => Err(ExecutionError::StepFailure {
                task: self.task,
                step,
                exit_code: self.exit_code,
            }),
            _ => Ok(self),
        }
    }
}

/// Executes tasks of one project
pub struct Runtime<'p> {
    tasks: &'p TaskRegistry,
    project_env: &'p EnvMap,
    builtins: &'p BuiltinRegistry,
    ctx: Context,
}

impl<'p> Runtime<'p> {
    pub fn new(project: &'p Project, builtins: &'p BuiltinRegistry, ctx: Context) -> Self {
        Runtime {
            tasks: project.tasks(),
            project_env: project.env(),
            builtins,
            ctx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run a task and everything it spawns
    ///
    /// Step failures come back as an `Outcome` with a non-zero exit code;
    /// errors are reserved for conditions that abort the whole run.
    pub fn run(&mut self, task_name: &str, extra_args: &[String]) -> ExecutionResult<Outcome> {
        let tasks = self.tasks;
        let task = tasks
            .try_find(task_name)
            .ok_or_else(|| ExecutionError::UnknownTask(task_name.to_string()))?;

        if self.ctx.is_task_in_stack(task_name) {
            return Err(ExecutionError::CyclicTaskGraph {
                path: self.ctx.cycle_path(task_name),
            });
        }

        self.ctx.push_task(task_name.to_string());
        let result = self.run_task(task, extra_args);
        self.ctx.pop_task();

        match &result {
            Ok(outcome) if outcome.is_success() => self.ctx.print_task_complete(task_name),
            Ok(outcome) => {
                tracing::debug!(task = task_name, exit_code = outcome.exit_code, "task failed")
            }
            Err(e) => tracing::debug!(task = task_name, error = %e, "task aborted"),
        }
        result
    }

    fn transition(&self, task: &str, state: TaskState) {
        tracing::debug!(task, ?state, "task state");
    }

    fn task_cwd(&self, task: &Task) -> PathBuf {
        match task.cwd() {
            Some(dir) => self.ctx.working_dir.join(dir),
            None => self.ctx.working_dir.clone(),
        }
    }

    /// Ambient environment, then project env, then task env
    fn task_env(&self, task: &Task, cwd: &Path) -> ExecutionResult<ResolvedEnv> {
        let mut env = self.ctx.ambient_env.clone();
        apply_layer(&mut env, self.project_env, task.name(), cwd, &self.ctx)?;
        apply_layer(&mut env, task.env(), task.name(), cwd, &self.ctx)?;
        Ok(env)
    }

    fn run_task(&mut self, task: &'p Task, extra_args: &[String]) -> ExecutionResult<Outcome> {
        let name = task.name();
        self.transition(name, TaskState::Pending);
        self.ctx.print_task_start(name);

        let cwd = self.task_cwd(task);
        let env = self.task_env(task, &cwd)?;

        if let Some(condition) = task.condition() {
            self.transition(name, TaskState::EvaluatingCondition);
            if !check_command(name, condition, &env, &cwd, &self.ctx)? {
                let reason = format!("condition '{}' exited non-zero", condition);
                self.ctx.print_task_skip(name, &reason);
                self.transition(name, TaskState::Skipped);
                return Ok(Outcome::finished(name, TaskState::Skipped, Vec::new()));
            }
        }

        if let Some(missing) = task.required_env().iter().find(|key| !env.contains_key(*key)) {
            return Err(ExecutionError::MissingEnv {
                task: name.to_string(),
                name: missing.clone(),
            });
        }

        self.transition(name, TaskState::Running);
        let mut results = Vec::with_capacity(task.steps().len());

        for (index, step) in task.steps().iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled {
                    task: name.to_string(),
                });
            }

            if let Some(condition) = step.condition() {
                if !check_command(name, condition, &env, &cwd, &self.ctx)? {
                    self.ctx.print_debug(&format!("Skipping step {} of '{}'", index, name));
                    results.push(StepResult {
                        index,
                        label: step.label(),
                        status: StepStatus::Skipped,
                        exit_code: 0,
                        spawned: None,
                    });
                    continue;
                }
            }

            let (exit_code, spawned) = self.run_step(task, index, step, &env, &cwd, extra_args)?;
            let failed = exit_code != 0;
            results.push(StepResult {
                index,
                label: step.label(),
                status: if failed { StepStatus::Failed } else { StepStatus::Succeeded },
                exit_code,
                spawned,
            });

            if failed {
                if step.continue_on_error().unwrap_or(false) || task.continue_on_error() {
                    tracing::warn!(task = name, step = index, exit_code, "step failed, continuing");
                    continue;
                }

                self.ctx.print_error(&format!(
                    "Task '{}' failed at step {} ({}) with exit code {}",
                    name,
                    index,
                    step.label(),
                    exit_code
                ));
                self.transition(name, TaskState::Failed);
                return Ok(Outcome {
                    task: name.to_string(),
                    state: TaskState::Failed,
                    exit_code,
                    steps: results,
                    failed_step: Some(index),
                });
            }
        }

        self.transition(name, TaskState::Succeeded);
        Ok(Outcome::finished(name, TaskState::Succeeded, results))
    }

    fn run_step(
        &mut self,
        task: &'p Task,
        index: usize,
        step: &'p Step,
        env: &ResolvedEnv,
        cwd: &Path,
        extra_args: &[String],
    ) -> ExecutionResult<(i32, Option<Box<Outcome>>)> {
        let name = task.name();

        match step {
            Step::Exec(exec) => {
                let step_cwd = match &exec.cwd {
                    Some(dir) => cwd.join(dir),
                    None => cwd.to_path_buf(),
                };

                let mut step_env = env.clone();
                if let Some(layer) = &exec.env {
                    apply_layer(&mut step_env, layer, name, &step_cwd, &self.ctx)?;
                }

                let command = if exec.receive_args.unwrap_or(false) {
                    append_args(&exec.exec, extra_args)
                } else {
                    exec.exec.clone()
                };

                let code = execute_command(name, &command, &step_env, &step_cwd, &self.ctx)?;
                Ok((code, None))
            }

            Step::Spawn(spawn) => {
                let mut args = spawn.args.clone().unwrap_or_default();
                if spawn.receive_args.unwrap_or(false) {
                    args.extend(extra_args.iter().cloned());
                }

                let outcome = self.run(&spawn.spawn, &args)?;
                Ok((outcome.exit_code, Some(Box::new(outcome))))
            }

            Step::Builtin(builtin_step) => {
                let builtins = self.builtins;
                let builtin = builtins.resolve(&builtin_step.builtin, name, index)?;
                let empty = BuiltinArgs::new();
                let args = builtin_step.args.as_ref().unwrap_or(&empty);

                let ctx = BuiltinContext {
                    task: name,
                    step: index,
                    cwd,
                    env,
                    verbosity: self.ctx.verbosity,
                    cancel: &self.ctx.cancel,
                };
                tracing::debug!(task = name, builtin = %builtin_step.builtin, "builtin");

                let code = builtin
                    .run(args, &ctx)
                    .map_err(|e| ExecutionError::BuiltinFailure {
                        task: name.to_string(),
                        step: index,
                        builtin: builtin_step.builtin.clone(),
                        message: format!("{:#}", e),
                    })?;
                Ok((code, None))
            }

            Step::Say(say) => {
                self.ctx.print_say(&say.say);
                Ok((0, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Verbosity;
    use crate::task::{ExecStep, SpawnStep};

    fn quiet_context() -> Context {
        Context::new().with_verbosity(Verbosity::Silent)
    }

    #[test]
    fn test_empty_task_succeeds() {
        let mut project = Project::new("p", ".");
        project.add_task("noop").unwrap();

        let builtins = BuiltinRegistry::new();
        let mut runtime = Runtime::new(&project, &builtins, quiet_context());
        let outcome = runtime.run("noop", &[]).unwrap();

        assert_eq!(outcome.state, TaskState::Succeeded);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.steps.is_empty());
    }

    #[test]
    fn test_unknown_task() {
        let project = Project::new("p", ".");
        let builtins = BuiltinRegistry::new();
        let mut runtime = Runtime::new(&project, &builtins, quiet_context());

        let result = runtime.run("missing", &[]);
        assert!(matches!(result, Err(ExecutionError::UnknownTask(name)) if name == "missing"));
    }

    #[test]
    fn test_self_spawn_is_a_cycle() {
        let mut project = Project::new("p", ".");
        project.add_task("loop").unwrap().spawn("loop");

        let builtins = BuiltinRegistry::new();
        let mut runtime = Runtime::new(&project, &builtins, quiet_context());
        let result = runtime.run("loop", &[]);

        match result {
            Err(ExecutionError::CyclicTaskGraph { path }) => assert_eq!(path, vec!["loop", "loop"]),
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(runtime.context().task_stack.is_empty());
    }

    #[test]
    fn test_sibling_spawns_are_not_cycles() {
        let mut project = Project::new("p", ".");
        project.add_task("leaf").unwrap().exec("true");
        project
            .add_task("root")
            .unwrap()
            .spawn("leaf")
            .spawn("leaf");

        let builtins = BuiltinRegistry::new();
        let mut runtime = Runtime::new(&project, &builtins, quiet_context());
        let outcome = runtime.run("root", &[]).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.steps.len(), 2);
        let spawned = outcome.steps[0].spawned.as_ref().unwrap();
        assert_eq!(spawned.task, "leaf");
        assert_eq!(spawned.steps.len(), 1);
    }

    #[test]
    fn test_into_result() {
        let mut project = Project::new("p", ".");
        project
            .add_task("fail")
            .unwrap()
            .add_step(ExecStep::new("exit 3"));
        project
            .add_task("wrap")
            .unwrap()
            .add_step(SpawnStep::new("fail"));

        let builtins = BuiltinRegistry::new();
        let mut runtime = Runtime::new(&project, &builtins, quiet_context());
        let outcome = runtime.run("wrap", &[]).unwrap();
        assert_eq!(outcome.exit_code, 3);

        match outcome.into_result() {
            Err(ExecutionError::StepFailure { task, step, exit_code }) => {
                assert_eq!(task, "wrap");
                assert_eq!(step, 0);
                assert_eq!(exit_code, 3);
            }
            other => panic!("expected step failure, got {:?}", other),
        }
    }
}
