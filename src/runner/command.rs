//! Command execution
//!
//! This module handles executing shell commands through the configured
//! interpreter. The runtime owns every child process until it exits and
//! kills it when the context's cancel token is set.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Context, ResolvedEnv};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Build an interpreter invocation with an exact environment
fn shell_command(command: &str, env: &ResolvedEnv, cwd: &Path, ctx: &Context) -> StdCommand {
    let mut cmd = StdCommand::new(&ctx.interpreter[0]);

    // Add interpreter args (e.g., "-c" for sh/bash)
    if ctx.interpreter.len() > 1 {
        cmd.args(&ctx.interpreter[1..]);
    }

    cmd.arg(command);
    cmd.current_dir(cwd);
    cmd.env_clear();
    cmd.envs(env);
    cmd
}

fn launch(mut cmd: StdCommand, command: &str) -> ExecutionResult<Child> {
    cmd.spawn().map_err(|error| ExecutionError::Spawn {
        command: command.to_string(),
        error,
    })
}

/// Wait for a child, killing it if the run is cancelled
fn wait_for(mut child: Child, task: &str, ctx: &Context) -> ExecutionResult<i32> {
    loop {
        if let Some(status) = child.try_wait().map_err(|error| ExecutionError::Spawn {
            command: format!("wait for task '{}'", task),
            error,
        })? {
            return Ok(exit_code(status));
        }

        if ctx.cancel.is_cancelled() {
            tracing::warn!(task, pid = child.id(), "cancelled, killing child process");
            // The child may already have exited between the poll and the kill.
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecutionError::Cancelled {
                task: task.to_string(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Exit code of a finished process; signals map to 128 + signal number
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// Execute a command with inherited stdio and return its exit code
pub fn execute_command(
    task: &str,
    command: &str,
    env: &ResolvedEnv,
    cwd: &Path,
    ctx: &Context,
) -> ExecutionResult<i32> {
    ctx.print_command(command);
    tracing::debug!(task, command, cwd = %cwd.display(), "exec");

    let mut cmd = shell_command(command, env, cwd, ctx);
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    let child = launch(cmd, command)?;
    wait_for(child, task, ctx)
}

/// Check if a command succeeds (for conditions); output is suppressed
pub fn check_command(
    task: &str,
    command: &str,
    env: &ResolvedEnv,
    cwd: &Path,
    ctx: &Context,
) -> ExecutionResult<bool> {
    let mut cmd = shell_command(command, env, cwd, ctx);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = launch(cmd, command)?;
    Ok(wait_for(child, task, ctx)? == 0)
}

/// Run a command and capture its stdout
///
/// Stdout is drained on a separate thread so a chatty command can't fill the
/// pipe while the child is being polled for exit or cancellation.
pub fn capture_command(
    task: &str,
    command: &str,
    env: &ResolvedEnv,
    cwd: &Path,
    ctx: &Context,
) -> ExecutionResult<(i32, String)> {
    let mut cmd = shell_command(command, env, cwd, ctx);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let mut child = launch(cmd, command)?;
    let stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            // A read error leaves whatever was captured so far.
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });

    let code = wait_for(child, task, ctx)?;
    let output = reader.join().unwrap_or_default();
    Ok((code, String::from_utf8_lossy(&output).into_owned()))
}

/// Quote an argument for a POSIX shell
pub fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Append quoted arguments to a command line
pub fn append_args(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }
    let quoted: Vec<String> = args.iter().map(|a| quote_arg(a)).collect();
    format!("{} {}", command, quoted.join(" "))
}
