//! Environment layering and value expressions
//!
//! The effective environment of a step is built from layers applied in
//! order: ambient process environment, project env, task env, step env.
//! Each entry overrides an earlier one with the same key and `None` removes
//! the key. Values are either `$(command)` expressions, evaluated through the
//! interpreter, or strings in which `${NAME}` references to already-set
//! variables are substituted.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{capture_command, Context};
use crate::task::EnvMap;
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

/// A fully resolved environment
pub type ResolvedEnv = IndexMap<String, String>;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"));

/// Substitute `${NAME}` references with values from `vars`
///
/// Unknown names are left untouched so the shell can still expand them.
/// Substituted values are not expanded again.
pub fn interpolate(s: &str, vars: &ResolvedEnv) -> String {
    VAR_PATTERN
        .replace_all(s, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// The command inside a `$(...)` value, if it is one
pub fn expression_command(value: &str) -> Option<&str> {
    value
        .strip_prefix("$(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

/// Apply one layer of overrides on top of `env`
pub fn apply_layer(
    env: &mut ResolvedEnv,
    layer: &EnvMap,
    task: &str,
    cwd: &Path,
    ctx: &Context,
) -> ExecutionResult<()> {
    for (key, value) in layer {
        match value {
            None => {
                env.shift_remove(key);
            }
            Some(raw) => {
                let resolved = resolve_value(key, raw, env, task, cwd, ctx)?;
                env.insert(key.clone(), resolved);
            }
        }
    }
    Ok(())
}

fn resolve_value(
    key: &str,
    raw: &str,
    env: &ResolvedEnv,
    task: &str,
    cwd: &Path,
    ctx: &Context,
) -> ExecutionResult<String> {
    let Some(command) = expression_command(raw) else {
        return Ok(interpolate(raw, env));
    };

    let (code, stdout) = capture_command(task, command, env, cwd, ctx)?;
    if code != 0 {
        return Err(ExecutionError::EnvExpression {
            task: task.to_string(),
            name: key.to_string(),
            reason: format!("'{}' exited with code {}", command, code),
        });
    }
    Ok(stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> ResolvedEnv {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_interpolate_known_and_unknown() {
        let env = vars(&[("NAME", "world")]);
        assert_eq!(interpolate("hello ${NAME}", &env), "hello world");
        assert_eq!(interpolate("${MISSING}/x", &env), "${MISSING}/x");
        assert_eq!(interpolate("$NAME stays", &env), "$NAME stays");
    }

    #[test]
    fn test_interpolate_is_single_pass() {
        let env = vars(&[("A", "${B}"), ("B", "b")]);
        assert_eq!(interpolate("${A}", &env), "${B}");
    }

    #[test]
    fn test_expression_command() {
        assert_eq!(expression_command("$(git rev-parse HEAD)"), Some("git rev-parse HEAD"));
        assert_eq!(expression_command("$(echo hi"), None);
        assert_eq!(expression_command("plain"), None);
    }

    #[test]
    fn test_apply_layer_overrides_and_unsets() {
        let ctx = Context::new();
        let mut env = vars(&[("X", "1"), ("GONE", "yes")]);

        let mut layer = EnvMap::new();
        layer.insert("X".to_string(), Some("2".to_string()));
        layer.insert("Y".to_string(), Some("${X}-3".to_string()));
        layer.insert("GONE".to_string(), None);

        apply_layer(&mut env, &layer, "t", &ctx.working_dir, &ctx).unwrap();
        assert_eq!(env.get("X").map(String::as_str), Some("2"));
        assert_eq!(env.get("Y").map(String::as_str), Some("2-3"));
        assert!(!env.contains_key("GONE"));
    }

    #[test]
    fn test_apply_layer_evaluates_expressions() {
        let ctx = Context::new();
        let mut env = vars(&[("PATH", std::env::var("PATH").unwrap_or_default().as_str())]);

        let mut layer = EnvMap::new();
        layer.insert("GREETING".to_string(), Some("$(echo '  hi  ')".to_string()));
        apply_layer(&mut env, &layer, "t", &ctx.working_dir, &ctx).unwrap();
        assert_eq!(env.get("GREETING").map(String::as_str), Some("hi"));

        let mut failing = EnvMap::new();
        failing.insert("BAD".to_string(), Some("$(exit 4)".to_string()));
        let result = apply_layer(&mut env, &failing, "t", &ctx.working_dir, &ctx);
        assert!(matches!(result, Err(ExecutionError::EnvExpression { .. })));
    }
}
