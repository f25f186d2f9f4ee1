//! Stock builtins
//!
//! All of them are idempotent: running one again against the same arguments
//! and filesystem state changes nothing and returns the same exit code.

use crate::runner::{required_arg, BuiltinContext, BuiltinRegistry, Verbosity};
use crate::task::BuiltinArgs;
use anyhow::{bail, Context as _};
use std::fs;

/// Register `sync-file`, `make-dir` and `remove-glob`
pub fn register_defaults(registry: &mut BuiltinRegistry) {
    registry
        .register_fn("sync-file", sync_file)
        .register_fn("make-dir", make_dir)
        .register_fn("remove-glob", remove_glob);
}

/// Copy `from` to `to`, writing only when the contents differ
fn sync_file(args: &BuiltinArgs, ctx: &BuiltinContext<'_>) -> anyhow::Result<i32> {
    let from = ctx.resolve_path(required_arg(args, "from")?);
    let to = ctx.resolve_path(required_arg(args, "to")?);

    let contents = match fs::read(&from) {
        Ok(contents) => contents,
        Err(e) => {
            if ctx.verbosity >= Verbosity::Quiet {
                eprintln!("sync-file: cannot read {}: {}", from.display(), e);
            }
            return Ok(1);
        }
    };

    if fs::read(&to).ok().as_deref() == Some(contents.as_slice()) {
        tracing::debug!(to = %to.display(), "sync-file: already up to date");
        return Ok(0);
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&to, contents).with_context(|| format!("writing {}", to.display()))?;
    Ok(0)
}

/// Create `path` and its parents
fn make_dir(args: &BuiltinArgs, ctx: &BuiltinContext<'_>) -> anyhow::Result<i32> {
    let path = ctx.resolve_path(required_arg(args, "path")?);
    fs::create_dir_all(&path).with_context(|| format!("creating {}", path.display()))?;
    Ok(0)
}

/// Delete every file or directory matching `pattern`
fn remove_glob(args: &BuiltinArgs, ctx: &BuiltinContext<'_>) -> anyhow::Result<i32> {
    let pattern = ctx.resolve_path(required_arg(args, "pattern")?);
    let pattern = pattern.to_string_lossy();

    for entry in glob::glob(&pattern).with_context(|| format!("invalid pattern '{}'", pattern))? {
        if ctx.cancel.is_cancelled() {
            bail!("cancelled while removing '{}'", pattern);
        }

        let path = entry?;
        // An earlier match may have been a parent directory of this one.
        if !path.exists() {
            continue;
        }
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CancelToken, ResolvedEnv};
    use tempfile::TempDir;

    fn run(name: &str, args: &[(&str, &str)], dir: &TempDir) -> anyhow::Result<i32> {
        let registry = BuiltinRegistry::with_defaults();
        let args: BuiltinArgs = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let env = ResolvedEnv::new();
        let cancel = CancelToken::new();
        let ctx = BuiltinContext {
            task: "t",
            step: 0,
            cwd: dir.path(),
            env: &env,
            verbosity: Verbosity::Silent,
            cancel: &cancel,
        };
        registry.resolve(name, "t", 0).unwrap().run(&args, &ctx)
    }

    #[test]
    fn test_sync_file_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("src.txt"), "payload").unwrap();

        let args = [("from", "src.txt"), ("to", "out/dst.txt")];
        assert_eq!(run("sync-file", &args, &dir).unwrap(), 0);
        assert_eq!(run("sync-file", &args, &dir).unwrap(), 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("out/dst.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn test_sync_file_missing_source_fails_normally() {
        let dir = TempDir::new().unwrap();
        let code = run("sync-file", &[("from", "nope"), ("to", "x")], &dir).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn test_missing_argument_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(run("make-dir", &[], &dir).is_err());
    }

    #[test]
    fn test_make_dir_and_remove_glob() {
        let dir = TempDir::new().unwrap();
        assert_eq!(run("make-dir", &[("path", "dist/a")], &dir).unwrap(), 0);
        assert_eq!(run("make-dir", &[("path", "dist/a")], &dir).unwrap(), 0);
        fs::write(dir.path().join("dist/a/x.log"), "").unwrap();
        fs::write(dir.path().join("keep.txt"), "").unwrap();

        assert_eq!(run("remove-glob", &[("pattern", "dist")], &dir).unwrap(), 0);
        assert_eq!(run("remove-glob", &[("pattern", "dist")], &dir).unwrap(), 0);
        assert!(!dir.path().join("dist").exists());
        assert!(dir.path().join("keep.txt").exists());
    }
}
