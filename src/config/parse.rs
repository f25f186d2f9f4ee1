//! Project file parsing and discovery

use crate::config::types::{ProjectConfig, TaskConfig};
use crate::error::{ConfigError, ConfigResult, TaskforgeError};
use crate::project::{normalize_path, Project, TaskManifest, MANIFEST_PATH};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File names searched for, in order, in each directory
const CONFIG_FILE_NAMES: &[&str] = &["taskforge.yml", "taskforge.yaml", MANIFEST_PATH];

/// Find the project file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the project file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        // Try parent directory
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => {
                // Reached root without finding config
                return Err(ConfigError::NotFound(searched_paths.join(", ")));
            }
        }
    }
}

/// Parse a project file from a path
pub fn parse_config_file(path: &Path) -> Result<ProjectConfig, TaskforgeError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    parse_config(&contents, Some(path))
}

/// Parse a project file from a string
///
/// `include` directives are resolved relative to `config_path` when given.
pub fn parse_config(
    yaml: &str,
    config_path: Option<&Path>,
) -> Result<ProjectConfig, TaskforgeError> {
    let mut config: ProjectConfig = serde_yaml::from_str(yaml)?;

    if let Some(base_path) = config_path {
        process_includes(&mut config, base_path)?;
    }

    Ok(config)
}

fn base_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Replace tasks carrying `include` with the content of the included file
fn process_includes(config: &mut ProjectConfig, config_path: &Path) -> Result<(), TaskforgeError> {
    let base_dir = base_dir(config_path);

    for task in config.tasks.values_mut() {
        if let Some(include_path) = &task.include {
            *task = load_included_task(&base_dir.join(include_path))?;
        }
    }

    Ok(())
}

/// Load a task from an included file
fn load_included_task(path: &Path) -> Result<TaskConfig, TaskforgeError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let task: TaskConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    if task.include.is_some() {
        return Err(ConfigError::IncludeFile {
            path: path.to_path_buf(),
            error: "included tasks cannot include other files".to_string(),
        }
        .into());
    }

    Ok(task)
}

/// Read a dotenv file into ordered key/value pairs
fn load_env_file(path: &Path) -> ConfigResult<Vec<(String, String)>> {
    let env_error = |error: String| ConfigError::EnvFile {
        path: path.to_path_buf(),
        error,
    };

    dotenvy::from_path_iter(path)
        .map_err(|e| env_error(e.to_string()))?
        .map(|item| item.map_err(|e| env_error(e.to_string())))
        .collect()
}

/// Build a project rooted at `outdir` from a parsed file
pub fn build_project(config: ProjectConfig, outdir: &Path) -> Result<Project, TaskforgeError> {
    let name = config.name.clone().unwrap_or_else(|| {
        outdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });
    let mut project = Project::new(name, outdir);

    if let Some(description) = config.description {
        project.set_description(description);
    }
    if let Some(interpreter) = config.interpreter {
        project.set_interpreter(interpreter);
    }

    if let Some(env_file) = &config.env_file {
        for (key, value) in load_env_file(&outdir.join(env_file))? {
            project.set_env(key, value);
        }
    }
    for (key, value) in config.env {
        match value {
            Some(value) => project.set_env(key, value),
            None => project.unset_env(key),
        };
    }

    for (task_name, task_config) in config.tasks {
        let task = task_config.into_task(&task_name)?;
        project.tasks_mut().add_task(task)?;
    }

    for sub in &config.subprojects {
        let sub_path = outdir.join(sub);
        let sub_file = if sub_path.is_dir() {
            find_in_dir(&sub_path)?
        } else {
            sub_path
        };
        let sub_project = load_project(&sub_file)?;
        let sub_dir = sub_project
            .outdir()
            .strip_prefix(project.outdir())
            .map(Path::to_path_buf)
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "subproject '{}' is outside the project directory",
                    sub
                ))
            })?;
        attach_subproject(&mut project, sub_project, &sub_dir);
    }

    Ok(project)
}

fn attach_subproject(parent: &mut Project, loaded: Project, dir: &Path) {
    let child = parent.add_subproject(loaded.name().to_string(), dir);
    *child = loaded;
}

fn find_in_dir(dir: &Path) -> ConfigResult<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| ConfigError::NotFound(dir.display().to_string()))
}

/// Load a project from a project file or an exported manifest
pub fn load_project(path: &Path) -> Result<Project, TaskforgeError> {
    let path = normalize_path(&env::current_dir()?.join(path));

    if path.extension().is_some_and(|ext| ext == "json") {
        // <outdir>/.taskforge/tasks.json
        let outdir = path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = outdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        return Project::from_manifest(name, outdir, TaskManifest::load(&path)?);
    }

    let config = parse_config_file(&path)?;
    build_project(config, base_dir(&path))
}

/// Load the project with automatic file discovery
pub fn load_project_auto() -> Result<(Project, PathBuf), TaskforgeError> {
    let config_path = find_config_file()?;
    let project = load_project(&config_path)?;
    Ok((project, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_simple_config() {
        let yaml = r#"
tasks:
  hello:
    description: Say hello
    steps: echo "hello"
"#;
        let config = parse_config(yaml, None).unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert!(config.tasks.contains_key("hello"));
    }

    #[test]
    fn test_find_config_in_current_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("taskforge.yml");
        fs::write(&config_path, "tasks: {}\n").unwrap();

        let found = find_config_file_from(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(found, config_path);
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("taskforge.yml");
        let sub_dir = temp_dir.path().join("subdir");

        fs::create_dir(&sub_dir).unwrap();
        fs::write(&config_path, "tasks: {}\n").unwrap();

        let found = find_config_file_from(sub_dir).unwrap();
        assert_eq!(found, config_path);
    }

    #[test]
    fn test_find_manifest_when_no_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join(MANIFEST_PATH);
        fs::create_dir_all(manifest.parent().unwrap()).unwrap();
        fs::write(&manifest, "{\"tasks\": {}}\n").unwrap();

        let found = find_config_file_from(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(found, manifest);
    }

    #[test]
    fn test_config_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = find_config_file_from(temp_dir.path().to_path_buf());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_include_replaces_task() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("deploy.yml"),
            "description: Deploy\nsteps:\n  - echo deploy\n",
        )
        .unwrap();
        let config_path = temp_dir.path().join("taskforge.yml");
        fs::write(&config_path, "tasks:\n  deploy:\n    include: deploy.yml\n").unwrap();

        let config = parse_config_file(&config_path).unwrap();
        let deploy = &config.tasks["deploy"];
        assert_eq!(deploy.description.as_deref(), Some("Deploy"));
        assert!(deploy.include.is_none());
    }

    #[test]
    fn test_missing_include() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("taskforge.yml");
        fs::write(&config_path, "tasks:\n  x:\n    include: nope.yml\n").unwrap();

        let result = parse_config_file(&config_path);
        assert!(matches!(
            result,
            Err(TaskforgeError::Config(ConfigError::IncludeFile { .. }))
        ));
    }

    #[test]
    fn test_env_file_loads_beneath_env() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".env"), "A=from-file\nB=from-file\n").unwrap();
        let config = parse_config("envFile: .env\nenv:\n  B: from-config\n", None).unwrap();

        let project = build_project(config, temp_dir.path()).unwrap();
        assert_eq!(project.env().get("A"), Some(&Some("from-file".to_string())));
        assert_eq!(project.env().get("B"), Some(&Some("from-config".to_string())));
    }

    #[test]
    fn test_build_project_with_subproject() {
        let temp_dir = TempDir::new().unwrap();
        let sub = temp_dir.path().join("packages/api");
        fs::create_dir_all(&sub).unwrap();
        fs::write(
            sub.join("taskforge.yml"),
            "name: api\ntasks:\n  serve:\n    steps: echo serve\n",
        )
        .unwrap();

        let root_file = temp_dir.path().join("taskforge.yml");
        fs::write(
            &root_file,
            "name: root\nsubprojects: [packages/api]\ntasks:\n  build:\n    steps: echo build\n",
        )
        .unwrap();

        let project = load_project(&root_file).unwrap();
        assert_eq!(project.name(), "root");
        assert_eq!(project.subprojects().len(), 1);
        assert_eq!(project.subprojects()[0].name(), "api");
        assert!(project.subprojects()[0].tasks().contains("serve"));
    }

    #[test]
    fn test_load_project_from_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join(MANIFEST_PATH);
        fs::create_dir_all(manifest.parent().unwrap()).unwrap();
        fs::write(
            &manifest,
            r#"{"tasks": {"build": {"name": "build", "steps": [{"exec": "make"}]}}}"#,
        )
        .unwrap();

        let project = load_project(&manifest).unwrap();
        assert_eq!(project.outdir(), normalize_path(temp_dir.path()));
        assert!(project.tasks().contains("build"));
    }
}
