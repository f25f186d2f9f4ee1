//! Projects
//!
//! A [`Project`] owns its task registry, project-wide environment and the
//! files it generates. Sub-projects live in directories below their parent
//! and synthesize independently.

pub mod files;
pub mod manifest;

pub use files::*;
pub use manifest::*;

use crate::error::{ConfigResult, Result};
use crate::task::{EnvMap, Task, TaskRegistry};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    description: Option<String>,
    /// Directory the project's files and tasks are rooted at
    outdir: PathBuf,
    tasks: TaskRegistry,
    env: EnvMap,
    interpreter: Option<Vec<String>>,
    files: FileTree,
    subprojects: Vec<Project>,
}

impl Project {
    pub fn new(name: impl Into<String>, outdir: impl Into<PathBuf>) -> Self {
        Project {
            name: name.into(),
            description: None,
            outdir: normalize_path(&outdir.into()),
            tasks: TaskRegistry::new(),
            env: EnvMap::new(),
            interpreter: None,
            files: FileTree::new(),
            subprojects: Vec::new(),
        }
    }

    /// Rebuild a project from an exported manifest
    pub fn from_manifest(
        name: impl Into<String>,
        outdir: impl Into<PathBuf>,
        manifest: TaskManifest,
    ) -> Result<Self> {
        let mut project = Project::new(name, outdir);
        project.description = manifest.description.clone();
        project.interpreter = manifest.interpreter.clone();
        project.env = manifest.env.clone();
        project.tasks = manifest.into_registry()?;
        Ok(project)
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

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskRegistry {
        &mut self.tasks
    }

    /// Shorthand for registering an empty task
    pub fn add_task(&mut self, name: impl Into<String>) -> ConfigResult<&mut Task> {
        self.tasks.add(name)
    }

    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Set a variable for every task of this project
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    pub fn unset_env(&mut self, key: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), None);
        self
    }

    pub fn interpreter(&self) -> Option<&[String]> {
        self.interpreter.as_deref()
    }

    pub fn set_interpreter(&mut self, interpreter: Vec<String>) -> &mut Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn files(&self) -> &FileTree {
        &self.files
    }

    /// Register a generated file at a project-relative path
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        contents: impl Into<String>,
    ) -> ConfigResult<&GeneratedFile> {
        self.files.add(path, contents)
    }

    pub fn subprojects(&self) -> &[Project] {
        &self.subprojects
    }

    /// Create a sub-project rooted at `dir`, relative to this project
    pub fn add_subproject(
        &mut self,
        name: impl Into<String>,
        dir: impl AsRef<Path>,
    ) -> &mut Project {
        let sub = Project::new(name, self.outdir.join(dir.as_ref()));
        self.subprojects.push(sub);
        let last = self.subprojects.len() - 1;
        &mut self.subprojects[last]
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.outdir.join(path))
        }
    }

    /// Find a generated file by project-relative or absolute path, looking
    /// into sub-projects whose directory contains it
    pub fn try_find_file(&self, path: impl AsRef<Path>) -> Option<&GeneratedFile> {
        self.find_absolute(&self.absolute(path.as_ref()))
    }

    fn find_absolute(&self, path: &Path) -> Option<&GeneratedFile> {
        let local = path.strip_prefix(&self.outdir).ok();
        if let Some(file) = local.and_then(|rel| self.files.get(rel)) {
            return Some(file);
        }
        self.subprojects
            .iter()
            .filter(|sub| path.starts_with(&sub.outdir))
            .find_map(|sub| sub.find_absolute(path))
    }

    /// Remove a generated file so a later registration can replace it.
    /// Removing twice returns `None` the second time.
    pub fn try_remove_file(&mut self, path: impl AsRef<Path>) -> Option<GeneratedFile> {
        let path = self.absolute(path.as_ref());
        self.remove_absolute(&path)
    }

    fn remove_absolute(&mut self, path: &Path) -> Option<GeneratedFile> {
        if let Ok(rel) = path.strip_prefix(&self.outdir) {
            if let Some(file) = self.files.remove(rel) {
                return Some(file);
            }
        }
        self.subprojects
            .iter_mut()
            .filter(|sub| path.starts_with(&sub.outdir))
            .find_map(|sub| sub.remove_absolute(path))
    }

    /// Snapshot of the current tasks
    pub fn manifest(&self) -> TaskManifest {
        TaskManifest {
            description: self.description.clone(),
            interpreter: self.interpreter.clone(),
            ..TaskManifest::from_registry(&self.env, &self.tasks)
        }
    }

    /// Freeze the tasks, export the manifest and write every file
    ///
    /// Sub-projects are synthesized first. Each file is written atomically.
    pub fn synth(&mut self) -> Result<()> {
        for sub in &mut self.subprojects {
            sub.synth()?;
        }

        self.tasks.lock();
        let manifest = self.manifest().to_json()?;
        self.files.remove(Path::new(MANIFEST_PATH));
        self.files.add(MANIFEST_PATH, manifest)?;

        for file in self.files.iter() {
            let target = self.outdir.join(&file.path);
            tracing::debug!(project = %self.name, path = %target.display(), "writing file");
            write_atomic(&target, &file.contents)?;
        }
        tracing::info!(project = %self.name, files = self.files.len(), "synthesized");
        Ok(())
    }
}
