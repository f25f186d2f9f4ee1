//! Generated files
//!
//! A [`FileTree`] holds the artifacts a project will write on synthesis,
//! keyed by their normalized project-relative path.

use crate::error::{ConfigError, ConfigResult};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// An artifact registered for synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Relative to the owning project's directory
    pub path: PathBuf,
    pub contents: String,
}

/// Lexically normalize a path: drop `.` components and fold `..`
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    files: BTreeMap<PathBuf, GeneratedFile>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file; a path can only be registered once until removed
    pub fn add(
        &mut self,
        path: impl AsRef<Path>,
        contents: impl Into<String>,
    ) -> ConfigResult<&GeneratedFile> {
        let path = normalize_path(path.as_ref());
        if path.as_os_str().is_empty() || path.is_absolute() || path.starts_with("..") {
            return Err(ConfigError::Invalid(format!(
                "generated file path must stay inside the project: '{}'",
                path.display()
            )));
        }
        if self.files.contains_key(&path) {
            return Err(ConfigError::DuplicateFile(path));
        }

        let file = GeneratedFile {
            path: path.clone(),
            contents: contents.into(),
        };
        Ok(self.files.entry(path).or_insert(file))
    }

    pub fn get(&self, path: &Path) -> Option<&GeneratedFile> {
        self.files.get(&normalize_path(path))
    }

    pub fn remove(&mut self, path: &Path) -> Option<GeneratedFile> {
        self.files.remove(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in path order
    pub fn iter(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.files.values()
    }
}

/// Write `contents` so readers see either the old file or the complete new one
///
/// The data goes to a sibling temporary file which is synced and then
/// renamed over the target.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".tmp-{}", std::process::id()));
    let tmp_path = parent.join(tmp_name);

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        // Best effort cleanup
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
