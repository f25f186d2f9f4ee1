//! Task manifest
//!
//! The manifest is the serialized snapshot of a project's tasks consumed by
//! the CLI dispatcher and editor tooling. Tasks are keyed and sorted by name;
//! steps keep their declared order.

use crate::error::{ConfigError, Result};
use crate::task::{EnvMap, Task, TaskRegistry};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Where a project writes its manifest, relative to its directory
pub const MANIFEST_PATH: &str = ".taskforge/tasks.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Command prefix the project's exec steps run through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// Project-wide environment
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: EnvMap,

    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
}

impl TaskManifest {
    /// Snapshot a registry and the project env
    pub fn from_registry(env: &EnvMap, registry: &TaskRegistry) -> Self {
        TaskManifest {
            description: None,
            interpreter: None,
            env: env.clone(),
            tasks: registry
                .iter()
                .map(|task| (task.name().to_string(), task.clone()))
                .collect(),
        }
    }

    /// Pretty JSON with a trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: TaskManifest = serde_json::from_str(json)?;

        if let Some((key, task)) = manifest.tasks.iter().find(|(key, task)| *key != task.name()) {
            return Err(ConfigError::Invalid(format!(
                "manifest entry '{}' describes task '{}'",
                key,
                task.name()
            ))
            .into());
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Rebuild an (unlocked) registry from the snapshot
    pub fn into_registry(self) -> Result<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        for task in self.tasks.into_values() {
            registry.add_task(task)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_sorted_by_name() {
        let mut registry = TaskRegistry::new();
        registry.add("zeta").unwrap();
        registry.add("alpha").unwrap().exec("true");

        let json = TaskManifest::from_registry(&EnvMap::new(), &registry)
            .to_json()
            .unwrap();
        let alpha = json.find("\"alpha\"").unwrap();
        let zeta = json.find("\"zeta\"").unwrap();
        assert!(alpha < zeta);
        assert!(json.ends_with('\n'));
        assert!(!json.contains("\"env\""));
    }

    #[test]
    fn test_key_must_match_name() {
        let json = r#"{"tasks": {"build": {"name": "test"}}}"#;
        assert!(TaskManifest::from_json(json).is_err());
    }

    #[test]
    fn test_project_settings_are_optional() {
        let manifest = TaskManifest::from_json(r#"{"tasks": {}}"#).unwrap();
        assert_eq!(manifest.description, None);
        assert_eq!(manifest.interpreter, None);

        let json = r#"{"description": "Demo", "interpreter": ["sh", "-c"], "tasks": {}}"#;
        let manifest = TaskManifest::from_json(json).unwrap();
        assert_eq!(manifest.description.as_deref(), Some("Demo"));
        assert_eq!(manifest.interpreter, Some(vec!["sh".to_string(), "-c".to_string()]));
    }

    #[test]
    fn test_unset_is_null() {
        let mut registry = TaskRegistry::new();
        registry.add("t").unwrap().unset_env("NODE_OPTIONS");

        let json = TaskManifest::from_registry(&EnvMap::new(), &registry)
            .to_json()
            .unwrap();
        assert!(json.contains("\"NODE_OPTIONS\": null"));
    }
}
