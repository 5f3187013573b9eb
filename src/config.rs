//! Cluster configuration (`clusterup.toml`)

use crate::cloud::Cloud;
use anyhow::{Context, Result, bail};
use cloudkit::RetryConfig;
use converge::{BoxedTask, TaskRegistry};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG: &str = "clusterup.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    pub cluster: ClusterSection,
    /// Raw `[[task]]` tables, built into tasks through the registry
    #[serde(default, rename = "task")]
    pub tasks: Vec<toml::Table>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    pub name: String,
    /// Provider state file; `~` and environment variables are expanded
    #[serde(default)]
    pub state: Option<String>,
    /// Discovery workers
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ClusterConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.cluster.name.trim().is_empty() {
            bail!("[cluster] name must not be empty");
        }
        Ok(config)
    }

    /// Expanded state file path, if configured
    pub fn state_path(&self) -> Result<Option<PathBuf>> {
        self.cluster
            .state
            .as_deref()
            .map(|raw| {
                let expanded = shellexpand::full(raw)
                    .with_context(|| format!("Could not expand state path {raw}"))?;
                Ok(PathBuf::from(expanded.as_ref()))
            })
            .transpose()
    }

    /// Build every `[[task]]` table into a task
    pub fn build_tasks(&self, registry: &TaskRegistry<Cloud>) -> Result<Vec<BoxedTask<Cloud>>> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, table)| {
                build_task(registry, table).with_context(|| format!("[[task]] #{}", index + 1))
            })
            .collect()
    }
}

fn build_task(registry: &TaskRegistry<Cloud>, table: &toml::Table) -> Result<BoxedTask<Cloud>> {
    let mut table = table.clone();
    let kind = match table.remove("kind") {
        Some(toml::Value::String(kind)) => kind,
        Some(other) => bail!("kind must be a string, got {other}"),
        None => bail!("missing kind"),
    };

    match table.get("name").and_then(toml::Value::as_str) {
        None => bail!("{kind} task has no name"),
        Some(name) if name.trim().is_empty() => bail!("{kind} task has an empty name"),
        Some(name) if name.contains('/') => bail!("task name {name} must not contain '/'"),
        Some(_) => {}
    }

    let value = serde_json::to_value(&table)?;
    Ok(registry.build(&kind, value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::registry;
    use converge::TaskKey;

    const CONFIG: &str = r#"
[cluster]
name = "prod.example.com"
state = "state/cloud.json"

[[task]]
kind = "iam_role"
name = "nodes"
assume_role_policy = '{"Version": "2012-10-17"}'

[[task]]
kind = "instance_template"
name = "nodes"
machine_type = "n1-standard-2"
image = "cos"
service_account = { ref = "iam_role/nodes", attr = "arn" }
lifecycle = "exists_and_warn_if_changes"
"#;

    #[test]
    fn test_builds_tasks_with_references() {
        let config = ClusterConfig::parse(CONFIG).unwrap();
        let tasks = config.build_tasks(&registry().unwrap()).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(
            tasks[1].dependencies().unwrap(),
            [TaskKey::new("iam_role", "nodes")]
        );
        assert_eq!(
            tasks[1].lifecycle(),
            converge::Lifecycle::ExistsAndWarnIfChanges
        );
    }

    #[test]
    fn test_state_path() {
        let config = ClusterConfig::parse(CONFIG).unwrap();
        assert_eq!(
            config.state_path().unwrap(),
            Some(PathBuf::from("state/cloud.json"))
        );
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let config = ClusterConfig::parse(
            "[cluster]\nname = \"c\"\n[[task]]\nkind = \"bucket\"\nname = \"b\"\n",
        )
        .unwrap();
        let err = config.build_tasks(&registry().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown task kind `bucket`"));
    }

    #[test]
    fn test_rejects_empty_names() {
        assert!(ClusterConfig::parse("[cluster]\nname = \" \"\n").is_err());

        let config = ClusterConfig::parse(
            "[cluster]\nname = \"c\"\n[[task]]\nkind = \"iam_role\"\nname = \"\"\n",
        )
        .unwrap();
        assert!(config.build_tasks(&registry().unwrap()).is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG);
        fs::write(&path, CONFIG).unwrap();

        let config = ClusterConfig::load(&path).unwrap();
        assert_eq!(config.cluster.name, "prod.example.com");
        assert!(ClusterConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
