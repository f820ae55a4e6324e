// Engine Configuration
// Tunables for graph materialization, loadable from YAML

use crate::error::{GraphError, GraphResult};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the graph service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Resolve outcomes and step details for every vertex on generate
    pub include_details: bool,

    /// Snapshot directory (default: ~/.execgraph/snapshots/)
    pub snapshot_dir: PathBuf,

    /// Warn when a record without parent or previous lands on a non-empty graph
    pub log_orphan_roots: bool,

    /// Check every invariant after each service-level mutation
    pub validate_after_mutation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let snapshot_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".execgraph")
            .join("snapshots");

        Self {
            include_details: false,
            snapshot_dir,
            log_orphan_roots: true,
            validate_after_mutation: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> GraphResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GraphError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn with_details(mut self, include_details: bool) -> Self {
        self.include_details = include_details;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_after_mutation = validate;
        self
    }
}
