// Graph Snapshots
// Persists adjacency lists as JSON so cached graphs survive a restart

use crate::error::{GraphError, GraphResult};
use crate::graph::AdjacencyList;

use std::fs;
use std::path::{Path, PathBuf};

/// File-backed snapshot store, one JSON document per plan execution
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot for one plan execution
    pub fn path_for(&self, plan_execution_id: &str) -> PathBuf {
        let file_name: String = plan_execution_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    pub fn exists(&self, plan_execution_id: &str) -> bool {
        self.path_for(plan_execution_id).is_file()
    }

    /// Write the graph, replacing any older snapshot
    pub fn save(&self, plan_execution_id: &str, graph: &AdjacencyList) -> GraphResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(plan_execution_id);
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(graph)?;
        fs::write(&staging, content)?;
        fs::rename(&staging, &path)?;

        Ok(path)
    }

    pub fn load(&self, plan_execution_id: &str) -> GraphResult<AdjacencyList> {
        let path = self.path_for(plan_execution_id);
        if !path.is_file() {
            return Err(GraphError::not_found(format!(
                "snapshot for {}",
                plan_execution_id
            )));
        }
        let content = fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Returns whether a snapshot was deleted
    pub fn delete(&self, plan_execution_id: &str) -> GraphResult<bool> {
        let path = self.path_for(plan_execution_id);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{add_vertex, generate};
    use crate::models::{ExecutionMode, NodeExecutionRecord};
    use tempfile::TempDir;

    fn graph() -> AdjacencyList {
        let records = vec![
            NodeExecutionRecord::new("plan-1", "root", 0),
            NodeExecutionRecord::new("plan-1", "c0", 1)
                .with_parent("root")
                .with_mode(ExecutionMode::Chain),
            NodeExecutionRecord::new("plan-1", "c1", 2)
                .with_parent("root")
                .with_mode(ExecutionMode::Chain),
        ];
        generate("root", &records).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().join("snapshots"));
        let original = graph();

        let path = store.save("plan-1", &original).unwrap();
        assert!(path.ends_with("plan-1.json"));
        assert!(store.exists("plan-1"));

        let loaded = store.load("plan-1").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_placeholders_survive_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path());

        let mut waiting = AdjacencyList::new();
        add_vertex(
            &mut waiting,
            &NodeExecutionRecord::new("plan-1", "child", 5).with_parent("late-parent"),
        )
        .unwrap();

        store.save("plan-1", &waiting).unwrap();
        let loaded = store.load("plan-1").unwrap();
        assert!(loaded.is_placeholder("late-parent"));
    }

    #[test]
    fn test_missing_snapshot_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path());

        let err = store.load("nope").unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
        assert!(!store.delete("nope").unwrap());
    }

    #[test]
    fn test_corrupt_snapshot_is_encoding_error() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path());
        fs::write(store.path_for("plan-1"), b"{ not json").unwrap();

        let err = store.load("plan-1").unwrap_err();
        assert!(matches!(err, GraphError::SnapshotEncoding(_)));
    }

    #[test]
    fn test_ids_are_sanitized() {
        let store = SnapshotStore::new("/tmp/snapshots");
        assert_eq!(
            store.path_for("../plan/1"),
            PathBuf::from("/tmp/snapshots/___plan_1.json")
        );
    }
}
