//! Workspace registry: CRUD over `workspaces/<ws_id>/workspace.json`, in the
//! same scan-on-query idiom `orcaops_observability::RunStore` uses for run
//! records — no in-memory cache, atomic writes via `Fs::write_atomic`.

use chrono::Utc;
use orcaops_base::{ErrorKind, OrcaError, Workspace};
use orcaops_util::{Config, Fs};
use rand::RngCore;
use std::collections::HashMap;

fn generate_workspace_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("ws_{}", hex::encode(bytes))
}

pub struct WorkspaceRegistry<'a> {
    config: &'a Config,
    fs: Fs,
}

impl<'a> WorkspaceRegistry<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, fs: Fs::new() }
    }

    pub fn create(&self, name: impl Into<String>, metadata: HashMap<String, serde_json::Value>) -> Result<Workspace, OrcaError> {
        let name = name.into();
        if self.list().iter().any(|w| w.name == name) {
            return Err(OrcaError::conflict(format!("workspace name {name:?} already in use")));
        }
        let workspace = Workspace { workspace_id: generate_workspace_id(), name, created_at: Utc::now(), metadata };
        self.persist(&workspace)?;
        Ok(workspace)
    }

    pub fn get(&self, workspace_id: &str) -> Option<Workspace> {
        let path = self.config.workspace_dir(workspace_id).join("workspace.json");
        let contents = self.fs.read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn list(&self) -> Vec<Workspace> {
        let dir = self.config.workspaces_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut workspaces: Vec<Workspace> = entries
            .flatten()
            .filter_map(|entry| self.get(entry.file_name().to_str()?))
            .collect();
        workspaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        workspaces
    }

    pub fn update_metadata(&self, workspace_id: &str, metadata: HashMap<String, serde_json::Value>) -> Result<Workspace, OrcaError> {
        let mut workspace = self
            .get(workspace_id)
            .ok_or_else(|| OrcaError::not_found(format!("workspace {workspace_id:?} not found")))?;
        workspace.metadata.extend(metadata);
        self.persist(&workspace)?;
        Ok(workspace)
    }

    pub fn delete(&self, workspace_id: &str) -> bool {
        self.fs.remove_dir_all(self.config.workspace_dir(workspace_id)).is_ok()
    }

    fn persist(&self, workspace: &Workspace) -> Result<(), OrcaError> {
        let path = self.config.workspace_dir(&workspace.workspace_id).join("workspace.json");
        let body = serde_json::to_vec_pretty(workspace).map_err(|e| OrcaError::new(ErrorKind::PersistenceFailed, e.to_string()))?;
        self.fs.write_atomic(path, &body).map_err(|e| OrcaError::new(ErrorKind::PersistenceFailed, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let registry = WorkspaceRegistry::new(&config);

        let created = registry.create("team-a", HashMap::new()).unwrap();
        let fetched = registry.get(&created.workspace_id).unwrap();
        assert_eq!(fetched.name, "team-a");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let registry = WorkspaceRegistry::new(&config);

        registry.create("team-a", HashMap::new()).unwrap();
        let err = registry.create("team-a", HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn list_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let registry = WorkspaceRegistry::new(&config);

        registry.create("first", HashMap::new()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.create("second", HashMap::new()).unwrap();

        let listed = registry.list();
        assert_eq!(listed[0].name, "second");
    }

    #[test]
    fn delete_removes_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let registry = WorkspaceRegistry::new(&config);

        let created = registry.create("gone", HashMap::new()).unwrap();
        assert!(registry.delete(&created.workspace_id));
        assert!(registry.get(&created.workspace_id).is_none());
    }
}
