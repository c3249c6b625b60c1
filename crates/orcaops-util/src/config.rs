//! Process-wide tunables resolved at composition-root construction time, not
//! read ad hoc from the environment throughout the codebase (§9 "Global
//! singletons": construct once, pass explicitly).

use std::env;
use std::path::PathBuf;

fn env_root() -> Option<PathBuf> {
    env::var_os("ORCAOPS_ROOT").map(PathBuf::from)
}

fn default_root() -> PathBuf {
    env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".orcaops"))
        .unwrap_or_else(|| PathBuf::from(".orcaops"))
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Root of the persisted filesystem layout (§6): defaults to
    /// `~/.orcaops`, overridable by `ORCAOPS_ROOT`.
    pub root: PathBuf,
    /// Terminal entries retained in the Job Manager's in-memory map before
    /// eviction (§4.3, default 100).
    pub max_completed_in_memory: u32,
    /// Bounded worker-pool width for parallel sibling jobs in a workflow
    /// level (§4.5, default 4).
    pub max_parallel: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: env_root().unwrap_or_else(default_root),
            max_completed_in_memory: env_u32("ORCAOPS_MAX_COMPLETED_IN_MEMORY", 100),
            max_parallel: env_u32("ORCAOPS_MAX_PARALLEL", 4),
            log_level: env::var("ORCAOPS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Config {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.artifacts_dir().join(job_id)
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    pub fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        self.workflows_dir().join(workflow_id)
    }

    pub fn baselines_path(&self) -> PathBuf {
        self.root.join("baselines.json")
    }

    pub fn anomalies_dir(&self) -> PathBuf {
        self.root.join("anomalies")
    }

    pub fn recommendations_dir(&self) -> PathBuf {
        self.root.join("recommendations")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    pub fn workspace_dir(&self, workspace_id: &str) -> PathBuf {
        self.workspaces_dir().join(workspace_id)
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn failure_patterns_path(&self) -> PathBuf {
        self.root.join("failure_patterns.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_spec_paths() {
        let cfg = Config::with_root("/tmp/root");
        assert_eq!(cfg.job_dir("j1"), PathBuf::from("/tmp/root/artifacts/j1"));
        assert_eq!(cfg.workflow_dir("wf1"), PathBuf::from("/tmp/root/workflows/wf1"));
        assert_eq!(cfg.baselines_path(), PathBuf::from("/tmp/root/baselines.json"));
    }
}
