//! Agent session lifecycle: one file per session under `sessions/<id>.json`
//! (§6). `AgentSession` carries no status enum, so "idle"/"expired" is a
//! derived property of `last_active_at` rather than stored state — ending or
//! expiring a session simply removes its file.

use chrono::{DateTime, Duration, Utc};
use orcaops_base::{AgentSession, ErrorKind, OrcaError};
use orcaops_util::{Config, Fs};
use rand::RngCore;

fn generate_session_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sess_{}", hex::encode(bytes))
}

pub struct SessionManager<'a> {
    config: &'a Config,
    fs: Fs,
}

impl<'a> SessionManager<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, fs: Fs::new() }
    }

    pub fn create_session(&self, workspace_id: &str) -> Result<AgentSession, OrcaError> {
        let now = Utc::now();
        let session = AgentSession {
            session_id: generate_session_id(),
            workspace_id: workspace_id.to_string(),
            created_at: now,
            last_active_at: now,
            job_ids: Vec::new(),
        };
        self.persist(&session)?;
        Ok(session)
    }

    /// Bumps `last_active_at`. Returns `None` if the session no longer exists.
    pub fn touch(&self, session_id: &str) -> Option<AgentSession> {
        let mut session = self.get(session_id)?;
        session.last_active_at = Utc::now();
        self.persist(&session).ok()?;
        Some(session)
    }

    pub fn track_job(&self, session_id: &str, job_id: &str) -> bool {
        let Some(mut session) = self.get(session_id) else {
            return false;
        };
        session.job_ids.push(job_id.to_string());
        self.persist(&session).is_ok()
    }

    pub fn get(&self, session_id: &str) -> Option<AgentSession> {
        let path = self.path(session_id);
        let contents = self.fs.read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn list(&self, workspace_id: Option<&str>) -> Vec<AgentSession> {
        let dir = self.config.sessions_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut sessions: Vec<AgentSession> = entries
            .flatten()
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| {
                let contents = self.fs.read_to_string(entry.path()).ok()?;
                serde_json::from_str::<AgentSession>(&contents).ok()
            })
            .filter(|s| workspace_id.is_none_or(|want| s.workspace_id == want))
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Explicit end: removes the session file. Idempotent.
    pub fn end_session(&self, session_id: &str) -> bool {
        let path = self.path(session_id);
        match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(_) => false,
        }
    }

    /// Deletes every session idle longer than `idle_timeout`. Returns the
    /// count removed.
    pub fn expire_idle(&self, idle_timeout: Duration, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for session in self.list(None) {
            if now - session.last_active_at > idle_timeout && self.end_session(&session.session_id) {
                expired += 1;
            }
        }
        expired
    }

    fn path(&self, session_id: &str) -> std::path::PathBuf {
        self.config.sessions_dir().join(format!("{session_id}.json"))
    }

    fn persist(&self, session: &AgentSession) -> Result<(), OrcaError> {
        let body = serde_json::to_vec_pretty(session).map_err(|e| OrcaError::new(ErrorKind::PersistenceFailed, e.to_string()))?;
        self.fs.write_atomic(self.path(&session.session_id), &body).map_err(|e| OrcaError::new(ErrorKind::PersistenceFailed, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = SessionManager::new(&config);

        let created = manager.create_session("ws1").unwrap();
        let fetched = manager.get(&created.session_id).unwrap();
        assert_eq!(fetched.workspace_id, "ws1");
        assert!(fetched.job_ids.is_empty());
    }

    #[test]
    fn track_job_appends() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = SessionManager::new(&config);

        let created = manager.create_session("ws1").unwrap();
        assert!(manager.track_job(&created.session_id, "job-1"));
        let fetched = manager.get(&created.session_id).unwrap();
        assert_eq!(fetched.job_ids, vec!["job-1".to_string()]);
    }

    #[test]
    fn end_session_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = SessionManager::new(&config);

        let created = manager.create_session("ws1").unwrap();
        assert!(manager.end_session(&created.session_id));
        assert!(manager.get(&created.session_id).is_none());
    }

    #[test]
    fn expire_idle_removes_stale_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = SessionManager::new(&config);

        let created = manager.create_session("ws1").unwrap();
        let removed = manager.expire_idle(Duration::seconds(0), created.last_active_at + Duration::hours(1));
        assert_eq!(removed, 1);
        assert!(manager.get(&created.session_id).is_none());
    }
}
