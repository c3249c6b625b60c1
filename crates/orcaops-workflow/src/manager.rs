//! The Workflow Manager: the same in-memory lifecycle shape as
//! `orcaops_job::JobManager`, one level up — owns `{workflow_id ->
//! WorkflowEntry}`, spawns a `WorkflowRunner::run` per submission, and
//! persists the finished record.

use crate::runner::WorkflowRunner;
use chrono::Utc;
use orcaops_base::{WorkflowRecord, WorkflowSpec, WorkflowStatus};
use orcaops_job::{CancelSignal, JobManager};
use orcaops_runtime::RuntimeAdapter;
use orcaops_util::{Config, Fs};
use slog::{error, info, o, Logger};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

const DEFAULT_MAX_COMPLETED_IN_MEMORY: usize = 100;
const DEFAULT_MAX_PARALLEL: usize = 4;

#[derive(Debug, PartialEq)]
pub enum SubmitError {
    DuplicateWorkflowId,
    Invalid(String),
}

struct WorkflowEntry {
    record: Arc<AsyncMutex<WorkflowRecord>>,
    cancel: CancelSignal,
    worker: JoinHandle<()>,
}

struct Inner {
    entries: Mutex<HashMap<String, WorkflowEntry>>,
    completed_order: Mutex<VecDeque<String>>,
}

/// Cheap to clone, same idiom as `JobManager`: every field is an `Arc`, so a
/// clone is another handle onto the same state.
#[derive(Clone)]
pub struct WorkflowManager {
    inner: Arc<Inner>,
    job_manager: Arc<JobManager>,
    runtime: Arc<dyn RuntimeAdapter>,
    config: Arc<Config>,
    logger: Logger,
    max_completed_in_memory: usize,
    max_parallel: usize,
}

impl WorkflowManager {
    pub fn new(job_manager: Arc<JobManager>, runtime: Arc<dyn RuntimeAdapter>, config: Arc<Config>, logger: Logger) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                completed_order: Mutex::new(VecDeque::new()),
            }),
            job_manager,
            runtime,
            config,
            logger,
            max_completed_in_memory: DEFAULT_MAX_COMPLETED_IN_MEMORY,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    pub fn with_max_completed_in_memory(mut self, max: usize) -> Self {
        self.max_completed_in_memory = max;
        self
    }

    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max;
        self
    }

    pub async fn submit(&self, workflow_id: String, spec: WorkflowSpec, triggered_by: Option<String>) -> Result<WorkflowRecord, SubmitError> {
        crate::schema::validate(&spec).map_err(|e| SubmitError::Invalid(e.to_string()))?;

        let mut initial = WorkflowRecord::new(workflow_id.clone(), spec.name.clone(), Utc::now());
        initial.status = WorkflowStatus::Running;
        let snapshot = initial.clone();
        let record = Arc::new(AsyncMutex::new(initial));
        let cancel = CancelSignal::new();

        {
            let mut entries = self.inner.entries.lock().unwrap();
            if entries.contains_key(&workflow_id) {
                return Err(SubmitError::DuplicateWorkflowId);
            }
            let worker = self.spawn_worker(workflow_id.clone(), spec, record.clone(), cancel.clone(), triggered_by);
            entries.insert(workflow_id, WorkflowEntry { record, cancel, worker });
        }

        Ok(snapshot)
    }

    fn spawn_worker(
        &self,
        workflow_id: String,
        spec: WorkflowSpec,
        record: Arc<AsyncMutex<WorkflowRecord>>,
        cancel: CancelSignal,
        triggered_by: Option<String>,
    ) -> JoinHandle<()> {
        let job_manager = self.job_manager.clone();
        let runtime = self.runtime.clone();
        let config = self.config.clone();
        let logger = self.logger.new(o!("workflow_id" => workflow_id.clone()));
        let inner = self.inner.clone();
        let max_completed_in_memory = self.max_completed_in_memory;
        let max_parallel = self.max_parallel;

        tokio::spawn(async move {
            if cancel.is_cancelled() {
                let mut guard = record.lock().await;
                guard.status = WorkflowStatus::Cancelled;
                guard.finished_at = Some(Utc::now());
                drop(guard);
                Self::retire(&inner, &workflow_id, max_completed_in_memory);
                return;
            }

            let runner = WorkflowRunner::new(job_manager, runtime, logger.clone(), max_parallel);
            let finished = runner.run(&spec, &workflow_id, &cancel, triggered_by).await;

            if let Err(e) = persist(&config, &finished) {
                error!(logger, "failed to persist workflow record"; "error" => %e);
            }

            *record.lock().await = finished;
            info!(logger, "workflow worker retiring");
            Self::retire(&inner, &workflow_id, max_completed_in_memory);
        })
    }

    fn retire(inner: &Arc<Inner>, workflow_id: &str, max_completed_in_memory: usize) {
        let mut order = inner.completed_order.lock().unwrap();
        order.push_back(workflow_id.to_string());
        while order.len() > max_completed_in_memory {
            if let Some(evict_id) = order.pop_front() {
                inner.entries.lock().unwrap().remove(&evict_id);
            }
        }
    }

    pub async fn get(&self, workflow_id: &str) -> Option<WorkflowRecord> {
        let entry_record = {
            let entries = self.inner.entries.lock().unwrap();
            entries.get(workflow_id).map(|e| e.record.clone())
        };
        if let Some(record) = entry_record {
            return Some(record.lock().await.clone());
        }
        load_persisted(&self.config, workflow_id)
    }

    pub async fn list_in_memory(&self) -> Vec<WorkflowRecord> {
        let records: Vec<_> = {
            let entries = self.inner.entries.lock().unwrap();
            entries.values().map(|e| e.record.clone()).collect()
        };
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(record.lock().await.clone());
        }
        out
    }

    pub async fn cancel(&self, workflow_id: &str) -> Option<WorkflowRecord> {
        let entry_record = {
            let entries = self.inner.entries.lock().unwrap();
            let entry = entries.get(workflow_id)?;
            entry.cancel.cancel();
            entry.record.clone()
        };
        Some(entry_record.lock().await.clone())
    }

    pub async fn shutdown(&self, timeout: Duration) {
        let handles: Vec<_> = {
            let mut entries = self.inner.entries.lock().unwrap();
            for entry in entries.values() {
                entry.cancel.cancel();
            }
            entries.drain().map(|(_, e)| e.worker).collect()
        };
        let _ = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
    }
}

fn persist(config: &Config, record: &WorkflowRecord) -> anyhow::Result<()> {
    let fs = Fs::new();
    let dir = config.workflow_dir(&record.workflow_id);
    let body = serde_json::to_vec_pretty(record)?;
    fs.write_atomic(dir.join("run.json"), &body)
}

fn load_persisted(config: &Config, workflow_id: &str) -> Option<WorkflowRecord> {
    let path = config.workflow_dir(workflow_id).join("run.json");
    let body = std::fs::read(path).ok()?;
    serde_json::from_slice(&body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_runtime::LocalRuntime;
    use orcaops_util::logging::discard_logger;
    use std::collections::HashMap as Map;

    fn manager(dir: &std::path::Path) -> WorkflowManager {
        let config = Arc::new(Config::with_root(dir));
        let job_manager = Arc::new(JobManager::new(Arc::new(LocalRuntime::new()), config.clone(), discard_logger()));
        WorkflowManager::new(job_manager, Arc::new(LocalRuntime::new()), config, discard_logger())
    }

    fn simple_spec() -> WorkflowSpec {
        let mut jobs = Map::new();
        jobs.insert(
            "build".to_string(),
            orcaops_base::WorkflowJob { image: "alpine:3".into(), commands: vec![orcaops_base::CommandSpec::new("echo hi")], ..Default::default() },
        );
        WorkflowSpec { name: "wf".into(), jobs, ..Default::default() }
    }

    #[tokio::test]
    async fn submit_then_get_reaches_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.submit("wf1".into(), simple_spec(), None).await.unwrap();

        let mut record = manager.get("wf1").await.unwrap();
        for _ in 0..100 {
            if record.status != WorkflowStatus::Running && record.status != WorkflowStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            record = manager.get("wf1").await.unwrap();
        }
        assert_eq!(record.status, WorkflowStatus::Success);
    }

    #[tokio::test]
    async fn duplicate_workflow_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.submit("dup".into(), simple_spec(), None).await.unwrap();
        let err = manager.submit("dup".into(), simple_spec(), None).await.unwrap_err();
        assert_eq!(err, SubmitError::DuplicateWorkflowId);
    }

    #[tokio::test]
    async fn cancel_unknown_workflow_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(manager.cancel("nope").await.is_none());
    }
}
