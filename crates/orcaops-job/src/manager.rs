//! The Job Manager (§4.3): owns the in-memory `{job_id -> JobEntry}` map,
//! spawns a worker task per submission, and evicts terminal entries once the
//! in-memory cap is exceeded.

use crate::cancel::CancelSignal;
use crate::persistence::persist;
use crate::runner::JobRunner;
use chrono::Utc;
use orcaops_base::{JobSpec, JobStatus, RunRecord};
use orcaops_observability::RunStore;
use orcaops_runtime::RuntimeAdapter;
use orcaops_util::Config;
use slog::{error, info, o, Logger};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

const DEFAULT_MAX_COMPLETED_IN_MEMORY: usize = 100;

struct JobEntry {
    record: Arc<AsyncMutex<RunRecord>>,
    cancel: CancelSignal,
    worker: JoinHandle<()>,
}

struct Inner {
    entries: Mutex<std::collections::HashMap<String, JobEntry>>,
    /// FIFO of terminal job ids still resident, oldest first, for eviction.
    completed_order: Mutex<VecDeque<String>>,
}

/// Concurrency-safe lifecycle manager for single-container jobs (§4.3).
/// Cheap to clone: every field is an `Arc`, so cloning hands out another
/// handle onto the same in-memory state — the idiom `maelstrom-broker` uses
/// for its scheduler handle.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
    runtime: Arc<dyn RuntimeAdapter>,
    config: Arc<Config>,
    logger: Logger,
    max_completed_in_memory: usize,
}

#[derive(Debug, PartialEq)]
pub enum SubmitError {
    DuplicateJobId,
    Invalid(String),
}

impl JobManager {
    pub fn new(runtime: Arc<dyn RuntimeAdapter>, config: Arc<Config>, logger: Logger) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(std::collections::HashMap::new()),
                completed_order: Mutex::new(VecDeque::new()),
            }),
            runtime,
            config,
            logger,
            max_completed_in_memory: DEFAULT_MAX_COMPLETED_IN_MEMORY,
        }
    }

    pub fn with_max_completed_in_memory(mut self, max: usize) -> Self {
        self.max_completed_in_memory = max;
        self
    }

    pub async fn submit(&self, spec: JobSpec) -> Result<RunRecord, SubmitError> {
        spec.validate().map_err(|e| SubmitError::Invalid(e.to_string()))?;

        let initial = RunRecord::new(spec.job_id.clone(), orcaops_base::fingerprint::fingerprint(&spec), Utc::now());
        let snapshot = initial.clone();
        let record = Arc::new(AsyncMutex::new(initial));
        let cancel = CancelSignal::new();

        {
            let mut entries = self.inner.entries.lock().unwrap();
            if entries.contains_key(&spec.job_id) {
                return Err(SubmitError::DuplicateJobId);
            }
            let worker = self.spawn_worker(spec, record.clone(), cancel.clone());
            entries.insert(
                snapshot.job_id.clone(),
                JobEntry { record, cancel, worker },
            );
        }

        Ok(snapshot)
    }

    fn spawn_worker(&self, spec: JobSpec, record: Arc<AsyncMutex<RunRecord>>, cancel: CancelSignal) -> JoinHandle<()> {
        let runtime = self.runtime.clone();
        let config = self.config.clone();
        let logger = self.logger.new(o!("job_id" => spec.job_id.clone()));
        let inner = self.inner.clone();
        let job_id = spec.job_id.clone();
        let max_completed_in_memory = self.max_completed_in_memory;

        tokio::spawn(async move {
            if cancel.is_cancelled() {
                let mut guard = record.lock().await;
                guard.status = JobStatus::Cancelled;
                guard.finished_at = Some(Utc::now());
                drop(guard);
                Self::retire(&inner, &job_id, max_completed_in_memory);
                return;
            }

            {
                let mut guard = record.lock().await;
                guard.status = JobStatus::Running;
                guard.started_at = Some(Utc::now());
            }

            let artifacts_dir = config.job_dir(&spec.job_id);
            let runner = JobRunner::new(runtime, logger.clone());
            let finished = runner.run(&spec, &artifacts_dir, &cancel).await;

            if let Err(e) = persist(&config, &spec, &finished) {
                error!(logger, "failed to persist run record"; "error" => %e);
            }

            *record.lock().await = finished;
            info!(logger, "worker retiring job");
            Self::retire(&inner, &job_id, max_completed_in_memory);
        })
    }

    fn retire(inner: &Arc<Inner>, job_id: &str, max_completed_in_memory: usize) {
        let mut order = inner.completed_order.lock().unwrap();
        order.push_back(job_id.to_string());
        while order.len() > max_completed_in_memory {
            if let Some(evict_id) = order.pop_front() {
                inner.entries.lock().unwrap().remove(&evict_id);
            }
        }
    }

    /// Returns a snapshot from memory if resident, else falls back to the
    /// Run Store's on-disk copy.
    pub async fn get(&self, job_id: &str) -> Option<RunRecord> {
        let entry_record = {
            let entries = self.inner.entries.lock().unwrap();
            entries.get(job_id).map(|e| e.record.clone())
        };
        if let Some(record) = entry_record {
            return Some(record.lock().await.clone());
        }
        let run_store = RunStore::new(&self.config);
        run_store.get(job_id)
    }

    /// Snapshots every record currently resident in memory; combining with
    /// historical data is the caller's responsibility (§4.3).
    pub async fn list_in_memory(&self) -> Vec<RunRecord> {
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

    /// Sets the entry's cancel signal. A still-queued job never gets as far
    /// as the runner; the worker notices the flag and marks it cancelled
    /// itself. Returns `(cancelled, snapshot)`.
    pub async fn cancel(&self, job_id: &str) -> Option<(bool, RunRecord)> {
        let entry_record = {
            let entries = self.inner.entries.lock().unwrap();
            let entry = entries.get(job_id)?;
            entry.cancel.cancel();
            entry.record.clone()
        };
        let snapshot = entry_record.lock().await.clone();
        Some((true, snapshot))
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

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_base::{CommandSpec, JobContext, SandboxSpec};
    use orcaops_runtime::LocalRuntime;
    use orcaops_util::logging::discard_logger;

    fn manager(dir: &std::path::Path) -> JobManager {
        JobManager::new(
            Arc::new(LocalRuntime::new()),
            Arc::new(Config::with_root(dir)),
            discard_logger(),
        )
    }

    fn spec(job_id: &str, command: &str) -> JobSpec {
        JobSpec {
            job_id: job_id.into(),
            sandbox: SandboxSpec { image: "alpine:3".into(), ..Default::default() },
            commands: vec![CommandSpec::new(command)],
            artifacts: vec![],
            ttl_seconds: 60,
            context: JobContext::default(),
        }
    }

    #[tokio::test]
    async fn submit_then_get_reaches_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let snapshot = manager.submit(spec("j1", "echo hi")).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Queued);

        let mut record = manager.get("j1").await.unwrap();
        for _ in 0..50 {
            if record.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            record = manager.get("j1").await.unwrap();
        }
        assert_eq!(record.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn duplicate_job_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.submit(spec("dup", "echo one")).await.unwrap();
        let err = manager.submit(spec("dup", "echo two")).await.unwrap_err();
        assert_eq!(err, SubmitError::DuplicateJobId);
    }

    #[tokio::test]
    async fn cancel_unknown_job_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(manager.cancel("nope").await.is_none());
    }

    #[tokio::test]
    async fn get_falls_back_to_run_store_after_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path()).with_max_completed_in_memory(0);
        manager.submit(spec("evicted", "echo hi")).await.unwrap();
        for _ in 0..50 {
            if manager.inner.entries.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let record = manager.get("evicted").await.unwrap();
        assert_eq!(record.status, JobStatus::Success);
    }
}
