//! The Workflow Runner (§4.5): drives a validated `WorkflowSpec` level by
//! level, delegating each job to the Job Manager and polling it to
//! completion.

use crate::condition::{self, EvalContext};
use crate::dag::get_levels;
use crate::schema::expand_matrix;
use crate::service_manager::{start_services, stop_services};
use chrono::Utc;
use orcaops_base::{
    JobContext, JobSpec, JobStatus, OnComplete, SandboxSpec, WorkflowJob, WorkflowJobStatus, WorkflowRecord, WorkflowSpec,
};
use orcaops_job::{CancelSignal, JobManager};
use orcaops_runtime::RuntimeAdapter;
use regex::Regex;
use slog::{info, o, warn, Logger};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEADLINE_SLACK: Duration = Duration::from_secs(30);
const DEFAULT_JOB_TIMEOUT_SECONDS: u64 = 3600;

fn matrix_interp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{\s*matrix\.(\w+)\s*\}\}").unwrap())
}

fn interpolate_matrix(image: &str, vars: &HashMap<String, String>) -> String {
    matrix_interp_re()
        .replace_all(image, |caps: &regex::Captures| vars.get(&caps[1]).cloned().unwrap_or_default())
        .into_owned()
}

fn sanitize_job_id(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    if out.is_empty() || !out.chars().next().unwrap().is_ascii_alphanumeric() {
        out = format!("j{out}");
    }
    out.truncate(128);
    out
}

struct Task {
    job_name: String,
    job_id: String,
    job: WorkflowJob,
    matrix_vars: HashMap<String, String>,
}

pub struct WorkflowRunner {
    job_manager: Arc<JobManager>,
    runtime: Arc<dyn RuntimeAdapter>,
    logger: Logger,
    max_parallel: usize,
}

impl WorkflowRunner {
    pub fn new(job_manager: Arc<JobManager>, runtime: Arc<dyn RuntimeAdapter>, logger: Logger, max_parallel: usize) -> Self {
        Self { job_manager, runtime, logger, max_parallel }
    }

    pub async fn run(
        &self,
        spec: &WorkflowSpec,
        workflow_id: &str,
        cancel: &CancelSignal,
        triggered_by: Option<String>,
    ) -> WorkflowRecord {
        let logger = self.logger.new(o!("workflow_id" => workflow_id.to_string()));
        let now = Utc::now();
        let mut record = WorkflowRecord::new(workflow_id, spec.name.clone(), now);
        record.started_at = Some(now);
        record.env = spec.env.clone();
        record.triggered_by = triggered_by;

        let levels = match get_levels(spec) {
            Ok(levels) => levels,
            Err(e) => {
                record.status = orcaops_base::WorkflowStatus::Failed;
                record.error = Some(e.to_string());
                record.finished_at = Some(Utc::now());
                return record;
            }
        };

        let workflow_name = spec.name.clone();
        let tasks_by_level = self.build_tasks(spec, workflow_id, &levels);
        for level_tasks in &tasks_by_level {
            for task in level_tasks {
                record.job_statuses.insert(task.job_id.clone(), WorkflowJobStatus::queued());
            }
        }

        'levels: for level_tasks in &tasks_by_level {
            if cancel.is_cancelled() {
                self.cancel_remaining(&mut record, &tasks_by_level, "workflow cancelled");
                break;
            }

            let mut scheduled = Vec::new();
            for task in level_tasks {
                if self.should_run(task, &record) {
                    scheduled.push(task);
                } else {
                    self.mark(&mut record, &task.job_id, JobStatus::Cancelled, Some("condition not met".to_string()));
                }
            }

            let results = self.run_level(scheduled, spec, workflow_id, &workflow_name, cancel).await;
            for (job_id, status, error) in results {
                self.mark(&mut record, &job_id, status, error);
            }

            let level_has_success_gated_failure = level_tasks.iter().any(|task| {
                task.job.on_complete == OnComplete::Success
                    && matches!(record.job_statuses.get(&task.job_id).map(|s| s.status), Some(JobStatus::Failed) | Some(JobStatus::TimedOut))
            });

            if level_has_success_gated_failure {
                let any_retainable_later = tasks_by_level
                    .iter()
                    .skip_while(|lvl| !std::ptr::eq(*lvl, level_tasks))
                    .skip(1)
                    .flatten()
                    .any(|task| task.job.on_complete != OnComplete::Success);
                if !any_retainable_later {
                    self.cancel_remaining(&mut record, &tasks_by_level, "upstream failure");
                    break 'levels;
                }
            }
        }

        record.status = record.derive_final_status();
        record.finished_at = Some(Utc::now());
        info!(logger, "workflow finished"; "status" => %record.status);
        record
    }

    fn build_tasks(&self, spec: &WorkflowSpec, workflow_id: &str, levels: &[Vec<String>]) -> Vec<Vec<Task>> {
        levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .flat_map(|job_name| {
                        let job = spec.jobs[job_name].clone();
                        match &job.matrix {
                            None => {
                                let job_id = sanitize_job_id(&format!("wf-{workflow_id}-{job_name}"));
                                vec![Task { job_name: job_name.clone(), job_id, job, matrix_vars: HashMap::new() }]
                            }
                            Some(matrix) => expand_matrix(matrix)
                                .into_iter()
                                .map(|combo| {
                                    let job_id = sanitize_job_id(&format!("wf-{workflow_id}-{job_name}-{}", combo.suffix));
                                    Task { job_name: job_name.clone(), job_id, job: job.clone(), matrix_vars: combo.vars }
                                })
                                .collect(),
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn should_run(&self, task: &Task, record: &WorkflowRecord) -> bool {
        let job_statuses: HashMap<String, String> = record
            .job_statuses
            .iter()
            .map(|(k, v)| (k.clone(), v.status.to_string()))
            .collect();
        // `requires` names are job *names*, not expanded task ids; a matrix
        // job's deps are matched by checking every task derived from it.
        let dep_status = |dep_name: &str| -> Vec<JobStatus> {
            record
                .job_statuses
                .iter()
                .filter(|(id, _)| id.as_str() == dep_name.as_str() || id.starts_with(&format!("wf-{dep_name}-")) || *id == dep_name)
                .map(|(_, s)| s.status)
                .collect()
        };

        let condition_ok = match &task.job.if_condition {
            None => true,
            Some(raw) => condition::parse(raw)
                .map(|expr| expr.eval(&EvalContext { job_statuses: &job_statuses, env: &record.env }))
                .unwrap_or(false),
        };

        match task.job.on_complete {
            OnComplete::Always => condition_ok,
            OnComplete::Failure => {
                condition_ok
                    && task
                        .job
                        .requires
                        .iter()
                        .any(|dep| dep_status(dep).iter().any(|s| matches!(s, JobStatus::Failed | JobStatus::TimedOut)))
            }
            OnComplete::Success => {
                condition_ok
                    && task.job.requires.iter().all(|dep| {
                        let statuses = dep_status(dep);
                        !statuses.is_empty() && statuses.iter().all(|s| *s == JobStatus::Success)
                    })
            }
        }
    }

    async fn run_level(
        &self,
        tasks: Vec<&Task>,
        spec: &WorkflowSpec,
        workflow_id: &str,
        workflow_name: &str,
        cancel: &CancelSignal,
    ) -> Vec<(String, JobStatus, Option<String>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel.max(1)));
        let mut handles = Vec::new();

        for task in tasks {
            let permit = semaphore.clone();
            let job_manager = self.job_manager.clone();
            let runtime = self.runtime.clone();
            let logger = self.logger.clone();
            let cancel = cancel.clone();
            let image = interpolate_matrix(&task.job.image, &task.matrix_vars);
            let job_id = task.job_id.clone();
            let job_name = task.job_name.clone();
            let job = task.job.clone();
            let matrix_vars = task.matrix_vars.clone();
            let workflow_env = spec.env.clone();
            let workflow_id = workflow_id.to_string();
            let workflow_name = workflow_name.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                run_one_task(
                    job_manager.as_ref(),
                    runtime.as_ref(),
                    &logger,
                    &cancel,
                    job_id,
                    job_name,
                    image,
                    job,
                    matrix_vars,
                    workflow_env,
                    workflow_id,
                    workflow_name,
                )
                .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(_) => continue,
            }
        }
        results
    }

    fn mark(&self, record: &mut WorkflowRecord, job_id: &str, status: JobStatus, error: Option<String>) {
        if let Some(entry) = record.job_statuses.get_mut(job_id) {
            entry.status = status;
            entry.error = error;
            entry.finished_at = Some(Utc::now());
        }
    }

    fn cancel_remaining(&self, record: &mut WorkflowRecord, tasks_by_level: &[Vec<Task>], reason: &str) {
        for level in tasks_by_level {
            for task in level {
                if let Some(entry) = record.job_statuses.get_mut(&task.job_id) {
                    if entry.status == JobStatus::Queued {
                        entry.status = JobStatus::Cancelled;
                        entry.error = Some(reason.to_string());
                        entry.finished_at = Some(Utc::now());
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one_task(
    job_manager: &JobManager,
    runtime: &dyn RuntimeAdapter,
    logger: &Logger,
    cancel: &CancelSignal,
    job_id: String,
    job_name: String,
    image: String,
    job: WorkflowJob,
    matrix_vars: HashMap<String, String>,
    workflow_env: HashMap<String, String>,
    workflow_id: String,
    workflow_name: String,
) -> (String, JobStatus, Option<String>) {
    let started = if job.services.is_empty() {
        None
    } else {
        match start_services(runtime, &job.services, &workflow_id).await {
            Ok(started) => Some(started),
            Err(e) => {
                warn!(logger, "service startup failed"; "job" => %job_name, "error" => %e);
                return (job_id, JobStatus::Failed, Some(e.to_string()));
            }
        }
    };

    let mut env = workflow_env;
    env.extend(job.env.clone());
    if let Some(started) = &started {
        env.extend(started.env_vars.clone());
    }
    env.extend(matrix_vars);

    let timeout_seconds = job.timeout.unwrap_or(DEFAULT_JOB_TIMEOUT_SECONDS);
    let ttl_seconds = (timeout_seconds.clamp(
        orcaops_base::validation::MIN_TTL_SECONDS as u64,
        orcaops_base::validation::MAX_TTL_SECONDS as u64,
    )) as u32;

    let job_spec = JobSpec {
        job_id: job_id.clone(),
        sandbox: SandboxSpec { image, env, resources: serde_json::Value::Null, network_name: None, labels: HashMap::new() },
        commands: job.commands.clone(),
        artifacts: job.artifacts.clone(),
        ttl_seconds,
        context: JobContext {
            triggered_by: Some("workflow".to_string()),
            intent: None,
            parent_job_id: Some(workflow_id.clone()),
            tags: vec!["workflow".to_string(), workflow_name.clone(), job_name.clone()],
            metadata: HashMap::new(),
        },
    };

    let outcome = if let Err(e) = job_manager.submit(job_spec).await {
        (JobStatus::Failed, Some(format!("{e:?}")))
    } else {
        poll_to_terminal(job_manager, &job_id, cancel, Duration::from_secs(timeout_seconds) + DEADLINE_SLACK).await
    };

    if let Some(started) = started {
        let network_name = format!("orcaops-wf-{workflow_id}");
        stop_services(runtime, &started.container_ids, &network_name).await;
    }

    (job_id, outcome.0, outcome.1)
}

async fn poll_to_terminal(job_manager: &JobManager, job_id: &str, cancel: &CancelSignal, deadline: Duration) -> (JobStatus, Option<String>) {
    let start = tokio::time::Instant::now();
    loop {
        if cancel.is_cancelled() {
            job_manager.cancel(job_id).await;
            return (JobStatus::Cancelled, Some("workflow cancelled".to_string()));
        }
        match job_manager.get(job_id).await {
            Some(record) if record.status.is_terminal() => return (record.status, record.error),
            _ => {}
        }
        if start.elapsed() >= deadline {
            job_manager.cancel(job_id).await;
            return (JobStatus::TimedOut, Some("workflow-level deadline elapsed".to_string()));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_disallowed_characters() {
        assert_eq!(sanitize_job_id("wf-abc-job-python=3.10,os=mac"), "wf-abc-job-python-3-10-os-mac");
    }

    #[test]
    fn interpolates_matrix_variable_in_image() {
        let mut vars = HashMap::new();
        vars.insert("python".to_string(), "3.11".to_string());
        assert_eq!(interpolate_matrix("python:${{ matrix.python }}", &vars), "python:3.11");
    }
}
