//! The Job Runner (§4.2): drives one `JobSpec` through a freshly provisioned
//! sandbox container. The hardest subsystem in the workspace — every step is
//! grounded directly in the component design's numbered sequence.

use crate::artifacts::collect_artifacts;
use crate::cancel::CancelSignal;
use crate::env_capture::capture_environment;
use crate::resource_usage::from_stats;
use crate::stream::{read_to_deadline, StepOutcome};
use chrono::Utc;
use orcaops_base::fingerprint::fingerprint;
use orcaops_base::{CleanupStatus, JobSpec, JobStatus, ResourceUsage, RunRecord, StepResult, SANDBOX_LOST_EXIT_CODE, TIMEOUT_EXIT_CODE};
use orcaops_observability::LogAnalyzer;
use orcaops_runtime::{labels, RunOpts, RuntimeAdapter};
use slog::{debug, info, o, warn, Logger};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Command used to keep the sandbox alive between `Run` and the first
/// `Exec` (§4.2 step 2: "command=sleep-forever").
const SLEEP_FOREVER: &[&str] = &["sleep", "infinity"];

pub struct JobRunner {
    runtime: Arc<dyn RuntimeAdapter>,
    logger: Logger,
}

impl JobRunner {
    pub fn new(runtime: Arc<dyn RuntimeAdapter>, logger: Logger) -> Self {
        Self { runtime, logger }
    }

    /// Drives `spec` to completion, writing into `artifacts_dir` (the
    /// caller-computed `<root>/<job_id>/`). Never returns an `Err` — every
    /// failure mode is captured as a terminal `RunRecord`.
    pub async fn run(&self, spec: &JobSpec, artifacts_dir: &Path, cancel: &CancelSignal) -> RunRecord {
        let logger = self.logger.new(o!("job_id" => spec.job_id.clone()));
        let now = Utc::now();
        let mut record = RunRecord::new(spec.job_id.clone(), fingerprint(spec), now);
        record.status = JobStatus::Running;
        record.started_at = Some(now);
        record.image_ref = Some(spec.sandbox.image.clone());

        // Step 2: provision sandbox.
        let cid = match self.provision(spec).await {
            Ok(cid) => cid,
            Err(message) => {
                warn!(logger, "provisioning failed"; "error" => %message);
                record.status = JobStatus::Failed;
                record.error = Some(message);
                record.finished_at = Some(Utc::now());
                return record;
            }
        };
        record.sandbox_id = Some(cid.clone());

        // Step 3: execute steps in order.
        let outcome = self.execute_steps(&cid, spec, cancel, &mut record, &logger).await;

        record.status = match outcome {
            StepsOutcome::Success => JobStatus::Success,
            StepsOutcome::Failed => JobStatus::Failed,
            StepsOutcome::TimedOut => JobStatus::TimedOut,
            StepsOutcome::Cancelled => JobStatus::Cancelled,
        };

        // Step 4: collect artifacts. Failures here never change job status.
        record.artifacts = collect_artifacts(self.runtime.as_ref(), &cid, &spec.artifacts, artifacts_dir).await;

        // Step 5: environment capture.
        match self.runtime.inspect_container(&cid).await {
            Ok(inspect) => record.environment = Some(capture_environment(&inspect)),
            Err(e) => debug!(logger, "inspect_container failed"; "error" => %e),
        }

        // Step 6: a single resource usage snapshot; any failure is zero-filled.
        record.resource_usage = Some(match self.runtime.stats(&cid).await {
            Ok(stats) => from_stats(&stats),
            Err(_) => ResourceUsage::default(),
        });

        // Step 7: log analysis.
        record.log_analysis = Some(LogAnalyzer::analyze(record.status, &record.steps));

        // Step 8: teardown.
        match self.runtime.remove(&cid, true).await {
            Ok(()) => record.cleanup_status = CleanupStatus::Destroyed,
            Err(e) => {
                warn!(logger, "sandbox removal failed, leaking container"; "error" => %e);
                record.cleanup_status = CleanupStatus::Leaked;
                record.ttl_expiry = Some(Utc::now());
            }
        }

        record.finished_at = Some(Utc::now());
        info!(logger, "job finished"; "status" => %record.status);
        record
    }

    async fn provision(&self, spec: &JobSpec) -> Result<String, String> {
        let mut container_labels = spec.sandbox.labels.clone();
        container_labels.insert(labels::JOB_ID.to_string(), spec.job_id.clone());
        container_labels.insert(labels::TTL.to_string(), spec.ttl_seconds.to_string());
        container_labels.insert(labels::CREATED_AT.to_string(), Utc::now().to_rfc3339());

        let opts = RunOpts {
            detach: true,
            command_override: Some(SLEEP_FOREVER.iter().map(|s| s.to_string()).collect()),
            environment: spec.sandbox.env.clone(),
            labels: container_labels,
            network_name: spec.sandbox.network_name.clone(),
            name: None,
            resource_limits: Default::default(),
        };
        self.runtime.run(&spec.sandbox.image, opts).await.map_err(|e| e.to_string())
    }

    async fn execute_steps(
        &self,
        cid: &str,
        spec: &JobSpec,
        cancel: &CancelSignal,
        record: &mut RunRecord,
        logger: &Logger,
    ) -> StepsOutcome {
        for command in &spec.commands {
            if cancel.is_cancelled() {
                return StepsOutcome::Cancelled;
            }

            let step_started = Utc::now();
            let streams = match self.runtime.exec(cid, &[command.command.clone()], command.cwd.as_deref()).await {
                Ok(streams) => streams,
                Err(e) => {
                    // The sandbox died out from under us between provisioning
                    // and this exec (§4.2 edge cases).
                    warn!(logger, "exec failed, sandbox likely lost"; "error" => %e);
                    record.steps.push(StepResult {
                        command: command.command.clone(),
                        exit_code: SANDBOX_LOST_EXIT_CODE,
                        stdout: String::new(),
                        stderr: e.to_string(),
                        duration_seconds: (Utc::now() - step_started).num_milliseconds() as f64 / 1000.0,
                        timestamp: Utc::now(),
                    });
                    return StepsOutcome::Failed;
                }
            };

            let timeout = Duration::from_secs(command.timeout_seconds);
            let output = read_to_deadline(streams.stdout, streams.stderr, timeout, cancel).await;
            let duration_seconds = (Utc::now() - step_started).num_milliseconds() as f64 / 1000.0;

            match output.outcome {
                StepOutcome::Cancelled => return StepsOutcome::Cancelled,
                StepOutcome::TimedOut => {
                    let mut stderr = output.stderr;
                    stderr.push_str(&format!("Command timed out after {}s.", command.timeout_seconds));
                    record.steps.push(StepResult {
                        command: command.command.clone(),
                        exit_code: TIMEOUT_EXIT_CODE,
                        stdout: output.stdout,
                        stderr,
                        duration_seconds,
                        timestamp: Utc::now(),
                    });
                    return StepsOutcome::TimedOut;
                }
                StepOutcome::Completed => {
                    let exit_code = self.runtime.inspect_exec(&streams.handle).await.unwrap_or(SANDBOX_LOST_EXIT_CODE);
                    let step = StepResult {
                        command: command.command.clone(),
                        exit_code,
                        stdout: output.stdout,
                        stderr: output.stderr,
                        duration_seconds,
                        timestamp: Utc::now(),
                    };
                    let succeeded = step.succeeded();
                    record.steps.push(step);
                    if !succeeded {
                        return StepsOutcome::Failed;
                    }
                }
            }
        }
        StepsOutcome::Success
    }
}

enum StepsOutcome {
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_base::{CommandSpec, JobContext, SandboxSpec};
    use orcaops_runtime::LocalRuntime;
    use orcaops_util::logging::discard_logger;

    fn spec(commands: Vec<CommandSpec>) -> JobSpec {
        JobSpec {
            job_id: "j1".into(),
            sandbox: SandboxSpec { image: "alpine:3".into(), ..Default::default() },
            commands,
            artifacts: vec![],
            ttl_seconds: 60,
            context: JobContext::default(),
        }
    }

    fn runner() -> JobRunner {
        JobRunner::new(Arc::new(LocalRuntime::new()), discard_logger())
    }

    #[tokio::test]
    async fn happy_path_runs_to_success() {
        let dir = tempfile::tempdir().unwrap();
        let record = runner()
            .run(&spec(vec![CommandSpec::new("echo hello")]), dir.path(), &CancelSignal::new())
            .await;
        assert_eq!(record.status, JobStatus::Success);
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.cleanup_status, CleanupStatus::Destroyed);
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn step_failure_halts_remaining_steps() {
        let dir = tempfile::tempdir().unwrap();
        let record = runner()
            .run(
                &spec(vec![CommandSpec::new("exit 3"), CommandSpec::new("echo should-not-run")]),
                dir.path(),
                &CancelSignal::new(),
            )
            .await;
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.steps[0].exit_code, 3);
    }

    #[tokio::test]
    async fn unknown_image_fails_before_any_steps_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = spec(vec![CommandSpec::new("echo hi")]);
        bad.sandbox.image = "does-not-exist:1".into();
        let record = runner().run(&bad, dir.path(), &CancelSignal::new()).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.steps.is_empty());
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn timeout_produces_reserved_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let record = runner()
            .run(&spec(vec![CommandSpec::new("sleep 5").with_timeout(0)]), dir.path(), &CancelSignal::new())
            .await;
        assert_eq!(record.status, JobStatus::TimedOut);
        assert_eq!(record.steps[0].exit_code, TIMEOUT_EXIT_CODE);
    }

    #[tokio::test]
    async fn cancellation_before_first_step_marks_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelSignal::new();
        cancel.cancel();
        let record = runner().run(&spec(vec![CommandSpec::new("echo hi")]), dir.path(), &cancel).await;
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.steps.is_empty());
    }
}
