//! Durable writes for a job's `run.json` and `steps.jsonl` (§4.2 step 9),
//! and the sibling `spec.json` the Run Store reads back for tag/
//! `triggered_by` filtering.

use orcaops_base::{JobSpec, RunRecord};
use orcaops_util::{Config, Fs};

pub fn persist(config: &Config, spec: &JobSpec, record: &RunRecord) -> anyhow::Result<()> {
    let fs = Fs::new();
    let job_dir = config.job_dir(&spec.job_id);

    let run_json = serde_json::to_vec_pretty(record)?;
    fs.write_atomic(job_dir.join("run.json"), &run_json)?;

    let spec_json = serde_json::to_vec(spec)?;
    fs.write_atomic(job_dir.join("spec.json"), &spec_json)?;

    let steps_jsonl = record
        .steps
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?
        .join("\n");
    fs.write_atomic(job_dir.join("steps.jsonl"), steps_jsonl.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orcaops_base::{CleanupStatus, CommandSpec, JobContext, JobStatus, SandboxSpec};

    fn spec() -> JobSpec {
        JobSpec {
            job_id: "j1".into(),
            sandbox: SandboxSpec { image: "alpine:3".into(), ..Default::default() },
            commands: vec![CommandSpec::new("echo hi")],
            artifacts: vec![],
            ttl_seconds: 60,
            context: JobContext::default(),
        }
    }

    #[test]
    fn writes_run_json_and_steps_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let mut record = RunRecord::new("j1", "fp", Utc::now());
        record.status = JobStatus::Success;
        record.started_at = Some(Utc::now());
        record.finished_at = Some(Utc::now());
        record.cleanup_status = CleanupStatus::Destroyed;

        persist(&config, &spec(), &record).unwrap();

        let job_dir = config.job_dir("j1");
        assert!(job_dir.join("run.json").exists());
        assert!(job_dir.join("spec.json").exists());
        assert!(job_dir.join("steps.jsonl").exists());

        let loaded: RunRecord = serde_json::from_str(&std::fs::read_to_string(job_dir.join("run.json")).unwrap()).unwrap();
        assert_eq!(loaded.job_id, "j1");
    }
}
