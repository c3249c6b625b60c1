//! Filesystem-backed query layer over `<root>/artifacts/*/run.json` (§4.8).
//! Every query re-scans the directory; there is no in-memory index to keep
//! consistent with the Job Manager's own state.

use chrono::{DateTime, Utc};
use orcaops_base::RunRecord;
use orcaops_util::Config;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct RunFilter {
    pub status: Option<String>,
    pub image_contains: Option<String>,
    pub tags: Vec<String>,
    pub triggered_by: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub min_duration_seconds: Option<f64>,
    pub max_duration_seconds: Option<f64>,
}

impl RunFilter {
    fn matches(&self, record: &RunRecord, tags: &[String]) -> bool {
        if let Some(status) = &self.status {
            if record.status.to_string() != *status {
                return false;
            }
        }
        if let Some(substr) = &self.image_contains {
            if !record.image_ref.as_deref().unwrap_or("").contains(substr.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().all(|t| tags.contains(t)) {
            return false;
        }
        if let Some(after) = self.after {
            if record.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if record.created_at > before {
                return false;
            }
        }
        if let Some(min) = self.min_duration_seconds {
            if record.duration_seconds().map(|d| d < min).unwrap_or(true) {
                return false;
            }
        }
        if let Some(max) = self.max_duration_seconds {
            if record.duration_seconds().map(|d| d > max).unwrap_or(true) {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    pub records: Vec<RunRecord>,
    pub total_matched: usize,
}

pub struct RunStore<'a> {
    config: &'a Config,
    fs: orcaops_util::Fs,
}

impl<'a> RunStore<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            fs: orcaops_util::Fs::new(),
        }
    }

    /// `triggered_by` and `tags` live on the JobSpec's context, not on
    /// RunRecord itself; the store keeps a side table loaded from
    /// `<job_dir>/spec.json` when present, else treats tag/triggered_by
    /// filters as non-matching for that record.
    fn load_all(&self) -> Vec<(RunRecord, Vec<String>, Option<String>)> {
        let mut out = Vec::new();
        let dir = self.config.artifacts_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return out;
        };
        for entry in entries.flatten() {
            let job_dir = entry.path();
            if !job_dir.is_dir() {
                continue;
            }
            let run_path = job_dir.join("run.json");
            let Ok(contents) = self.fs.read_to_string(&run_path) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<RunRecord>(&contents) else {
                continue;
            };
            if record.check_invariants().is_err() {
                continue;
            }
            let (tags, triggered_by) = load_context(&job_dir);
            out.push((record, tags, triggered_by));
        }
        out
    }

    pub fn query(&self, filter: &RunFilter, offset: usize, limit: usize) -> Page {
        let mut matched: Vec<RunRecord> = self
            .load_all()
            .into_iter()
            .filter(|(record, tags, triggered_by)| {
                if let Some(want) = &filter.triggered_by {
                    if triggered_by.as_deref() != Some(want.as_str()) {
                        return false;
                    }
                }
                filter.matches(record, tags)
            })
            .map(|(record, _, _)| record)
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total_matched = matched.len();
        let records = matched.into_iter().skip(offset).take(limit).collect();
        Page { records, total_matched }
    }

    pub fn get(&self, job_id: &str) -> Option<RunRecord> {
        let path = self.config.job_dir(job_id).join("run.json");
        let contents = self.fs.read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Removes every job directory whose `created_at` is strictly older than
    /// `now - days`. Returns the number of directories removed.
    pub fn cleanup_older_than(&self, days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::days(days);
        let mut removed = 0;
        for (record, _, _) in self.load_all() {
            if record.created_at < cutoff {
                let job_dir = self.config.job_dir(&record.job_id);
                if self.fs.remove_dir_all(&job_dir).is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// `spec.json` is written by the Job Runner alongside `run.json`; it is the
/// only place `tags`/`triggered_by` survive to, since RunRecord itself does
/// not carry JobSpec's context fields.
fn load_context(job_dir: &Path) -> (Vec<String>, Option<String>) {
    let path = job_dir.join("spec.json");
    let Ok(contents) = std::fs::read_to_string(path) else {
        return (Vec::new(), None);
    };
    let Ok(spec) = serde_json::from_str::<orcaops_base::JobSpec>(&contents) else {
        return (Vec::new(), None);
    };
    (spec.context.tags, spec.context.triggered_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_base::{CleanupStatus, JobStatus};
    use std::fs;

    fn write_record(config: &Config, job_id: &str, status: JobStatus, created_at: DateTime<Utc>, image: &str) {
        let mut record = RunRecord::new(job_id, "fp", created_at);
        record.status = status;
        record.image_ref = Some(image.to_string());
        record.started_at = Some(created_at);
        record.finished_at = Some(created_at);
        record.cleanup_status = CleanupStatus::Destroyed;
        let dir = config.job_dir(job_id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("run.json"), serde_json::to_string(&record).unwrap()).unwrap();
    }

    #[test]
    fn query_filters_by_status_and_sorts_descending() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let t0 = Utc::now();
        write_record(&config, "j1", JobStatus::Success, t0, "alpine:3");
        write_record(&config, "j2", JobStatus::Failed, t0 + chrono::Duration::seconds(1), "alpine:3");

        let store = RunStore::new(&config);
        let page = store.query(&RunFilter { status: Some("success".into()), ..Default::default() }, 0, 10);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].job_id, "j1");
    }

    #[test]
    fn malformed_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let job_dir = config.job_dir("bad");
        fs::create_dir_all(&job_dir).unwrap();
        fs::write(job_dir.join("run.json"), b"not json").unwrap();

        let store = RunStore::new(&config);
        let page = store.query(&RunFilter::default(), 0, 10);
        assert_eq!(page.records.len(), 0);
    }

    #[test]
    fn cleanup_removes_old_job_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let old = Utc::now() - chrono::Duration::days(10);
        write_record(&config, "old", JobStatus::Success, old, "alpine:3");
        write_record(&config, "new", JobStatus::Success, Utc::now(), "alpine:3");

        let store = RunStore::new(&config);
        let removed = store.cleanup_older_than(5, Utc::now());
        assert_eq!(removed, 1);
        assert!(!config.job_dir("old").exists());
        assert!(config.job_dir("new").exists());
    }
}
