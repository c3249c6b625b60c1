//! Statistical/threshold checks run against `(RunRecord, PerformanceBaseline)`
//! pairs (§4.9 table), plus the JSONL anomaly store.

use chrono::{DateTime, NaiveDate, Utc};
use orcaops_base::{AnomalyKind, AnomalyRecord, PerformanceBaseline, RunRecord, Severity};
use orcaops_util::Fs;
use std::path::{Path, PathBuf};

const MIN_SAMPLES_FOR_DETECTION: u64 = 3;
const FLAKY_MIN_TOTAL: u64 = 10;
const DEGRADATION_MIN_TOTAL: u64 = 5;

pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Evaluates every check in §4.9's table against one terminal run and
    /// its baseline. A run may produce zero, one, or several anomalies
    /// (e.g. duration *and* flaky simultaneously).
    pub fn detect(record: &RunRecord, baseline: &PerformanceBaseline) -> Vec<AnomalyRecord> {
        if baseline.sample_count < MIN_SAMPLES_FOR_DETECTION {
            return Vec::new();
        }

        let mut anomalies = Vec::new();
        let now = Utc::now();

        if let Some(duration) = record.duration_seconds() {
            if baseline.stddev > 0.0 {
                let z = (duration - baseline.mean) / baseline.stddev;
                if z.abs() > 3.0 {
                    anomalies.push(make(record, AnomalyKind::Duration, Severity::Critical, z, 0.0, now, "duration z-score exceeds 3"));
                } else if z.abs() > 2.0 {
                    anomalies.push(make(record, AnomalyKind::Duration, Severity::Warning, z, 0.0, now, "duration z-score exceeds 2"));
                }
            }
        }

        if let (Some(usage), true) = (&record.resource_usage, baseline.memory_max_mb > 0.0) {
            let ratio = usage.memory_peak_mb / baseline.memory_max_mb;
            if ratio > 2.0 {
                anomalies.push(make(record, AnomalyKind::Memory, Severity::Critical, ratio, 0.0, now, "memory peak exceeds 2x historical max"));
            } else if ratio > 1.5 {
                anomalies.push(make(record, AnomalyKind::Memory, Severity::Warning, ratio, 0.0, now, "memory peak exceeds 1.5x historical max"));
            }
        }

        let total = baseline.success_count + baseline.failure_count;
        if total >= FLAKY_MIN_TOTAL && (0.3..0.9).contains(&baseline.success_rate) {
            anomalies.push(make(record, AnomalyKind::Flaky, Severity::Warning, baseline.success_rate, 0.0, now, "success rate is flaky"));
        }
        if total >= DEGRADATION_MIN_TOTAL && baseline.success_rate < 0.8 {
            anomalies.push(make(record, AnomalyKind::SuccessRateDegradation, Severity::Critical, baseline.success_rate, 0.8, now, "success rate degraded below threshold"));
        }

        anomalies
    }
}

fn make(
    record: &RunRecord,
    kind: AnomalyKind,
    severity: Severity,
    actual: f64,
    expected: f64,
    now: DateTime<Utc>,
    message: &str,
) -> AnomalyRecord {
    AnomalyRecord {
        id: uuid::Uuid::new_v4().to_string(),
        job_id: record.job_id.clone(),
        fingerprint: record.fingerprint.clone(),
        kind,
        severity,
        actual: format!("{actual:.3}"),
        expected: format!("{expected:.3}"),
        message: message.to_string(),
        detected_at: now,
        acknowledged: false,
    }
}

/// One JSONL file per day under a dedicated directory; queries load and
/// filter in memory, acknowledgement rewrites the file under a store-level
/// lock (§4.9).
pub struct AnomalyStore<'a> {
    dir: &'a Path,
    fs: Fs,
    lock: std::sync::Mutex<()>,
}

impl<'a> AnomalyStore<'a> {
    pub fn new(dir: &'a Path) -> Self {
        Self { dir, fs: Fs::new(), lock: std::sync::Mutex::new(()) }
    }

    fn file_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    pub fn append(&self, anomaly: &AnomalyRecord) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.file_for(anomaly.detected_at.date_naive());
        let line = serde_json::to_string(anomaly)?;
        self.fs.append_line(path, &line)?;
        Ok(())
    }

    /// Loads a day's anomalies, filtered by an optional severity.
    pub fn query(&self, day: NaiveDate, severity: Option<Severity>) -> Vec<AnomalyRecord> {
        let _guard = self.lock.lock().unwrap();
        let Ok(contents) = self.fs.read_to_string(self.file_for(day)) else {
            return Vec::new();
        };
        contents
            .lines()
            .filter_map(|line| serde_json::from_str::<AnomalyRecord>(line).ok())
            .filter(|a| severity.map(|s| a.severity == s).unwrap_or(true))
            .collect()
    }

    /// Rewrites the containing day's file with `anomaly_id` marked
    /// acknowledged. Returns `false` if not found.
    pub fn acknowledge(&self, day: NaiveDate, anomaly_id: &str) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().unwrap();
        let path = self.file_for(day);
        let Ok(contents) = self.fs.read_to_string(&path) else {
            return Ok(false);
        };
        let mut found = false;
        let mut rewritten = Vec::new();
        for line in contents.lines() {
            let Ok(mut record) = serde_json::from_str::<AnomalyRecord>(line) else {
                continue;
            };
            if record.id == anomaly_id {
                record.acknowledged = true;
                found = true;
            }
            rewritten.push(serde_json::to_string(&record)?);
        }
        if found {
            self.fs.write_atomic(&path, rewritten.join("\n").as_bytes())?;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_base::{CleanupStatus, JobStatus, ResourceUsage};

    fn baseline(sample_count: u64, mean: f64, stddev: f64, success_rate: f64) -> PerformanceBaseline {
        let mut b = PerformanceBaseline::new(Utc::now());
        b.sample_count = sample_count;
        b.success_count = (sample_count as f64 * success_rate) as u64;
        b.failure_count = sample_count - b.success_count;
        b.mean = mean;
        b.stddev = stddev;
        b.success_rate = success_rate;
        b
    }

    fn record(job_id: &str, duration: f64) -> RunRecord {
        let now = Utc::now();
        let mut r = RunRecord::new(job_id, "fp", now);
        r.status = JobStatus::Success;
        r.started_at = Some(now);
        r.finished_at = Some(now + chrono::Duration::milliseconds((duration * 1000.0) as i64));
        r.cleanup_status = CleanupStatus::Destroyed;
        r
    }

    #[test]
    fn below_min_samples_detects_nothing() {
        let b = baseline(2, 10.0, 1.0, 1.0);
        let r = record("j1", 100.0);
        assert!(AnomalyDetector::detect(&r, &b).is_empty());
    }

    #[test]
    fn duration_z_score_warning_and_critical() {
        let b = baseline(10, 10.0, 2.0, 1.0);
        let warning = AnomalyDetector::detect(&record("j1", 15.0), &b);
        assert!(warning.iter().any(|a| a.kind == AnomalyKind::Duration && a.severity == Severity::Warning));

        let critical = AnomalyDetector::detect(&record("j2", 20.0), &b);
        assert!(critical.iter().any(|a| a.kind == AnomalyKind::Duration && a.severity == Severity::Critical));
    }

    #[test]
    fn memory_ratio_triggers_anomaly() {
        let mut b = baseline(10, 10.0, 0.0, 1.0);
        b.memory_max_mb = 100.0;
        let mut r = record("j1", 10.0);
        r.resource_usage = Some(ResourceUsage { memory_peak_mb: 250.0, ..Default::default() });
        let anomalies = AnomalyDetector::detect(&r, &b);
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::Memory && a.severity == Severity::Critical));
    }

    #[test]
    fn flaky_and_degradation_checks() {
        let flaky = baseline(10, 10.0, 0.0, 0.5);
        assert!(AnomalyDetector::detect(&record("j1", 10.0), &flaky).iter().any(|a| a.kind == AnomalyKind::Flaky));

        let degraded = baseline(5, 10.0, 0.0, 0.5);
        assert!(AnomalyDetector::detect(&record("j2", 10.0), &degraded).iter().any(|a| a.kind == AnomalyKind::SuccessRateDegradation));
    }

    #[test]
    fn store_append_query_and_acknowledge_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnomalyStore::new(dir.path());
        let anomaly = make(&record("j1", 1.0), AnomalyKind::Duration, Severity::Warning, 1.0, 0.0, Utc::now(), "test");
        store.append(&anomaly).unwrap();

        let day = anomaly.detected_at.date_naive();
        let loaded = store.query(day, None);
        assert_eq!(loaded.len(), 1);

        let acked = store.acknowledge(day, &anomaly.id).unwrap();
        assert!(acked);
        let reloaded = store.query(day, None);
        assert!(reloaded[0].acknowledged);
    }
}
