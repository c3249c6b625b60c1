//! Per-fingerprint performance baselines: EMA, rolling window, percentiles,
//! success rate (§4.9 "Update rule"). Persisted as a single JSON object keyed
//! by fingerprint under `<root>/baselines.json`.

use chrono::Utc;
use orcaops_base::baseline::push_capped;
use orcaops_base::{AnomalyKind, AnomalyRecord, JobStatus, PerformanceBaseline, RunRecord, Severity};
use orcaops_util::{Config, Fs};
use std::collections::HashMap;

const EMA_ALPHA: f64 = 0.2;
/// Duration anomalies fire inline once a run's duration exceeds this
/// multiple of the current EMA (§4.9).
const INLINE_ANOMALY_DURATION_MULTIPLE: f64 = 2.0;
const INLINE_ANOMALY_MIN_SAMPLES: u64 = 3;

pub struct BaselineTracker<'a> {
    config: &'a Config,
    fs: Fs,
}

impl<'a> BaselineTracker<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, fs: Fs::new() }
    }

    fn load(&self) -> HashMap<String, PerformanceBaseline> {
        let Ok(contents) = self.fs.read_to_string(self.config.baselines_path()) else {
            return HashMap::new();
        };
        let Ok(raw) = serde_json::from_str::<HashMap<String, RawBaseline>>(&contents) else {
            return HashMap::new();
        };
        raw.into_iter().map(|(k, v)| (k, v.into_baseline())).collect()
    }

    fn save(&self, baselines: &HashMap<String, PerformanceBaseline>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(baselines)?;
        self.fs.write_atomic(self.config.baselines_path(), &json)?;
        Ok(())
    }

    /// Applies the update rule for one terminal run, persists the whole
    /// table atomically, and returns any anomaly emitted inline.
    pub fn record(&self, key: &str, record: &RunRecord) -> anyhow::Result<Option<AnomalyRecord>> {
        if matches!(record.status, JobStatus::Queued | JobStatus::Running | JobStatus::Cancelled) {
            return Ok(None);
        }

        let mut baselines = self.load();
        let is_success = record.status == JobStatus::Success;
        if !baselines.contains_key(key) && !is_success {
            return Ok(None);
        }

        let now = Utc::now();
        let entry = baselines.entry(key.to_string()).or_insert_with(|| PerformanceBaseline::new(now));

        let mut anomaly = None;
        if is_success {
            let duration = record.duration_seconds().unwrap_or(0.0);
            let prior_ema = entry.ema;
            entry.ema = if entry.sample_count == 0 {
                duration
            } else {
                EMA_ALPHA * duration + (1.0 - EMA_ALPHA) * prior_ema
            };
            push_capped(&mut entry.recent_durations, duration);
            if let Some(usage) = &record.resource_usage {
                if usage.memory_peak_mb > 0.0 {
                    push_capped(&mut entry.recent_memory_mb, usage.memory_peak_mb);
                }
            }
            entry.success_count += 1;
            recompute_duration_stats(entry);
            recompute_memory_stats(entry);

            if entry.sample_count >= INLINE_ANOMALY_MIN_SAMPLES && duration > INLINE_ANOMALY_DURATION_MULTIPLE * prior_ema {
                anomaly = Some(AnomalyRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    job_id: record.job_id.clone(),
                    fingerprint: record.fingerprint.clone(),
                    kind: AnomalyKind::Duration,
                    severity: Severity::Warning,
                    actual: format!("{duration:.2}"),
                    expected: format!("{prior_ema:.2}"),
                    message: format!("duration {duration:.2}s exceeds 2x EMA {prior_ema:.2}s"),
                    detected_at: now,
                    acknowledged: false,
                });
            }
        } else {
            entry.failure_count += 1;
        }

        entry.sample_count = entry.success_count + entry.failure_count;
        entry.success_rate = entry.success_count as f64 / entry.sample_count.max(1) as f64;
        entry.last_updated = now;

        self.save(&baselines)?;
        Ok(anomaly)
    }

    pub fn get(&self, key: &str) -> Option<PerformanceBaseline> {
        self.load().remove(key)
    }

    /// The whole table, for fleet-wide scans (Recommendation Engine,
    /// Predictor).
    pub fn all(&self) -> HashMap<String, PerformanceBaseline> {
        self.load()
    }
}

fn recompute_duration_stats(baseline: &mut PerformanceBaseline) {
    let samples: Vec<f64> = baseline.recent_durations.iter().copied().collect();
    if samples.is_empty() {
        return;
    }
    let (mean, stddev) = mean_stddev(&samples);
    baseline.mean = mean;
    baseline.stddev = stddev;
    baseline.min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    baseline.max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    baseline.p50 = percentile(&samples, 0.50);
    baseline.p95 = percentile(&samples, 0.95);
    baseline.p99 = percentile(&samples, 0.99);
}

fn recompute_memory_stats(baseline: &mut PerformanceBaseline) {
    let samples: Vec<f64> = baseline.recent_memory_mb.iter().copied().collect();
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    baseline.memory_mean_mb = mean;
    baseline.memory_max_mb = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
}

fn mean_stddev(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn percentile(samples: &[f64], p: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// On-disk shape tolerant of legacy rows missing `recent_durations`/
/// `recent_memory_mb` and carrying a flat `count` instead of
/// `sample_count`/`success_count` (§4.9 migration note).
#[derive(serde::Deserialize)]
struct RawBaseline {
    #[serde(flatten)]
    baseline: PerformanceBaseline,
    #[serde(default)]
    count: Option<u64>,
}

impl RawBaseline {
    fn into_baseline(self) -> PerformanceBaseline {
        match self.count {
            Some(legacy_count) => self.baseline.migrate_legacy(legacy_count),
            None => self.baseline,
        }
    }
}
