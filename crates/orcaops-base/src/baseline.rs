use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Rolling window cap shared by `recent_durations` and `recent_memory_mb`
/// (§3: "each capped at 200 samples").
pub const ROLLING_WINDOW_CAP: usize = 200;

/// Per-fingerprint performance aggregates, keyed externally by
/// `image_ref ‖ "::" ‖ join(command, "|")` (see
/// `orcaops_base::fingerprint::baseline_key`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub success_rate: f64,

    #[serde(default)]
    pub ema: f64,
    #[serde(default)]
    pub mean: f64,
    #[serde(default)]
    pub stddev: f64,
    #[serde(default)]
    pub p50: f64,
    #[serde(default)]
    pub p95: f64,
    #[serde(default)]
    pub p99: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,

    #[serde(default)]
    pub memory_mean_mb: f64,
    #[serde(default)]
    pub memory_max_mb: f64,

    #[serde(default)]
    pub recent_durations: VecDeque<f64>,
    #[serde(default)]
    pub recent_memory_mb: VecDeque<f64>,

    #[serde(default = "Utc::now")]
    pub first_seen: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl PerformanceBaseline {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            sample_count: 0,
            success_count: 0,
            failure_count: 0,
            success_rate: 0.0,
            ema: 0.0,
            mean: 0.0,
            stddev: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
            memory_mean_mb: 0.0,
            memory_max_mb: 0.0,
            recent_durations: VecDeque::new(),
            recent_memory_mb: VecDeque::new(),
            first_seen: now,
            last_updated: now,
        }
    }

    /// Migrates a legacy row (pre-rolling-window) that is missing
    /// `recent_durations`, by synthesizing up to 3 samples equal to the
    /// stored EMA and reseeding `sample_count`/`success_count` from a legacy
    /// `count` field, per §4.9.
    pub fn migrate_legacy(mut self, legacy_count: u64) -> Self {
        if self.recent_durations.is_empty() && self.ema > 0.0 {
            let synth = legacy_count.min(3);
            for _ in 0..synth {
                self.recent_durations.push_back(self.ema);
            }
            self.sample_count = legacy_count;
            self.success_count = legacy_count;
        }
        self
    }
}

pub fn push_capped(window: &mut VecDeque<f64>, value: f64) {
    window.push_back(value);
    while window.len() > ROLLING_WINDOW_CAP {
        window.pop_front();
    }
}
