//! Fleet-level scan of runs and baselines, emitting actionable
//! recommendations across four dimensions (§4.10).

use crate::baseline_tracker::BaselineTracker;
use crate::run_store::{RunFilter, RunStore};
use chrono::Utc;
use orcaops_base::{Recommendation, RecommendationCategory};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const DEFAULT_TIMEOUT_SECONDS: f64 = 3600.0;
const DEPENDENCY_CACHE_MIN_OCCURRENCES: usize = 3;
const RELIABILITY_MIN_TOTAL: u64 = 10;
const RELIABILITY_MAX_SUCCESS_RATE: f64 = 0.9;
const RECENT_RUN_LIMIT: usize = 500;

fn right_sizable_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(python|node|ruby|golang):[\w.\-]+$").unwrap())
}

fn dependency_install_patterns() -> &'static [&'static str] {
    &["pip install", "npm install", "npm ci", "yarn install", "apt-get install", "apk add"]
}

pub struct RecommendationEngine;

impl RecommendationEngine {
    pub fn scan(run_store: &RunStore<'_>, baseline_tracker: &BaselineTracker<'_>) -> Vec<Recommendation> {
        let now = Utc::now();
        let mut recommendations = Vec::new();

        let recent = run_store.query(&RunFilter::default(), 0, RECENT_RUN_LIMIT).records;

        recommendations.extend(image_right_sizing(&recent, now));
        recommendations.extend(dependency_caching(&recent, now));
        recommendations.extend(timeout_right_sizing(&baseline_tracker.all(), now));
        recommendations.extend(reliability_alerts(&baseline_tracker.all(), now));

        recommendations
    }
}

fn image_right_sizing(recent: &[orcaops_base::RunRecord], now: chrono::DateTime<Utc>) -> Vec<Recommendation> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for record in recent {
        let Some(image) = &record.image_ref else { continue };
        if !right_sizable_image_re().is_match(image) || !seen.insert(image.clone()) {
            continue;
        }
        out.push(Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            category: RecommendationCategory::ImageRightSizing,
            title: format!("Consider a slimmer variant of {image}"),
            detail: format!("{image} has no slim/alpine suffix; a smaller base image reduces pull and startup time."),
            fingerprint: None,
            created_at: now,
        });
    }
    out
}

fn dependency_caching(recent: &[orcaops_base::RunRecord], now: chrono::DateTime<Utc>) -> Vec<Recommendation> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in recent {
        for step in &record.steps {
            for pattern in dependency_install_patterns() {
                if step.command.contains(pattern) {
                    *counts.entry(*pattern).or_insert(0) += 1;
                }
            }
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count >= DEPENDENCY_CACHE_MIN_OCCURRENCES)
        .map(|(pattern, count)| Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            category: RecommendationCategory::DependencyCaching,
            title: format!("Cache dependencies installed via `{pattern}`"),
            detail: format!("`{pattern}` ran {count} times across recent jobs; a dependency cache would cut repeated install time."),
            fingerprint: None,
            created_at: now,
        })
        .collect()
}

fn timeout_right_sizing(
    baselines: &HashMap<String, orcaops_base::PerformanceBaseline>,
    now: chrono::DateTime<Utc>,
) -> Vec<Recommendation> {
    baselines
        .iter()
        .filter(|(_, b)| b.p99 > 0.0 && b.p99 < 0.30 * DEFAULT_TIMEOUT_SECONDS)
        .map(|(key, b)| Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            category: RecommendationCategory::TimeoutRightSizing,
            title: format!("Lower the timeout for {key}"),
            detail: format!("p99 duration is {:.1}s, well under the default {DEFAULT_TIMEOUT_SECONDS:.0}s timeout; consider {:.1}s.", b.p99, 2.0 * b.p99),
            fingerprint: Some(key.clone()),
            created_at: now,
        })
        .collect()
}

fn reliability_alerts(
    baselines: &HashMap<String, orcaops_base::PerformanceBaseline>,
    now: chrono::DateTime<Utc>,
) -> Vec<Recommendation> {
    baselines
        .iter()
        .filter(|(_, b)| b.success_count + b.failure_count >= RELIABILITY_MIN_TOTAL && b.success_rate < RELIABILITY_MAX_SUCCESS_RATE)
        .map(|(key, b)| Recommendation {
            id: uuid::Uuid::new_v4().to_string(),
            category: RecommendationCategory::ReliabilityAlert,
            title: format!("{key} is unreliable"),
            detail: format!("success rate is {:.1}%, below the 90% reliability threshold.", b.success_rate * 100.0),
            fingerprint: Some(key.clone()),
            created_at: now,
        })
        .collect()
}
