//! Duration and failure-risk prediction from a spec's baseline key (§4.10).

use orcaops_base::fingerprint::baseline_key;
use orcaops_base::PerformanceBaseline;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DurationPrediction {
    pub estimated: f64,
    pub range_low: f64,
    pub range_high: f64,
    pub confidence: f64,
}

pub struct DurationPredictor;

impl DurationPredictor {
    pub fn predict(image: &str, commands: &[String], baselines: &std::collections::HashMap<String, PerformanceBaseline>) -> Option<DurationPrediction> {
        let key = baseline_key(image, commands);
        let baseline = baselines.get(&key)?;

        let estimated = if baseline.p50 > 0.0 { baseline.p50 } else { baseline.ema };
        let range_low = (if baseline.p50 > 0.0 { 0.8 * baseline.p50 } else { 0.5 * estimated }).min(estimated);
        let range_high = (if baseline.p95 > 0.0 { baseline.p95 } else { 2.0 * estimated }).max(estimated);
        let confidence = (baseline.sample_count as f64 / 50.0).min(0.95);

        Some(DurationPrediction { estimated, range_low, range_high, confidence })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FailurePrediction {
    pub risk_score: f64,
    pub level: RiskLevel,
}

pub struct FailurePredictor;

impl FailurePredictor {
    pub fn predict(image: &str, commands: &[String], baselines: &std::collections::HashMap<String, PerformanceBaseline>) -> Option<FailurePrediction> {
        let key = baseline_key(image, commands);
        let baseline = baselines.get(&key)?;
        let risk_score = 1.0 - baseline.success_rate;
        let level = if risk_score < 0.2 {
            RiskLevel::Low
        } else if risk_score < 0.5 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };
        Some(FailurePrediction { risk_score, level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn baselines_with(key: &str, p50: f64, p95: f64, sample_count: u64, success_rate: f64) -> HashMap<String, PerformanceBaseline> {
        let mut b = PerformanceBaseline::new(Utc::now());
        b.p50 = p50;
        b.p95 = p95;
        b.sample_count = sample_count;
        b.success_rate = success_rate;
        let mut map = HashMap::new();
        map.insert(key.to_string(), b);
        map
    }

    #[test]
    fn duration_prediction_uses_p50_and_p95() {
        let commands = vec!["echo hi".to_string()];
        let key = baseline_key("alpine:3", &commands);
        let baselines = baselines_with(&key, 10.0, 25.0, 20, 0.95);
        let prediction = DurationPredictor::predict("alpine:3", &commands, &baselines).unwrap();
        assert_eq!(prediction.estimated, 10.0);
        assert_eq!(prediction.range_high, 25.0);
        assert!((prediction.confidence - 0.4).abs() < 0.01);
    }

    #[test]
    fn missing_baseline_yields_no_prediction() {
        let baselines = HashMap::new();
        assert!(DurationPredictor::predict("alpine:3", &["echo hi".to_string()], &baselines).is_none());
    }

    #[test]
    fn failure_prediction_levels() {
        let commands = vec!["echo hi".to_string()];
        let key = baseline_key("alpine:3", &commands);

        let low = baselines_with(&key, 1.0, 1.0, 10, 0.95);
        assert_eq!(FailurePredictor::predict("alpine:3", &commands, &low).unwrap().level, RiskLevel::Low);

        let high = baselines_with(&key, 1.0, 1.0, 10, 0.3);
        assert_eq!(FailurePredictor::predict("alpine:3", &commands, &high).unwrap().level, RiskLevel::High);
    }
}
