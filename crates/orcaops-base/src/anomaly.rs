use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyKind {
    Duration,
    Memory,
    Flaky,
    SuccessRateDegradation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// One deviation from baseline, emitted inline by the Baseline Tracker or by
/// a standalone Anomaly Detector pass (§4.9).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: String,
    pub job_id: String,
    pub fingerprint: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub actual: String,
    pub expected: String,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
}
