use crate::anomaly::AnomalyRecord;
use crate::log_analysis::LogAnalysis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

/// Schema version stamped on every persisted `RunRecord`, for forward
/// compatible deserialization as the record shape grows.
pub const RUN_RECORD_SCHEMA_VERSION: &str = "1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    /// `status ∈ terminal` per the RunRecord invariants in §3.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CleanupStatus {
    Destroyed,
    Leaked,
}

/// Reserved exit code meaning "the step's timeout elapsed before it finished".
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Exit code recorded when the sandbox died out from under the step.
pub const SANDBOX_LOST_EXIT_CODE: i32 = -1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Sentinel recorded in [`ArtifactMetadata::sha256`] when hashing the
/// collected file failed (missing file, read error, etc).
pub const ARTIFACT_HASH_ERROR: &str = "error";

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_seconds: f64,
    pub memory_peak_mb: f64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub blkio_read_bytes: u64,
    pub blkio_write_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nano_cpus: Option<u64>,
}

/// Redacted environment + image/runtime metadata captured from the sandbox
/// after step execution (§4.2 step 5).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentCapture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_digest: Option<String>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Append-only once terminal, per §3's RunRecord invariants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default = "schema_version")]
    pub schema_version: String,
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactMetadata>,
    pub cleanup_status: CleanupStatus,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ResourceUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentCapture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_analysis: Option<LogAnalysis>,
    #[serde(default)]
    pub anomalies: Vec<AnomalyRecord>,
    /// Timestamp past which a leaked sandbox becomes fair game for a sweeper
    /// collaborator; set only when `cleanup_status == Leaked`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_expiry: Option<DateTime<Utc>>,
}

fn schema_version() -> String {
    RUN_RECORD_SCHEMA_VERSION.to_string()
}

impl RunRecord {
    pub fn new(job_id: impl Into<String>, fingerprint: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: schema_version(),
            job_id: job_id.into(),
            status: JobStatus::Queued,
            created_at,
            started_at: None,
            finished_at: None,
            sandbox_id: None,
            image_ref: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
            cleanup_status: CleanupStatus::Destroyed,
            fingerprint: fingerprint.into(),
            error: None,
            resource_usage: None,
            environment: None,
            log_analysis: None,
            anomalies: Vec::new(),
            ttl_expiry: None,
        }
    }

    /// `duration_seconds` derived accessor (§3 expansion): `None` unless both
    /// `started_at` and `finished_at` are set.
    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }

    /// Invariant check used by tests and by the Run Store on load: a
    /// malformed record (violating §3's RunRecord invariants) should never
    /// be treated as valid.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status.is_terminal() && self.finished_at.is_none() {
            return Err("terminal record missing finished_at".into());
        }
        if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
            if finished < started {
                return Err("finished_at precedes started_at".into());
            }
        }
        if self.status == JobStatus::Success {
            if let Some(bad) = self.steps.iter().find(|s| s.exit_code != 0) {
                return Err(format!("success record has failing step {bad:?}"));
            }
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.exit_code != 0 && i != self.steps.len() - 1 {
                return Err("a step after a non-zero exit code was executed".into());
            }
        }
        Ok(())
    }
}
