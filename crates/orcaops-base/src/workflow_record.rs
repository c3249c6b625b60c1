use crate::run_record::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Partial,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJobStatus {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowJobStatus {
    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            job_id: None,
            matrix_key: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub spec_name: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub job_statuses: HashMap<String, WorkflowJobStatus>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowRecord {
    pub fn new(workflow_id: impl Into<String>, spec_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            spec_name: spec_name.into(),
            status: WorkflowStatus::Pending,
            created_at: now,
            started_at: None,
            finished_at: None,
            job_statuses: HashMap::new(),
            env: HashMap::new(),
            triggered_by: None,
            error: None,
        }
    }

    /// Final status per the priority order in §4.5: all success → success;
    /// all cancelled → cancelled; any success + any failure/cancel →
    /// partial; else → failed.
    pub fn derive_final_status(&self) -> WorkflowStatus {
        let statuses: Vec<JobStatus> = self.job_statuses.values().map(|s| s.status).collect();
        if statuses.is_empty() {
            return WorkflowStatus::Success;
        }
        let all_success = statuses.iter().all(|s| *s == JobStatus::Success);
        let all_cancelled = statuses.iter().all(|s| *s == JobStatus::Cancelled);
        let any_success = statuses.iter().any(|s| *s == JobStatus::Success);
        let any_bad = statuses
            .iter()
            .any(|s| matches!(s, JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled));

        if all_success {
            WorkflowStatus::Success
        } else if all_cancelled {
            WorkflowStatus::Cancelled
        } else if any_success && any_bad {
            WorkflowStatus::Partial
        } else {
            WorkflowStatus::Failed
        }
    }
}
