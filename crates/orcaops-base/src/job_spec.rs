use crate::error::OrcaError;
use crate::validation::{validate_artifact_pattern, validate_image_ref, validate_job_id, validate_ttl_seconds};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One shell command inside a job, run in order inside the sandbox.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// The container-shaped portion of a job: the image, its environment, and
/// whatever free-form resource limits the caller wants applied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxSpec {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub resources: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Free-form caller context carried through to the persisted record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An immutable job submission. Once `Submit`ted this value is never mutated;
/// everything observed about its execution accrues onto a separate
/// [`crate::run_record::RunRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: String,
    pub sandbox: SandboxSpec,
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub ttl_seconds: u32,
    #[serde(flatten)]
    pub context: JobContext,
}

impl JobSpec {
    /// Validates every bounded field. Submit must call this eagerly and
    /// write no state at all if it fails.
    pub fn validate(&self) -> Result<(), OrcaError> {
        validate_job_id(&self.job_id)?;
        validate_image_ref(&self.sandbox.image)?;
        validate_ttl_seconds(self.ttl_seconds)?;
        if self.commands.is_empty() {
            return Err(OrcaError::validation("job must have at least one command"));
        }
        for artifact in &self.artifacts {
            validate_artifact_pattern(artifact)?;
        }
        Ok(())
    }
}
