use crate::error::OrcaError;
use crate::job_spec::CommandSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OnComplete {
    Success,
    Always,
    Failure,
}

impl Default for OnComplete {
    fn default() -> Self {
        Self::Success
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Accepts `Ns`/`Nms`/`Nm` suffixes and bare numbers (seconds); parsed by
    /// `orcaops_util::duration::parse_duration`.
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
}

/// Already-normalized matrix: `matrix: {python: [...], exclude: [...],
/// include: [...]}` after the YAML shorthand has been expanded into
/// `parameters + exclude/include` (§4.4).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    pub parameters: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub exclude: Vec<HashMap<String, String>>,
    #[serde(default)]
    pub include: Vec<HashMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "if")]
    pub if_condition: Option<String>,
    #[serde(default)]
    pub on_complete: OnComplete,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixSpec>,
    #[serde(default)]
    pub services: HashMap<String, ServiceDefinition>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub jobs: HashMap<String, WorkflowJob>,
}

impl WorkflowSpec {
    /// All `requires` names resolve to defined jobs (§3 WorkflowSpec
    /// invariant). Cycle detection is a separate pass (`dag::validate_acyclic`
    /// in `orcaops-workflow`) since it needs graph traversal, not just a
    /// lookup.
    pub fn validate_requires(&self) -> Result<(), OrcaError> {
        for (name, job) in &self.jobs {
            for dep in &job.requires {
                if !self.jobs.contains_key(dep) {
                    return Err(OrcaError::validation(format!(
                        "job {name:?} requires undefined job {dep:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_requires_rejected() {
        let mut jobs = HashMap::new();
        jobs.insert(
            "b".to_string(),
            WorkflowJob {
                requires: vec!["a".to_string()],
                ..Default::default()
            },
        );
        let spec = WorkflowSpec {
            name: "wf".into(),
            jobs,
            ..Default::default()
        };
        assert!(spec.validate_requires().is_err());
    }
}
