//! Typed records, enums, and validators shared by every OrcaOps component.
//!
//! Nothing in this crate talks to a filesystem, a container runtime, or a
//! clock beyond what's handed in — it is pure data and pure validation, the
//! same role `maelstrom-base` plays for the workspace this one is patterned
//! after.

pub mod anomaly;
pub mod baseline;
pub mod error;
pub mod fingerprint;
pub mod job_spec;
pub mod log_analysis;
pub mod recommendation;
pub mod run_record;
pub mod validation;
pub mod workflow_record;
pub mod workflow_spec;
pub mod workspace;

pub use anomaly::{AnomalyKind, AnomalyRecord, Severity};
pub use baseline::PerformanceBaseline;
pub use error::{ErrorKind, OrcaError};
pub use job_spec::{CommandSpec, JobContext, JobSpec, SandboxSpec};
pub use log_analysis::LogAnalysis;
pub use recommendation::{DebugAnalysis, MatchedCause, Recommendation, RecommendationCategory};
pub use run_record::{
    ArtifactMetadata, CleanupStatus, EnvironmentCapture, JobStatus, ResourceLimits, ResourceUsage,
    RunRecord, StepResult, ARTIFACT_HASH_ERROR, SANDBOX_LOST_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
pub use workflow_record::{WorkflowJobStatus, WorkflowRecord, WorkflowStatus};
pub use workflow_spec::{HealthCheck, MatrixSpec, OnComplete, ServiceDefinition, WorkflowJob, WorkflowSpec};
pub use workspace::{AgentSession, ApiKey, AuditEvent, Workspace};
