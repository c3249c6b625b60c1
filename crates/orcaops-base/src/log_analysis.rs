use serde::{Deserialize, Serialize};

/// Output of the Log Analyzer (`orcaops-observability::log_analyzer`),
/// attached to a [`crate::run_record::RunRecord`] at teardown time. The type
/// lives in `orcaops-base` so `RunRecord` can own it without a crate cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub error_lines: Vec<String>,
    pub warning_count: u32,
    pub stack_traces: Vec<String>,
    pub summary: String,
    pub suggestions: Vec<String>,
}
