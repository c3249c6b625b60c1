use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecommendationCategory {
    ImageRightSizing,
    TimeoutRightSizing,
    DependencyCaching,
    ReliabilityAlert,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub category: RecommendationCategory,
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One matched root-cause for a failed run, from the Knowledge Base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchedCause {
    pub category: String,
    pub title: String,
    pub solutions: Vec<String>,
}

/// Result of `KnowledgeBase::analyze_failure` for a single run (§4.10).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugAnalysis {
    pub job_id: String,
    pub causes: Vec<MatchedCause>,
    pub sibling_failures: Vec<String>,
}
