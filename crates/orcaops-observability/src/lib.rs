//! Run Store queries, log analysis, baseline tracking, anomaly detection,
//! and the recommendation/prediction layer (§4.7–§4.10). Everything here
//! consumes [`orcaops_base`] record types and [`orcaops_util::Config`]'s
//! filesystem layout; nothing here talks to a container runtime.

pub mod anomaly_detector;
pub mod baseline_tracker;
pub mod knowledge_base;
pub mod log_analyzer;
pub mod predictor;
pub mod recommendation_engine;
pub mod run_store;

pub use anomaly_detector::{AnomalyDetector, AnomalyStore};
pub use baseline_tracker::BaselineTracker;
pub use knowledge_base::KnowledgeBase;
pub use log_analyzer::LogAnalyzer;
pub use predictor::{DurationPredictor, DurationPrediction, FailurePredictor, FailurePrediction, RiskLevel};
pub use recommendation_engine::RecommendationEngine;
pub use run_store::{Page, RunFilter, RunStore};
