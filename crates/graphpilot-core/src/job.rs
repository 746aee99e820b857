use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{Algorithm, AnalysisConfig, EngineSize};

/// Lifecycle of one analysis run.
///
/// `Pending → Deploying → LoadingGraph → RunningAlgorithm → StoringResults`
/// ends in `Completed` or `Failed`; `CleaningUp` is entered once the retry
/// loop exits, before the terminal status is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Deploying,
    LoadingGraph,
    RunningAlgorithm,
    StoringResults,
    CleaningUp,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::LoadingGraph => "loading_graph",
            Self::RunningAlgorithm => "running_algorithm",
            Self::StoringResults => "storing_results",
            Self::CleaningUp => "cleaning_up",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Seconds spent in each phase of the last attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub deploy_secs: Option<f64>,
    pub load_secs: Option<f64>,
    pub execute_secs: Option<f64>,
    pub store_secs: Option<f64>,
}

/// Mutable record of one analysis execution.
///
/// Owned by the orchestrator while it runs; read-only once in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: String,
    pub analysis_name: String,
    pub algorithm: Algorithm,
    pub engine_size: EngineSize,
    pub status: AnalysisStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timings: PhaseTimings,
    pub engine_id: Option<String>,
    #[serde(default)]
    pub engine_reused: bool,
    pub graph_id: Option<String>,
    pub load_job_id: Option<String>,
    pub algorithm_job_id: Option<String>,
    pub store_job_id: Option<String>,
    pub vertex_count: Option<u64>,
    pub edge_count: Option<u64>,
    pub documents_updated: u64,
    pub error: Option<String>,
    /// Set when engine teardown failed; the engine may still be billing.
    pub cleanup_error: Option<String>,
    pub retry_count: u32,
    pub elapsed_secs: Option<f64>,
    pub estimated_cost: Option<f64>,
}

impl AnalysisResult {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            analysis_name: config.name.clone(),
            algorithm: config.algorithm,
            engine_size: config.engine_size,
            status: AnalysisStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            timings: PhaseTimings::default(),
            engine_id: None,
            engine_reused: false,
            graph_id: None,
            load_job_id: None,
            algorithm_job_id: None,
            store_job_id: None,
            vertex_count: None,
            edge_count: None,
            documents_updated: 0,
            error: None,
            cleanup_error: None,
            retry_count: 0,
            elapsed_secs: None,
            estimated_cost: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }
}

/// A template execution as tracked by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub template_name: String,
    #[serde(default)]
    pub use_case_id: Option<String>,
    pub database: String,
    pub target_collection: String,
    pub result: AnalysisResult,
    /// Up to `max_result_documents` documents read back on success.
    #[serde(default)]
    pub sample_documents: Vec<serde_json::Value>,
    pub submitted_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.result.succeeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_result_is_pending() {
        let config = AnalysisConfig::new("demo", "wcc").unwrap();
        let result = AnalysisResult::new(&config);
        assert_eq!(result.status, AnalysisStatus::Pending);
        assert_eq!(result.retry_count, 0);
        assert_eq!(result.algorithm, Algorithm::Wcc);
        assert!(!result.succeeded());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&AnalysisStatus::RunningAlgorithm).unwrap();
        assert_eq!(json, "\"running_algorithm\"");
        assert!(AnalysisStatus::Failed.is_terminal());
        assert!(!AnalysisStatus::CleaningUp.is_terminal());
    }
}
