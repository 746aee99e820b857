use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{Algorithm, EngineSize};

/// Unique workflow run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bearer credential issued by the engine platform.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Deployment status flags reported for an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl EngineStatus {
    pub fn is_ready(&self) -> bool {
        self.started && self.succeeded && !self.failed
    }
}

/// One engine as listed by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub id: String,
    #[serde(default)]
    pub status: EngineStatus,
    #[serde(default)]
    pub size_class: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// An engine held by exactly one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLease {
    pub id: String,
    pub url: Option<String>,
    pub size: Option<EngineSize>,
    /// True when an already running engine was adopted instead of deployed.
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadGraphRequest {
    pub database: String,
    pub vertex_collections: Vec<String>,
    pub edge_collections: Vec<String>,
    #[serde(default)]
    pub vertex_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedGraph {
    pub job_id: String,
    pub graph_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmRequest {
    pub algorithm: Algorithm,
    pub graph_id: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub target_collection: String,
    pub job_ids: Vec<String>,
    pub attribute_names: Vec<String>,
    pub database: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub vertex_count: u64,
    pub edge_count: u64,
}

/// Normalized state of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

/// A polled job observation after shape normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub state: JobState,
    pub progress: Option<u64>,
    pub total: Option<u64>,
    pub documents_updated: Option<u64>,
    pub error: Option<String>,
}
