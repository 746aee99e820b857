use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraphPilotError, Result};

/// Graph algorithms the remote engine can run. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    PageRank,
    Wcc,
    Scc,
    LabelPropagation,
    Betweenness,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::PageRank,
        Algorithm::Wcc,
        Algorithm::Scc,
        Algorithm::LabelPropagation,
        Algorithm::Betweenness,
    ];

    /// Canonical identifier, also the engine endpoint name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageRank => "pagerank",
            Self::Wcc => "wcc",
            Self::Scc => "scc",
            Self::LabelPropagation => "label_propagation",
            Self::Betweenness => "betweenness",
        }
    }

    /// Attribute the engine writes into each result document.
    pub fn result_attribute(&self) -> &'static str {
        match self {
            Self::PageRank => "pagerank",
            Self::Wcc | Self::Scc => "component",
            Self::LabelPropagation => "community",
            Self::Betweenness => "betweenness",
        }
    }

    /// Whether results assign each vertex to a component.
    pub fn produces_components(&self) -> bool {
        matches!(self, Self::Wcc | Self::Scc)
    }

    /// Comma-separated list of canonical names, for error messages.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn parse(name: &str) -> Result<Self> {
        let key = name.trim().to_lowercase().replace(['-', ' '], "_");
        let algo = match key.as_str() {
            "pagerank" | "page_rank" | "rank" => Self::PageRank,
            "wcc" | "weakly_connected_components" | "connected_components" => Self::Wcc,
            "scc" | "strongly_connected_components" => Self::Scc,
            "label_propagation" | "labelpropagation" | "lpa" => Self::LabelPropagation,
            "betweenness" | "betweenness_centrality" => Self::Betweenness,
            _ => {
                return Err(GraphPilotError::UnsupportedAlgorithm {
                    name: name.to_string(),
                    valid: Self::valid_names(),
                })
            }
        };
        Ok(algo)
    }
}

impl FromStr for Algorithm {
    type Err = GraphPilotError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Algorithm {
    type Error = GraphPilotError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Algorithm> for String {
    fn from(a: Algorithm) -> Self {
        a.as_str().to_string()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine size class. Values are normalized on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineSize {
    E4,
    E8,
    #[default]
    E16,
    E32,
    E64,
    E128,
}

impl EngineSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E4 => "e4",
            Self::E8 => "e8",
            Self::E16 => "e16",
            Self::E32 => "e32",
            Self::E64 => "e64",
            Self::E128 => "e128",
        }
    }

    /// Accepts `e16`, `E16`, `16`, `16gb` and t-shirt aliases.
    pub fn normalize(raw: &str) -> Result<Self> {
        let key = raw.trim().to_lowercase();
        let key = key.trim_end_matches("gb");
        let size = match key {
            "e4" | "4" | "xsmall" => Self::E4,
            "e8" | "8" | "small" => Self::E8,
            "e16" | "16" | "medium" => Self::E16,
            "e32" | "32" | "large" => Self::E32,
            "e64" | "64" | "xlarge" => Self::E64,
            "e128" | "128" | "xxlarge" => Self::E128,
            _ => {
                return Err(GraphPilotError::Configuration(format!(
                    "Unknown engine size '{}' (expected one of e4, e8, e16, e32, e64, e128)",
                    raw
                )))
            }
        };
        Ok(size)
    }

    /// Next smaller size class, if any.
    pub fn smaller(&self) -> Option<Self> {
        match self {
            Self::E4 => None,
            Self::E8 => Some(Self::E4),
            Self::E16 => Some(Self::E8),
            Self::E32 => Some(Self::E16),
            Self::E64 => Some(Self::E32),
            Self::E128 => Some(Self::E64),
        }
    }

    /// Billing rate in USD per engine-hour.
    pub fn hourly_rate(&self) -> f64 {
        match self {
            Self::E4 => 0.20,
            Self::E8 => 0.40,
            Self::E16 => 0.80,
            Self::E32 => 1.60,
            Self::E64 => 3.20,
            Self::E128 => 6.40,
        }
    }

    /// Estimated cost of running this size for `elapsed_secs`.
    pub fn estimate_cost(&self, elapsed_secs: f64) -> f64 {
        self.hourly_rate() * (elapsed_secs / 3600.0)
    }
}

impl TryFrom<String> for EngineSize {
    type Error = GraphPilotError;

    fn try_from(value: String) -> Result<Self> {
        Self::normalize(&value)
    }
}

impl From<EngineSize> for String {
    fn from(s: EngineSize) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for EngineSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the orchestrator deletes the engine after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    #[default]
    Always,
    Never,
}

impl CleanupPolicy {
    pub fn should_delete(&self) -> bool {
        matches!(self, Self::Always)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Per-job polling budget in seconds.
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout_secs: 3600,
        }
    }
}

/// Settings applied to templates that leave them unspecified.
#[derive(Debug, Clone)]
pub struct AnalysisDefaults {
    pub database: String,
    pub engine_size: EngineSize,
    pub retry: RetryPolicy,
    pub cleanup: CleanupPolicy,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            database: "_system".to_string(),
            engine_size: EngineSize::default(),
            retry: RetryPolicy::default(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// Immutable description of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub name: String,
    pub algorithm: Algorithm,
    pub database: String,
    pub vertex_collections: Vec<String>,
    pub edge_collections: Vec<String>,
    #[serde(default)]
    pub vertex_attributes: Vec<String>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub engine_size: EngineSize,
    pub target_collection: String,
    pub retry: RetryPolicy,
    pub cleanup: CleanupPolicy,
}

impl AnalysisConfig {
    /// Create a config; fails if the algorithm is not supported.
    pub fn new(name: impl Into<String>, algorithm: &str) -> Result<Self> {
        let algorithm = Algorithm::parse(algorithm)?;
        Ok(Self {
            name: name.into(),
            algorithm,
            database: AnalysisDefaults::default().database,
            vertex_collections: vec![],
            edge_collections: vec![],
            vertex_attributes: vec![],
            params: serde_json::Map::new(),
            engine_size: EngineSize::default(),
            target_collection: format!("{}_results", algorithm.as_str()),
            retry: RetryPolicy::default(),
            cleanup: CleanupPolicy::default(),
        })
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_collections(mut self, vertices: Vec<String>, edges: Vec<String>) -> Self {
        self.vertex_collections = vertices;
        self.edge_collections = edges;
        self
    }

    pub fn with_vertex_attributes(mut self, attributes: Vec<String>) -> Self {
        self.vertex_attributes = attributes;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Set the engine size from a raw string, normalizing it.
    pub fn with_engine_size(mut self, raw: &str) -> Result<Self> {
        self.engine_size = EngineSize::normalize(raw)?;
        Ok(self)
    }

    pub fn with_target_collection(mut self, target: impl Into<String>) -> Self {
        self.target_collection = target.into();
        self
    }

    pub fn with_retry(mut self, max_retries: u32, timeout_secs: u64) -> Self {
        self.retry = RetryPolicy {
            max_retries,
            timeout_secs,
        };
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }
}

/// Declarative, pre-validated analysis ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub use_case_id: Option<String>,
    pub algorithm: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub vertex_collections: Vec<String>,
    pub edge_collections: Vec<String>,
    #[serde(default)]
    pub vertex_attributes: Vec<String>,
    #[serde(default)]
    pub engine_size: Option<String>,
    #[serde(default)]
    pub target_collection: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl AnalysisTemplate {
    /// Convert into an executable config, falling back to `defaults`.
    pub fn to_analysis_config(&self, defaults: &AnalysisDefaults) -> Result<AnalysisConfig> {
        if self.vertex_collections.is_empty() {
            return Err(GraphPilotError::Configuration(format!(
                "Template '{}' has no vertex collections",
                self.name
            )));
        }

        let mut config = AnalysisConfig::new(self.name.clone(), &self.algorithm)?
            .with_database(self.database.clone().unwrap_or_else(|| defaults.database.clone()))
            .with_collections(self.vertex_collections.clone(), self.edge_collections.clone())
            .with_vertex_attributes(self.vertex_attributes.clone())
            .with_retry(
                self.max_retries.unwrap_or(defaults.retry.max_retries),
                self.timeout_secs.unwrap_or(defaults.retry.timeout_secs),
            )
            .with_cleanup(defaults.cleanup);

        config.engine_size = match self.engine_size.as_deref() {
            Some(raw) => EngineSize::normalize(raw)?,
            None => defaults.engine_size,
        };
        if let Some(ref target) = self.target_collection {
            config.target_collection = target.clone();
        }
        config.params = self.params.clone();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_aliases() {
        assert_eq!(Algorithm::parse("PageRank").unwrap(), Algorithm::PageRank);
        assert_eq!(
            Algorithm::parse("weakly-connected-components").unwrap(),
            Algorithm::Wcc
        );
        assert_eq!(Algorithm::parse("lpa").unwrap(), Algorithm::LabelPropagation);
    }

    #[test]
    fn test_unsupported_algorithm_names_valid_set() {
        let err = Algorithm::parse("louvain").unwrap_err();
        match err {
            GraphPilotError::UnsupportedAlgorithm { name, valid } => {
                assert_eq!(name, "louvain");
                assert!(valid.contains("pagerank"));
                assert!(valid.contains("betweenness"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_engine_size_normalization() {
        assert_eq!(EngineSize::normalize("E32").unwrap(), EngineSize::E32);
        assert_eq!(EngineSize::normalize(" 8 ").unwrap(), EngineSize::E8);
        assert_eq!(EngineSize::normalize("64gb").unwrap(), EngineSize::E64);
        assert_eq!(EngineSize::normalize("medium").unwrap(), EngineSize::E16);
        assert!(EngineSize::normalize("huge").is_err());
    }

    #[test]
    fn test_engine_size_smaller_and_cost() {
        assert_eq!(EngineSize::E16.smaller(), Some(EngineSize::E8));
        assert_eq!(EngineSize::E4.smaller(), None);
        let cost = EngineSize::E16.estimate_cost(1800.0);
        assert!((cost - 0.40).abs() < 1e-9);
    }

    #[test]
    fn test_config_rejects_unknown_algorithm() {
        assert!(AnalysisConfig::new("x", "kcore").is_err());
    }

    #[test]
    fn test_template_to_config_uses_defaults() {
        let template = AnalysisTemplate {
            name: "influencers".into(),
            description: String::new(),
            use_case_id: None,
            algorithm: "pagerank".into(),
            params: serde_json::Map::new(),
            vertex_collections: vec!["users".into()],
            edge_collections: vec!["follows".into()],
            vertex_attributes: vec![],
            engine_size: Some("E8".into()),
            target_collection: None,
            database: None,
            max_retries: None,
            timeout_secs: Some(60),
        };
        let defaults = AnalysisDefaults {
            database: "social".into(),
            ..AnalysisDefaults::default()
        };
        let config = template.to_analysis_config(&defaults).unwrap();
        assert_eq!(config.algorithm, Algorithm::PageRank);
        assert_eq!(config.database, "social");
        assert_eq!(config.engine_size, EngineSize::E8);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.timeout_secs, 60);
        assert_eq!(config.target_collection, "pagerank_results");
    }

    #[test]
    fn test_template_without_vertices_is_rejected() {
        let template: AnalysisTemplate = serde_json::from_value(serde_json::json!({
            "name": "empty",
            "algorithm": "wcc",
            "vertex_collections": [],
            "edge_collections": []
        }))
        .unwrap();
        assert!(template
            .to_analysis_config(&AnalysisDefaults::default())
            .is_err());
    }
}
