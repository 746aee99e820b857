//! Fakes and fixtures shared by the graphpilot test suites.

mod collaborators;
mod engine;

pub use collaborators::{social_schema, FakeCollaborators};
pub use engine::{FakeEngine, FakeFailure};

use graphpilot_core::analysis::AnalysisTemplate;
use graphpilot_core::config::{BackoffConfig, EngineConfig, JobsConfig};

/// Engine settings with credentials present and millisecond polling.
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        client_id: Some("test-client".into()),
        client_secret: Some("test-secret".into()),
        poll_interval_ms: 1,
        deploy_timeout_secs: 5,
        ..EngineConfig::default()
    }
}

/// Job settings with near-zero backoff.
pub fn fast_jobs_config() -> JobsConfig {
    JobsConfig {
        backoff: BackoffConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..JobsConfig::default()
    }
}

/// A template over the `users`/`follows` fixture graph.
pub fn social_template(name: &str, algorithm: &str) -> AnalysisTemplate {
    AnalysisTemplate {
        name: name.to_string(),
        description: String::new(),
        use_case_id: None,
        algorithm: algorithm.to_string(),
        params: serde_json::Map::new(),
        vertex_collections: vec!["users".into()],
        edge_collections: vec!["follows".into()],
        vertex_attributes: vec![],
        engine_size: None,
        target_collection: Some(format!("{}_results", name)),
        database: Some("social".into()),
        max_retries: None,
        timeout_secs: None,
    }
}
