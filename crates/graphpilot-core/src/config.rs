use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisDefaults, CleanupPolicy, EngineSize, RetryPolicy};
use crate::error::{GraphPilotError, Result};

/// Top-level graphpilot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Remote engine platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Engine family eligible for reuse.
    #[serde(default = "default_family")]
    pub family: String,
    /// Adopt a healthy running engine instead of deploying.
    #[serde(default = "default_prefer_reuse")]
    pub prefer_reuse: bool,
    /// The deployment target allows a single engine at a time.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Sessions older than this are refreshed regardless of expiry.
    #[serde(default = "default_token_max_age")]
    pub token_max_age_secs: u64,
    #[serde(default = "default_token_refresh_margin")]
    pub token_refresh_margin_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            client_id: None,
            client_secret: None,
            family: default_family(),
            prefer_reuse: default_prefer_reuse(),
            exclusive: false,
            deploy_timeout_secs: default_deploy_timeout(),
            poll_interval_ms: default_poll_interval(),
            token_max_age_secs: default_token_max_age(),
            token_refresh_margin_secs: default_token_refresh_margin(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_url() -> String { "http://localhost:8829".to_string() }
fn default_family() -> String { "gral".to_string() }
fn default_prefer_reuse() -> bool { true }
fn default_deploy_timeout() -> u64 { 600 }
fn default_poll_interval() -> u64 { 2000 }
fn default_token_max_age() -> u64 { 3600 }
fn default_token_refresh_margin() -> u64 { 60 }
fn default_request_timeout() -> u64 { 60 }

/// Database holding the graph and receiving results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Collections to analyse. Empty means "discover".
    #[serde(default)]
    pub vertex_collections: Vec<String>,
    #[serde(default)]
    pub edge_collections: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: default_db_endpoint(),
            name: default_db_name(),
            username: default_db_user(),
            password: None,
            vertex_collections: vec![],
            edge_collections: vec![],
        }
    }
}

fn default_db_endpoint() -> String { "http://localhost:8529".to_string() }
fn default_db_name() -> String { "_system".to_string() }
fn default_db_user() -> String { "root".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Analysis job execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default)]
    pub default_engine_size: EngineSize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    #[serde(default)]
    pub cleanup: CleanupPolicy,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Documents read back when validating results.
    #[serde(default = "default_validation_sample")]
    pub validation_sample_size: usize,
    /// Documents collected per successful execution.
    #[serde(default = "default_max_result_documents")]
    pub max_result_documents: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_engine_size: EngineSize::default(),
            max_retries: default_max_retries(),
            job_timeout_secs: default_job_timeout(),
            cleanup: CleanupPolicy::default(),
            backoff: BackoffConfig::default(),
            validation_sample_size: default_validation_sample(),
            max_result_documents: default_max_result_documents(),
        }
    }
}

fn default_max_retries() -> u32 { 2 }
fn default_job_timeout() -> u64 { 3600 }
fn default_validation_sample() -> usize { 100 }
fn default_max_result_documents() -> usize { 100 }

impl JobsConfig {
    /// Defaults applied to templates that leave fields unset.
    pub fn analysis_defaults(&self, database: &str) -> AnalysisDefaults {
        AnalysisDefaults {
            database: database.to_string(),
            engine_size: self.default_engine_size,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                timeout_secs: self.job_timeout_secs,
            },
            cleanup: self.cleanup,
        }
    }
}

/// Agent workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_executions")]
    pub max_executions: usize,
    #[serde(default)]
    pub enable_parallelism: bool,
    /// Write trace files here after each run.
    #[serde(default)]
    pub trace_dir: Option<String>,
    /// Any of "json", "jsonl", "summary".
    #[serde(default = "default_trace_formats")]
    pub trace_formats: Vec<String>,
    /// Write the exported workflow state here after each run.
    #[serde(default)]
    pub export_path: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_executions: default_max_executions(),
            enable_parallelism: false,
            trace_dir: None,
            trace_formats: default_trace_formats(),
            export_path: None,
        }
    }
}

fn default_max_executions() -> usize { 3 }
fn default_trace_formats() -> Vec<String> { vec!["json".to_string(), "summary".to_string()] }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GraphPilotError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded)
            .map_err(|e| GraphPilotError::Configuration(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    tracing::warn!(var = %var_name, "Config references an unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
