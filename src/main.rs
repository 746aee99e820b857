use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use graphpilot_agents::{WorkflowRunner, WorkflowStatus};
use graphpilot_core::analysis::AnalysisConfig;
use graphpilot_core::artifacts::InputDocument;
use graphpilot_core::config::AppConfig;
use graphpilot_core::event::EventBus;
use graphpilot_engine::{EngineClient, HttpDocumentStore, HttpEngineApi};
use graphpilot_jobs::JobOrchestrator;

#[derive(Parser)]
#[command(name = "graphpilot", version, about = "Agent-driven graph analytics on a remote compute engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "graphpilot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full agent workflow over the given documents
    Run {
        /// Requirement documents (markdown or plain text)
        #[arg(long = "docs")]
        docs: Vec<PathBuf>,
        /// Run independent steps and fan-out steps concurrently
        #[arg(long)]
        parallel: bool,
        /// Maximum number of templates to execute
        #[arg(long)]
        max_executions: Option<usize>,
        /// Write the exported workflow state to this file
        #[arg(long)]
        export: Option<PathBuf>,
        /// Write trace files to this directory
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },
    /// Run one analysis on the engine
    Analyze {
        /// Analysis name
        #[arg(long)]
        name: String,
        /// Algorithm (pagerank, wcc, scc, label_propagation, betweenness)
        #[arg(long)]
        algorithm: String,
        /// Vertex collections
        #[arg(long = "vertex", required = true)]
        vertices: Vec<String>,
        /// Edge collections
        #[arg(long = "edge", required = true)]
        edges: Vec<String>,
        /// Engine size class (e4 .. e128)
        #[arg(long)]
        size: Option<String>,
        /// Collection receiving the results
        #[arg(long)]
        target: Option<String>,
        /// Database name (defaults to [database].name)
        #[arg(long)]
        database: Option<String>,
        /// Algorithm parameter as key=value; values are parsed as JSON when possible
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Manage engines on the platform
    Engines {
        #[command(subcommand)]
        action: EnginesAction,
    },
    /// Validate and print the resolved configuration
    CheckConfig,
}

#[derive(Subcommand)]
enum EnginesAction {
    /// List engines
    List,
    /// Delete an engine
    Delete {
        /// Engine id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("graphpilot=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            docs,
            parallel,
            max_executions,
            export,
            trace_dir,
        } => {
            let mut config = config;
            if let Some(path) = export {
                config.workflow.export_path = Some(path.display().to_string());
            }
            if let Some(dir) = trace_dir {
                config.workflow.trace_dir = Some(dir.display().to_string());
            }
            let parallel = parallel || config.workflow.enable_parallelism;
            run_workflow(config, &docs, parallel, max_executions).await
        }
        Commands::Analyze {
            name,
            algorithm,
            vertices,
            edges,
            size,
            target,
            database,
            params,
        } => {
            let database = database.unwrap_or_else(|| config.database.name.clone());
            let mut analysis = AnalysisConfig::new(name, &algorithm)?
                .with_database(database)
                .with_collections(vertices, edges)
                .with_retry(config.jobs.max_retries, config.jobs.job_timeout_secs)
                .with_cleanup(config.jobs.cleanup);
            if let Some(size) = size {
                analysis = analysis.with_engine_size(&size)?;
            }
            if let Some(target) = target {
                analysis = analysis.with_target_collection(target);
            }
            for param in &params {
                let (key, value) = parse_param(param)?;
                analysis = analysis.with_param(key, value);
            }
            run_analysis(config, analysis).await
        }
        Commands::Engines { action } => handle_engines(config, action).await,
        Commands::CheckConfig => check_config(&config),
    }
}

/// A missing default config file falls back to built-in defaults; an
/// explicitly named one must exist.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if path == Path::new("graphpilot.toml") {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }
    anyhow::bail!("Config file not found: {}", path.display())
}

async fn run_workflow(
    config: AppConfig,
    docs: &[PathBuf],
    parallel: bool,
    max_executions: Option<usize>,
) -> anyhow::Result<()> {
    let mut documents = Vec::with_capacity(docs.len());
    for path in docs {
        let content = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(InputDocument::new(name, content));
    }

    let runner = WorkflowRunner::from_config(config)?;
    let state = runner
        .run_async(documents, None, max_executions, parallel)
        .await;

    println!("Run: {}", state.run_id);
    println!(
        "Completed steps: {}",
        state
            .completed_steps
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for execution in &state.execution_results {
        let result = &execution.result;
        println!(
            "  {} [{}] {} ({} documents, {} retries)",
            execution.template_name,
            result.algorithm,
            result.status,
            result.documents_updated,
            result.retry_count
        );
        if let Some(ref err) = result.error {
            println!("    error: {}", err);
        }
        if let Some(ref err) = result.cleanup_error {
            println!("    CLEANUP: {}", err);
        }
    }
    for report in &state.reports {
        println!("Report: {}", report.title);
    }
    for error in &state.errors {
        println!("Error [{}]: {}", error.agent, error.error);
    }

    if state.status == WorkflowStatus::Aborted {
        anyhow::bail!("workflow aborted after {} steps", state.completed_steps.len());
    }
    info!(run_id = %state.run_id, "Workflow finished");
    Ok(())
}

async fn run_analysis(config: AppConfig, analysis: AnalysisConfig) -> anyhow::Result<()> {
    let api = Arc::new(HttpEngineApi::new(&config.engine)?);
    let store = Arc::new(HttpDocumentStore::new(&config.database));
    let engine = Arc::new(EngineClient::new(api, config.engine.clone()));
    let orchestrator = JobOrchestrator::new(
        engine,
        store,
        config.jobs.clone(),
        Arc::new(EventBus::default()),
    );

    let result = orchestrator.run_analysis(&analysis).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(ref err) = result.cleanup_error {
        eprintln!("{}", err);
    }
    if !result.succeeded() {
        anyhow::bail!(
            "analysis {} {}: {}",
            result.analysis_name,
            result.status,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn handle_engines(config: AppConfig, action: EnginesAction) -> anyhow::Result<()> {
    let api = Arc::new(HttpEngineApi::new(&config.engine)?);
    let client = EngineClient::new(api, config.engine);

    match action {
        EnginesAction::List => {
            let engines = client.list_engines().await?;
            if engines.is_empty() {
                println!("No engines.");
            }
            for engine in engines {
                let state = if engine.status.failed {
                    "failed"
                } else if engine.status.is_ready() {
                    "ready"
                } else {
                    "starting"
                };
                println!(
                    "{}  {}  {}",
                    engine.id,
                    engine.size_class.as_deref().unwrap_or("-"),
                    state
                );
            }
        }
        EnginesAction::Delete { id } => {
            client.delete_engine(&id).await?;
            println!("Deleted engine {}", id);
        }
    }
    Ok(())
}

fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    let mut problems = Vec::new();
    if config.engine.client_id.is_none() || config.engine.client_secret.is_none() {
        problems.push("engine.client_id and engine.client_secret must both be set");
    }
    if config.database.vertex_collections.is_empty() {
        problems.push("database.vertex_collections is empty; the workflow has no graph to analyse");
    }
    for format in &config.workflow.trace_formats {
        if !matches!(format.as_str(), "json" | "jsonl" | "summary") {
            warn!(format = %format, "Unknown trace format");
        }
    }

    println!("{}", config_preview(config)?);
    if problems.is_empty() {
        println!("Configuration OK");
        return Ok(());
    }
    for problem in &problems {
        println!("  - {}", problem);
    }
    anyhow::bail!("{} configuration problem(s)", problems.len())
}

/// Resolved config as JSON with secrets masked.
fn config_preview(config: &AppConfig) -> anyhow::Result<String> {
    let mut value = serde_json::to_value(config)?;
    for pointer in ["/engine/client_secret", "/database/password"] {
        if let Some(secret) = value.pointer_mut(pointer) {
            if !secret.is_null() {
                *secret = serde_json::Value::String("********".into());
            }
        }
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

fn parse_param(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid --param '{}', expected key=value", raw))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_values() {
        assert_eq!(parse_param("damping=0.85").unwrap().1, serde_json::json!(0.85));
        assert_eq!(parse_param("mode=fast").unwrap().1, serde_json::json!("fast"));
        assert!(parse_param("broken").is_err());
    }

    #[test]
    fn test_preview_masks_secrets() {
        let mut config = AppConfig::default();
        config.engine.client_secret = Some("hunter2".into());
        let preview = config_preview(&config).unwrap();
        assert!(!preview.contains("hunter2"));
        assert!(preview.contains("********"));
    }
}
