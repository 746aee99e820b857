use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{info, warn};

use graphpilot_core::artifacts::InputDocument;
use graphpilot_core::config::{AppConfig, DatabaseConfig};
use graphpilot_core::error::Result;
use graphpilot_core::event::EventBus;
use graphpilot_core::traits::{DocumentStore, EngineApi};
use graphpilot_engine::{EngineClient, HttpDocumentStore, HttpEngineApi};
use graphpilot_jobs::{ExecutionCoordinator, JobOrchestrator};

use crate::collaborators::Collaborators;
use crate::runtime::AgentRuntime;
use crate::state::WorkflowState;
use crate::supervisor::AgentSupervisor;
use crate::trace::{export_entries, TraceEntry, TraceRecorder};

/// Wires the engine client, job layers and agents, and runs workflows.
pub struct WorkflowRunner {
    config: AppConfig,
    event_bus: Arc<EventBus>,
    engine: Arc<EngineClient>,
    coordinator: Arc<ExecutionCoordinator>,
    supervisor: AgentSupervisor,
    last_trace: Mutex<Vec<TraceEntry>>,
}

impl WorkflowRunner {
    pub fn new(
        config: AppConfig,
        api: Arc<dyn EngineApi>,
        store: Arc<dyn DocumentStore>,
        collaborators: Collaborators,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let engine = Arc::new(EngineClient::new(api, config.engine.clone()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            engine.clone(),
            store.clone(),
            config.jobs.clone(),
            event_bus.clone(),
        ));
        let coordinator = Arc::new(
            ExecutionCoordinator::new(
                orchestrator,
                store,
                config.jobs.analysis_defaults(&config.database.name),
            )
            .with_max_result_documents(config.jobs.max_result_documents),
        );
        let runtime = Arc::new(AgentRuntime::standard(collaborators, coordinator.clone()));
        let supervisor = AgentSupervisor::new(runtime, event_bus.clone());

        Self {
            config,
            event_bus,
            engine,
            coordinator,
            supervisor,
            last_trace: Mutex::new(Vec::new()),
        }
    }

    /// HTTP transports and the baseline collaborators.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let api = Arc::new(HttpEngineApi::new(&config.engine)?);
        let store = Arc::new(HttpDocumentStore::new(&config.database));
        Ok(Self::new(config, api, store, Collaborators::baseline()))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn engine(&self) -> &Arc<EngineClient> {
        &self.engine
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    /// Run every step sequentially.
    ///
    /// Always returns the state, aborted runs included, so partial
    /// artifacts and errors can be inspected.
    pub async fn run(
        &self,
        documents: Vec<InputDocument>,
        database: Option<DatabaseConfig>,
        max_executions: Option<usize>,
    ) -> WorkflowState {
        self.run_async(documents, database, max_executions, false).await
    }

    /// Run with parallel phases when `enable_parallelism` is set.
    pub async fn run_async(
        &self,
        documents: Vec<InputDocument>,
        database: Option<DatabaseConfig>,
        max_executions: Option<usize>,
        enable_parallelism: bool,
    ) -> WorkflowState {
        let mut state = WorkflowState::new(
            documents,
            database.unwrap_or_else(|| self.config.database.clone()),
            max_executions.unwrap_or(self.config.workflow.max_executions),
        );
        info!(
            run_id = %state.run_id,
            documents = state.input_documents.len(),
            max_executions = state.max_executions,
            parallel = enable_parallelism,
            "Starting workflow run"
        );

        let mut recorder = TraceRecorder::start(&self.event_bus);
        let last = self
            .supervisor
            .run_workflow_async(&mut state, enable_parallelism)
            .await;
        recorder.stop().await;

        let entries = recorder.entries().await;
        info!(
            run_id = %state.run_id,
            outcome = last.kind.as_str(),
            completed = state.completed_steps.len(),
            errors = state.errors.len(),
            events = entries.len(),
            "Workflow run finished"
        );
        self.store_trace(entries);
        self.write_configured_outputs(&state).await;
        state
    }

    pub fn export_state(&self, state: &WorkflowState) -> Value {
        state.export_state()
    }

    /// Write the trace of the most recent run.
    pub async fn export_trace(&self, dir: &Path, formats: &[String]) -> Result<Vec<PathBuf>> {
        let entries = self.trace_entries();
        export_entries(&entries, dir, formats).await
    }

    /// Trace of the most recent run.
    pub fn trace_entries(&self) -> Vec<TraceEntry> {
        match self.last_trace.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_trace(&self, entries: Vec<TraceEntry>) {
        match self.last_trace.lock() {
            Ok(mut guard) => *guard = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
    }

    /// Export state and trace where `[workflow]` asks for them. Failures
    /// here never fail the run.
    async fn write_configured_outputs(&self, state: &WorkflowState) {
        let workflow = &self.config.workflow;
        if let Some(ref path) = workflow.export_path {
            if let Err(e) = state.save_state(Path::new(path)) {
                warn!(path = %path, error = %e, "Failed to export workflow state");
            }
        }
        if let Some(ref dir) = workflow.trace_dir {
            let dir = Path::new(dir).join(&state.run_id.0);
            if let Err(e) = self.export_trace(&dir, &workflow.trace_formats).await {
                warn!(dir = %dir.display(), error = %e, "Failed to export trace");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowStatus;
    use crate::steps::WorkflowStep;
    use graphpilot_core::job::AnalysisStatus;
    use graphpilot_test_utils::{fast_engine_config, fast_jobs_config, FakeCollaborators, FakeEngine};
    use serde_json::json;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.engine = fast_engine_config();
        config.jobs = fast_jobs_config();
        config.database.name = "social".into();
        config
    }

    fn engine_with_results() -> Arc<FakeEngine> {
        let engine = Arc::new(FakeEngine::new());
        let docs = vec![
            json!({"_id": "users/1", "component": 1, "pagerank": 0.5}),
            json!({"_id": "users/2", "component": 1, "pagerank": 0.3}),
            json!({"_id": "users/3", "component": 3, "pagerank": 0.2}),
        ];
        engine.set_results("uc-001_results", docs.clone());
        engine.set_results("uc-002_results", docs);
        engine
    }

    fn runner(config: AppConfig, engine: &Arc<FakeEngine>, fake: &Arc<FakeCollaborators>) -> WorkflowRunner {
        WorkflowRunner::new(
            config,
            engine.clone(),
            engine.clone(),
            Collaborators::from_single(fake.clone()),
        )
    }

    fn documents() -> Vec<InputDocument> {
        vec![InputDocument::new("brief.md", "- find influential users")]
    }

    #[tokio::test]
    async fn sequential_run_produces_every_artifact() {
        let engine = engine_with_results();
        let fake = Arc::new(FakeCollaborators::new());
        let runner = runner(config(), &engine, &fake);

        let state = runner.run(documents(), None, None).await;

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.completed_steps, WorkflowStep::ALL.to_vec());
        assert_eq!(state.database.name, "social");
        assert_eq!(state.execution_results.len(), 2);
        for execution in &state.execution_results {
            assert_eq!(execution.result.status, AnalysisStatus::Completed);
            assert_eq!(execution.sample_documents.len(), 3);
        }
        assert_eq!(state.reports.len(), 2);
        assert_eq!(engine.calls(FakeEngine::DEPLOY_ENGINE), 2);
        assert_eq!(engine.calls(FakeEngine::DELETE_ENGINE), 2);
        assert_eq!(runner.coordinator().get_execution_summary().completed, 2);
    }

    #[tokio::test]
    async fn max_executions_caps_the_execution_step() {
        let engine = engine_with_results();
        let fake = Arc::new(FakeCollaborators::new());
        fake.set_use_case_count(4);
        let runner = runner(config(), &engine, &fake);

        let state = runner.run_async(documents(), None, Some(1), true).await;

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.templates.len(), 4);
        assert_eq!(state.execution_results.len(), 1);
        assert_eq!(state.reports.len(), 1);
    }

    #[tokio::test]
    async fn aborted_run_still_returns_partial_state() {
        let engine = engine_with_results();
        let fake = Arc::new(FakeCollaborators::new());
        fake.fail_next(FakeCollaborators::SCHEMA, 3);
        let runner = runner(config(), &engine, &fake);

        let state = runner.run(documents(), None, None).await;

        assert_eq!(state.status, WorkflowStatus::Aborted);
        assert!(state.completed_steps.is_empty());
        assert_eq!(state.errors.len(), 3);
        assert_eq!(engine.calls(FakeEngine::DEPLOY_ENGINE), 0);
        assert!(state.messages.last().unwrap().is_error());
    }

    #[tokio::test]
    async fn run_records_trace_and_writes_configured_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.workflow.export_path = Some(dir.path().join("state.json").display().to_string());
        config.workflow.trace_dir = Some(dir.path().join("traces").display().to_string());
        config.workflow.trace_formats = vec!["json".into(), "summary".into()];

        let engine = engine_with_results();
        let fake = Arc::new(FakeCollaborators::new());
        let runner = runner(config, &engine, &fake);

        let state = runner.run_async(documents(), None, None, true).await;

        let trace = runner.trace_entries();
        assert_eq!(trace.first().map(|e| e.event.name()), Some("workflow_started"));
        assert_eq!(trace.last().map(|e| e.event.name()), Some("workflow_completed"));
        assert!(trace.iter().any(|e| e.event.name() == "engine_deleted"));

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("state.json")).unwrap())
                .unwrap();
        assert_eq!(saved["status"], "completed");
        assert_eq!(saved["reports"].as_array().unwrap().len(), 2);

        let run_dir = dir.path().join("traces").join(&state.run_id.0);
        assert!(run_dir.join("trace.json").exists());
        assert!(run_dir.join("trace_summary.md").exists());
        assert!(!run_dir.join("trace.jsonl").exists());
    }

    #[tokio::test]
    async fn export_state_matches_state() {
        let engine = engine_with_results();
        let fake = Arc::new(FakeCollaborators::new());
        let runner = runner(config(), &engine, &fake);
        let state = runner.run(documents(), None, Some(1)).await;

        let export = runner.export_state(&state);
        assert_eq!(export["completed_steps"].as_array().unwrap().len(), 6);
        assert_eq!(export["messages"][0]["type"], "start");
    }
}
