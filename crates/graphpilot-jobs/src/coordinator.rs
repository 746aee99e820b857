use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use graphpilot_core::analysis::{AnalysisConfig, AnalysisDefaults, AnalysisTemplate};
use graphpilot_core::error::Result;
use graphpilot_core::job::{AnalysisResult, ExecutionResult};
use graphpilot_core::traits::DocumentStore;

use crate::orchestrator::JobOrchestrator;

/// Aggregate metrics over every finished execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub average_execution_secs: f64,
    pub total_estimated_cost: f64,
}

/// Turns templates into orchestrator runs and keeps their history.
pub struct ExecutionCoordinator {
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<dyn DocumentStore>,
    defaults: AnalysisDefaults,
    max_result_documents: usize,
    history: Arc<Mutex<Vec<ExecutionResult>>>,
    pending: tokio::sync::Mutex<Vec<JoinHandle<ExecutionResult>>>,
}

impl ExecutionCoordinator {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        store: Arc<dyn DocumentStore>,
        defaults: AnalysisDefaults,
    ) -> Self {
        let max_result_documents = orchestrator.jobs_config().max_result_documents;
        Self {
            orchestrator,
            store,
            defaults,
            max_result_documents,
            history: Arc::new(Mutex::new(Vec::new())),
            pending: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_result_documents(mut self, max: usize) -> Self {
        self.max_result_documents = max;
        self
    }

    pub fn defaults(&self) -> &AnalysisDefaults {
        &self.defaults
    }

    /// Execute one template.
    ///
    /// With `wait` the call returns the finished execution. Without it the
    /// run is spawned and a `Pending` record returned; the finished record
    /// lands in history and is returned by [`Self::await_pending`].
    /// Fails only if the template cannot be turned into a config.
    pub async fn execute_template(
        &self,
        template: &AnalysisTemplate,
        wait: bool,
    ) -> Result<ExecutionResult> {
        let config = template.to_analysis_config(&self.defaults)?;
        let record = ExecutionResult {
            template_name: template.name.clone(),
            use_case_id: template.use_case_id.clone(),
            database: config.database.clone(),
            target_collection: config.target_collection.clone(),
            result: AnalysisResult::new(&config),
            sample_documents: vec![],
            submitted_at: Utc::now(),
        };
        info!(
            template = %template.name,
            algorithm = %config.algorithm,
            wait,
            "Submitting template"
        );

        let run = ExecutionRun {
            orchestrator: self.orchestrator.clone(),
            store: self.store.clone(),
            history: self.history.clone(),
            max_result_documents: self.max_result_documents,
        };

        if wait {
            return Ok(run.execute(config, record).await);
        }

        let pending = record.clone();
        let handle = tokio::spawn(async move { run.execute(config, record).await });
        self.pending.lock().await.push(handle);
        Ok(pending)
    }

    /// Wait for every run submitted without `wait`.
    pub async fn await_pending(&self) -> Vec<ExecutionResult> {
        let handles: Vec<_> = self.pending.lock().await.drain(..).collect();
        let mut finished = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(execution) => finished.push(execution),
                Err(e) => warn!(error = %e, "Background execution task failed"),
            }
        }
        finished
    }

    /// Run templates one after another, each fully isolated.
    pub async fn execute_batch(
        &self,
        templates: &[AnalysisTemplate],
    ) -> Vec<Result<ExecutionResult>> {
        let mut results = Vec::with_capacity(templates.len());
        for template in templates {
            results.push(self.execute_template(template, true).await);
        }
        results
    }

    pub fn history(&self) -> Vec<ExecutionResult> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn get_execution_summary(&self) -> ExecutionSummary {
        let history = self.history();
        let total = history.len();
        if total == 0 {
            return ExecutionSummary::default();
        }
        let completed = history.iter().filter(|e| e.succeeded()).count();
        let elapsed: Vec<f64> = history
            .iter()
            .filter_map(|e| e.result.elapsed_secs)
            .collect();
        let average_execution_secs = if elapsed.is_empty() {
            0.0
        } else {
            elapsed.iter().sum::<f64>() / elapsed.len() as f64
        };
        ExecutionSummary {
            total,
            completed,
            failed: total - completed,
            success_rate: completed as f64 / total as f64,
            average_execution_secs,
            total_estimated_cost: history
                .iter()
                .filter_map(|e| e.result.estimated_cost)
                .sum(),
        }
    }
}

/// Owned handles needed to finish one execution, spawnable on its own.
struct ExecutionRun {
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<dyn DocumentStore>,
    history: Arc<Mutex<Vec<ExecutionResult>>>,
    max_result_documents: usize,
}

impl ExecutionRun {
    async fn execute(self, config: AnalysisConfig, mut record: ExecutionResult) -> ExecutionResult {
        record.result = self.orchestrator.run_analysis(&config).await;

        if record.succeeded() && self.max_result_documents > 0 {
            match self
                .store
                .sample_documents(
                    config.database.clone(),
                    config.target_collection.clone(),
                    self.max_result_documents,
                )
                .await
            {
                Ok(docs) => record.sample_documents = docs,
                Err(e) => warn!(
                    template = %record.template_name,
                    error = %e,
                    "Could not collect result documents"
                ),
            }
        }

        if let Ok(mut history) = self.history.lock() {
            history.push(record.clone());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphpilot_core::event::EventBus;
    use graphpilot_core::job::AnalysisStatus;
    use graphpilot_engine::EngineClient;
    use graphpilot_test_utils::{
        fast_engine_config, fast_jobs_config, social_template, FakeEngine, FakeFailure,
    };
    use serde_json::json;

    fn coordinator(fake: &Arc<FakeEngine>) -> ExecutionCoordinator {
        let client = Arc::new(EngineClient::new(fake.clone(), fast_engine_config()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            client,
            fake.clone(),
            fast_jobs_config(),
            Arc::new(EventBus::default()),
        ));
        ExecutionCoordinator::new(orchestrator, fake.clone(), AnalysisDefaults::default())
    }

    fn seed_results(fake: &FakeEngine, name: &str) {
        fake.set_results(
            &format!("{}_results", name),
            vec![
                json!({"id": "users/1", "component": 1, "pagerank": 0.5}),
                json!({"id": "users/2", "component": 1, "pagerank": 0.3}),
                json!({"id": "users/3", "component": 2, "pagerank": 0.2}),
            ],
        );
    }

    #[tokio::test]
    async fn waiting_execution_collects_documents() {
        let fake = Arc::new(FakeEngine::new());
        seed_results(&fake, "communities");
        let coordinator = coordinator(&fake).with_max_result_documents(2);

        let execution = coordinator
            .execute_template(&social_template("communities", "wcc"), true)
            .await
            .unwrap();

        assert!(execution.succeeded());
        assert_eq!(execution.database, "social");
        assert_eq!(execution.sample_documents.len(), 2);
        assert_eq!(coordinator.history().len(), 1);
    }

    #[tokio::test]
    async fn background_execution_is_joined_by_await_pending() {
        let fake = Arc::new(FakeEngine::new());
        seed_results(&fake, "ranking");
        let coordinator = coordinator(&fake);

        let pending = coordinator
            .execute_template(&social_template("ranking", "pagerank"), false)
            .await
            .unwrap();
        assert_eq!(pending.result.status, AnalysisStatus::Pending);

        let finished = coordinator.await_pending().await;
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].result.status, AnalysisStatus::Completed);
        assert_eq!(coordinator.history().len(), 1);
    }

    #[tokio::test]
    async fn invalid_template_is_rejected_before_running() {
        let fake = Arc::new(FakeEngine::new());
        let coordinator = coordinator(&fake);

        let err = coordinator
            .execute_template(&social_template("bad", "louvain"), true)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("pagerank"));
        assert_eq!(fake.calls(FakeEngine::DEPLOY_ENGINE), 0);
        assert!(coordinator.history().is_empty());
    }

    #[tokio::test]
    async fn batch_runs_are_isolated() {
        let fake = Arc::new(FakeEngine::new());
        seed_results(&fake, "first");
        seed_results(&fake, "second");
        fake.fail_next(FakeEngine::LOAD_GRAPH, FakeFailure::Configuration, 1);
        let coordinator = coordinator(&fake);

        let results = coordinator
            .execute_batch(&[
                social_template("first", "wcc"),
                social_template("second", "wcc"),
            ])
            .await;

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert!(!first.succeeded());
        assert!(second.succeeded());
        assert_ne!(first.result.engine_id, second.result.engine_id);
        assert_eq!(fake.calls(FakeEngine::DEPLOY_ENGINE), 2);
        assert_eq!(fake.calls(FakeEngine::DELETE_ENGINE), 2);

        let summary = coordinator.get_execution_summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn concurrent_runs_never_share_an_engine() {
        let fake = Arc::new(FakeEngine::new());
        fake.set_latency(std::time::Duration::from_millis(20));
        seed_results(&fake, "a");
        seed_results(&fake, "b");
        let coordinator = coordinator(&fake);
        let a = social_template("a", "wcc");
        let b = social_template("b", "wcc");

        let (ra, rb) = tokio::join!(
            coordinator.execute_template(&a, true),
            coordinator.execute_template(&b, true)
        );

        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert!(ra.succeeded() && rb.succeeded());
        assert_ne!(ra.result.engine_id, rb.result.engine_id);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let fake = Arc::new(FakeEngine::new());
        let summary = coordinator(&fake).get_execution_summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
    }
}
