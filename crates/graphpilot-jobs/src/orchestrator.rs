use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use graphpilot_core::analysis::{AnalysisConfig, EngineSize};
use graphpilot_core::config::{BackoffConfig, JobsConfig};
use graphpilot_core::error::{ErrorKind, GraphPilotError, Result};
use graphpilot_core::event::{EventBus, WorkflowEvent};
use graphpilot_core::job::{AnalysisResult, AnalysisStatus};
use graphpilot_core::traits::DocumentStore;
use graphpilot_core::types::EngineLease;
use graphpilot_engine::EngineClient;

use crate::classify::is_retryable;
use crate::validation::validate_results;

/// Drives one analysis at a time through deploy, load, run, store and
/// validate, with bounded retries and guaranteed engine teardown.
///
/// Safe to share between concurrent runs: each run leases its own engine
/// from the `EngineClient` and owns its `AnalysisResult` until it is
/// appended to history.
pub struct JobOrchestrator {
    engine: Arc<EngineClient>,
    store: Arc<dyn DocumentStore>,
    config: JobsConfig,
    event_bus: Arc<EventBus>,
    history: Mutex<Vec<AnalysisResult>>,
}

/// Per-run retry bookkeeping.
struct RunState {
    held: Option<EngineLease>,
    size: EngineSize,
    timed_out: bool,
}

fn calculate_backoff(attempt: u32, config: &BackoffConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl JobOrchestrator {
    pub fn new(
        engine: Arc<EngineClient>,
        store: Arc<dyn DocumentStore>,
        config: JobsConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            engine,
            store,
            config,
            event_bus,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<EngineClient> {
        &self.engine
    }

    pub fn jobs_config(&self) -> &JobsConfig {
        &self.config
    }

    /// Every finished run, oldest first.
    pub fn history(&self) -> Vec<AnalysisResult> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Run one analysis to a terminal status.
    ///
    /// Never returns an error: failures are recorded on the result. An
    /// engine that could not be deleted is reported in `cleanup_error`.
    pub async fn run_analysis(&self, config: &AnalysisConfig) -> AnalysisResult {
        let mut result = AnalysisResult::new(config);
        let started = Instant::now();
        info!(
            job_id = %result.job_id,
            analysis = %config.name,
            algorithm = %config.algorithm,
            size = %config.engine_size,
            "Starting analysis"
        );
        self.set_status(&mut result, AnalysisStatus::Pending);

        if let Err(e) = self.preflight().await {
            error!(job_id = %result.job_id, error = %e, "Preflight check failed");
            result.error = Some(e.to_string());
            return self.finish(result, AnalysisStatus::Failed, started);
        }

        let mut run = RunState {
            held: None,
            size: config.engine_size,
            timed_out: false,
        };
        let max_retries = config.retry.max_retries;

        let outcome = loop {
            match self.attempt(config, &mut run, &mut result).await {
                Ok(()) => break AnalysisStatus::Completed,
                Err(e) => {
                    let timeout = e.kind() == ErrorKind::Timeout;
                    let retryable = is_retryable(&e) && !(timeout && run.timed_out);
                    result.error = Some(e.to_string());

                    if !retryable {
                        error!(job_id = %result.job_id, error = %e, "Non-retryable failure");
                        break AnalysisStatus::Failed;
                    }
                    if result.retry_count >= max_retries {
                        error!(
                            job_id = %result.job_id,
                            retries = result.retry_count,
                            error = %e,
                            "Retries exhausted"
                        );
                        break AnalysisStatus::Failed;
                    }

                    if timeout {
                        run.timed_out = true;
                        if let Some(lease) = run.held.take() {
                            self.teardown(lease, &mut result).await;
                        }
                        if let Some(smaller) = run.size.smaller() {
                            info!(job_id = %result.job_id, from = %run.size, to = %smaller, "Downsizing engine after timeout");
                            run.size = smaller;
                        }
                    }

                    let backoff = calculate_backoff(result.retry_count, &self.config.backoff);
                    result.retry_count += 1;
                    warn!(
                        job_id = %result.job_id,
                        attempt = result.retry_count,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying analysis"
                    );
                    self.event_bus.publish(WorkflowEvent::JobRetry {
                        job_id: result.job_id.clone(),
                        attempt: result.retry_count,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        if let Some(lease) = run.held.take() {
            self.set_status(&mut result, AnalysisStatus::CleaningUp);
            if config.cleanup.should_delete() {
                self.teardown(lease, &mut result).await;
            } else {
                info!(engine_id = %lease.id, "Cleanup disabled, leaving engine running");
                self.engine.release(&lease.id);
            }
        }

        if outcome == AnalysisStatus::Completed {
            result.error = None;
        }
        result.engine_size = run.size;
        self.finish(result, outcome, started)
    }

    /// Checks performed once per run, outside the retry loop.
    async fn preflight(&self) -> Result<()> {
        self.engine.acquire_session().await?;

        let engine_config = self.engine.config();
        if engine_config.exclusive && !engine_config.prefer_reuse {
            let running = self.engine.running_engines().await?;
            if !running.is_empty() {
                let ids: Vec<&str> = running.iter().map(|e| e.id.as_str()).collect();
                return Err(GraphPilotError::EngineConflict(format!(
                    "exclusive deployment requested but engines already running: {}",
                    ids.join(", ")
                )));
            }
        }
        Ok(())
    }

    async fn attempt(
        &self,
        config: &AnalysisConfig,
        run: &mut RunState,
        result: &mut AnalysisResult,
    ) -> Result<()> {
        let job_timeout = Duration::from_secs(config.retry.timeout_secs);

        // Deploy
        self.set_status(result, AnalysisStatus::Deploying);
        let phase = Instant::now();
        let lease = self.acquire_engine(run, result).await?;
        result.timings.deploy_secs = Some(phase.elapsed().as_secs_f64());

        // Load
        self.set_status(result, AnalysisStatus::LoadingGraph);
        let phase = Instant::now();
        let loaded = self
            .engine
            .load_graph(
                &lease,
                &config.database,
                &config.vertex_collections,
                &config.edge_collections,
                &config.vertex_attributes,
            )
            .await?;
        result.graph_id = Some(loaded.graph_id.clone());
        result.load_job_id = Some(loaded.job_id.clone());
        self.engine
            .wait_for_job(&lease, &loaded.job_id, job_timeout)
            .await?;
        match self.engine.graph_stats(&lease, &loaded.graph_id).await {
            Ok(stats) => {
                result.vertex_count = Some(stats.vertex_count);
                result.edge_count = Some(stats.edge_count);
            }
            Err(e) => warn!(graph_id = %loaded.graph_id, error = %e, "Could not read graph statistics"),
        }
        result.timings.load_secs = Some(phase.elapsed().as_secs_f64());

        // Run
        self.set_status(result, AnalysisStatus::RunningAlgorithm);
        let phase = Instant::now();
        let algorithm_job = self
            .engine
            .run_algorithm(&lease, config.algorithm.as_str(), &loaded.graph_id, &config.params)
            .await?;
        result.algorithm_job_id = Some(algorithm_job.clone());
        self.engine
            .wait_for_job(&lease, &algorithm_job, job_timeout)
            .await?;
        result.timings.execute_secs = Some(phase.elapsed().as_secs_f64());

        // Store
        self.set_status(result, AnalysisStatus::StoringResults);
        let phase = Instant::now();
        let store_job = self
            .engine
            .store_results(
                &lease,
                &config.target_collection,
                &[algorithm_job],
                &[config.algorithm.result_attribute().to_string()],
                &config.database,
            )
            .await?;
        result.store_job_id = Some(store_job.clone());
        let stored = self
            .engine
            .wait_for_job(&lease, &store_job, job_timeout)
            .await?;
        result.documents_updated = stored.documents_updated.unwrap_or(0);
        result.timings.store_secs = Some(phase.elapsed().as_secs_f64());

        validate_results(
            self.store.as_ref(),
            config,
            result.documents_updated,
            self.config.validation_sample_size,
        )
        .await
    }

    /// Keep the engine held from a previous attempt if it still answers,
    /// otherwise lease a fresh one.
    async fn acquire_engine(
        &self,
        run: &mut RunState,
        result: &mut AnalysisResult,
    ) -> Result<EngineLease> {
        if let Some(lease) = run.held.take() {
            if self.engine.probe(&lease).await {
                debug!(engine_id = %lease.id, "Keeping engine from previous attempt");
                run.held = Some(lease.clone());
                return Ok(lease);
            }
            warn!(engine_id = %lease.id, "Held engine stopped answering, replacing it");
            self.teardown(lease, result).await;
        }

        let lease = self
            .engine
            .ensure_engine(self.engine.config().prefer_reuse, run.size)
            .await?;
        result.engine_id = Some(lease.id.clone());
        result.engine_reused = lease.reused;
        self.event_bus.publish(WorkflowEvent::EngineAcquired {
            engine_id: lease.id.clone(),
            reused: lease.reused,
        });
        run.held = Some(lease.clone());
        Ok(lease)
    }

    /// Delete an engine; a failure is escalated on the result, never swallowed.
    async fn teardown(&self, lease: EngineLease, result: &mut AnalysisResult) {
        match self.engine.delete_engine(&lease.id).await {
            Ok(()) => {
                self.event_bus.publish(WorkflowEvent::EngineDeleted {
                    engine_id: lease.id.clone(),
                });
            }
            Err(e) => {
                let escalated = GraphPilotError::EngineCleanup {
                    engine_id: lease.id.clone(),
                    message: e.to_string(),
                };
                error!(engine_id = %lease.id, job_id = %result.job_id, error = %escalated, "ENGINE CLEANUP FAILED");
                self.engine.release(&lease.id);
                self.event_bus.publish(WorkflowEvent::EngineCleanupFailed {
                    engine_id: lease.id.clone(),
                    error: e.to_string(),
                });
                result.cleanup_error = Some(escalated.to_string());
            }
        }
    }

    fn set_status(&self, result: &mut AnalysisResult, status: AnalysisStatus) {
        result.status = status;
        debug!(job_id = %result.job_id, status = %status, "Analysis status");
        self.event_bus.publish(WorkflowEvent::JobStatusChanged {
            job_id: result.job_id.clone(),
            analysis: result.analysis_name.clone(),
            status,
        });
    }

    fn finish(
        &self,
        mut result: AnalysisResult,
        status: AnalysisStatus,
        started: Instant,
    ) -> AnalysisResult {
        let elapsed = started.elapsed().as_secs_f64();
        result.completed_at = Some(Utc::now());
        result.elapsed_secs = Some(elapsed);
        if result.engine_id.is_some() {
            result.estimated_cost = Some(result.engine_size.estimate_cost(elapsed));
        }
        self.set_status(&mut result, status);

        match status {
            AnalysisStatus::Completed => info!(
                job_id = %result.job_id,
                analysis = %result.analysis_name,
                retries = result.retry_count,
                documents = result.documents_updated,
                elapsed_secs = elapsed,
                "Analysis completed"
            ),
            _ => warn!(
                job_id = %result.job_id,
                analysis = %result.analysis_name,
                retries = result.retry_count,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Analysis failed"
            ),
        }

        if let Ok(mut history) = self.history.lock() {
            history.push(result.clone());
        }
        result
    }
}
