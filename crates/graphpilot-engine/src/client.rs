use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use graphpilot_core::analysis::{Algorithm, EngineSize};
use graphpilot_core::config::EngineConfig;
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::traits::EngineApi;
use graphpilot_core::types::*;

use crate::session::EngineSession;
use crate::status::normalize_job_status;

/// Authenticated session to the remote graph-compute platform.
///
/// Holds one live credential (refreshed on age or on an authorization
/// failure) and the set of engine ids currently leased by orchestrator
/// runs. A leased engine is never handed to a second run.
pub struct EngineClient {
    api: Arc<dyn EngineApi>,
    config: EngineConfig,
    session: tokio::sync::Mutex<Option<EngineSession>>,
    leases: Mutex<HashSet<String>>,
}

impl EngineClient {
    pub fn new(api: Arc<dyn EngineApi>, config: EngineConfig) -> Self {
        Self {
            api,
            config,
            session: tokio::sync::Mutex::new(None),
            leases: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Return a usable token, issuing a new credential if needed.
    pub async fn acquire_session(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        if let Some(ref session) = *guard {
            if session.is_fresh(
                Utc::now(),
                self.config.token_refresh_margin_secs,
                self.config.token_max_age_secs,
            ) {
                return Ok(session.token.clone());
            }
            debug!("Engine session expired, refreshing");
        }

        let (client_id, secret) = match (
            self.config.client_id.as_deref().filter(|s| !s.is_empty()),
            self.config.client_secret.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(id), Some(secret)) => (id.to_string(), secret.to_string()),
            _ => {
                return Err(GraphPilotError::Configuration(
                    "Missing engine credentials: set engine.client_id and engine.client_secret"
                        .into(),
                ))
            }
        };

        let credential = self
            .api
            .issue_credential(client_id, secret)
            .await
            .map_err(|e| match e {
                GraphPilotError::Auth(_) | GraphPilotError::Configuration(_) => e,
                other => GraphPilotError::Auth(format!("credential issuance failed: {}", other)),
            })?;

        let mut session = EngineSession::from_credential(credential);
        if let Some(previous) = guard.take() {
            session.engine_id = previous.engine_id;
            session.engine_url = previous.engine_url;
        }
        let token = session.token.clone();
        *guard = Some(session);
        info!("Engine session established");
        Ok(token)
    }

    /// Drop the current credential; the next call issues a new one.
    pub async fn invalidate_session(&self) {
        if let Some(ref mut session) = *self.session.lock().await {
            session.expires_at = Utc::now();
        }
    }

    /// Engine most recently acquired through this client.
    pub async fn current_engine(&self) -> Option<(String, Option<String>)> {
        let guard = self.session.lock().await;
        guard
            .as_ref()
            .and_then(|s| s.engine_id.clone().map(|id| (id, s.engine_url.clone())))
    }

    /// Run `call` with a token; on an authorization failure refresh the
    /// session once and retry the same call once.
    async fn authorized<'a, T, F>(&'a self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn(String) -> BoxFuture<'a, Result<T>>,
    {
        let token = self.acquire_session().await?;
        match call(token).await {
            Err(GraphPilotError::Auth(msg)) => {
                warn!(op, error = %msg, "Authorization rejected, refreshing session");
                self.invalidate_session().await;
                let token = self.acquire_session().await?;
                call(token).await
            }
            other => other,
        }
    }

    pub async fn list_engines(&self) -> Result<Vec<EngineInfo>> {
        self.authorized("list_engines", |token| self.api.list_engines(token))
            .await
    }

    /// Listed engines of this client's family that report running.
    pub async fn running_engines(&self) -> Result<Vec<EngineInfo>> {
        let family = self.config.family.as_str();
        Ok(self
            .list_engines()
            .await?
            .into_iter()
            .filter(|e| e.family.as_deref().map_or(true, |f| f == family))
            .filter(|e| e.status.is_ready())
            .collect())
    }

    /// Health probe; any failure counts as unhealthy.
    pub async fn probe(&self, engine: &EngineLease) -> bool {
        let result = self
            .authorized("probe_engine", |token| {
                self.api.probe_engine(token, engine.clone())
            })
            .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(engine_id = %engine.id, error = %e, "Engine probe failed");
                false
            }
        }
    }

    /// Reuse a healthy running engine or deploy a new one of `size_hint`.
    ///
    /// Listed engines are probed before being trusted. A newly deployed
    /// engine that never becomes ready is deleted before the error returns.
    pub async fn ensure_engine(&self, prefer_reuse: bool, size_hint: EngineSize) -> Result<EngineLease> {
        if prefer_reuse {
            if let Some(lease) = self.find_reusable_engine().await? {
                return Ok(lease);
            }
        }

        let deployed = self
            .authorized("deploy_engine", |token| self.api.deploy_engine(token, size_hint))
            .await?;
        self.try_lease(&deployed.id);
        info!(engine_id = %deployed.id, size = %size_hint, "Deploying engine");

        match self.wait_until_ready(&deployed.id).await {
            Ok(ready) => {
                let lease = EngineLease {
                    id: deployed.id.clone(),
                    url: ready.url.or(deployed.url),
                    size: Some(size_hint),
                    reused: false,
                };
                self.record_engine(&lease).await;
                info!(engine_id = %lease.id, "Engine ready");
                Ok(lease)
            }
            Err(e) => {
                warn!(engine_id = %deployed.id, error = %e, "Engine never became ready, tearing it down");
                if let Err(del) = self.delete_engine(&deployed.id).await {
                    error!(
                        engine_id = %deployed.id,
                        error = %del,
                        "Failed to delete partially deployed engine, must manually delete it"
                    );
                }
                Err(e)
            }
        }
    }

    async fn find_reusable_engine(&self) -> Result<Option<EngineLease>> {
        for engine in self.running_engines().await? {
            if !self.try_lease(&engine.id) {
                debug!(engine_id = %engine.id, "Engine held by another run, skipping");
                continue;
            }
            let lease = EngineLease {
                id: engine.id.clone(),
                url: engine.url.clone(),
                size: engine
                    .size_class
                    .as_deref()
                    .and_then(|s| EngineSize::normalize(s).ok()),
                reused: true,
            };
            if self.probe(&lease).await {
                info!(engine_id = %lease.id, "Reusing running engine");
                self.record_engine(&lease).await;
                return Ok(Some(lease));
            }
            warn!(engine_id = %engine.id, "Listed engine failed health probe, ignoring");
            self.release(&engine.id);
        }
        Ok(None)
    }

    async fn wait_until_ready(&self, engine_id: &str) -> Result<EngineInfo> {
        let timeout_secs = self.config.deploy_timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            let info = self
                .authorized("get_engine", |token| {
                    self.api.get_engine(token, engine_id.to_string())
                })
                .await?;
            if info.status.failed {
                return Err(GraphPilotError::Transient(format!(
                    "Engine {} deployment failed: {}",
                    engine_id,
                    info.status.message.as_deref().unwrap_or("no details")
                )));
            }
            if info.status.is_ready() {
                return Ok(info);
            }
            if Instant::now() >= deadline {
                return Err(GraphPilotError::Timeout {
                    what: format!("engine {} to start", engine_id),
                    secs: timeout_secs,
                });
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    pub async fn load_graph(
        &self,
        engine: &EngineLease,
        database: &str,
        vertex_collections: &[String],
        edge_collections: &[String],
        vertex_attributes: &[String],
    ) -> Result<LoadedGraph> {
        let request = LoadGraphRequest {
            database: database.to_string(),
            vertex_collections: vertex_collections.to_vec(),
            edge_collections: edge_collections.to_vec(),
            vertex_attributes: vertex_attributes.to_vec(),
        };
        self.authorized("load_graph", |token| {
            self.api.load_graph(token, engine.clone(), request.clone())
        })
        .await
    }

    /// Submit an algorithm job. Unknown algorithm names fail before any call.
    pub async fn run_algorithm(
        &self,
        engine: &EngineLease,
        algorithm: &str,
        graph_id: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let request = AlgorithmRequest {
            algorithm: Algorithm::parse(algorithm)?,
            graph_id: graph_id.to_string(),
            params: params.clone(),
        };
        self.authorized("run_algorithm", |token| {
            self.api.run_algorithm(token, engine.clone(), request.clone())
        })
        .await
    }

    pub async fn store_results(
        &self,
        engine: &EngineLease,
        target_collection: &str,
        job_ids: &[String],
        attribute_names: &[String],
        database: &str,
    ) -> Result<String> {
        let request = StoreRequest {
            target_collection: target_collection.to_string(),
            job_ids: job_ids.to_vec(),
            attribute_names: attribute_names.to_vec(),
            database: database.to_string(),
        };
        self.authorized("store_results", |token| {
            self.api.store_results(token, engine.clone(), request.clone())
        })
        .await
    }

    /// Current normalized status of a job.
    pub async fn poll_job(&self, engine: &EngineLease, job_id: &str) -> Result<JobProgress> {
        let raw = self
            .authorized("get_job", |token| {
                self.api.get_job(token, engine.clone(), job_id.to_string())
            })
            .await?;
        normalize_job_status(&raw)
    }

    /// Poll until the job succeeds, fails, or `timeout` elapses.
    ///
    /// A timeout only stops polling; the remote job is not cancelled.
    pub async fn wait_for_job(
        &self,
        engine: &EngineLease,
        job_id: &str,
        timeout: Duration,
    ) -> Result<JobProgress> {
        let deadline = Instant::now() + timeout;
        loop {
            let progress = self.poll_job(engine, job_id).await?;
            match progress.state {
                JobState::Succeeded => return Ok(progress),
                JobState::Failed => {
                    return Err(GraphPilotError::JobFailed {
                        job_id: job_id.to_string(),
                        message: progress.error.unwrap_or_else(|| "no details".into()),
                    })
                }
                JobState::Running => {
                    debug!(job_id, progress = ?progress.progress, total = ?progress.total, "Job running");
                }
            }
            if Instant::now() >= deadline {
                return Err(GraphPilotError::Timeout {
                    what: format!("job {}", job_id),
                    secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    pub async fn graph_stats(&self, engine: &EngineLease, graph_id: &str) -> Result<GraphStats> {
        self.authorized("get_graph", |token| {
            self.api.get_graph(token, engine.clone(), graph_id.to_string())
        })
        .await
    }

    /// Delete an engine. An engine that no longer exists is not an error.
    pub async fn delete_engine(&self, engine_id: &str) -> Result<()> {
        let result = self
            .authorized("delete_engine", |token| {
                self.api.delete_engine(token, engine_id.to_string())
            })
            .await;
        match result {
            Ok(()) => info!(engine_id, "Engine deleted"),
            Err(GraphPilotError::NotFound(_)) => debug!(engine_id, "Engine already absent"),
            Err(e) => return Err(e),
        }
        self.release(engine_id);
        let mut guard = self.session.lock().await;
        if let Some(ref mut session) = *guard {
            if session.engine_id.as_deref() == Some(engine_id) {
                session.engine_id = None;
                session.engine_url = None;
            }
        }
        Ok(())
    }

    /// Give up the lease on an engine without deleting it.
    pub fn release(&self, engine_id: &str) {
        if let Ok(mut leases) = self.leases.lock() {
            leases.remove(engine_id);
        }
    }

    pub fn is_leased(&self, engine_id: &str) -> bool {
        self.leases
            .lock()
            .map(|l| l.contains(engine_id))
            .unwrap_or(false)
    }

    fn try_lease(&self, engine_id: &str) -> bool {
        match self.leases.lock() {
            Ok(mut leases) => leases.insert(engine_id.to_string()),
            Err(_) => false,
        }
    }

    async fn record_engine(&self, lease: &EngineLease) {
        if let Some(ref mut session) = *self.session.lock().await {
            session.engine_id = Some(lease.id.clone());
            session.engine_url = lease.url.clone();
        }
    }
}
