use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use graphpilot_core::analysis::EngineSize;
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::traits::{DocumentStore, EngineApi};
use graphpilot_core::types::*;

/// A scripted failure returned by the next call of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFailure {
    Auth,
    Transient,
    Timeout,
    NotFound,
    Configuration,
    Remote(u16),
    /// A remote rejection with a custom message.
    Message(String),
}

impl FakeFailure {
    fn to_error(&self, op: &str) -> GraphPilotError {
        match self {
            Self::Auth => GraphPilotError::Auth(format!("{}: token rejected", op)),
            Self::Transient => GraphPilotError::Transient(format!("{}: connection reset", op)),
            Self::Timeout => GraphPilotError::Timeout {
                what: op.to_string(),
                secs: 1,
            },
            Self::NotFound => GraphPilotError::NotFound(format!("{}: no such resource", op)),
            Self::Configuration => {
                GraphPilotError::Configuration(format!("{}: invalid request", op))
            }
            Self::Remote(status) => GraphPilotError::Remote {
                status: *status,
                message: format!("{}: rejected", op),
            },
            Self::Message(message) => GraphPilotError::Remote {
                status: 400,
                message: message.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct FakeEngineRecord {
    info: EngineInfo,
    healthy: bool,
}

#[derive(Default)]
struct State {
    engines: BTreeMap<String, FakeEngineRecord>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<FakeFailure>>,
    deployed_sizes: Vec<EngineSize>,
    deploy_never_ready: bool,
    job_document: Option<Value>,
    documents_updated: u64,
    results: HashMap<String, Vec<Value>>,
    latency: Option<Duration>,
    next_id: u64,
}

/// In-memory engine platform and result database.
///
/// Every operation bumps a call counter and first consumes any failure
/// scripted with [`FakeEngine::fail_next`]. Deployed engines report ready
/// on their first status check unless `set_deploy_never_ready` was called.
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub const ISSUE_CREDENTIAL: &'static str = "issue_credential";
    pub const LIST_ENGINES: &'static str = "list_engines";
    pub const DEPLOY_ENGINE: &'static str = "deploy_engine";
    pub const GET_ENGINE: &'static str = "get_engine";
    pub const PROBE_ENGINE: &'static str = "probe_engine";
    pub const DELETE_ENGINE: &'static str = "delete_engine";
    pub const LOAD_GRAPH: &'static str = "load_graph";
    pub const RUN_ALGORITHM: &'static str = "run_algorithm";
    pub const STORE_RESULTS: &'static str = "store_results";
    pub const GET_JOB: &'static str = "get_job";
    pub const GET_GRAPH: &'static str = "get_graph";
    pub const SAMPLE_DOCUMENTS: &'static str = "sample_documents";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                documents_updated: 100,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make the next `times` calls of `op` fail with `failure`.
    pub fn fail_next(&self, op: &'static str, failure: FakeFailure, times: usize) {
        let mut state = self.lock();
        let queue = state.failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(failure.clone());
        }
    }

    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Register an already running, healthy engine.
    pub fn add_running_engine(&self, id: &str) {
        self.lock().engines.insert(
            id.to_string(),
            FakeEngineRecord {
                info: EngineInfo {
                    id: id.to_string(),
                    status: EngineStatus {
                        started: true,
                        succeeded: true,
                        failed: false,
                        message: None,
                    },
                    size_class: Some(EngineSize::E16.as_str().to_string()),
                    family: Some("gral".to_string()),
                    url: None,
                },
                healthy: true,
            },
        );
    }

    /// Listed as ready, but its health probe fails.
    pub fn mark_unhealthy(&self, id: &str) {
        if let Some(record) = self.lock().engines.get_mut(id) {
            record.healthy = false;
        }
    }

    pub fn set_deploy_never_ready(&self) {
        self.lock().deploy_never_ready = true;
    }

    /// Raw document returned by every job status poll.
    pub fn set_job_document(&self, doc: Value) {
        self.lock().job_document = Some(doc);
    }

    /// Documents reported as written by completed jobs.
    pub fn set_documents_updated(&self, count: u64) {
        self.lock().documents_updated = count;
    }

    /// Documents readable from `collection` after results are stored.
    pub fn set_results(&self, collection: &str, docs: Vec<Value>) {
        self.lock().results.insert(collection.to_string(), docs);
    }

    /// Delay applied to graph loads, used to overlap concurrent runs.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    pub fn engine_ids(&self) -> Vec<String> {
        self.lock().engines.keys().cloned().collect()
    }

    pub fn deployed_sizes(&self) -> Vec<EngineSize> {
        self.lock().deployed_sizes.clone()
    }

    fn begin(&self, op: &'static str) -> Result<()> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(failure) => Err(failure.to_error(op)),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    fn require_engine(&self, id: &str) -> Result<()> {
        if self.lock().engines.contains_key(id) {
            Ok(())
        } else {
            Err(GraphPilotError::NotFound(format!("engine {}", id)))
        }
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineApi for FakeEngine {
    fn issue_credential(&self, _client_id: String, _secret: String) -> BoxFuture<'_, Result<Credential>> {
        Box::pin(async move {
            self.begin(Self::ISSUE_CREDENTIAL)?;
            Ok(Credential {
                token: self.next_id("token"),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
        })
    }

    fn list_engines(&self, _token: String) -> BoxFuture<'_, Result<Vec<EngineInfo>>> {
        Box::pin(async move {
            self.begin(Self::LIST_ENGINES)?;
            Ok(self.lock().engines.values().map(|r| r.info.clone()).collect())
        })
    }

    fn deploy_engine(&self, _token: String, size: EngineSize) -> BoxFuture<'_, Result<EngineInfo>> {
        Box::pin(async move {
            self.begin(Self::DEPLOY_ENGINE)?;
            let id = self.next_id("engine");
            let info = EngineInfo {
                id: id.clone(),
                status: EngineStatus {
                    started: true,
                    ..EngineStatus::default()
                },
                size_class: Some(size.as_str().to_string()),
                family: Some("gral".to_string()),
                url: None,
            };
            let mut state = self.lock();
            state.deployed_sizes.push(size);
            state.engines.insert(
                id,
                FakeEngineRecord {
                    info: info.clone(),
                    healthy: true,
                },
            );
            Ok(info)
        })
    }

    fn get_engine(&self, _token: String, engine_id: String) -> BoxFuture<'_, Result<EngineInfo>> {
        Box::pin(async move {
            self.begin(Self::GET_ENGINE)?;
            let mut state = self.lock();
            let never_ready = state.deploy_never_ready;
            let record = state
                .engines
                .get_mut(&engine_id)
                .ok_or_else(|| GraphPilotError::NotFound(format!("engine {}", engine_id)))?;
            if !never_ready {
                record.info.status.succeeded = true;
            }
            Ok(record.info.clone())
        })
    }

    fn probe_engine(&self, _token: String, engine: EngineLease) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.begin(Self::PROBE_ENGINE)?;
            match self.lock().engines.get(&engine.id) {
                Some(record) if record.healthy => Ok(()),
                Some(_) => Err(GraphPilotError::Transient(format!(
                    "engine {} is not answering",
                    engine.id
                ))),
                None => Err(GraphPilotError::NotFound(format!("engine {}", engine.id))),
            }
        })
    }

    fn delete_engine(&self, _token: String, engine_id: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.begin(Self::DELETE_ENGINE)?;
            match self.lock().engines.remove(&engine_id) {
                Some(_) => Ok(()),
                None => Err(GraphPilotError::NotFound(format!("engine {}", engine_id))),
            }
        })
    }

    fn load_graph(
        &self,
        _token: String,
        engine: EngineLease,
        _request: LoadGraphRequest,
    ) -> BoxFuture<'_, Result<LoadedGraph>> {
        Box::pin(async move {
            self.begin(Self::LOAD_GRAPH)?;
            let latency = self.lock().latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            self.require_engine(&engine.id)?;
            Ok(LoadedGraph {
                job_id: self.next_id("job"),
                graph_id: self.next_id("graph"),
            })
        })
    }

    fn run_algorithm(
        &self,
        _token: String,
        engine: EngineLease,
        _request: AlgorithmRequest,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.begin(Self::RUN_ALGORITHM)?;
            self.require_engine(&engine.id)?;
            Ok(self.next_id("job"))
        })
    }

    fn store_results(
        &self,
        _token: String,
        engine: EngineLease,
        _request: StoreRequest,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.begin(Self::STORE_RESULTS)?;
            self.require_engine(&engine.id)?;
            Ok(self.next_id("job"))
        })
    }

    fn get_job(
        &self,
        _token: String,
        _engine: EngineLease,
        _job_id: String,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.begin(Self::GET_JOB)?;
            let state = self.lock();
            Ok(state.job_document.clone().unwrap_or_else(|| {
                json!({ "status": "done", "documents_updated": state.documents_updated })
            }))
        })
    }

    fn get_graph(
        &self,
        _token: String,
        _engine: EngineLease,
        _graph_id: String,
    ) -> BoxFuture<'_, Result<GraphStats>> {
        Box::pin(async move {
            self.begin(Self::GET_GRAPH)?;
            Ok(GraphStats {
                vertex_count: 100,
                edge_count: 250,
            })
        })
    }
}

impl DocumentStore for FakeEngine {
    fn sample_documents(
        &self,
        _database: String,
        collection: String,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Value>>> {
        Box::pin(async move {
            self.begin(Self::SAMPLE_DOCUMENTS)?;
            Ok(self
                .lock()
                .results
                .get(&collection)
                .map(|docs| docs.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let fake = FakeEngine::new();
        fake.fail_next(FakeEngine::LIST_ENGINES, FakeFailure::Transient, 1);
        assert!(fake.list_engines("t".into()).await.is_err());
        assert!(fake.list_engines("t".into()).await.is_ok());
        assert_eq!(fake.calls(FakeEngine::LIST_ENGINES), 2);
    }

    #[tokio::test]
    async fn deployed_engine_becomes_ready_on_first_check() {
        let fake = FakeEngine::new();
        let info = fake.deploy_engine("t".into(), EngineSize::E8).await.unwrap();
        assert!(!info.status.is_ready());
        let info = fake.get_engine("t".into(), info.id).await.unwrap();
        assert!(info.status.is_ready());
        assert_eq!(fake.deployed_sizes(), vec![EngineSize::E8]);
    }
}
