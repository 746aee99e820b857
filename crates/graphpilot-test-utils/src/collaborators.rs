use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use graphpilot_core::analysis::AnalysisTemplate;
use graphpilot_core::artifacts::*;
use graphpilot_core::config::DatabaseConfig;
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::job::ExecutionResult;
use graphpilot_core::traits::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Error,
    Panic,
}

#[derive(Default)]
struct State {
    calls: HashMap<&'static str, usize>,
    faults: HashMap<&'static str, Vec<Fault>>,
    latency: HashMap<&'static str, Duration>,
    use_case_count: usize,
    /// Completion order of operations, for ordering assertions.
    log: Vec<&'static str>,
}

/// Deterministic stand-in for every workflow collaborator.
///
/// Produces a two-collection social graph schema, one use case per
/// requested count (cycling through wcc and pagerank) and one template
/// per use case.
pub struct FakeCollaborators {
    state: Mutex<State>,
}

impl FakeCollaborators {
    pub const SCHEMA: &'static str = "schema";
    pub const REQUIREMENTS: &'static str = "requirements";
    pub const USE_CASES: &'static str = "use_cases";
    pub const TEMPLATES: &'static str = "templates";
    pub const REPORTS: &'static str = "reports";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                use_case_count: 2,
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

    /// Make the next `times` calls of `op` return an error.
    pub fn fail_next(&self, op: &'static str, times: usize) {
        let mut state = self.lock();
        let faults = state.faults.entry(op).or_default();
        faults.extend(std::iter::repeat(Fault::Error).take(times));
    }

    /// Make the next call of `op` panic.
    pub fn panic_next(&self, op: &'static str) {
        self.lock().faults.entry(op).or_default().push(Fault::Panic);
    }

    pub fn set_latency(&self, op: &'static str, latency: Duration) {
        self.lock().latency.insert(op, latency);
    }

    pub fn set_use_case_count(&self, count: usize) {
        self.lock().use_case_count = count;
    }

    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Operations in the order they completed successfully.
    pub fn completion_log(&self) -> Vec<&'static str> {
        self.lock().log.clone()
    }

    async fn begin(&self, op: &'static str) -> Result<()> {
        let (fault, latency) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            let fault = match state.faults.get_mut(op) {
                Some(faults) if !faults.is_empty() => Some(faults.remove(0)),
                _ => None,
            };
            (fault, state.latency.get(op).copied())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match fault {
            Some(Fault::Panic) => panic!("{} collaborator crashed", op),
            Some(Fault::Error) => Err(GraphPilotError::Transient(format!(
                "{} collaborator unavailable",
                op
            ))),
            None => Ok(()),
        }
    }

    fn finish(&self, op: &'static str) {
        self.lock().log.push(op);
    }
}

impl Default for FakeCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema of the fixture graph: `users` vertices joined by `follows` edges.
pub fn social_schema(database: &str) -> GraphSchema {
    GraphSchema {
        database: database.to_string(),
        collections: vec![
            CollectionInfo {
                name: "users".into(),
                kind: CollectionKind::Vertex,
                document_count: Some(100),
                attributes: vec!["name".into()],
            },
            CollectionInfo {
                name: "follows".into(),
                kind: CollectionKind::Edge,
                document_count: Some(250),
                attributes: vec![],
            },
        ],
    }
}

impl SchemaAnalyzer for FakeCollaborators {
    fn analyze(&self, database: DatabaseConfig) -> BoxFuture<'_, Result<GraphSchema>> {
        Box::pin(async move {
            self.begin(Self::SCHEMA).await?;
            self.finish(Self::SCHEMA);
            Ok(social_schema(&database.name))
        })
    }
}

impl RequirementsExtractor for FakeCollaborators {
    fn extract(&self, documents: Vec<InputDocument>) -> BoxFuture<'_, Result<Requirements>> {
        Box::pin(async move {
            self.begin(Self::REQUIREMENTS).await?;
            self.finish(Self::REQUIREMENTS);
            Ok(Requirements {
                domain: Some("social".into()),
                objectives: vec!["find influential users".into(), "detect communities".into()],
                constraints: vec![],
                source_documents: documents.into_iter().map(|d| d.name).collect(),
            })
        })
    }
}

impl UseCaseGenerator for FakeCollaborators {
    fn generate(
        &self,
        _requirements: Requirements,
        _schema: Option<GraphSchema>,
    ) -> BoxFuture<'_, Result<Vec<UseCase>>> {
        Box::pin(async move {
            self.begin(Self::USE_CASES).await?;
            let count = self.lock().use_case_count;
            self.finish(Self::USE_CASES);
            Ok((0..count)
                .map(|i| {
                    let algorithm = if i % 2 == 0 { "wcc" } else { "pagerank" };
                    UseCase {
                        id: format!("UC-{:03}", i + 1),
                        title: format!("{} analysis {}", algorithm, i + 1),
                        description: String::new(),
                        algorithm: algorithm.into(),
                        priority: 1,
                    }
                })
                .collect())
        })
    }
}

impl TemplateGenerator for FakeCollaborators {
    fn generate(
        &self,
        use_cases: Vec<UseCase>,
        schema: Option<GraphSchema>,
    ) -> BoxFuture<'_, Result<Vec<AnalysisTemplate>>> {
        Box::pin(async move {
            self.begin(Self::TEMPLATES).await?;
            let schema = schema.unwrap_or_else(|| social_schema("_system"));
            self.finish(Self::TEMPLATES);
            Ok(use_cases
                .into_iter()
                .map(|uc| AnalysisTemplate {
                    name: format!("{}_{}", uc.id.to_lowercase(), uc.algorithm),
                    description: uc.title.clone(),
                    use_case_id: Some(uc.id.clone()),
                    algorithm: uc.algorithm.clone(),
                    params: serde_json::Map::new(),
                    vertex_collections: schema.vertex_collections(),
                    edge_collections: schema.edge_collections(),
                    vertex_attributes: vec![],
                    engine_size: None,
                    target_collection: Some(format!("{}_results", uc.id.to_lowercase())),
                    database: Some(schema.database.clone()),
                    max_retries: None,
                    timeout_secs: None,
                })
                .collect())
        })
    }
}

impl ReportGenerator for FakeCollaborators {
    fn generate(
        &self,
        execution: ExecutionResult,
        _context: ReportContext,
    ) -> BoxFuture<'_, Result<Report>> {
        Box::pin(async move {
            self.begin(Self::REPORTS).await?;
            self.finish(Self::REPORTS);
            Ok(Report {
                title: format!("Report: {}", execution.template_name),
                job_id: execution.result.job_id.clone(),
                summary: format!("{} {}", execution.result.algorithm, execution.result.status),
                body: String::new(),
                created_at: Utc::now(),
            })
        })
    }
}
