use futures::future::BoxFuture;

use crate::analysis::{AnalysisTemplate, EngineSize};
use crate::artifacts::{GraphSchema, InputDocument, Report, ReportContext, Requirements, UseCase};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::job::ExecutionResult;
use crate::types::*;

/// Transport-agnostic operations of the remote graph-compute platform.
///
/// Implementations map authorization failures to `GraphPilotError::Auth`
/// and missing resources to `GraphPilotError::NotFound`; the engine client
/// relies on both for session refresh and idempotent teardown.
pub trait EngineApi: Send + Sync + 'static {
    /// Exchange client credentials for a bearer token.
    fn issue_credential(&self, client_id: String, secret: String) -> BoxFuture<'_, Result<Credential>>;

    /// List engines visible to this account.
    fn list_engines(&self, token: String) -> BoxFuture<'_, Result<Vec<EngineInfo>>>;

    /// Start deploying a new engine. Returns as soon as an id is assigned.
    fn deploy_engine(&self, token: String, size: EngineSize) -> BoxFuture<'_, Result<EngineInfo>>;

    /// Fetch one engine's current status.
    fn get_engine(&self, token: String, engine_id: String) -> BoxFuture<'_, Result<EngineInfo>>;

    /// Lightweight health probe against a running engine.
    fn probe_engine(&self, token: String, engine: EngineLease) -> BoxFuture<'_, Result<()>>;

    /// Delete an engine. Missing engines yield `NotFound`.
    fn delete_engine(&self, token: String, engine_id: String) -> BoxFuture<'_, Result<()>>;

    /// Submit a graph load job.
    fn load_graph(
        &self,
        token: String,
        engine: EngineLease,
        request: LoadGraphRequest,
    ) -> BoxFuture<'_, Result<LoadedGraph>>;

    /// Submit an algorithm job; returns the job id.
    fn run_algorithm(
        &self,
        token: String,
        engine: EngineLease,
        request: AlgorithmRequest,
    ) -> BoxFuture<'_, Result<String>>;

    /// Submit a store-results job; returns the job id.
    fn store_results(
        &self,
        token: String,
        engine: EngineLease,
        request: StoreRequest,
    ) -> BoxFuture<'_, Result<String>>;

    /// Raw job status document; shape varies by engine version.
    fn get_job(
        &self,
        token: String,
        engine: EngineLease,
        job_id: String,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Vertex and edge counts of a loaded graph.
    fn get_graph(
        &self,
        token: String,
        engine: EngineLease,
        graph_id: String,
    ) -> BoxFuture<'_, Result<GraphStats>>;
}

/// Read access to the database that receives stored results.
pub trait DocumentStore: Send + Sync + 'static {
    /// Return up to `limit` documents from `collection`.
    fn sample_documents(
        &self,
        database: String,
        collection: String,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<serde_json::Value>>>;
}

/// Extracts the graph schema of a database.
pub trait SchemaAnalyzer: Send + Sync + 'static {
    fn analyze(&self, database: DatabaseConfig) -> BoxFuture<'_, Result<GraphSchema>>;
}

/// Turns business documents into structured requirements.
pub trait RequirementsExtractor: Send + Sync + 'static {
    fn extract(&self, documents: Vec<InputDocument>) -> BoxFuture<'_, Result<Requirements>>;
}

/// Derives analytics use cases from requirements and schema.
pub trait UseCaseGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        requirements: Requirements,
        schema: Option<GraphSchema>,
    ) -> BoxFuture<'_, Result<Vec<UseCase>>>;
}

/// Builds executable analysis templates for use cases.
pub trait TemplateGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        use_cases: Vec<UseCase>,
        schema: Option<GraphSchema>,
    ) -> BoxFuture<'_, Result<Vec<AnalysisTemplate>>>;
}

/// Renders a report for one execution.
pub trait ReportGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        execution: ExecutionResult,
        context: ReportContext,
    ) -> BoxFuture<'_, Result<Report>>;
}
