//! Minimal deterministic collaborators so the workflow runs end to end
//! without a language model behind it.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;

use graphpilot_core::analysis::{Algorithm, AnalysisTemplate};
use graphpilot_core::artifacts::*;
use graphpilot_core::config::DatabaseConfig;
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::job::ExecutionResult;
use graphpilot_core::traits::*;

/// The external collaborators the agents delegate to.
#[derive(Clone)]
pub struct Collaborators {
    pub schema: Arc<dyn SchemaAnalyzer>,
    pub requirements: Arc<dyn RequirementsExtractor>,
    pub use_cases: Arc<dyn UseCaseGenerator>,
    pub templates: Arc<dyn TemplateGenerator>,
    pub reports: Arc<dyn ReportGenerator>,
}

impl Collaborators {
    pub fn baseline() -> Self {
        Self {
            schema: Arc::new(ConfiguredSchema),
            requirements: Arc::new(LineRequirements),
            use_cases: Arc::new(KeywordUseCases),
            templates: Arc::new(TemplatePerUseCase),
            reports: Arc::new(MarkdownReports),
        }
    }

    /// Use one object for every collaborator role.
    pub fn from_single<T>(all: Arc<T>) -> Self
    where
        T: SchemaAnalyzer
            + RequirementsExtractor
            + UseCaseGenerator
            + TemplateGenerator
            + ReportGenerator,
    {
        Self {
            schema: all.clone(),
            requirements: all.clone(),
            use_cases: all.clone(),
            templates: all.clone(),
            reports: all,
        }
    }
}

/// Schema taken from the collections listed in `[database]`.
pub struct ConfiguredSchema;

impl SchemaAnalyzer for ConfiguredSchema {
    fn analyze(&self, database: DatabaseConfig) -> BoxFuture<'_, Result<GraphSchema>> {
        Box::pin(async move {
            if database.vertex_collections.is_empty() {
                return Err(GraphPilotError::Configuration(
                    "database.vertex_collections is not configured".into(),
                ));
            }
            let vertices = database.vertex_collections.iter().map(|name| CollectionInfo {
                name: name.clone(),
                kind: CollectionKind::Vertex,
                document_count: None,
                attributes: vec![],
            });
            let edges = database.edge_collections.iter().map(|name| CollectionInfo {
                name: name.clone(),
                kind: CollectionKind::Edge,
                document_count: None,
                attributes: vec![],
            });
            Ok(GraphSchema {
                database: database.name.clone(),
                collections: vertices.chain(edges).collect(),
            })
        })
    }
}

/// Bullet and numbered lines become objectives.
pub struct LineRequirements;

fn objective_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(". ") {
            return Some(rest.trim());
        }
    }
    None
}

impl RequirementsExtractor for LineRequirements {
    fn extract(&self, documents: Vec<InputDocument>) -> BoxFuture<'_, Result<Requirements>> {
        Box::pin(async move {
            let mut objectives = Vec::new();
            for doc in &documents {
                let before = objectives.len();
                objectives.extend(
                    doc.content
                        .lines()
                        .filter_map(objective_line)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                );
                if objectives.len() == before {
                    if let Some(first) = doc.content.lines().map(str::trim).find(|l| !l.is_empty()) {
                        objectives.push(first.to_string());
                    }
                }
            }
            if objectives.is_empty() {
                return Err(GraphPilotError::Validation(
                    "input documents contain no text".into(),
                ));
            }
            Ok(Requirements {
                domain: None,
                objectives,
                constraints: vec![],
                source_documents: documents.into_iter().map(|d| d.name).collect(),
            })
        })
    }
}

const KEYWORDS: &[(&[&str], Algorithm)] = &[
    (&["influen", "important", "rank", "central"], Algorithm::PageRank),
    (&["communit", "cluster", "segment"], Algorithm::LabelPropagation),
    (&["connected", "component", "island", "ring"], Algorithm::Wcc),
    (&["cycle", "circular", "strongly"], Algorithm::Scc),
    (&["bridge", "broker", "between", "bottleneck"], Algorithm::Betweenness),
];

/// One use case per distinct algorithm the objectives mention.
pub struct KeywordUseCases;

impl UseCaseGenerator for KeywordUseCases {
    fn generate(
        &self,
        requirements: Requirements,
        _schema: Option<GraphSchema>,
    ) -> BoxFuture<'_, Result<Vec<UseCase>>> {
        Box::pin(async move {
            let mut seen = BTreeSet::new();
            let mut use_cases = Vec::new();
            for objective in &requirements.objectives {
                let lower = objective.to_lowercase();
                let matched = KEYWORDS
                    .iter()
                    .find(|(words, _)| words.iter().any(|w| lower.contains(w)));
                if let Some((_, algorithm)) = matched {
                    if seen.insert(algorithm.as_str()) {
                        use_cases.push(UseCase {
                            id: format!("UC-{:03}", use_cases.len() + 1),
                            title: objective.clone(),
                            description: format!("{} over the graph", algorithm),
                            algorithm: algorithm.as_str().to_string(),
                            priority: use_cases.len() as u8 + 1,
                        });
                    }
                }
            }
            if use_cases.is_empty() {
                use_cases.push(UseCase {
                    id: "UC-001".into(),
                    title: "Identify the most important vertices".into(),
                    description: "pagerank over the graph".into(),
                    algorithm: Algorithm::PageRank.as_str().to_string(),
                    priority: 1,
                });
            }
            Ok(use_cases)
        })
    }
}

/// One template per use case over the whole schema.
pub struct TemplatePerUseCase;

impl TemplateGenerator for TemplatePerUseCase {
    fn generate(
        &self,
        use_cases: Vec<UseCase>,
        schema: Option<GraphSchema>,
    ) -> BoxFuture<'_, Result<Vec<AnalysisTemplate>>> {
        Box::pin(async move {
            let schema = schema.ok_or_else(|| {
                GraphPilotError::Validation("templates need a graph schema".into())
            })?;
            Ok(use_cases
                .into_iter()
                .map(|uc| {
                    let name = format!("{}_{}", uc.id.to_lowercase().replace('-', "_"), uc.algorithm);
                    AnalysisTemplate {
                        target_collection: Some(format!("{}_results", name)),
                        name,
                        description: uc.title,
                        use_case_id: Some(uc.id),
                        algorithm: uc.algorithm,
                        params: serde_json::Map::new(),
                        vertex_collections: schema.vertex_collections(),
                        edge_collections: schema.edge_collections(),
                        vertex_attributes: vec![],
                        engine_size: None,
                        database: Some(schema.database.clone()),
                        max_retries: None,
                        timeout_secs: None,
                    }
                })
                .collect())
        })
    }
}

/// Short markdown report per execution.
pub struct MarkdownReports;

impl ReportGenerator for MarkdownReports {
    fn generate(
        &self,
        execution: ExecutionResult,
        context: ReportContext,
    ) -> BoxFuture<'_, Result<Report>> {
        Box::pin(async move {
            let r = &execution.result;
            let title = match context.use_case {
                Some(ref uc) => format!("{}: {}", uc.id, uc.title),
                None => execution.template_name.clone(),
            };
            let summary = format!(
                "{} on {} finished {} ({} documents updated)",
                r.algorithm, execution.database, r.status, r.documents_updated
            );

            let mut body = format!("# {}\n\n{}\n\n", title, summary);
            let _ = writeln!(body, "| field | value |\n|---|---|");
            let _ = writeln!(body, "| template | {} |", execution.template_name);
            let _ = writeln!(body, "| target | {} |", execution.target_collection);
            let _ = writeln!(body, "| retries | {} |", r.retry_count);
            if let Some(secs) = r.elapsed_secs {
                let _ = writeln!(body, "| elapsed | {:.1}s |", secs);
            }
            if let Some(cost) = r.estimated_cost {
                let _ = writeln!(body, "| estimated cost | ${:.4} |", cost);
            }
            if let Some(ref err) = r.error {
                let _ = writeln!(body, "| error | {} |", err);
            }
            if let Some(ref err) = r.cleanup_error {
                let _ = writeln!(body, "\n**{}**", err);
            }

            Ok(Report {
                title,
                job_id: r.job_id.clone(),
                summary,
                body,
                created_at: Utc::now(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requirements_come_from_bullets() {
        let docs = vec![InputDocument::new(
            "brief.md",
            "# Goals\n- Find influential customers\n2. Detect fraud rings\nnotes",
        )];
        let req = LineRequirements.extract(docs).await.unwrap();
        assert_eq!(
            req.objectives,
            vec!["Find influential customers", "Detect fraud rings"]
        );
        assert_eq!(req.source_documents, vec!["brief.md"]);
    }

    #[tokio::test]
    async fn keywords_pick_algorithms_once() {
        let req = Requirements {
            objectives: vec![
                "Find influential customers".into(),
                "Rank suppliers".into(),
                "Detect fraud rings".into(),
            ],
            ..Requirements::default()
        };
        let use_cases = KeywordUseCases.generate(req, None).await.unwrap();
        let algorithms: Vec<_> = use_cases.iter().map(|u| u.algorithm.as_str()).collect();
        assert_eq!(algorithms, vec!["pagerank", "wcc"]);
        assert_eq!(use_cases[1].id, "UC-002");
    }

    #[tokio::test]
    async fn schema_requires_configured_collections() {
        let err = ConfiguredSchema
            .analyze(DatabaseConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphPilotError::Configuration(_)));
    }

    #[tokio::test]
    async fn templates_cover_the_schema() {
        let schema = GraphSchema {
            database: "social".into(),
            collections: vec![
                CollectionInfo {
                    name: "users".into(),
                    kind: CollectionKind::Vertex,
                    document_count: None,
                    attributes: vec![],
                },
                CollectionInfo {
                    name: "follows".into(),
                    kind: CollectionKind::Edge,
                    document_count: None,
                    attributes: vec![],
                },
            ],
        };
        let use_case = UseCase {
            id: "UC-001".into(),
            title: "Rank users".into(),
            description: String::new(),
            algorithm: "pagerank".into(),
            priority: 1,
        };
        let templates = TemplatePerUseCase
            .generate(vec![use_case], Some(schema))
            .await
            .unwrap();
        assert_eq!(templates[0].name, "uc_001_pagerank");
        assert_eq!(templates[0].vertex_collections, vec!["users"]);
        assert_eq!(templates[0].edge_collections, vec!["follows"]);
    }
}
