use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use graphpilot_core::analysis::AnalysisConfig;
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::traits::DocumentStore;

/// Sanity-check stored results before a run is marked completed.
///
/// Skipped when the store job wrote nothing. Otherwise up to `sample_size`
/// documents are read from the target collection and passed to
/// [`check_documents`].
pub async fn validate_results(
    store: &dyn DocumentStore,
    config: &AnalysisConfig,
    documents_updated: u64,
    sample_size: usize,
) -> Result<()> {
    if documents_updated == 0 {
        debug!(analysis = %config.name, "No documents written, skipping validation");
        return Ok(());
    }

    let docs = store
        .sample_documents(
            config.database.clone(),
            config.target_collection.clone(),
            sample_size,
        )
        .await?;
    if docs.is_empty() {
        warn!(
            analysis = %config.name,
            target = %config.target_collection,
            documents_updated,
            "Target collection returned no documents, nothing to validate"
        );
        return Ok(());
    }

    check_documents(config, &docs)
}

/// Validate a sample of result documents.
///
/// Every document must carry the algorithm's result attribute and an id
/// from one of the requested vertex collections. For component algorithms
/// the sample must contain fewer distinct components than vertices, since
/// a 1:1 mapping means the algorithm never ran.
pub fn check_documents(config: &AnalysisConfig, docs: &[Value]) -> Result<()> {
    let attribute = config.algorithm.result_attribute();
    let mut vertex_ids = HashSet::new();
    let mut components = HashSet::new();

    for doc in docs {
        let id = document_id(doc).ok_or_else(|| {
            GraphPilotError::Validation(format!(
                "Result document in '{}' has no vertex id",
                config.target_collection
            ))
        })?;

        let collection = id.split_once('/').map(|(c, _)| c).unwrap_or_default();
        if !config.vertex_collections.iter().any(|c| c == collection) {
            return Err(GraphPilotError::Validation(format!(
                "Vertex '{}' is outside the requested collections [{}]",
                id,
                config.vertex_collections.join(", ")
            )));
        }

        let value = doc.get(attribute).ok_or_else(|| {
            GraphPilotError::Validation(format!(
                "Result attribute '{}' missing on vertex '{}'",
                attribute, id
            ))
        })?;

        vertex_ids.insert(id.to_string());
        components.insert(value.to_string());
    }

    // A single sampled vertex is always its own component, so it says
    // nothing about the labelling and is accepted.
    if config.algorithm.produces_components()
        && vertex_ids.len() >= 2
        && components.len() >= vertex_ids.len()
    {
        return Err(GraphPilotError::Validation(format!(
            "{} produced {} components for {} vertices; every vertex is its own component",
            config.algorithm,
            components.len(),
            vertex_ids.len()
        )));
    }

    Ok(())
}

fn document_id(doc: &Value) -> Option<&str> {
    doc.get("id")
        .and_then(Value::as_str)
        .or_else(|| doc.get("_id").and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphpilot_test_utils::FakeEngine;
    use serde_json::json;

    fn wcc() -> AnalysisConfig {
        AnalysisConfig::new("components", "wcc")
            .unwrap()
            .with_collections(vec!["users".into()], vec!["follows".into()])
    }

    #[test]
    fn one_component_per_vertex_is_rejected() {
        let docs = vec![
            json!({"id": "users/1", "component": "users/1"}),
            json!({"id": "users/2", "component": "users/2"}),
            json!({"id": "users/3", "component": "users/3"}),
        ];
        let err = check_documents(&wcc(), &docs).unwrap_err();
        assert!(matches!(err, GraphPilotError::Validation(_)));
    }

    #[test]
    fn single_vertex_sample_passes_component_check() {
        let docs = vec![json!({"id": "users/1", "component": "users/1"})];
        check_documents(&wcc(), &docs).unwrap();
    }

    #[test]
    fn vertex_outside_requested_collections_is_rejected() {
        let docs = vec![
            json!({"id": "users/1", "component": 1}),
            json!({"id": "orders/9", "component": 1}),
        ];
        let err = check_documents(&wcc(), &docs).unwrap_err();
        assert!(err.to_string().contains("orders/9"));
    }

    #[test]
    fn missing_attribute_is_rejected() {
        let docs = vec![json!({"id": "users/1", "rank": 0.4})];
        assert!(check_documents(&wcc(), &docs).is_err());
    }

    #[test]
    fn well_formed_results_pass() {
        let docs = vec![
            json!({"id": "users/1", "component": "c1"}),
            json!({"id": "users/2", "component": "c1"}),
            json!({"_id": "users/3", "component": "c2"}),
        ];
        check_documents(&wcc(), &docs).unwrap();
    }

    #[test]
    fn pagerank_does_not_check_components() {
        let config = AnalysisConfig::new("rank", "pagerank")
            .unwrap()
            .with_collections(vec!["users".into()], vec!["follows".into()]);
        let docs = vec![
            json!({"id": "users/1", "pagerank": 0.1}),
            json!({"id": "users/2", "pagerank": 0.2}),
        ];
        check_documents(&config, &docs).unwrap();
    }

    #[tokio::test]
    async fn zero_documents_skips_sampling() {
        let store = FakeEngine::new();
        validate_results(&store, &wcc(), 0, 10).await.unwrap();
        assert_eq!(store.calls(FakeEngine::SAMPLE_DOCUMENTS), 0);
    }

    #[tokio::test]
    async fn samples_target_collection() {
        let store = FakeEngine::new();
        let config = wcc();
        store.set_results(
            &config.target_collection,
            vec![
                json!({"id": "users/1", "component": "users/1"}),
                json!({"id": "users/2", "component": "users/2"}),
            ],
        );
        assert!(validate_results(&store, &config, 2, 10).await.is_err());
        assert_eq!(store.calls(FakeEngine::SAMPLE_DOCUMENTS), 1);
    }
}
