//! Workflow artifacts exchanged between agents.
//!
//! Each artifact is produced by exactly one workflow step and consumed by
//! the next one. Their content is generated by external collaborators; only
//! the shape is fixed here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A business document fed into the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDocument {
    pub name: String,
    pub content: String,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Vertex,
    Edge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub kind: CollectionKind,
    #[serde(default)]
    pub document_count: Option<u64>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Graph schema of the analysed database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSchema {
    pub database: String,
    pub collections: Vec<CollectionInfo>,
}

impl GraphSchema {
    pub fn vertex_collections(&self) -> Vec<String> {
        self.collections_of(CollectionKind::Vertex)
    }

    pub fn edge_collections(&self) -> Vec<String> {
        self.collections_of(CollectionKind::Edge)
    }

    fn collections_of(&self, kind: CollectionKind) -> Vec<String> {
        self.collections
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Business requirements extracted from the input documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub domain: Option<String>,
    pub objectives: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub source_documents: Vec<String>,
}

/// One analytics use case derived from the requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Suggested algorithm identifier.
    pub algorithm: String,
    #[serde(default)]
    pub priority: u8,
}

/// Extra information handed to the report generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportContext {
    #[serde(default)]
    pub use_case: Option<UseCase>,
    #[serde(default)]
    pub requirements: Option<Requirements>,
}

/// A rendered analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub job_id: String,
    pub summary: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_partitions_collections() {
        let schema = GraphSchema {
            database: "social".into(),
            collections: vec![
                CollectionInfo {
                    name: "users".into(),
                    kind: CollectionKind::Vertex,
                    document_count: Some(10),
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
        assert_eq!(schema.vertex_collections(), vec!["users".to_string()]);
        assert_eq!(schema.edge_collections(), vec!["follows".to_string()]);
    }
}
