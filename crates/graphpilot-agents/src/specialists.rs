//! The six specialist agents, one per workflow step.
//!
//! Each specialist implements only its happy path and returns `Err` on
//! failure; [`crate::runtime::AgentRuntime`] turns failures into messages.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use graphpilot_core::artifacts::ReportContext;
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::traits::*;
use graphpilot_jobs::ExecutionCoordinator;

use crate::state::{StateDelta, StepInput};
use crate::steps::WorkflowStep;

/// What a specialist hands back: a message summary plus its artifacts.
#[derive(Debug, Default)]
pub struct StepOutput {
    pub summary: Value,
    pub delta: StateDelta,
    /// Per-item failures that leave the step itself successful.
    pub issues: Vec<String>,
}

fn agent_error(step: WorkflowStep, message: impl Into<String>) -> GraphPilotError {
    GraphPilotError::Agent {
        agent: step.agent_id().to_string(),
        message: message.into(),
    }
}

pub struct SchemaAnalyst {
    analyzer: Arc<dyn SchemaAnalyzer>,
}

impl SchemaAnalyst {
    pub fn new(analyzer: Arc<dyn SchemaAnalyzer>) -> Self {
        Self { analyzer }
    }

    async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        let schema = self.analyzer.analyze(input.database).await?;
        let summary = json!({
            "database": schema.database,
            "vertex_collections": schema.vertex_collections(),
            "edge_collections": schema.edge_collections(),
        });
        Ok(StepOutput {
            summary,
            delta: StateDelta {
                schema: Some(schema),
                ..StateDelta::default()
            },
            issues: Vec::new(),
        })
    }
}

pub struct RequirementsAnalyst {
    extractor: Arc<dyn RequirementsExtractor>,
}

impl RequirementsAnalyst {
    pub fn new(extractor: Arc<dyn RequirementsExtractor>) -> Self {
        Self { extractor }
    }

    async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        if input.documents.is_empty() {
            return Err(agent_error(
                WorkflowStep::RequirementsExtraction,
                "no input documents provided",
            ));
        }
        let requirements = self.extractor.extract(input.documents).await?;
        Ok(StepOutput {
            summary: json!({ "objectives": requirements.objectives.len() }),
            delta: StateDelta {
                requirements: Some(requirements),
                ..StateDelta::default()
            },
            issues: Vec::new(),
        })
    }
}

pub struct UseCaseExpert {
    generator: Arc<dyn UseCaseGenerator>,
}

impl UseCaseExpert {
    pub fn new(generator: Arc<dyn UseCaseGenerator>) -> Self {
        Self { generator }
    }

    async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        // Requirements may be missing when their step was skipped.
        let requirements = input.requirements.unwrap_or_default();
        let use_cases = self.generator.generate(requirements, input.schema).await?;
        if use_cases.is_empty() {
            return Err(agent_error(
                WorkflowStep::UseCaseGeneration,
                "no use cases generated",
            ));
        }
        let ids: Vec<&str> = use_cases.iter().map(|u| u.id.as_str()).collect();
        Ok(StepOutput {
            summary: json!({ "use_cases": ids }),
            delta: StateDelta {
                use_cases: Some(use_cases.clone()),
                ..StateDelta::default()
            },
            issues: Vec::new(),
        })
    }
}

pub struct TemplateEngineer {
    generator: Arc<dyn TemplateGenerator>,
}

impl TemplateEngineer {
    pub fn new(generator: Arc<dyn TemplateGenerator>) -> Self {
        Self { generator }
    }

    async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        if input.use_cases.is_empty() {
            return Err(agent_error(
                WorkflowStep::TemplateGeneration,
                "no use cases to build templates from",
            ));
        }
        let templates = self.generator.generate(input.use_cases, input.schema).await?;
        let names: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
        Ok(StepOutput {
            summary: json!({ "templates": names }),
            delta: StateDelta {
                templates: Some(templates.clone()),
                ..StateDelta::default()
            },
            issues: Vec::new(),
        })
    }
}

pub struct ExecutionSpecialist {
    coordinator: Arc<ExecutionCoordinator>,
}

impl ExecutionSpecialist {
    pub fn new(coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    /// A template that cannot become an analysis is reported as an issue;
    /// the step still succeeds so finished analyses are kept, not re-run.
    async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        let mut executions = Vec::new();
        let mut issues = Vec::new();
        for template in input.templates.iter().take(input.max_executions) {
            match self.coordinator.execute_template(template, true).await {
                Ok(execution) => executions.push(execution),
                Err(e) => {
                    warn!(template = %template.name, error = %e, "Template rejected");
                    issues.push(format!("template '{}' rejected: {}", template.name, e));
                }
            }
        }
        let succeeded = executions.iter().filter(|e| e.succeeded()).count();
        info!(
            executed = executions.len(),
            succeeded,
            rejected = issues.len(),
            "Templates executed"
        );
        Ok(StepOutput {
            summary: json!({
                "executed": executions.len(),
                "succeeded": succeeded,
                "rejected": issues,
            }),
            delta: StateDelta {
                execution_results: executions,
                ..StateDelta::default()
            },
            issues,
        })
    }
}

pub struct ReportingSpecialist {
    generator: Arc<dyn ReportGenerator>,
}

impl ReportingSpecialist {
    pub fn new(generator: Arc<dyn ReportGenerator>) -> Self {
        Self { generator }
    }

    async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        let mut reports = Vec::new();
        for execution in input.execution_results {
            let context = ReportContext {
                use_case: input
                    .use_cases
                    .iter()
                    .find(|u| Some(&u.id) == execution.use_case_id.as_ref())
                    .cloned(),
                requirements: input.requirements.clone(),
            };
            reports.push(self.generator.generate(execution, context).await?);
        }
        Ok(StepOutput {
            summary: json!({ "reports": reports.len() }),
            delta: StateDelta {
                reports,
                ..StateDelta::default()
            },
            issues: Vec::new(),
        })
    }
}

/// Closed set of agents; each variant owns one workflow step.
pub enum Agent {
    SchemaAnalyst(SchemaAnalyst),
    RequirementsAnalyst(RequirementsAnalyst),
    UseCaseExpert(UseCaseExpert),
    TemplateEngineer(TemplateEngineer),
    Execution(ExecutionSpecialist),
    Reporting(ReportingSpecialist),
}

impl Agent {
    pub fn step(&self) -> WorkflowStep {
        match self {
            Self::SchemaAnalyst(_) => WorkflowStep::SchemaAnalysis,
            Self::RequirementsAnalyst(_) => WorkflowStep::RequirementsExtraction,
            Self::UseCaseExpert(_) => WorkflowStep::UseCaseGeneration,
            Self::TemplateEngineer(_) => WorkflowStep::TemplateGeneration,
            Self::Execution(_) => WorkflowStep::Execution,
            Self::Reporting(_) => WorkflowStep::Reporting,
        }
    }

    pub fn id(&self) -> &'static str {
        self.step().agent_id()
    }

    pub(crate) async fn perform(&self, input: StepInput) -> Result<StepOutput> {
        match self {
            Self::SchemaAnalyst(a) => a.perform(input).await,
            Self::RequirementsAnalyst(a) => a.perform(input).await,
            Self::UseCaseExpert(a) => a.perform(input).await,
            Self::TemplateEngineer(a) => a.perform(input).await,
            Self::Execution(a) => a.perform(input).await,
            Self::Reporting(a) => a.perform(input).await,
        }
    }
}
