use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use graphpilot_core::analysis::AnalysisTemplate;
use graphpilot_core::artifacts::{GraphSchema, InputDocument, Report, Requirements, UseCase};
use graphpilot_core::config::DatabaseConfig;
use graphpilot_core::error::Result;
use graphpilot_core::job::ExecutionResult;
use graphpilot_core::types::RunId;

use crate::message::AgentMessage;
use crate::steps::WorkflowStep;

/// One agent failure, as recorded by the runtime adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub agent: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(agent: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Aborted,
}

/// The slice of workflow state an agent needs for one step.
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    pub documents: Vec<InputDocument>,
    pub database: DatabaseConfig,
    pub schema: Option<GraphSchema>,
    pub requirements: Option<Requirements>,
    pub use_cases: Vec<UseCase>,
    pub templates: Vec<AnalysisTemplate>,
    pub execution_results: Vec<ExecutionResult>,
    pub max_executions: usize,
}

impl StepInput {
    /// Split into one input per independent item of a fan-out step.
    ///
    /// Execution fans out over templates (capped by `max_executions`),
    /// reporting over execution results. Other steps do not split.
    pub fn split(self, step: WorkflowStep) -> Vec<StepInput> {
        match step {
            WorkflowStep::Execution => {
                let cap = self.max_executions;
                self.templates
                    .iter()
                    .take(cap)
                    .map(|t| StepInput {
                        templates: vec![t.clone()],
                        ..self.clone()
                    })
                    .collect()
            }
            WorkflowStep::Reporting => self
                .execution_results
                .iter()
                .map(|r| StepInput {
                    execution_results: vec![r.clone()],
                    ..self.clone()
                })
                .collect(),
            _ => vec![self],
        }
    }
}

/// Artifacts produced by one step, merged back by the supervisor.
///
/// Steps write disjoint fields, so deltas from concurrent steps never
/// overwrite each other.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub schema: Option<GraphSchema>,
    pub requirements: Option<Requirements>,
    pub use_cases: Option<Vec<UseCase>>,
    pub templates: Option<Vec<AnalysisTemplate>>,
    pub execution_results: Vec<ExecutionResult>,
    pub reports: Vec<Report>,
}

impl StateDelta {
    /// Combine deltas of fan-out tasks.
    pub fn merge(mut self, other: StateDelta) -> Self {
        self.schema = other.schema.or(self.schema);
        self.requirements = other.requirements.or(self.requirements);
        self.use_cases = other.use_cases.or(self.use_cases);
        self.templates = other.templates.or(self.templates);
        self.execution_results.extend(other.execution_results);
        self.reports.extend(other.reports);
        self
    }
}

/// Progress of one workflow run. Owned by the supervisor.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub run_id: RunId,
    pub input_documents: Vec<InputDocument>,
    pub database: DatabaseConfig,
    pub max_executions: usize,
    pub schema: Option<GraphSchema>,
    pub requirements: Option<Requirements>,
    pub use_cases: Vec<UseCase>,
    pub templates: Vec<AnalysisTemplate>,
    pub execution_results: Vec<ExecutionResult>,
    pub reports: Vec<Report>,
    pub status: WorkflowStatus,
    pub current_step: Option<WorkflowStep>,
    pub completed_steps: Vec<WorkflowStep>,
    pub messages: Vec<AgentMessage>,
    pub errors: Vec<ErrorRecord>,
}

impl WorkflowState {
    pub fn new(
        input_documents: Vec<InputDocument>,
        database: DatabaseConfig,
        max_executions: usize,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            input_documents,
            database,
            max_executions,
            schema: None,
            requirements: None,
            use_cases: vec![],
            templates: vec![],
            execution_results: vec![],
            reports: vec![],
            status: WorkflowStatus::Running,
            current_step: None,
            completed_steps: vec![],
            messages: vec![],
            errors: vec![],
        }
    }

    pub fn is_completed(&self, step: WorkflowStep) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn mark_completed(&mut self, step: WorkflowStep) {
        if !self.is_completed(step) {
            self.completed_steps.push(step);
        }
    }

    pub fn record_message(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    pub fn record_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Errors recorded so far for one agent.
    pub fn error_count(&self, agent: &str) -> usize {
        self.errors.iter().filter(|e| e.agent == agent).count()
    }

    /// Build the input an agent needs for `step`.
    pub fn input_for(&self, step: WorkflowStep) -> StepInput {
        let base = StepInput {
            database: self.database.clone(),
            max_executions: self.max_executions,
            ..StepInput::default()
        };
        match step {
            WorkflowStep::SchemaAnalysis => base,
            WorkflowStep::RequirementsExtraction => StepInput {
                documents: self.input_documents.clone(),
                ..base
            },
            WorkflowStep::UseCaseGeneration => StepInput {
                schema: self.schema.clone(),
                requirements: self.requirements.clone(),
                ..base
            },
            WorkflowStep::TemplateGeneration => StepInput {
                schema: self.schema.clone(),
                use_cases: self.use_cases.clone(),
                ..base
            },
            WorkflowStep::Execution => StepInput {
                templates: self.templates.clone(),
                ..base
            },
            WorkflowStep::Reporting => StepInput {
                requirements: self.requirements.clone(),
                use_cases: self.use_cases.clone(),
                execution_results: self.execution_results.clone(),
                ..base
            },
        }
    }

    /// Merge a step's artifacts into the state.
    pub fn apply(&mut self, delta: StateDelta) {
        if let Some(schema) = delta.schema {
            self.schema = Some(schema);
        }
        if let Some(requirements) = delta.requirements {
            self.requirements = Some(requirements);
        }
        if let Some(use_cases) = delta.use_cases {
            self.use_cases = use_cases;
        }
        if let Some(templates) = delta.templates {
            self.templates = templates;
        }
        self.execution_results.extend(delta.execution_results);
        self.reports.extend(delta.reports);
    }

    /// Stable JSON export of the run.
    pub fn export_state(&self) -> Value {
        json!({
            "run_id": self.run_id.0,
            "status": self.status,
            "completed_steps": self.completed_steps,
            "current_step": self.current_step,
            "messages": self.messages,
            "errors": self.errors,
            "schema": self.schema,
            "requirements": self.requirements,
            "use_cases": self.use_cases,
            "templates": self.templates,
            "execution_results": self.execution_results,
            "reports": self.reports,
        })
    }

    /// Write [`Self::export_state`] to `path` as pretty JSON.
    pub fn save_state(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&self.export_state())?;
        std::fs::write(path, body)?;
        Ok(())
    }
}
