use serde::{Deserialize, Serialize};

/// Sender id used by the supervisor.
pub const SUPERVISOR_ID: &str = "orchestrator";

/// Agent errors tolerated per agent before the workflow aborts.
pub const MAX_AGENT_ERRORS: usize = 3;

/// The fixed, ordered workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    SchemaAnalysis,
    RequirementsExtraction,
    UseCaseGeneration,
    TemplateGeneration,
    Execution,
    Reporting,
}

impl WorkflowStep {
    /// Declared order.
    pub const ALL: [WorkflowStep; 6] = [
        Self::SchemaAnalysis,
        Self::RequirementsExtraction,
        Self::UseCaseGeneration,
        Self::TemplateGeneration,
        Self::Execution,
        Self::Reporting,
    ];

    /// Steps that run concurrently in the first parallel phase.
    pub const INDEPENDENT: [WorkflowStep; 2] = [Self::SchemaAnalysis, Self::RequirementsExtraction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaAnalysis => "schema_analysis",
            Self::RequirementsExtraction => "requirements_extraction",
            Self::UseCaseGeneration => "use_case_generation",
            Self::TemplateGeneration => "template_generation",
            Self::Execution => "execution",
            Self::Reporting => "reporting",
        }
    }

    /// Id of the agent that owns this step.
    pub fn agent_id(&self) -> &'static str {
        match self {
            Self::SchemaAnalysis => "schema_analyst",
            Self::RequirementsExtraction => "requirements_analyst",
            Self::UseCaseGeneration => "use_case_expert",
            Self::TemplateGeneration => "template_engineer",
            Self::Execution => "execution_specialist",
            Self::Reporting => "reporting_specialist",
        }
    }

    /// A failure here marks the step complete instead of retrying.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::RequirementsExtraction | Self::Reporting)
    }

    /// Runs one task per item in parallel mode.
    pub fn is_fan_out(&self) -> bool {
        matches!(self, Self::Execution | Self::Reporting)
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
