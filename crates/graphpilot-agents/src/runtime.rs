use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error};

use graphpilot_core::error::GraphPilotError;
use graphpilot_jobs::ExecutionCoordinator;

use crate::collaborators::Collaborators;
use crate::message::AgentMessage;
use crate::specialists::*;
use crate::state::{ErrorRecord, StateDelta, StepInput};
use crate::steps::WorkflowStep;

/// What the supervisor receives back from one agent call.
#[derive(Debug)]
pub struct AgentOutcome {
    pub reply: AgentMessage,
    pub delta: StateDelta,
    /// Set when the agent failed; the supervisor appends it to state.
    pub error: Option<ErrorRecord>,
    /// Non-fatal item failures of a successful call, also appended to state.
    pub issues: Vec<ErrorRecord>,
}

/// Registry of agents keyed by the step they own, plus the standard
/// adapter that turns any failure into a canonical error message.
pub struct AgentRuntime {
    agents: HashMap<WorkflowStep, Agent>,
}

impl AgentRuntime {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.step(), a)).collect(),
        }
    }

    /// The standard six agents.
    pub fn standard(collaborators: Collaborators, coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self::new(vec![
            Agent::SchemaAnalyst(SchemaAnalyst::new(collaborators.schema)),
            Agent::RequirementsAnalyst(RequirementsAnalyst::new(collaborators.requirements)),
            Agent::UseCaseExpert(UseCaseExpert::new(collaborators.use_cases)),
            Agent::TemplateEngineer(TemplateEngineer::new(collaborators.templates)),
            Agent::Execution(ExecutionSpecialist::new(coordinator)),
            Agent::Reporting(ReportingSpecialist::new(collaborators.reports)),
        ])
    }

    pub fn agent(&self, step: WorkflowStep) -> Option<&Agent> {
        self.agents.get(&step)
    }

    /// Hand `task` to the agent owning `step`.
    ///
    /// Never fails: an agent error, a panic, or a missing agent all come
    /// back as an `error` message with an [`ErrorRecord`].
    pub async fn process(&self, step: WorkflowStep, task: &AgentMessage, input: StepInput) -> AgentOutcome {
        let agent_id = step.agent_id();
        let Some(agent) = self.agent(step) else {
            return Self::failure(agent_id, step, task, format!("no agent registered for {}", step));
        };

        debug!(agent = agent_id, step = %step, task = %task.id, "Agent processing task");
        let outcome = AssertUnwindSafe(agent.perform(input)).catch_unwind().await;

        match outcome {
            Ok(Ok(output)) => AgentOutcome {
                reply: AgentMessage::result(agent_id, task, step.as_str(), output.summary),
                delta: output.delta,
                error: None,
                issues: output
                    .issues
                    .into_iter()
                    .map(|issue| ErrorRecord::new(agent_id, issue))
                    .collect(),
            },
            Ok(Err(e)) => Self::failure(agent_id, step, task, error_text(agent_id, e)),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                    .unwrap_or_else(|| "unknown panic".to_string());
                Self::failure(agent_id, step, task, format!("agent panicked: {}", detail))
            }
        }
    }

    fn failure(agent_id: &str, step: WorkflowStep, task: &AgentMessage, message: String) -> AgentOutcome {
        error!(agent = agent_id, step = %step, error = %message, "Agent failed");
        AgentOutcome {
            reply: AgentMessage::error(agent_id, task, step.as_str(), &message),
            delta: StateDelta::default(),
            error: Some(ErrorRecord::new(agent_id, message)),
            issues: Vec::new(),
        }
    }
}

/// Strip the agent wrapper so records read "no use cases generated",
/// not "Agent use_case_expert failed: no use cases generated".
fn error_text(agent_id: &str, e: GraphPilotError) -> String {
    match e {
        GraphPilotError::Agent { agent, message } if agent == agent_id => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::steps::SUPERVISOR_ID;
    use graphpilot_test_utils::FakeCollaborators;
    use serde_json::Map;

    fn runtime(fake: &Arc<FakeCollaborators>) -> AgentRuntime {
        AgentRuntime::new(vec![
            Agent::SchemaAnalyst(SchemaAnalyst::new(fake.clone())),
            Agent::RequirementsAnalyst(RequirementsAnalyst::new(fake.clone())),
        ])
    }

    fn task(step: WorkflowStep) -> AgentMessage {
        AgentMessage::task(SUPERVISOR_ID, step.agent_id(), step.as_str(), Map::new())
    }

    #[tokio::test]
    async fn success_becomes_result_message() {
        let fake = Arc::new(FakeCollaborators::new());
        let task = task(WorkflowStep::SchemaAnalysis);
        let outcome = runtime(&fake)
            .process(WorkflowStep::SchemaAnalysis, &task, StepInput::default())
            .await;

        assert_eq!(outcome.reply.kind, MessageType::Result);
        assert_eq!(outcome.reply.to, SUPERVISOR_ID);
        assert!(outcome.delta.schema.is_some());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn error_becomes_error_message_and_record() {
        let fake = Arc::new(FakeCollaborators::new());
        let task = task(WorkflowStep::RequirementsExtraction);
        let outcome = runtime(&fake)
            .process(WorkflowStep::RequirementsExtraction, &task, StepInput::default())
            .await;

        assert!(outcome.reply.is_error());
        assert_eq!(outcome.reply.error_text(), Some("no input documents provided"));
        assert_eq!(outcome.error.unwrap().agent, "requirements_analyst");
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let fake = Arc::new(FakeCollaborators::new());
        fake.panic_next(FakeCollaborators::SCHEMA);
        let task = task(WorkflowStep::SchemaAnalysis);
        let outcome = runtime(&fake)
            .process(WorkflowStep::SchemaAnalysis, &task, StepInput::default())
            .await;

        assert!(outcome.reply.is_error());
        assert!(outcome.reply.error_text().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn missing_agent_is_an_error() {
        let fake = Arc::new(FakeCollaborators::new());
        let task = task(WorkflowStep::Reporting);
        let outcome = runtime(&fake)
            .process(WorkflowStep::Reporting, &task, StepInput::default())
            .await;
        assert!(outcome.reply.is_error());
        assert_eq!(outcome.error.unwrap().agent, "reporting_specialist");
    }
}
