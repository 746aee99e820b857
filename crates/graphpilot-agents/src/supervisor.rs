use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use graphpilot_core::event::{EventBus, WorkflowEvent};

use crate::message::{AgentMessage, MessageType};
use crate::runtime::{AgentOutcome, AgentRuntime};
use crate::state::{StateDelta, WorkflowState, WorkflowStatus};
use crate::steps::{WorkflowStep, MAX_AGENT_ERRORS, SUPERVISOR_ID};

/// How the supervisor reacts to a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Retry,
    Skip,
    Abort,
}

/// Result of handling one step's reply.
enum Flow {
    Advance,
    Retry,
    Abort(AgentMessage),
}

/// Sequences the specialist agents through the fixed workflow.
pub struct AgentSupervisor {
    runtime: Arc<AgentRuntime>,
    event_bus: Arc<EventBus>,
}

/// First declared step not yet completed.
pub fn determine_next_step(state: &WorkflowState) -> Option<WorkflowStep> {
    WorkflowStep::ALL
        .into_iter()
        .find(|step| !state.is_completed(*step))
}

/// Skip allow-listed steps; retry an agent while it has fewer than
/// `MAX_AGENT_ERRORS` recorded errors; abort otherwise.
pub fn decide_strategy(step: WorkflowStep, state: &WorkflowState) -> RecoveryStrategy {
    if step.is_skippable() {
        RecoveryStrategy::Skip
    } else if state.error_count(step.agent_id()) < MAX_AGENT_ERRORS {
        RecoveryStrategy::Retry
    } else {
        RecoveryStrategy::Abort
    }
}

impl AgentSupervisor {
    pub fn new(runtime: Arc<AgentRuntime>, event_bus: Arc<EventBus>) -> Self {
        Self { runtime, event_bus }
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    /// Run every remaining step in order, one agent at a time.
    ///
    /// Returns the terminal `complete` or `error` message, which is also
    /// the last message recorded in `state`.
    pub async fn run_workflow(&self, state: &mut WorkflowState) -> AgentMessage {
        self.start(state, false);
        while let Some(step) = determine_next_step(state) {
            if let Some(abort) = self.execute_step(step, state).await {
                return abort;
            }
        }
        self.complete(state)
    }

    /// Run with parallel phases.
    ///
    /// Phase 1 runs schema analysis and requirements extraction
    /// concurrently. Later steps run strictly after it joins; fan-out steps
    /// launch one task per item and join before the step completes.
    pub async fn run_workflow_async(&self, state: &mut WorkflowState, parallel: bool) -> AgentMessage {
        if !parallel {
            return self.run_workflow(state).await;
        }
        self.start(state, true);

        if let Some(abort) = self.run_independent_phase(state).await {
            return abort;
        }

        while let Some(step) = determine_next_step(state) {
            let abort = if step.is_fan_out() {
                self.fan_out(step, state).await
            } else {
                self.execute_step(step, state).await
            };
            if let Some(abort) = abort {
                return abort;
            }
        }
        self.complete(state)
    }

    /// Dispatch one step until it completes, is skipped, or aborts the run.
    pub async fn execute_step(&self, step: WorkflowStep, state: &mut WorkflowState) -> Option<AgentMessage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let task = self.dispatch_task(step, state, Map::new(), attempt);
            let outcome = self
                .runtime
                .process(step, &task, state.input_for(step))
                .await;
            match self.handle_outcome(step, outcome, state, started) {
                Flow::Advance => return None,
                Flow::Retry => continue,
                Flow::Abort(message) => return Some(message),
            }
        }
    }

    async fn run_independent_phase(&self, state: &mut WorkflowState) -> Option<AgentMessage> {
        let steps: Vec<WorkflowStep> = WorkflowStep::INDEPENDENT
            .into_iter()
            .filter(|s| !state.is_completed(*s))
            .collect();
        if steps.is_empty() {
            return None;
        }

        let started = Instant::now();
        let mut launches = Vec::new();
        for step in &steps {
            let task = self.dispatch_task(*step, state, Map::new(), 1);
            launches.push((*step, task, state.input_for(*step)));
        }

        // Each step writes its own field of the state, so both can run
        // before either result is merged.
        let outcomes = futures::future::join_all(
            launches
                .iter()
                .map(|(step, task, input)| self.runtime.process(*step, task, input.clone())),
        )
        .await;

        let mut retry = Vec::new();
        for (step, outcome) in steps.iter().zip(outcomes) {
            match self.handle_outcome(*step, outcome, state, started) {
                Flow::Advance => {}
                Flow::Retry => retry.push(*step),
                Flow::Abort(message) => return Some(message),
            }
        }
        for step in retry {
            if let Some(abort) = self.execute_step(step, state).await {
                return Some(abort);
            }
        }
        None
    }

    /// One task per independent item, a single item included; any failed
    /// task aborts the workflow. With no items the step completes at once.
    async fn fan_out(&self, step: WorkflowStep, state: &mut WorkflowState) -> Option<AgentMessage> {
        let started = Instant::now();
        let items = state.input_for(step).split(step);
        if items.is_empty() {
            info!(step = %step, "Nothing to fan out");
            self.mark_completed(step, state, started);
            return None;
        }

        let mut launches = Vec::with_capacity(items.len());
        for (index, input) in items.into_iter().enumerate() {
            let mut params = Map::new();
            params.insert("item".into(), json!(index));
            let task = self.dispatch_task(step, state, params, 1);
            launches.push((task, input));
        }
        info!(step = %step, tasks = launches.len(), "Fanning out");

        // Joined rather than raced so every analysis reaches its own cleanup.
        let outcomes = futures::future::join_all(
            launches
                .iter()
                .map(|(task, input)| self.runtime.process(step, task, input.clone())),
        )
        .await;

        let mut merged = StateDelta::default();
        let mut failures = Vec::new();
        for outcome in outcomes {
            self.record(state, outcome.reply.clone());
            for issue in outcome.issues {
                state.record_error(issue);
            }
            match outcome.error {
                Some(record) => {
                    failures.push(record.error.clone());
                    state.record_error(record);
                }
                None => merged = merged.merge(outcome.delta),
            }
        }

        if !failures.is_empty() {
            let error = format!("{} of {} {} tasks failed: {}", failures.len(), launches.len(), step, failures.join("; "));
            return Some(self.abort(step, &error, state));
        }

        state.apply(merged);
        self.mark_completed(step, state, started);
        None
    }

    fn dispatch_task(
        &self,
        step: WorkflowStep,
        state: &mut WorkflowState,
        params: Map<String, Value>,
        attempt: u32,
    ) -> AgentMessage {
        state.current_step = Some(step);
        let task = AgentMessage::task(SUPERVISOR_ID, step.agent_id(), step.as_str(), params);
        self.event_bus.publish(WorkflowEvent::StepStarted {
            step: step.as_str().to_string(),
            agent: step.agent_id().to_string(),
            attempt,
        });
        self.record(state, task.clone());
        task
    }

    fn handle_outcome(
        &self,
        step: WorkflowStep,
        outcome: AgentOutcome,
        state: &mut WorkflowState,
        started: Instant,
    ) -> Flow {
        self.record(state, outcome.reply.clone());

        for issue in outcome.issues {
            warn!(step = %step, issue = %issue.error, "Step finished with an issue");
            state.record_error(issue);
        }
        let Some(record) = outcome.error else {
            state.apply(outcome.delta);
            self.mark_completed(step, state, started);
            return Flow::Advance;
        };

        let error = record.error.clone();
        state.record_error(record);
        match decide_strategy(step, state) {
            RecoveryStrategy::Skip => {
                warn!(step = %step, error = %error, "Skipping failed step");
                state.mark_completed(step);
                self.event_bus.publish(WorkflowEvent::StepSkipped {
                    step: step.as_str().to_string(),
                    error,
                });
                Flow::Advance
            }
            RecoveryStrategy::Retry => {
                let attempt = state.error_count(step.agent_id()) as u32 + 1;
                warn!(step = %step, attempt, error = %error, "Retrying failed step");
                self.event_bus.publish(WorkflowEvent::StepRetried {
                    step: step.as_str().to_string(),
                    error,
                    attempt,
                });
                Flow::Retry
            }
            RecoveryStrategy::Abort => Flow::Abort(self.abort(step, &error, state)),
        }
    }

    fn mark_completed(&self, step: WorkflowStep, state: &mut WorkflowState, started: Instant) {
        state.mark_completed(step);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(step = %step, elapsed_ms, "Step completed");
        self.event_bus.publish(WorkflowEvent::StepCompleted {
            step: step.as_str().to_string(),
            elapsed_ms,
        });
    }

    fn record(&self, state: &mut WorkflowState, message: AgentMessage) {
        self.event_bus.publish(WorkflowEvent::MessageRecorded {
            id: message.id.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            kind: message.kind.as_str().to_string(),
        });
        state.record_message(message);
    }

    fn start(&self, state: &mut WorkflowState, parallel: bool) {
        state.status = WorkflowStatus::Running;
        info!(run_id = %state.run_id, parallel, "Workflow started");
        self.event_bus.publish(WorkflowEvent::WorkflowStarted {
            run_id: state.run_id.to_string(),
            parallel,
        });
        let mut content = Map::new();
        content.insert("run_id".into(), json!(state.run_id.0));
        content.insert("parallel".into(), json!(parallel));
        content.insert(
            "steps".into(),
            json!(WorkflowStep::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>()),
        );
        self.record(state, AgentMessage::new(SUPERVISOR_ID, "workflow", MessageType::Start, content));
    }

    fn complete(&self, state: &mut WorkflowState) -> AgentMessage {
        state.status = WorkflowStatus::Completed;
        state.current_step = None;
        info!(run_id = %state.run_id, errors = state.errors.len(), "Workflow completed");
        self.event_bus.publish(WorkflowEvent::WorkflowCompleted {
            run_id: state.run_id.to_string(),
            completed_steps: state.completed_steps.len(),
        });

        let mut content = Map::new();
        content.insert("status".into(), json!("success"));
        content.insert("completed_steps".into(), json!(state.completed_steps));
        content.insert("errors".into(), json!(state.errors.len()));
        let message = AgentMessage::new(SUPERVISOR_ID, "workflow", MessageType::Complete, content);
        self.record(state, message.clone());
        message
    }

    /// Terminal error message carrying the partial progress.
    fn abort(&self, step: WorkflowStep, error: &str, state: &mut WorkflowState) -> AgentMessage {
        state.status = WorkflowStatus::Aborted;
        error!(step = %step, error, completed = ?state.completed_steps, "Workflow aborted");
        self.event_bus.publish(WorkflowEvent::WorkflowAborted {
            step: step.as_str().to_string(),
            error: error.to_string(),
        });

        let mut content = Map::new();
        content.insert("status".into(), json!("error"));
        content.insert("step".into(), json!(step));
        content.insert("error".into(), json!(error));
        content.insert("completed_steps".into(), json!(state.completed_steps));
        let message = AgentMessage::new(SUPERVISOR_ID, "workflow", MessageType::Error, content);
        self.record(state, message.clone());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Collaborators;
    use crate::state::ErrorRecord;
    use graphpilot_core::artifacts::InputDocument;
    use graphpilot_core::config::DatabaseConfig;
    use graphpilot_core::job::AnalysisStatus;
    use graphpilot_engine::EngineClient;
    use graphpilot_jobs::{ExecutionCoordinator, JobOrchestrator};
    use graphpilot_test_utils::{
        fast_engine_config, fast_jobs_config, social_template, FakeCollaborators, FakeEngine,
        FakeFailure,
    };

    struct Harness {
        engine: Arc<FakeEngine>,
        collaborators: Arc<FakeCollaborators>,
        supervisor: AgentSupervisor,
    }

    fn harness() -> Harness {
        let engine = Arc::new(FakeEngine::new());
        for target in ["uc-001_results", "uc-002_results"] {
            engine.set_results(
                target,
                vec![
                    serde_json::json!({"id": "users/1", "component": 1, "pagerank": 0.6}),
                    serde_json::json!({"id": "users/2", "component": 1, "pagerank": 0.4}),
                ],
            );
        }
        let collaborators = Arc::new(FakeCollaborators::new());
        let bus = Arc::new(EventBus::default());
        let client = Arc::new(EngineClient::new(engine.clone(), fast_engine_config()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            client,
            engine.clone(),
            fast_jobs_config(),
            bus.clone(),
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            orchestrator,
            engine.clone(),
            fast_jobs_config().analysis_defaults("social"),
        ));
        let runtime = Arc::new(AgentRuntime::standard(
            Collaborators::from_single(collaborators.clone()),
            coordinator,
        ));
        Harness {
            engine,
            collaborators,
            supervisor: AgentSupervisor::new(runtime, bus),
        }
    }

    fn new_state() -> WorkflowState {
        WorkflowState::new(
            vec![InputDocument::new("brief.md", "- find influencers")],
            DatabaseConfig::default(),
            3,
        )
    }

    fn task_index(state: &WorkflowState, step: WorkflowStep) -> Option<usize> {
        state.messages.iter().position(|m| {
            m.kind == MessageType::Task && m.step() == Some(step.as_str())
        })
    }

    fn result_index(state: &WorkflowState, step: WorkflowStep) -> Option<usize> {
        state.messages.iter().position(|m| {
            m.kind == MessageType::Result && m.step() == Some(step.as_str())
        })
    }

    #[test]
    fn next_step_follows_declared_order() {
        let mut state = new_state();
        for expected in WorkflowStep::ALL {
            assert_eq!(determine_next_step(&state), Some(expected));
            state.mark_completed(expected);
        }
        assert_eq!(determine_next_step(&state), None);
    }

    #[test]
    fn next_step_skips_out_of_order_completions() {
        let mut state = new_state();
        state.mark_completed(WorkflowStep::RequirementsExtraction);
        assert_eq!(determine_next_step(&state), Some(WorkflowStep::SchemaAnalysis));
        state.mark_completed(WorkflowStep::SchemaAnalysis);
        assert_eq!(determine_next_step(&state), Some(WorkflowStep::UseCaseGeneration));
    }

    #[test]
    fn strategy_follows_allow_list_then_threshold() {
        let mut state = new_state();
        assert_eq!(
            decide_strategy(WorkflowStep::RequirementsExtraction, &state),
            RecoveryStrategy::Skip
        );
        assert_eq!(decide_strategy(WorkflowStep::Reporting, &state), RecoveryStrategy::Skip);
        for _ in 0..2 {
            state.record_error(ErrorRecord::new("schema_analyst", "down"));
        }
        assert_eq!(decide_strategy(WorkflowStep::SchemaAnalysis, &state), RecoveryStrategy::Retry);
        state.record_error(ErrorRecord::new("schema_analyst", "down"));
        assert_eq!(decide_strategy(WorkflowStep::SchemaAnalysis, &state), RecoveryStrategy::Abort);
    }

    #[tokio::test]
    async fn sequential_run_completes_every_step() {
        let h = harness();
        let mut state = new_state();

        let last = h.supervisor.run_workflow(&mut state).await;

        assert_eq!(last.kind, MessageType::Complete);
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.completed_steps, WorkflowStep::ALL.to_vec());
        assert_eq!(state.execution_results.len(), 2);
        assert!(state.execution_results.iter().all(|e| e.result.status == AnalysisStatus::Completed));
        assert_eq!(state.reports.len(), 2);
        assert_eq!(h.engine.calls(FakeEngine::DELETE_ENGINE), 2);
        assert_eq!(state.messages.first().map(|m| m.kind), Some(MessageType::Start));
    }

    #[tokio::test]
    async fn skippable_error_is_not_redispatched() {
        let h = harness();
        h.collaborators.fail_next(FakeCollaborators::REQUIREMENTS, 1);
        let mut state = new_state();

        let last = h.supervisor.run_workflow(&mut state).await;

        assert_eq!(last.kind, MessageType::Complete);
        assert!(state.is_completed(WorkflowStep::RequirementsExtraction));
        assert!(state.requirements.is_none());
        assert_eq!(h.collaborators.calls(FakeCollaborators::REQUIREMENTS), 1);
        let tasks = state
            .messages
            .iter()
            .filter(|m| m.kind == MessageType::Task && m.step() == Some("requirements_extraction"))
            .count();
        assert_eq!(tasks, 1);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].agent, "requirements_analyst");
    }

    #[tokio::test]
    async fn failing_step_is_retried_then_succeeds() {
        let h = harness();
        h.collaborators.fail_next(FakeCollaborators::USE_CASES, 2);
        let mut state = new_state();

        let last = h.supervisor.run_workflow(&mut state).await;

        assert_eq!(last.kind, MessageType::Complete);
        assert_eq!(h.collaborators.calls(FakeCollaborators::USE_CASES), 3);
        assert_eq!(state.error_count("use_case_expert"), 2);
    }

    #[tokio::test]
    async fn repeated_failure_aborts_with_partial_progress() {
        let h = harness();
        h.collaborators.fail_next(FakeCollaborators::TEMPLATES, 5);
        let mut state = new_state();

        let last = h.supervisor.run_workflow(&mut state).await;

        assert!(last.is_error());
        assert_eq!(state.status, WorkflowStatus::Aborted);
        assert_eq!(h.collaborators.calls(FakeCollaborators::TEMPLATES), 3);
        assert_eq!(
            last.content["completed_steps"],
            json!(["schema_analysis", "requirements_extraction", "use_case_generation"])
        );
        assert_eq!(state.error_count("template_engineer"), 3);
        assert!(state.schema.is_some());
        assert_eq!(state.use_cases.len(), 2);
    }

    #[tokio::test]
    async fn parallel_phase_one_finishes_before_use_cases_start() {
        let h = harness();
        h.collaborators
            .set_latency(FakeCollaborators::SCHEMA, std::time::Duration::from_millis(30));
        let mut state = new_state();

        let last = h.supervisor.run_workflow_async(&mut state, true).await;

        assert_eq!(last.kind, MessageType::Complete);
        let use_case_task = task_index(&state, WorkflowStep::UseCaseGeneration).unwrap();
        let schema_result = result_index(&state, WorkflowStep::SchemaAnalysis).unwrap();
        let requirements_result = result_index(&state, WorkflowStep::RequirementsExtraction).unwrap();
        assert!(schema_result < use_case_task);
        assert!(requirements_result < use_case_task);

        // Both phase-1 tasks were sent before either result arrived.
        let requirements_task = task_index(&state, WorkflowStep::RequirementsExtraction).unwrap();
        assert!(requirements_task < schema_result);

        let log = h.collaborators.completion_log();
        let schema_done = log.iter().position(|op| *op == FakeCollaborators::SCHEMA).unwrap();
        let requirements_done = log
            .iter()
            .position(|op| *op == FakeCollaborators::REQUIREMENTS)
            .unwrap();
        assert!(requirements_done < schema_done);
    }

    #[tokio::test]
    async fn parallel_fan_out_runs_one_task_per_template() {
        let h = harness();
        let mut state = new_state();

        let last = h.supervisor.run_workflow_async(&mut state, true).await;

        assert_eq!(last.kind, MessageType::Complete);
        let execution_tasks = state
            .messages
            .iter()
            .filter(|m| m.kind == MessageType::Task && m.step() == Some("execution"))
            .count();
        assert_eq!(execution_tasks, 2);
        assert_eq!(state.execution_results.len(), 2);
        assert_eq!(state.reports.len(), 2);
        let engines: std::collections::HashSet<_> = state
            .execution_results
            .iter()
            .map(|e| e.result.engine_id.clone())
            .collect();
        assert_eq!(engines.len(), 2);
    }

    #[tokio::test]
    async fn fan_out_failure_aborts_the_workflow() {
        let h = harness();
        h.collaborators.fail_next(FakeCollaborators::REPORTS, 1);
        let mut state = new_state();

        let last = h.supervisor.run_workflow_async(&mut state, true).await;

        assert!(last.is_error());
        assert_eq!(state.status, WorkflowStatus::Aborted);
        assert!(state.is_completed(WorkflowStep::Execution));
        assert!(!state.is_completed(WorkflowStep::Reporting));
        assert_eq!(state.errors.len(), 1);
    }

    #[tokio::test]
    async fn single_item_fan_out_failure_aborts_the_workflow() {
        let h = harness();
        h.collaborators.set_use_case_count(1);
        h.collaborators.fail_next(FakeCollaborators::REPORTS, 1);
        let mut state = new_state();

        let last = h.supervisor.run_workflow_async(&mut state, true).await;

        assert!(last.is_error());
        assert_eq!(state.status, WorkflowStatus::Aborted);
        assert_eq!(state.execution_results.len(), 1);
        assert!(!state.is_completed(WorkflowStep::Reporting));
        assert_eq!(h.collaborators.calls(FakeCollaborators::REPORTS), 1);
        let reporting_tasks = state
            .messages
            .iter()
            .filter(|m| m.kind == MessageType::Task && m.step() == Some("reporting"))
            .count();
        assert_eq!(reporting_tasks, 1);
    }

    #[tokio::test]
    async fn empty_fan_out_completes_without_dispatch() {
        let h = harness();
        let mut state = new_state();
        for step in &WorkflowStep::ALL[..4] {
            state.mark_completed(*step);
        }

        let last = h.supervisor.run_workflow_async(&mut state, true).await;

        assert_eq!(last.kind, MessageType::Complete);
        assert!(state.execution_results.is_empty());
        assert!(state.messages.iter().all(|m| m.kind != MessageType::Task));
        assert_eq!(h.engine.calls(FakeEngine::DEPLOY_ENGINE), 0);
    }

    fn state_with_templates(templates: Vec<graphpilot_core::analysis::AnalysisTemplate>) -> WorkflowState {
        let mut state = new_state();
        for step in &WorkflowStep::ALL[..4] {
            state.mark_completed(*step);
        }
        state.templates = templates;
        state
    }

    #[tokio::test]
    async fn rejected_template_keeps_finished_analyses() {
        let h = harness();
        h.engine.set_results(
            "good_results",
            vec![
                json!({"id": "users/1", "component": 1}),
                json!({"id": "users/2", "component": 1}),
            ],
        );
        let mut state = state_with_templates(vec![
            social_template("good", "wcc"),
            social_template("bad", "louvain"),
        ]);

        let last = h.supervisor.run_workflow(&mut state).await;

        assert_eq!(last.kind, MessageType::Complete);
        assert_eq!(h.engine.calls(FakeEngine::DEPLOY_ENGINE), 1);
        assert_eq!(h.engine.calls(FakeEngine::DELETE_ENGINE), 1);
        assert_eq!(state.execution_results.len(), 1);
        assert_eq!(state.execution_results[0].template_name, "good");
        assert!(state.execution_results[0].succeeded());
        assert_eq!(state.reports.len(), 1);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].agent, "execution_specialist");
        assert!(state.errors[0].error.contains("louvain"));
        let execution_tasks = state
            .messages
            .iter()
            .filter(|m| m.kind == MessageType::Task && m.step() == Some("execution"))
            .count();
        assert_eq!(execution_tasks, 1);
    }

    #[tokio::test]
    async fn rejected_template_in_fan_out_does_not_abort() {
        let h = harness();
        h.engine.set_results(
            "good_results",
            vec![
                json!({"id": "users/1", "component": 1}),
                json!({"id": "users/2", "component": 1}),
            ],
        );
        let mut state = state_with_templates(vec![
            social_template("good", "wcc"),
            social_template("bad", "louvain"),
        ]);

        let last = h.supervisor.run_workflow_async(&mut state, true).await;

        assert_eq!(last.kind, MessageType::Complete);
        assert_eq!(h.engine.calls(FakeEngine::DEPLOY_ENGINE), 1);
        assert_eq!(state.execution_results.len(), 1);
        assert_eq!(state.error_count("execution_specialist"), 1);
    }

    #[tokio::test]
    async fn failed_analyses_do_not_fail_the_execution_step() {
        let h = harness();
        h.engine.fail_next(FakeEngine::LOAD_GRAPH, FakeFailure::Configuration, 1);
        let mut state = new_state();

        let last = h.supervisor.run_workflow(&mut state).await;

        assert_eq!(last.kind, MessageType::Complete);
        let failed = state
            .execution_results
            .iter()
            .filter(|e| e.result.status == AnalysisStatus::Failed)
            .count();
        assert_eq!(failed, 1);
    }
}
