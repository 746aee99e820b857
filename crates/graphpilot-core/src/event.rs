use serde::Serialize;

use crate::job::AnalysisStatus;

/// Structured event broadcast to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Workflow run started.
    WorkflowStarted { run_id: String, parallel: bool },
    /// A step was dispatched to its owning agent.
    StepStarted { step: String, agent: String, attempt: u32 },
    /// A step finished successfully.
    StepCompleted { step: String, elapsed_ms: u64 },
    /// A failed step was marked complete under the skip policy.
    StepSkipped { step: String, error: String },
    /// A failed step will be dispatched again.
    StepRetried { step: String, error: String, attempt: u32 },
    /// A message was recorded in workflow state.
    MessageRecorded {
        id: String,
        from: String,
        to: String,
        kind: String,
    },
    /// Workflow stopped early.
    WorkflowAborted { step: String, error: String },
    /// Workflow finished every step.
    WorkflowCompleted { run_id: String, completed_steps: usize },
    /// Analysis job changed phase.
    JobStatusChanged {
        job_id: String,
        analysis: String,
        status: AnalysisStatus,
    },
    /// Analysis attempt failed and will be retried.
    JobRetry { job_id: String, attempt: u32, error: String },
    /// Engine is now held by a run.
    EngineAcquired { engine_id: String, reused: bool },
    /// Engine was torn down.
    EngineDeleted { engine_id: String },
    /// Engine teardown failed; the engine may still be billing.
    EngineCleanupFailed { engine_id: String, error: String },
}

impl WorkflowEvent {
    /// Short name used in trace summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepSkipped { .. } => "step_skipped",
            Self::StepRetried { .. } => "step_retried",
            Self::MessageRecorded { .. } => "message_recorded",
            Self::WorkflowAborted { .. } => "workflow_aborted",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::JobStatusChanged { .. } => "job_status_changed",
            Self::JobRetry { .. } => "job_retry",
            Self::EngineAcquired { .. } => "engine_acquired",
            Self::EngineDeleted { .. } => "engine_deleted",
            Self::EngineCleanupFailed { .. } => "engine_cleanup_failed",
        }
    }

    /// Whether this event ends a workflow run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted { .. } | Self::WorkflowAborted { .. }
        )
    }
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
