pub mod collaborators;
pub mod message;
pub mod runner;
pub mod runtime;
pub mod specialists;
pub mod state;
pub mod steps;
pub mod supervisor;
pub mod trace;

pub use collaborators::Collaborators;
pub use message::{AgentMessage, MessageType};
pub use runner::WorkflowRunner;
pub use runtime::{AgentOutcome, AgentRuntime};
pub use specialists::Agent;
pub use state::{ErrorRecord, StateDelta, StepInput, WorkflowState, WorkflowStatus};
pub use steps::WorkflowStep;
pub use supervisor::{decide_strategy, determine_next_step, AgentSupervisor, RecoveryStrategy};
pub use trace::{TraceEntry, TraceRecorder};
