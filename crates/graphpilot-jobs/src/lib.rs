pub mod classify;
pub mod coordinator;
pub mod orchestrator;
pub mod validation;

pub use classify::is_retryable;
pub use coordinator::{ExecutionCoordinator, ExecutionSummary};
pub use orchestrator::JobOrchestrator;
pub use validation::{check_documents, validate_results};
