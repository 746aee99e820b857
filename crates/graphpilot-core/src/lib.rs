pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod traits;
pub mod types;

pub use analysis::{
    Algorithm, AnalysisConfig, AnalysisDefaults, AnalysisTemplate, CleanupPolicy, EngineSize,
    RetryPolicy,
};
pub use config::AppConfig;
pub use error::{ErrorKind, GraphPilotError, Result};
pub use event::{EventBus, WorkflowEvent};
pub use job::{AnalysisResult, AnalysisStatus, ExecutionResult};
pub use types::*;
