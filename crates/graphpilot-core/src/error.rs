use thiserror::Error;

/// Coarse error category used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credentials, bad settings, unsupported input. Never retried.
    Configuration,
    /// Expired or rejected credential.
    Auth,
    /// Network failure, 5xx, rate limiting. Retried.
    Transient,
    /// Post-execution sanity check failed. Never retried.
    Validation,
    /// A remote job or engine missed its deadline.
    Timeout,
    /// The remote resource does not exist.
    NotFound,
    /// Engine teardown failed. Always escalated.
    Cleanup,
    /// Anything else; decided by message patterns.
    Other,
}

#[derive(Debug, Error)]
pub enum GraphPilotError {
    // Config errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Remote engine errors
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transient engine error: {0}")]
    Transient(String),

    #[error("Unsupported algorithm '{name}' (valid: {valid})")]
    UnsupportedAlgorithm { name: String, valid: String },

    #[error("Remote request rejected (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Engine conflict: {0}")]
    EngineConflict(String),

    #[error("Engine cleanup failed, must manually delete engine {engine_id}: {message}")]
    EngineCleanup { engine_id: String, message: String },

    // Result errors
    #[error("Result validation failed: {0}")]
    Validation(String),

    // Agent / workflow errors
    #[error("Agent {agent} failed: {message}")]
    Agent { agent: String, message: String },

    #[error("Workflow error: {0}")]
    Workflow(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphPilotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_)
            | Self::ConfigNotFound(_)
            | Self::UnsupportedAlgorithm { .. }
            | Self::EngineConflict(_) => ErrorKind::Configuration,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Transient(_) | Self::Io(_) => ErrorKind::Transient,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::EngineCleanup { .. } => ErrorKind::Cleanup,
            Self::Remote { status, .. } if *status == 429 || *status >= 500 => {
                ErrorKind::Transient
            }
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphPilotError>;
