use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job definition error: {0}")]
    Definition(String),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Invalid action: {action}")]
    InvalidAction { action: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Short error code string returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::Config(_) => "CONFIG_ERROR",
            WorkerError::Definition(_) => "DEFINITION_ERROR",
            WorkerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            WorkerError::InvalidAction { .. } => "INVALID_ACTION",
            WorkerError::Serialization(_) => "SERIALIZATION_ERROR",
            WorkerError::Io(_) => "IO_ERROR",
            WorkerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
