//! Cronflow error types.

use thiserror::Error;

/// Every failure a Cronflow operation can report.
#[derive(Debug, Error)]
pub enum CronflowError {
    /// A required field was missing, blank, or malformed.
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Another task already holds this (trimmed) name.
    #[error("Task name already exists: {0}")]
    Conflict(String),

    /// The remote CI API answered with a non-2xx status.
    #[error("Remote API error {status}: {message}")]
    RemoteApi { status: u16, message: String },

    /// The remote CI API answered 2xx but with an unexpected shape.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level failure (connect, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Config error: {0}")]
    Config(String),

    /// Run-now refused because the workflow is not `active`.
    #[error("Workflow '{workflow}' is not active (state: {state})")]
    WorkflowNotActive { workflow: String, state: String },

    /// A dispatch for this task is already in flight.
    #[error("Task is already dispatching: {0}")]
    TaskBusy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CronflowError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing task.
    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Task".to_string(),
            id: id.to_string(),
        }
    }

    /// True when the remote API reported 404.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::RemoteApi { status: 404, .. })
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CronflowError>;
