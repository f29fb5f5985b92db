//! Run-status normalization.
//!
//! Pure, stateless mapping from whatever the remote API reported (lookup
//! outcome, latest run) to a single [`RunStatus`]. Nothing is cached: every
//! call is a fresh projection of the remote system's current truth.
//!
//! ```text
//! lookup 404            → NOT_FOUND
//! lookup disabled_*     → DISABLED    (runs never queried)
//! no runs               → NEVER_RUN
//! run not completed     → RUNNING
//! completed + success   → SUCCESS
//! completed + cancelled → CANCELLED
//! completed + failure   → FAILURE
//! completed + other     → OTHER (uppercased verbatim)
//! any error on the way  → API_ERROR
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{WorkflowInfo, WorkflowRun, WorkflowState};

/// Normalized workflow status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    NotFound,
    Disabled,
    NeverRun,
    Running,
    Success,
    Cancelled,
    Failure,
    /// Any other conclusion, uppercased (`timed_out` → `TIMED_OUT`).
    Other(String),
    ApiError,
}

impl RunStatus {
    /// Map a completed run's conclusion.
    pub fn from_conclusion(conclusion: &str) -> Self {
        match conclusion {
            "success" => Self::Success,
            "cancelled" => Self::Cancelled,
            "failure" => Self::Failure,
            other => Self::Other(other.to_uppercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Disabled => "DISABLED",
            Self::NeverRun => "NEVER_RUN",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Cancelled => "CANCELLED",
            Self::Failure => "FAILURE",
            Self::Other(value) => value,
            Self::ApiError => "API_ERROR",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "NOT_FOUND" => Self::NotFound,
            "DISABLED" => Self::Disabled,
            "NEVER_RUN" => Self::NeverRun,
            "RUNNING" => Self::Running,
            "SUCCESS" => Self::Success,
            "CANCELLED" => Self::Cancelled,
            "FAILURE" => Self::Failure,
            "API_ERROR" => Self::ApiError,
            _ => Self::Other(value.to_uppercase()),
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Result of `get_workflow_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub run_id: Option<u64>,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

impl WorkflowStatus {
    fn bare(status: RunStatus) -> Self {
        Self {
            last_run: None,
            status,
            run_id: None,
            message: None,
            html_url: None,
        }
    }

    pub fn not_found() -> Self {
        Self::bare(RunStatus::NotFound)
    }

    pub fn disabled() -> Self {
        Self::bare(RunStatus::Disabled)
    }

    pub fn never_run() -> Self {
        Self::bare(RunStatus::NeverRun)
    }

    /// Error captured from anywhere in the probe.
    pub fn api_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::bare(RunStatus::ApiError)
        }
    }
}

/// Outcome of the workflow lookup. A 404 becomes [`WorkflowLookup::NotFound`]
/// instead of an error so the probe can branch on it like any other state.
#[derive(Debug, Clone)]
pub enum WorkflowLookup {
    NotFound,
    Found(WorkflowInfo),
}

/// Decide from the lookup alone, if possible.
///
/// Returns `None` when the runs must be queried to know more.
pub fn resolve_lookup(lookup: &WorkflowLookup) -> Option<WorkflowStatus> {
    match lookup {
        WorkflowLookup::NotFound => Some(WorkflowStatus::not_found()),
        WorkflowLookup::Found(info) => match info.workflow_state() {
            WorkflowState::Disabled(_) => Some(WorkflowStatus::disabled()),
            WorkflowState::Active | WorkflowState::Unknown(_) => None,
        },
    }
}

/// Status from the most recent run (or its absence).
pub fn resolve_latest_run(latest: Option<&WorkflowRun>) -> WorkflowStatus {
    let Some(run) = latest else {
        return WorkflowStatus::never_run();
    };

    let status = match (run.status.as_deref(), run.conclusion.as_deref()) {
        (Some("completed"), Some(conclusion)) => RunStatus::from_conclusion(conclusion),
        // Completed without a conclusion has nothing to report beyond "done"
        (Some("completed"), None) => RunStatus::Other("COMPLETED".to_string()),
        _ => RunStatus::Running,
    };

    WorkflowStatus {
        last_run: Some(run.created_at),
        status,
        run_id: Some(run.id),
        message: None,
        html_url: run.html_url.clone(),
    }
}
