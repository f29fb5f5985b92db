//! Wire types for the GitHub Actions API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow metadata as returned by `GET /actions/workflows/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub id: u64,
    pub name: String,
    pub path: String,
    /// Raw remote state: `active`, `disabled_manually`, `deleted`, ...
    pub state: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl WorkflowInfo {
    pub fn workflow_state(&self) -> WorkflowState {
        WorkflowState::parse(&self.state)
    }
}

/// Enablement state of a remote workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Active,
    /// Any `disabled_*` state; carries the raw value.
    Disabled(String),
    /// Neither active nor disabled (e.g. `deleted`).
    Unknown(String),
}

impl WorkflowState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            other if other.starts_with("disabled") => Self::Disabled(other.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Disabled(raw) | Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    /// `queued`, `in_progress`, `completed`, ...
    #[serde(default)]
    pub status: Option<String>,
    /// Only set once `status == "completed"`.
    #[serde(default)]
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Page of runs from `GET /actions/workflows/{id}/runs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

/// Branches and workflows of a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub branches: Vec<String>,
    pub workflows: Vec<WorkflowSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub path: String,
}

/// Reduce a workflow identifier to what the API accepts: the final path segment.
///
/// `".github/workflows/build.yml"` → `"build.yml"`, `"build.yml"` → `"build.yml"`.
pub fn resolve_workflow_id(workflow: &str) -> &str {
    let trimmed = workflow.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
