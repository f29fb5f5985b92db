//! # Cronflow GitHub
//!
//! Typed access to the GitHub Actions REST API plus the pure logic that folds
//! heterogeneous lookup/run results into one [`RunStatus`].
//!
//! ```text
//! GitHubClient
//!   ├── get_workflow_info   GET  /repos/{repo}/actions/workflows/{file}
//!   ├── latest_run          GET  /repos/{repo}/actions/workflows/{file}/runs?per_page=1
//!   ├── trigger_workflow    POST /repos/{repo}/actions/workflows/{file}/dispatches
//!   ├── cancel_workflow     POST /repos/{repo}/actions/runs/{id}/cancel
//!   ├── get_repo_info       GET  /repos/{repo}/branches + /actions/workflows (all pages)
//!   └── get_workflow_status → status::resolve_lookup / status::resolve_latest_run
//! ```

pub mod client;
pub mod status;
pub mod types;

pub use client::GitHubClient;
pub use status::{RunStatus, WorkflowLookup, WorkflowStatus};
pub use types::{
    RepoInfo, WorkflowInfo, WorkflowRun, WorkflowState, WorkflowSummary, resolve_workflow_id,
};
