//! Trait seams between crates.

use async_trait::async_trait;

use crate::error::Result;

/// Anything that can dispatch a workflow run on a repository ref.
///
/// Implemented by the GitHub client; the scheduler only ever sees this trait,
/// so tests can swap in a recording fake.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    /// Request a new run of `workflow` in `repo` against `git_ref`.
    async fn trigger_workflow(&self, repo: &str, workflow: &str, git_ref: &str) -> Result<()>;
}
