//! Task service — the operations consumed by the CLI (or any outer transport).
//!
//! Constructed once at startup from explicit store, client and scheduler
//! handles. Every store mutation is followed by a scheduler resync so persisted
//! definitions and live timers never drift apart.

use std::sync::Arc;

use cronflow_core::error::{CronflowError, Result};
use cronflow_github::{GitHubClient, RepoInfo, WorkflowStatus};

use crate::engine::CronScheduler;
use crate::store::TaskStore;
use crate::tasks::{NewTask, Task, TaskPatch};

pub struct TaskService {
    store: Arc<TaskStore>,
    client: Arc<GitHubClient>,
    scheduler: Arc<CronScheduler>,
}

impl TaskService {
    pub fn new(
        store: Arc<TaskStore>,
        client: Arc<GitHubClient>,
        scheduler: Arc<CronScheduler>,
    ) -> Self {
        Self {
            store,
            client,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<CronScheduler> {
        &self.scheduler
    }

    // ─── Task CRUD ──────────────────────────────────────────

    /// Validate and persist a new task. Returns its id.
    pub async fn create_task(&self, input: NewTask) -> Result<String> {
        let valid = input.validate()?;
        let id = self.store.create(valid)?;
        self.scheduler.sync().await;
        Ok(id)
    }

    /// Validate a patch and merge it over an existing task.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let valid = patch.validate()?;
        let task = self.store.update(id, &valid)?;
        self.scheduler.sync().await;
        Ok(task)
    }

    /// Remove a task; unknown ids succeed silently.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        self.scheduler.sync().await;
        Ok(())
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.list()
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        self.store.get(id)
    }

    // ─── Remote operations ──────────────────────────────────

    /// Dispatch a task immediately, only if its workflow is `active`.
    pub async fn run_task_now(&self, id: &str) -> Result<()> {
        let task = self.store.get(id)?;
        let info = self.client.get_workflow_info(&task.repo, &task.workflow).await?;

        let state = info.workflow_state();
        if !state.is_active() {
            tracing::warn!(
                "⛔ Not running '{}': workflow {} is {}",
                task.name,
                task.workflow,
                state
            );
            return Err(CronflowError::WorkflowNotActive {
                workflow: task.workflow.clone(),
                state: state.to_string(),
            });
        }

        self.scheduler.dispatch(&task).await
    }

    /// Normalized status of a workflow's latest run. Never fails.
    pub async fn get_workflow_status(&self, repo: &str, workflow: &str) -> WorkflowStatus {
        self.client.get_workflow_status(repo, workflow).await
    }

    pub async fn cancel_run(&self, repo: &str, run_id: u64) -> Result<()> {
        self.client.cancel_workflow(repo, run_id).await
    }

    pub async fn get_repo_info(&self, repo: &str) -> Result<RepoInfo> {
        self.client.get_repo_info(repo).await
    }
}
