//! GitHub Actions REST client.
//!
//! Mutating calls (`trigger_workflow`, `cancel_workflow`) propagate every
//! failure. The status probe never fails: errors become `API_ERROR` so it can
//! be polled while upstream is degraded.

use std::time::Duration;

use async_trait::async_trait;
use cronflow_core::config::GitHubConfig;
use cronflow_core::error::{CronflowError, Result};
use cronflow_core::traits::WorkflowTrigger;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use crate::status::{self, WorkflowLookup, WorkflowStatus};
use crate::types::{
    RepoInfo, WorkflowInfo, WorkflowRun, WorkflowRunList, WorkflowSummary, resolve_workflow_id,
};

const API_VERSION: &str = "2022-11-28";
/// GitHub's maximum `per_page`.
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 50;

/// Authenticated client for one GitHub API endpoint.
pub struct GitHubClient {
    /// Base URL, e.g. `https://api.github.com`.
    api_base: String,
    /// Bearer token; empty means anonymous.
    token: String,
    client: reqwest::Client,
}

impl GitHubClient {
    /// Build a client from config. The configured timeout applies to every call.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CronflowError::Http(format!("Client error: {e}")))?;

        if config.token.is_empty() {
            tracing::warn!("⚠️ No GitHub token configured — dispatch and cancel will be rejected");
        }

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    /// Issue an authenticated call against `endpoint` (a path starting with `/`).
    ///
    /// - non-2xx → [`CronflowError::RemoteApi`]
    /// - 204 (or an empty 2xx body) → `Value::Null`
    /// - other 2xx → the parsed JSON body
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.api_base, endpoint);
        tracing::debug!("🌐 GitHub {} {}", method, endpoint);

        let mut req = self
            .client
            .request(method, &url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(body) = body {
            req = req.json(body);
        }
        let req = self.apply_auth(req);

        let resp = req
            .send()
            .await
            .map_err(|e| CronflowError::Http(format!("GitHub request failed ({endpoint}): {e}")))?;

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = resp.text().await.map_err(|e| {
            CronflowError::Http(format!("GitHub body read failed ({endpoint}): {e}"))
        })?;

        if !status.is_success() {
            return Err(CronflowError::RemoteApi {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| CronflowError::Http(format!("Invalid JSON from {endpoint}: {e}")))
    }

    /// Fetch workflow metadata, including its enablement state.
    pub async fn get_workflow_info(&self, repo: &str, workflow: &str) -> Result<WorkflowInfo> {
        let endpoint = format!(
            "/repos/{}/actions/workflows/{}",
            repo,
            resolve_workflow_id(workflow)
        );
        let value = self.request(Method::GET, &endpoint, None).await?;
        serde_json::from_value(value)
            .map_err(|e| CronflowError::BadRequest(format!("Invalid workflow response: {e}")))
    }

    /// Dispatch a new run of `workflow` against `git_ref`.
    pub async fn trigger_workflow(&self, repo: &str, workflow: &str, git_ref: &str) -> Result<()> {
        let endpoint = format!(
            "/repos/{}/actions/workflows/{}/dispatches",
            repo,
            resolve_workflow_id(workflow)
        );
        self.request(Method::POST, &endpoint, Some(&json!({ "ref": git_ref })))
            .await?;
        tracing::info!("🚀 Dispatched {} on {}@{}", workflow, repo, git_ref);
        Ok(())
    }

    /// Ask GitHub to cancel a run.
    pub async fn cancel_workflow(&self, repo: &str, run_id: u64) -> Result<()> {
        let endpoint = format!("/repos/{}/actions/runs/{}/cancel", repo, run_id);
        self.request(Method::POST, &endpoint, None).await?;
        tracing::info!("🛑 Cancel requested for run {} in {}", run_id, repo);
        Ok(())
    }

    /// The newest run of a workflow, relying on the API's newest-first order.
    pub async fn latest_run(&self, repo: &str, workflow: &str) -> Result<Option<WorkflowRun>> {
        let endpoint = format!(
            "/repos/{}/actions/workflows/{}/runs?per_page=1",
            repo,
            resolve_workflow_id(workflow)
        );
        let value = self.request(Method::GET, &endpoint, None).await?;
        let list: WorkflowRunList = serde_json::from_value(value)
            .map_err(|e| CronflowError::BadRequest(format!("Invalid runs response: {e}")))?;
        Ok(list.workflow_runs.into_iter().next())
    }

    /// Branch names and workflow list of a repository, fetched concurrently.
    ///
    /// Both listings are followed page by page until a short page comes back.
    pub async fn get_repo_info(&self, repo: &str) -> Result<RepoInfo> {
        let branches_endpoint = format!("/repos/{}/branches", repo);
        let workflows_endpoint = format!("/repos/{}/actions/workflows", repo);

        let (branches, workflows) = tokio::try_join!(
            self.collect_pages(&branches_endpoint, branch_items, "branches"),
            self.collect_pages(&workflows_endpoint, workflow_items, "workflows"),
        )?;

        let branches = branches
            .iter()
            .filter_map(|b| b["name"].as_str().map(String::from))
            .collect();

        let workflows = workflows
            .iter()
            .filter_map(|w| {
                Some(WorkflowSummary {
                    name: w["name"].as_str()?.to_string(),
                    path: w["path"].as_str()?.to_string(),
                })
            })
            .collect();

        Ok(RepoInfo {
            branches,
            workflows,
        })
    }

    /// GET every page of a paginated listing. `items` picks the array out of one page.
    async fn collect_pages(
        &self,
        endpoint: &str,
        items: fn(&Value) -> Option<&Vec<Value>>,
        what: &str,
    ) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = format!("{endpoint}?per_page={PAGE_SIZE}&page={page}");
            let value = self.request(Method::GET, &url, None).await?;
            let batch = items(&value)
                .ok_or_else(|| CronflowError::BadRequest(format!("Invalid {what} response")))?;
            let last = batch.len() < PAGE_SIZE;
            all.extend(batch.iter().cloned());
            if last {
                return Ok(all);
            }
        }
        tracing::warn!("⚠️ {} listing truncated at {} pages", what, MAX_PAGES);
        Ok(all)
    }

    /// Normalized status of a workflow's latest run. Never fails.
    pub async fn get_workflow_status(&self, repo: &str, workflow: &str) -> WorkflowStatus {
        match self.probe_status(repo, workflow).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("⚠️ Status probe for {} in {} failed: {}", workflow, repo, e);
                WorkflowStatus::api_error(e.to_string())
            }
        }
    }

    async fn probe_status(&self, repo: &str, workflow: &str) -> Result<WorkflowStatus> {
        let lookup = match self.get_workflow_info(repo, workflow).await {
            Ok(info) => WorkflowLookup::Found(info),
            Err(e) if e.is_remote_not_found() => WorkflowLookup::NotFound,
            Err(e) => return Err(e),
        };

        if let Some(status) = status::resolve_lookup(&lookup) {
            return Ok(status);
        }

        let latest = self.latest_run(repo, workflow).await?;
        Ok(status::resolve_latest_run(latest.as_ref()))
    }
}

#[async_trait]
impl WorkflowTrigger for GitHubClient {
    async fn trigger_workflow(&self, repo: &str, workflow: &str, git_ref: &str) -> Result<()> {
        GitHubClient::trigger_workflow(self, repo, workflow, git_ref).await
    }
}

fn branch_items(page: &Value) -> Option<&Vec<Value>> {
    page.as_array()
}

fn workflow_items(page: &Value) -> Option<&Vec<Value>> {
    page["workflows"].as_array()
}

/// GitHub error bodies look like `{"message": "...", "documentation_url": "..."}`.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .filter(|m| !m.is_empty())
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}
