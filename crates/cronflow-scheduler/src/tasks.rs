//! Task definitions — the core data model for scheduled dispatches.
//!
//! Payloads arrive as [`NewTask`] / [`TaskPatch`] and only become storable
//! once validated into [`ValidTask`] / [`ValidPatch`], whose fields are private.

use chrono::{DateTime, Utc};
use cronflow_core::error::{CronflowError, Result};
use serde::{Deserialize, Serialize};

use crate::cron;

/// Ref used when none is supplied.
pub const DEFAULT_REF: &str = "main";

/// A persisted task: which workflow to dispatch, on what ref, on what schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID, assigned by the store.
    pub id: String,
    /// Trimmed, unique across all tasks.
    pub name: String,
    /// Target repository, "owner/name".
    pub repo: String,
    /// Workflow file name or path; only the last segment reaches the API.
    pub workflow: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub cron: String,
    pub description: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Set on every update; `None` until the first one.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create payload as supplied by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub repo: String,
    pub workflow: String,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    pub cron: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Update payload: every field optional, supplied ones win over the stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A create payload that passed validation, with all fields normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTask {
    name: String,
    repo: String,
    workflow: String,
    git_ref: String,
    cron: String,
    description: String,
    enabled: bool,
}

/// An update payload that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidPatch {
    patch: TaskPatch,
}

// ─── Field checks ───────────────────────────────────────────

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CronflowError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

fn check_repo(value: &str) -> Result<String> {
    let repo = required("repo", value)?;
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(repo)
        }
        _ => Err(CronflowError::validation("repo", "must look like 'owner/name'")),
    }
}

fn check_cron(value: &str) -> Result<String> {
    let expression = required("cron", value)?;
    cron::validate(&expression).map_err(|reason| {
        CronflowError::validation("cron", format!("invalid expression: {reason}"))
    })?;
    Ok(expression)
}

fn normalize_ref(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => DEFAULT_REF.to_string(),
    }
}

impl NewTask {
    /// Check every required field and normalize the payload.
    pub fn validate(&self) -> Result<ValidTask> {
        let name = required("name", &self.name)?;
        let repo = check_repo(&self.repo)?;
        let workflow = required("workflow", &self.workflow)?;
        let cron = check_cron(&self.cron)?;

        Ok(ValidTask {
            name,
            repo,
            workflow,
            git_ref: normalize_ref(self.git_ref.as_deref()),
            cron,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

impl TaskPatch {
    /// Check every supplied field; absent fields are left alone.
    pub fn validate(&self) -> Result<ValidPatch> {
        let patch = TaskPatch {
            name: self.name.as_deref().map(|v| required("name", v)).transpose()?,
            repo: self.repo.as_deref().map(check_repo).transpose()?,
            workflow: self
                .workflow
                .as_deref()
                .map(|v| required("workflow", v))
                .transpose()?,
            git_ref: self.git_ref.as_deref().map(|v| normalize_ref(Some(v))),
            cron: self.cron.as_deref().map(check_cron).transpose()?,
            description: self.description.as_deref().map(|d| d.trim().to_string()),
            enabled: self.enabled,
        };
        Ok(ValidPatch { patch })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.repo.is_none()
            && self.workflow.is_none()
            && self.git_ref.is_none()
            && self.cron.is_none()
            && self.description.is_none()
            && self.enabled.is_none()
    }
}

impl ValidTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Materialize the record the store will persist.
    pub(crate) fn into_task(self, id: String, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            name: self.name,
            repo: self.repo,
            workflow: self.workflow,
            git_ref: self.git_ref,
            cron: self.cron,
            description: self.description,
            enabled: self.enabled,
            created_at,
            updated_at: None,
        }
    }
}

impl ValidPatch {
    /// The new name, if this patch renames the task.
    pub fn name(&self) -> Option<&str> {
        self.patch.name.as_deref()
    }
}

impl Task {
    /// Merge a validated patch over this record and stamp `updated_at`.
    pub fn apply(&mut self, patch: &ValidPatch, now: DateTime<Utc>) {
        let p = &patch.patch;
        if let Some(name) = &p.name {
            self.name = name.clone();
        }
        if let Some(repo) = &p.repo {
            self.repo = repo.clone();
        }
        if let Some(workflow) = &p.workflow {
            self.workflow = workflow.clone();
        }
        if let Some(git_ref) = &p.git_ref {
            self.git_ref = git_ref.clone();
        }
        if let Some(cron) = &p.cron {
            self.cron = cron.clone();
        }
        if let Some(description) = &p.description {
            self.description = description.clone();
        }
        if let Some(enabled) = p.enabled {
            self.enabled = enabled;
        }
        self.updated_at = Some(now);
    }
}
