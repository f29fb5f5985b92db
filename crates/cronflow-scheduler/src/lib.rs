//! # Cronflow Scheduler
//!
//! Named tasks that dispatch remote CI workflows on a cron schedule.
//!
//! ## Architecture
//! ```text
//! TaskService (create / update / delete / run-now / status / cancel / repo)
//!   ├── TaskStore      SQLite, UNIQUE(name) → atomic create-if-absent
//!   ├── CronScheduler  one tokio timer per enabled task, resynced on every change
//!   │     └── on fire → WorkflowTrigger::trigger_workflow (failures logged)
//!   └── GitHubClient   dispatch, cancel, repo info, normalized status
//! ```

pub mod cron;
pub mod engine;
pub mod service;
pub mod store;
pub mod tasks;

pub use engine::{CronScheduler, ScheduledRun, SyncReport};
pub use service::TaskService;
pub use store::TaskStore;
pub use tasks::{NewTask, Task, TaskPatch, ValidPatch, ValidTask};
