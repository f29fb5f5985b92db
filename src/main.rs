//! # Cronflow — cron-driven dispatcher for remote CI workflows
//!
//! Usage:
//!   cronflow serve                                   # Run the scheduler until Ctrl-C
//!   cronflow task list                               # Tasks with their next due time
//!   cronflow task add nightly acme/app build.yml "0 2 * * *"
//!   cronflow task run <id>                           # Dispatch now (workflow must be active)
//!   cronflow status acme/app build.yml               # Normalized latest-run status
//!   cronflow cancel acme/app 123456
//!   cronflow repo acme/app                           # Branches + workflows

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use cronflow_core::CronflowConfig;
use cronflow_github::GitHubClient;
use cronflow_scheduler::cron::next_run_from_cron;
use cronflow_scheduler::{CronScheduler, NewTask, Task, TaskPatch, TaskService, TaskStore};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cronflow",
    version,
    about = "⏰ Cronflow — scheduled dispatch of remote CI workflows"
)]
struct Cli {
    /// Config file (default: ~/.cronflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and block until Ctrl-C
    Serve,
    /// Manage scheduled tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Show the latest run status of a workflow
    Status { repo: String, workflow: String },
    /// Cancel a workflow run
    Cancel { repo: String, run_id: u64 },
    /// List a repository's branches and workflows
    Repo { repo: String },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// List all tasks
    List,
    /// Show one task
    Show { id: String },
    /// Create a task
    Add(AddArgs),
    /// Update fields of a task
    Edit(EditArgs),
    /// Delete a task
    Remove { id: String },
    /// Dispatch a task's workflow right now
    Run { id: String },
}

#[derive(Args)]
struct AddArgs {
    name: String,
    /// Repository as owner/name
    repo: String,
    /// Workflow file name or path
    workflow: String,
    /// 5-field cron expression
    cron: String,
    /// Git ref to dispatch on (default: main)
    #[arg(long = "ref")]
    git_ref: Option<String>,
    #[arg(short, long)]
    description: Option<String>,
    /// Create the task disabled
    #[arg(long)]
    disabled: bool,
}

#[derive(Args)]
struct EditArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    workflow: Option<String>,
    #[arg(long)]
    cron: Option<String>,
    #[arg(long = "ref")]
    git_ref: Option<String>,
    #[arg(short, long)]
    description: Option<String>,
    #[arg(long, conflicts_with = "disable")]
    enable: bool,
    #[arg(long)]
    disable: bool,
}

impl From<AddArgs> for NewTask {
    fn from(args: AddArgs) -> Self {
        Self {
            name: args.name,
            repo: args.repo,
            workflow: args.workflow,
            git_ref: args.git_ref,
            cron: args.cron,
            description: args.description,
            enabled: Some(!args.disabled),
        }
    }
}

impl EditArgs {
    fn into_patch(self) -> (String, TaskPatch) {
        let enabled = match (self.enable, self.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        let patch = TaskPatch {
            name: self.name,
            repo: self.repo,
            workflow: self.workflow,
            git_ref: self.git_ref,
            cron: self.cron,
            description: self.description,
            enabled,
        };
        (self.id, patch)
    }
}

/// A task as printed by `task list`.
#[derive(Serialize)]
struct TaskView {
    #[serde(flatten)]
    task: Task,
    next_run: Option<DateTime<Utc>>,
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "cronflow=debug,cronflow_core=debug,cronflow_github=debug,cronflow_scheduler=debug"
    } else {
        "cronflow=info,cronflow_core=info,cronflow_github=info,cronflow_scheduler=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = match &cli.config {
        Some(path) => CronflowConfig::load_from(path)?,
        None => CronflowConfig::load()?,
    };

    let db_path = config.storage.resolved_db_path();
    let store = Arc::new(TaskStore::open(&db_path)?);
    let client = Arc::new(GitHubClient::new(&config.github)?);
    let scheduler = Arc::new(CronScheduler::new(store.clone(), client.clone()));
    let service = TaskService::new(store, client, scheduler.clone());

    match cli.command {
        Command::Serve => {
            if !config.scheduler.enabled {
                tracing::warn!("⚠️  Scheduler disabled in config ([scheduler] enabled = false)");
                return Ok(());
            }

            println!("⏰ Cronflow v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database: {}", db_path.display());
            println!("   🌐 API:      {}", config.github.api_base);
            println!();

            let resync = Duration::from_secs(config.scheduler.resync_interval_secs);
            scheduler.start(resync).await;
            for run in scheduler.next_runs().await {
                match run.next_run {
                    Some(at) => {
                        tracing::info!("   {} ({}) → next at {}", run.task_name, run.cron, at)
                    }
                    None => {
                        tracing::info!("   {} ({}) → no upcoming run", run.task_name, run.cron)
                    }
                }
            }

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            scheduler.stop().await;
        }
        Command::Task(command) => match command {
            TaskCommand::List => {
                let now = Utc::now();
                let views: Vec<TaskView> = service
                    .list_tasks()
                    .into_iter()
                    .map(|task| {
                        let next_run = if task.enabled {
                            next_run_from_cron(&task.cron, now)
                        } else {
                            None
                        };
                        TaskView { task, next_run }
                    })
                    .collect();
                print_json(&views)?;
            }
            TaskCommand::Show { id } => print_json(&service.get_task(&id)?)?,
            TaskCommand::Add(args) => {
                let id = service.create_task(args.into()).await?;
                print_json(&service.get_task(&id)?)?;
            }
            TaskCommand::Edit(args) => {
                let (id, patch) = args.into_patch();
                print_json(&service.update_task(&id, patch).await?)?;
            }
            TaskCommand::Remove { id } => {
                service.delete_task(&id).await?;
                println!("🗑️  Removed task {id}");
            }
            TaskCommand::Run { id } => {
                service.run_task_now(&id).await?;
                println!("🚀 Dispatched task {id}");
            }
        },
        Command::Status { repo, workflow } => {
            print_json(&service.get_workflow_status(&repo, &workflow).await)?;
        }
        Command::Cancel { repo, run_id } => {
            service.cancel_run(&repo, run_id).await?;
            println!("🛑 Cancel requested for run {run_id} in {repo}");
        }
        Command::Repo { repo } => print_json(&service.get_repo_info(&repo).await?)?,
    }

    Ok(())
}
