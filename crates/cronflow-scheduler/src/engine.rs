//! Scheduler Engine — one tokio timer per enabled task.
//!
//! ```text
//! CronScheduler
//!   ├── sync()        diff store ↔ live timers (spawn / abort / keep)
//!   ├── start()       sync once + periodic reconciliation loop
//!   ├── timer task    sleep until next occurrence → fire (spawned)
//!   └── dispatch()    guarded trigger used by run-now
//! ```
//!
//! A fire that fails is logged and dropped; the timer keeps its schedule.
//! At most one dispatch per task is in flight at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cronflow_core::error::{CronflowError, Result};
use cronflow_core::traits::WorkflowTrigger;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::cron;
use crate::store::TaskStore;
use crate::tasks::Task;

/// Everything a timer needs to fire. Two equal schedules need no respawn.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Schedule {
    task_id: String,
    task_name: String,
    repo: String,
    workflow: String,
    git_ref: String,
    cron: String,
}

impl From<&Task> for Schedule {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            repo: task.repo.clone(),
            workflow: task.workflow.clone(),
            git_ref: task.git_ref.clone(),
            cron: task.cron.clone(),
        }
    }
}

struct Timer {
    schedule: Schedule,
    handle: JoinHandle<()>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// Next due time of a registered task.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRun {
    pub task_id: String,
    pub task_name: String,
    pub cron: String,
    pub next_run: Option<DateTime<Utc>>,
}

// ─── In-flight guard ────────────────────────────────────────

#[derive(Default)]
struct InFlight {
    ids: std::sync::Mutex<HashSet<String>>,
}

impl InFlight {
    fn try_begin(self: &Arc<Self>, task_id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(task_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            owner: Arc::clone(self),
            task_id: task_id.to_string(),
        })
    }
}

/// Releases the task's slot when dropped, whatever the dispatch outcome.
struct InFlightGuard {
    owner: Arc<InFlight>,
    task_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = self.owner.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.remove(&self.task_id);
    }
}

// ─── Scheduler ──────────────────────────────────────────────

/// Keeps exactly one live timer per enabled task in the store.
pub struct CronScheduler {
    store: Arc<TaskStore>,
    trigger: Arc<dyn WorkflowTrigger>,
    timers: Mutex<HashMap<String, Timer>>,
    in_flight: Arc<InFlight>,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl CronScheduler {
    pub fn new(store: Arc<TaskStore>, trigger: Arc<dyn WorkflowTrigger>) -> Self {
        Self {
            store,
            trigger,
            timers: Mutex::new(HashMap::new()),
            in_flight: Arc::new(InFlight::default()),
            reconciler: Mutex::new(None),
        }
    }

    /// Register timers for the current store and keep reconciling every `resync_every`.
    pub async fn start(self: &Arc<Self>, resync_every: Duration) -> SyncReport {
        let report = self.sync().await;
        tracing::info!(
            "⏰ Scheduler started: {} timers (resync every {}s)",
            report.added + report.unchanged,
            resync_every.as_secs()
        );

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(resync_every.max(Duration::from_secs(1)));
            // The first tick completes immediately; sync already ran.
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = this.sync().await;
                if report.added > 0 || report.removed > 0 {
                    tracing::info!(
                        "🔄 Resync: +{} -{} ={}",
                        report.added,
                        report.removed,
                        report.unchanged
                    );
                }
            }
        });

        let mut reconciler = self.reconciler.lock().await;
        if let Some(old) = reconciler.replace(handle) {
            old.abort();
        }
        report
    }

    /// Abort every timer and the reconciliation loop.
    pub async fn stop(&self) {
        if let Some(handle) = self.reconciler.lock().await.take() {
            handle.abort();
        }
        let mut timers = self.timers.lock().await;
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        tracing::info!("⏹️ Scheduler stopped");
    }

    /// Bring live timers in line with the store.
    ///
    /// New or changed enabled tasks get a fresh timer, deleted or disabled ones
    /// lose theirs, untouched ones keep running undisturbed.
    pub async fn sync(&self) -> SyncReport {
        // Snapshot under the lock so concurrent syncs apply in store order.
        let mut timers = self.timers.lock().await;
        let wanted: HashMap<String, Schedule> = self
            .store
            .list()
            .iter()
            .filter(|t| t.enabled)
            .map(|t| (t.id.clone(), Schedule::from(t)))
            .collect();

        let mut report = SyncReport::default();

        timers.retain(|id, timer| {
            let keep = wanted.get(id) == Some(&timer.schedule) && !timer.handle.is_finished();
            if !keep {
                timer.handle.abort();
                report.removed += 1;
                tracing::debug!("Timer removed: '{}'", timer.schedule.task_name);
            }
            keep
        });

        for (id, schedule) in wanted {
            if timers.contains_key(&id) {
                report.unchanged += 1;
                continue;
            }
            tracing::info!(
                "📅 Timer registered: '{}' [{}] → {} {}@{}",
                schedule.task_name,
                schedule.cron,
                schedule.repo,
                schedule.workflow,
                schedule.git_ref
            );
            let handle = spawn_timer(
                schedule.clone(),
                Arc::clone(&self.trigger),
                Arc::clone(&self.in_flight),
            );
            timers.insert(id, Timer { schedule, handle });
            report.added += 1;
        }

        report
    }

    /// IDs of tasks that currently hold a live timer.
    pub async fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.timers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Next due time of every registered task, soonest first.
    pub async fn next_runs(&self) -> Vec<ScheduledRun> {
        let now = Utc::now();
        let mut runs: Vec<ScheduledRun> = self
            .timers
            .lock()
            .await
            .values()
            .map(|timer| ScheduledRun {
                task_id: timer.schedule.task_id.clone(),
                task_name: timer.schedule.task_name.clone(),
                cron: timer.schedule.cron.clone(),
                next_run: cron::next_run_from_cron(&timer.schedule.cron, now),
            })
            .collect();
        runs.sort_by_key(|r| r.next_run);
        runs
    }

    /// Trigger a task right away, unless a dispatch for it is already in flight.
    pub async fn dispatch(&self, task: &Task) -> Result<()> {
        let Some(_guard) = self.in_flight.try_begin(&task.id) else {
            return Err(CronflowError::TaskBusy(task.id.clone()));
        };
        tracing::info!("▶️ Manual run: '{}' ({})", task.name, task.id);
        self.trigger
            .trigger_workflow(&task.repo, &task.workflow, &task.git_ref)
            .await
    }
}

fn spawn_timer(
    schedule: Schedule,
    trigger: Arc<dyn WorkflowTrigger>,
    in_flight: Arc<InFlight>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut after = Utc::now();
        loop {
            let Some(next) = cron::next_run_from_cron(&schedule.cron, after) else {
                tracing::warn!(
                    "⚠️ No upcoming occurrence for '{}' [{}]; timer stopped",
                    schedule.task_name,
                    schedule.cron
                );
                return;
            };

            let delay = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            // Fire off-loop so a slow remote never pushes back the next occurrence.
            tokio::spawn(fire(
                schedule.clone(),
                Arc::clone(&trigger),
                Arc::clone(&in_flight),
            ));

            // Never search from before the occurrence we just fired.
            after = next.max(Utc::now());
        }
    })
}

/// One scheduled fire. Failures are logged, never propagated.
async fn fire(schedule: Schedule, trigger: Arc<dyn WorkflowTrigger>, in_flight: Arc<InFlight>) {
    let Some(_guard) = in_flight.try_begin(&schedule.task_id) else {
        tracing::warn!(
            "⏭️ Skipping '{}': previous dispatch still in flight",
            schedule.task_name
        );
        return;
    };

    tracing::info!("🔔 Cron fired: '{}'", schedule.task_name);
    match trigger
        .trigger_workflow(&schedule.repo, &schedule.workflow, &schedule.git_ref)
        .await
    {
        Ok(()) => tracing::info!("✅ Dispatched '{}'", schedule.task_name),
        Err(e) => tracing::warn!(
            "⚠️ Scheduled dispatch for '{}' failed: {}",
            schedule.task_name,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{NewTask, TaskPatch};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Records every dispatch; optionally fails or blocks until released.
    #[derive(Default)]
    struct FakeTrigger {
        calls: std::sync::Mutex<Vec<(String, String, String)>>,
        count: AtomicUsize,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl WorkflowTrigger for FakeTrigger {
        async fn trigger_workflow(&self, repo: &str, workflow: &str, git_ref: &str) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((repo.into(), workflow.into(), git_ref.into()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(CronflowError::RemoteApi {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn add(store: &TaskStore, name: &str, enabled: bool) -> String {
        store
            .create(
                NewTask {
                    name: name.into(),
                    repo: "acme/app".into(),
                    workflow: "build.yml".into(),
                    cron: "0 2 * * *".into(),
                    enabled: Some(enabled),
                    ..NewTask::default()
                }
                .validate()
                .unwrap(),
            )
            .unwrap()
    }

    fn setup(trigger: FakeTrigger) -> (Arc<TaskStore>, Arc<FakeTrigger>, Arc<CronScheduler>) {
        let store = Arc::new(TaskStore::open_in_memory().unwrap());
        let trigger = Arc::new(trigger);
        let scheduler = Arc::new(CronScheduler::new(store.clone(), trigger.clone()));
        (store, trigger, scheduler)
    }

    #[tokio::test]
    async fn test_sync_registers_enabled_only() {
        let (store, _, scheduler) = setup(FakeTrigger::default());
        let on = add(&store, "on", true);
        add(&store, "off", false);

        let report = scheduler.sync().await;
        assert_eq!(report, SyncReport { added: 1, removed: 0, unchanged: 0 });
        assert_eq!(scheduler.registered().await, vec![on]);
    }

    #[tokio::test]
    async fn test_resync_follows_store_changes() {
        let (store, _, scheduler) = setup(FakeTrigger::default());
        let a = add(&store, "a", true);
        let b = add(&store, "b", true);
        scheduler.sync().await;

        // Unchanged store → nothing respawned
        let report = scheduler.sync().await;
        assert_eq!(report, SyncReport { added: 0, removed: 0, unchanged: 2 });

        // Disable a, reschedule b, add c, delete nothing
        let disable = TaskPatch { enabled: Some(false), ..TaskPatch::default() };
        store.update(&a, &disable.validate().unwrap()).unwrap();
        let reschedule = TaskPatch { cron: Some("15 4 * * *".into()), ..TaskPatch::default() };
        store.update(&b, &reschedule.validate().unwrap()).unwrap();
        let c = add(&store, "c", true);

        let report = scheduler.sync().await;
        assert_eq!(report, SyncReport { added: 2, removed: 2, unchanged: 0 });
        let mut expected = vec![b.clone(), c.clone()];
        expected.sort();
        assert_eq!(scheduler.registered().await, expected);

        store.delete(&c).unwrap();
        let report = scheduler.sync().await;
        assert_eq!(report, SyncReport { added: 0, removed: 1, unchanged: 1 });
        assert_eq!(scheduler.registered().await, vec![b]);
    }

    #[tokio::test]
    async fn test_next_runs() {
        let (store, _, scheduler) = setup(FakeTrigger::default());
        add(&store, "nightly", true);
        scheduler.sync().await;

        let runs = scheduler.next_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].task_name, "nightly");
        assert!(runs[0].next_run.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_fire_failure_is_swallowed_and_slot_released() {
        let (store, trigger, scheduler) = setup(FakeTrigger {
            fail: true,
            ..FakeTrigger::default()
        });
        let id = add(&store, "flaky", true);

        let schedule = Schedule::from(&store.get(&id).unwrap());
        fire(schedule.clone(), trigger.clone(), scheduler.in_flight.clone()).await;
        fire(schedule, trigger.clone(), scheduler.in_flight.clone()).await;

        assert_eq!(trigger.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_keeps_firing_after_failures() {
        let (store, trigger, scheduler) = setup(FakeTrigger {
            fail: true,
            ..FakeTrigger::default()
        });
        let id = add(&store, "every-minute", true);
        let mut schedule = Schedule::from(&store.get(&id).unwrap());
        schedule.cron = "* * * * *".into();

        let handle = spawn_timer(schedule, trigger.clone(), scheduler.in_flight.clone());
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;

        assert!(trigger.count.load(Ordering::SeqCst) >= 2);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sync_after_delete_drops_timer() {
        let (store, _, scheduler) = setup(FakeTrigger::default());
        let a = add(&store, "a", true);
        let b = add(&store, "b", true);
        scheduler.sync().await;

        store.delete(&a).unwrap();
        let (first, second) = tokio::join!(scheduler.sync(), scheduler.sync());
        assert_eq!(first.removed + second.removed, 1);
        assert_eq!(scheduler.registered().await, vec![b]);
    }

    #[tokio::test]
    async fn test_fire_passes_task_target() {
        let (store, trigger, scheduler) = setup(FakeTrigger::default());
        let id = add(&store, "nightly", true);

        let schedule = Schedule::from(&store.get(&id).unwrap());
        fire(schedule, trigger.clone(), scheduler.in_flight.clone()).await;

        let calls = trigger.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![("acme/app".to_string(), "build.yml".to_string(), "main".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dispatch_rejects_overlap() {
        let gate = Arc::new(Notify::new());
        let (store, trigger, scheduler) = setup(FakeTrigger {
            gate: Some(gate.clone()),
            ..FakeTrigger::default()
        });
        let id = add(&store, "slow", true);
        let task = store.get(&id).unwrap();

        let first = {
            let scheduler = scheduler.clone();
            let task = task.clone();
            tokio::spawn(async move { scheduler.dispatch(&task).await })
        };
        // Wait until the first dispatch is inside the trigger
        while trigger.count.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let err = scheduler.dispatch(&task).await.unwrap_err();
        assert!(matches!(err, CronflowError::TaskBusy(_)));

        // A scheduled fire during the same window is skipped
        fire(Schedule::from(&task), trigger.clone(), scheduler.in_flight.clone()).await;
        assert_eq!(trigger.count.load(Ordering::SeqCst), 1);

        gate.notify_one();
        first.await.unwrap().unwrap();

        // Slot released: next dispatch goes through
        gate.notify_one();
        scheduler.dispatch(&task).await.unwrap();
        assert_eq!(trigger.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispatch_propagates_failure() {
        let (store, _, scheduler) = setup(FakeTrigger {
            fail: true,
            ..FakeTrigger::default()
        });
        let id = add(&store, "broken", true);
        let err = scheduler.dispatch(&store.get(&id).unwrap()).await.unwrap_err();
        assert!(matches!(err, CronflowError::RemoteApi { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (store, _, scheduler) = setup(FakeTrigger::default());
        add(&store, "a", true);

        let report = scheduler.start(Duration::from_secs(3600)).await;
        assert_eq!(report.added, 1);
        assert_eq!(scheduler.registered().await.len(), 1);

        scheduler.stop().await;
        assert!(scheduler.registered().await.is_empty());
    }
}
