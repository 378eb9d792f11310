use crate::registry::TaskRegistry;
use crate::store::SchedulerStore;
use crate::task::{Plan, ScheduledTask, TaskRecord, TaskState};
use crate::Error;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use wardencore_rs::crypto::gen_random;
use wardencore_rs::types::GuildId;

const TASK_ID_LENGTH: usize = 18;

/// Context passed to a task handler when it fires
///
/// Carries the scheduler itself so a handler can cancel or re-schedule
/// from inside a firing.
pub struct TaskContext {
    pub scheduler: Scheduler,
    pub task: ScheduledTask,
}

impl TaskContext {
    /// The opaque payload the task was scheduled with
    pub fn payload(&self) -> &serde_json::Value {
        self.task.payload()
    }
}

type WorkingSet = IndexMap<String, Arc<TaskState>>;

struct SchedulerInner {
    registry: Arc<TaskRegistry>,
    store: Arc<dyn SchedulerStore>,
    tick_interval: std::time::Duration,

    /// Working sets per guild. Map insertion order is creation order,
    /// which is also the order records are persisted in
    guilds: Mutex<HashMap<GuildId, WorkingSet>>,

    seq: AtomicU64,
    running: AtomicBool,
    stop: Notify,
}

/// The process-wide task scheduler
///
/// Owns the authoritative set of pending tasks across all guilds, drives
/// the tick loop, persists every durable mutation through the store and
/// resolves handlers through the registry at fire time.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<dyn SchedulerStore>,
        tick_interval: std::time::Duration,
    ) -> Scheduler {
        Scheduler {
            inner: Arc::new(SchedulerInner {
                registry,
                store,
                tick_interval,
                guilds: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
                running: AtomicBool::new(false),
                stop: Notify::new(),
            }),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Schedules a task and durably persists it before returning
    ///
    /// The kind does not have to be registered yet; the record is stored
    /// regardless and resolution happens at fire time. A payload that
    /// cannot be serialized fails the call and creates nothing.
    pub async fn schedule<T: serde::Serialize>(
        &self,
        guild_id: GuildId,
        plan: Plan,
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<ScheduledTask, Error> {
        let kind = kind.into();

        let payload = serde_json::to_value(payload)
            .map_err(|e| format!("Cannot serialize payload for kind {}: {}", kind, e))?;

        let due_at = Utc::now() + plan.initial_delay();

        let mut guilds = self.inner.guilds.lock().await;
        let tasks = guilds.entry(guild_id).or_default();

        // Ids must stay unique within the guild's persisted set
        let mut id = gen_random(TASK_ID_LENGTH);
        while tasks.contains_key(&id) {
            id = gen_random(TASK_ID_LENGTH);
        }

        let state = Arc::new(TaskState::new(
            id,
            guild_id,
            kind,
            payload,
            plan,
            due_at,
            self.inner.seq.fetch_add(1, Ordering::SeqCst),
        ));

        tasks.insert(state.id.clone(), state.clone());

        if let Err(e) = self.persist_locked(guild_id, tasks).await {
            // Roll the task back out so memory and disk stay in sync
            tasks.shift_remove(&state.id);
            return Err(e);
        }

        Ok(ScheduledTask { state })
    }

    /// Rehydrates every persisted task for a guild into the working set
    ///
    /// Called once per guild at process start, after all modules have
    /// registered their kinds. A corrupt record is skipped and logged;
    /// the rest of the guild's tasks still load. A task whose kind has
    /// no handler yet is rehydrated anyway and held pending.
    pub async fn resume_guild(&self, guild_id: GuildId) -> Result<Vec<ScheduledTask>, Error> {
        let raw = self.inner.store.load(guild_id).await?;

        let mut guilds = self.inner.guilds.lock().await;
        let tasks = guilds.entry(guild_id).or_default();

        let mut resumed = Vec::new();

        for value in raw {
            match self.rehydrate(guild_id, value, tasks) {
                Ok(task) => resumed.push(task),
                Err(e) => {
                    warn!("Skipping scheduler record for guild {}: {}", guild_id, e);
                }
            }
        }

        Ok(resumed)
    }

    /// Rehydrates a single persisted task by id
    ///
    /// Fails if the record is missing or corrupt; other tasks in the
    /// guild's document are unaffected.
    pub async fn resume(&self, guild_id: GuildId, id: &str) -> Result<ScheduledTask, Error> {
        let raw = self.inner.store.load(guild_id).await?;

        let mut guilds = self.inner.guilds.lock().await;
        let tasks = guilds.entry(guild_id).or_default();

        for value in raw {
            if value.get("id").and_then(|v| v.as_str()) != Some(id) {
                continue;
            }

            return self.rehydrate(guild_id, value, tasks);
        }

        Err(format!("No persisted task {} for guild {}", id, guild_id).into())
    }

    fn rehydrate(
        &self,
        guild_id: GuildId,
        value: serde_json::Value,
        tasks: &mut WorkingSet,
    ) -> Result<ScheduledTask, Error> {
        let record: TaskRecord = serde_json::from_value(value)
            .map_err(|e| format!("Corrupt record: {}", e))?;

        if tasks.contains_key(&record.id) {
            return Err(format!("Duplicate task id {}", record.id).into());
        }

        if !self.inner.registry.is_registered(&record.kind) {
            info!(
                "Task {} (kind {}) has no handler registered yet; holding until one is",
                record.id, record.kind
            );
        }

        let state = Arc::new(TaskState::from_record(
            guild_id,
            record,
            self.inner.seq.fetch_add(1, Ordering::SeqCst),
        ));

        tasks.insert(state.id.clone(), state.clone());

        Ok(ScheduledTask { state })
    }

    /// Cancels a task, removing it from the working set and from the
    /// guild's persisted document
    ///
    /// Cancelling a task that was already cancelled or has already fired
    /// is a no-op, not an error.
    pub async fn cancel(&self, task: &ScheduledTask) -> Result<(), Error> {
        if task.state.mark_cancelled() {
            return Ok(());
        }

        let mut guilds = self.inner.guilds.lock().await;
        let Some(tasks) = guilds.get_mut(&task.state.guild_id) else {
            return Ok(());
        };

        // Only rewrite the document if the task was actually still tracked
        if tasks.shift_remove(&task.state.id).is_some() {
            self.persist_locked(task.state.guild_id, tasks).await?;
        }

        Ok(())
    }

    /// Runs one scheduling pass over every guild's working set
    ///
    /// Within a guild, due tasks fire in ascending due time order with
    /// ties broken by creation order; ordering between guilds is
    /// unspecified. A failing handler is logged and the task still
    /// transitions per its plan. A task whose kind is unresolved stays
    /// pending and is retried on the next pass.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let due = {
            let guilds = self.inner.guilds.lock().await;

            let mut due: Vec<Arc<TaskState>> = Vec::new();

            for tasks in guilds.values() {
                let mut guild_due: Vec<Arc<TaskState>> = tasks
                    .values()
                    .filter(|t| !t.cancelled() && t.due_at() <= now)
                    .cloned()
                    .collect();

                guild_due.sort_by_key(|t| (t.due_at(), t.seq));
                due.extend(guild_due);
            }

            due
        };

        for state in due {
            // May have been cancelled between collection and firing
            if state.cancelled() {
                continue;
            }

            let Some(handler) = self.inner.registry.get(&state.kind) else {
                warn!(
                    "No handler registered for task {} (kind {}, guild {}); leaving pending",
                    state.id, state.kind, state.guild_id
                );
                continue;
            };

            let ctx = TaskContext {
                scheduler: self.clone(),
                task: ScheduledTask {
                    state: state.clone(),
                },
            };

            if let Err(e) = (*handler)(&ctx).await {
                error!(
                    "Error while running task {} (kind {}, guild {}): {}",
                    state.id, state.kind, state.guild_id, e
                );
            }

            // A handler cancelling its own task already removed and
            // persisted it
            if state.cancelled() {
                continue;
            }

            let mut guilds = self.inner.guilds.lock().await;
            let Some(tasks) = guilds.get_mut(&state.guild_id) else {
                continue;
            };

            match state.plan {
                Plan::Once { .. } => {
                    tasks.shift_remove(&state.id);
                }
                Plan::Repeat { distance_ms, .. } => {
                    // Rebase off the previous due time, not `now`, so late
                    // ticks do not accumulate drift. Firings missed while
                    // the process was down are skipped, keeping the phase
                    let distance = chrono::Duration::milliseconds(distance_ms.max(1));

                    let mut next = state.due_at() + distance;
                    while next <= now {
                        next += distance;
                    }

                    state.set_due_at(next);
                }
            }

            if let Err(e) = self.persist_locked(state.guild_id, tasks).await {
                error!(
                    "Could not persist scheduler state for guild {}: {}",
                    state.guild_id, e
                );
            }
        }
    }

    /// Starts the tick loop, returning when `shutdown` is called
    ///
    /// Calling run while the loop is already running is a guarded no-op.
    pub async fn run(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler run() called while the tick loop is already running");
            return;
        }

        info!(
            "Scheduler tick loop started (interval {:?})",
            self.inner.tick_interval
        );

        let mut interval = tokio::time::interval(self.inner.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = self.inner.stop.notified() => {
                    break;
                }
            }
        }

        info!("Scheduler tick loop stopped");
    }

    /// Stops the tick loop and flushes every guild's records to the store
    pub async fn shutdown(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            self.inner.stop.notify_one();
        }

        let guilds = self.inner.guilds.lock().await;

        for (guild_id, tasks) in guilds.iter() {
            if let Err(e) = self.persist_locked(*guild_id, tasks).await {
                error!(
                    "Could not flush scheduler state for guild {}: {}",
                    guild_id, e
                );
            }
        }
    }

    async fn persist_locked(&self, guild_id: GuildId, tasks: &WorkingSet) -> Result<(), Error> {
        let records: Vec<TaskRecord> = tasks.values().map(|t| t.record()).collect();
        self.inner.store.save(guild_id, &records).await
    }
}
