use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use wardencore_rs::types::GuildId;

/// When and how often a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plan {
    /// Fire once after `delay_ms`, then delete the record
    Once { delay_ms: i64 },

    /// Fire after `initial_delay_ms`, then every `distance_ms` until cancelled
    Repeat {
        initial_delay_ms: i64,
        distance_ms: i64,
    },
}

impl Plan {
    pub fn once(delay: chrono::Duration) -> Plan {
        Plan::Once {
            delay_ms: delay.num_milliseconds(),
        }
    }

    pub fn repeat(initial_delay: chrono::Duration, distance: chrono::Duration) -> Plan {
        Plan::Repeat {
            initial_delay_ms: initial_delay.num_milliseconds(),
            distance_ms: distance.num_milliseconds(),
        }
    }

    /// The delay between creation and the first firing
    pub fn initial_delay(&self) -> chrono::Duration {
        match self {
            Plan::Once { delay_ms } => chrono::Duration::milliseconds(*delay_ms),
            Plan::Repeat {
                initial_delay_ms, ..
            } => chrono::Duration::milliseconds(*initial_delay_ms),
        }
    }

    /// The fixed inter-fire distance, if the plan repeats
    pub fn distance(&self) -> Option<chrono::Duration> {
        match self {
            Plan::Once { .. } => None,
            Plan::Repeat { distance_ms, .. } => Some(chrono::Duration::milliseconds(*distance_ms)),
        }
    }
}

/// The persisted form of a scheduled task
///
/// This is what lands in the `scheduler` section of a guild's document.
/// Handlers are not persistable, so only the `kind` naming one is stored;
/// the live handler is resolved through the registry at fire time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub kind: String,
    pub payload: serde_json::Value,

    /// Next due time, in milliseconds since the unix epoch
    pub due_at: i64,

    pub plan: Plan,
}

/// Runtime state of a tracked task. Shared between the scheduler's
/// working set and every `ScheduledTask` handle to it.
pub(crate) struct TaskState {
    pub(crate) id: String,
    pub(crate) guild_id: GuildId,
    pub(crate) kind: String,
    pub(crate) payload: serde_json::Value,
    pub(crate) plan: Plan,

    /// Creation order, used to break due-time ties deterministically
    pub(crate) seq: u64,

    due_at_ms: AtomicI64,
    cancelled: AtomicBool,
}

impl TaskState {
    pub(crate) fn new(
        id: String,
        guild_id: GuildId,
        kind: String,
        payload: serde_json::Value,
        plan: Plan,
        due_at: DateTime<Utc>,
        seq: u64,
    ) -> Self {
        TaskState {
            id,
            guild_id,
            kind,
            payload,
            plan,
            seq,
            due_at_ms: AtomicI64::new(due_at.timestamp_millis()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn from_record(guild_id: GuildId, record: TaskRecord, seq: u64) -> Self {
        TaskState {
            id: record.id,
            guild_id,
            kind: record.kind,
            payload: record.payload,
            plan: record.plan,
            seq,
            due_at_ms: AtomicI64::new(record.due_at),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn due_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.due_at_ms.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub(crate) fn set_due_at(&self, due_at: DateTime<Utc>) {
        self.due_at_ms
            .store(due_at.timestamp_millis(), Ordering::SeqCst);
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sets the cancelled flag, returning whether it was already set
    pub(crate) fn mark_cancelled(&self) -> bool {
        self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn record(&self) -> TaskRecord {
        TaskRecord {
            id: self.id.clone(),
            kind: self.kind.clone(),
            payload: self.payload.clone(),
            due_at: self.due_at_ms.load(Ordering::SeqCst),
            plan: self.plan,
        }
    }
}

/// Consumer-facing view of a scheduled task
#[derive(Clone)]
pub struct ScheduledTask {
    pub(crate) state: Arc<TaskState>,
}

impl ScheduledTask {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.state.guild_id
    }

    pub fn kind(&self) -> &str {
        &self.state.kind
    }

    /// The opaque payload the task was scheduled with. The scheduler
    /// never interprets it
    pub fn payload(&self) -> &serde_json::Value {
        &self.state.payload
    }

    pub fn plan(&self) -> Plan {
        self.state.plan
    }

    /// The next due time
    pub fn date(&self) -> DateTime<Utc> {
        self.state.due_at()
    }

    pub fn cancelled(&self) -> bool {
        self.state.cancelled()
    }

    /// Time left until the next firing, clamped to zero. Purely advisory
    pub fn remaining_time(&self) -> chrono::Duration {
        (self.state.due_at() - Utc::now()).max(chrono::Duration::zero())
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.state.id)
            .field("guild_id", &self.state.guild_id)
            .field("kind", &self.state.kind)
            .field("due_at", &self.state.due_at())
            .field("plan", &self.state.plan)
            .field("cancelled", &self.state.cancelled())
            .finish()
    }
}

#[cfg(test)]
mod test {
    pub use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = TaskRecord {
            id: "abc123".to_string(),
            kind: "moderation/unban".to_string(),
            payload: serde_json::json!({"user_id": "123"}),
            due_at: 1_700_000_000_000,
            plan: Plan::once(chrono::Duration::hours(2)),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["plan"]["type"], "once");

        let decoded: TaskRecord = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_plan_initial_delay() {
        let plan = Plan::repeat(chrono::Duration::seconds(1), chrono::Duration::seconds(5));
        assert_eq!(plan.initial_delay(), chrono::Duration::seconds(1));
        assert_eq!(plan.distance(), Some(chrono::Duration::seconds(5)));
        assert_eq!(Plan::once(chrono::Duration::seconds(3)).distance(), None);
    }

    #[test]
    fn test_remaining_time_clamped() {
        let state = Arc::new(TaskState::new(
            "t1".to_string(),
            GuildId(1),
            "noop".to_string(),
            serde_json::Value::Null,
            Plan::once(chrono::Duration::zero()),
            Utc::now() - chrono::Duration::hours(1),
            0,
        ));

        let task = ScheduledTask { state };
        assert_eq!(task.remaining_time(), chrono::Duration::zero());
    }
}
