use crate::ModerationExecutor;
use scheduler::{Error, Plan, ScheduledTask, Scheduler, TaskContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wardencore_rs::types::{GuildId, UserId};
use wardencore_rs::utils::parse_duration_string_to_chrono_duration;

/// Payload persisted with a scheduled unban
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnbanPayload {
    pub user_id: UserId,
    pub moderator: UserId,
    pub reason: String,
}

/// Schedules the lifting of a temporary ban
///
/// `duration` is the user-supplied duration string from the tempban
/// command, e.g. `2h` or `3 days`.
pub async fn schedule_unban(
    sched: &Scheduler,
    guild_id: GuildId,
    user_id: UserId,
    moderator: UserId,
    duration: &str,
    reason: &str,
) -> Result<ScheduledTask, Error> {
    if reason.len() > 384 {
        return Err("Reason must be less than/equal to 384 characters".into());
    }

    let duration = parse_duration_string_to_chrono_duration(duration)?;

    let payload = UnbanPayload {
        user_id,
        moderator,
        reason: reason.to_string(),
    };

    sched
        .schedule(guild_id, Plan::once(duration), crate::UNBAN_KIND, &payload)
        .await
}

/// Handles an expired temporary ban by lifting it through the executor
pub async fn unban_task(
    ctx: &TaskContext,
    executor: Arc<dyn ModerationExecutor>,
) -> Result<(), Error> {
    let payload: UnbanPayload = serde_json::from_value(ctx.payload().clone())
        .map_err(|e| format!("Invalid unban payload for task {}: {}", ctx.task.id(), e))?;

    let reason = config::CONFIG
        .moderation
        .unban_reason_template
        .replace("{reason}", &payload.reason);

    executor
        .remove_ban(ctx.task.guild_id(), payload.user_id, &reason)
        .await?;

    log::info!(
        "Lifted temporary ban on {} in guild {} (banned by {})",
        payload.user_id,
        ctx.task.guild_id(),
        payload.moderator
    );

    Ok(())
}

#[cfg(test)]
mod test {
    pub use super::*;
    use crate::UNBAN_KIND;
    use async_trait::async_trait;
    use scheduler::{SchedulerStore, TaskRecord, TaskRegistry};
    use std::sync::Mutex;

    struct MemoryStore {
        docs: dashmap::DashMap<GuildId, Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl SchedulerStore for MemoryStore {
        async fn load(&self, guild_id: GuildId) -> Result<Vec<serde_json::Value>, Error> {
            Ok(self
                .docs
                .get(&guild_id)
                .map(|d| d.clone())
                .unwrap_or_default())
        }

        async fn save(&self, guild_id: GuildId, records: &[TaskRecord]) -> Result<(), Error> {
            let values = records
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;

            self.docs.insert(guild_id, values);

            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        removed: Mutex<Vec<(GuildId, UserId, String)>>,
    }

    #[async_trait]
    impl ModerationExecutor for RecordingExecutor {
        async fn remove_ban(
            &self,
            guild_id: GuildId,
            user_id: UserId,
            reason: &str,
        ) -> Result<(), Error> {
            self.removed
                .lock()
                .unwrap()
                .push((guild_id, user_id, reason.to_string()));

            Ok(())
        }
    }

    fn test_scheduler() -> (Scheduler, Arc<MemoryStore>, Arc<RecordingExecutor>) {
        let store = Arc::new(MemoryStore {
            docs: dashmap::DashMap::new(),
        });
        let registry = Arc::new(TaskRegistry::new());
        let executor = Arc::new(RecordingExecutor::default());

        crate::register_task_kinds(&registry, executor.clone());

        let sched = Scheduler::new(
            registry,
            store.clone(),
            std::time::Duration::from_millis(50),
        );

        (sched, store, executor)
    }

    #[tokio::test]
    async fn test_tempban_expiry_lifts_ban_once() {
        let (sched, store, executor) = test_scheduler();

        let guild = GuildId(1);
        let task = schedule_unban(
            &sched,
            guild,
            UserId(42),
            UserId(7),
            "1h",
            "posted phishing links",
        )
        .await
        .unwrap();

        assert_eq!(task.kind(), UNBAN_KIND);
        assert_eq!(store.docs.get(&guild).unwrap().len(), 1);

        // Not due yet
        sched.tick(task.date() - chrono::Duration::minutes(1)).await;
        assert!(executor.removed.lock().unwrap().is_empty());

        sched.tick(task.date() + chrono::Duration::seconds(1)).await;

        let removed = executor.removed.lock().unwrap().clone();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, guild);
        assert_eq!(removed[0].1, UserId(42));
        assert!(removed[0].2.contains("posted phishing links"));

        // Single-shot: gone from the document
        assert!(store.docs.get(&guild).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unban_survives_restart() {
        let store = Arc::new(MemoryStore {
            docs: dashmap::DashMap::new(),
        });

        let guild = GuildId(1);

        // First process life: schedule, then drop the scheduler
        {
            let registry = Arc::new(TaskRegistry::new());
            crate::register_task_kinds(&registry, Arc::new(RecordingExecutor::default()));
            let sched = Scheduler::new(
                registry,
                store.clone(),
                std::time::Duration::from_millis(50),
            );

            schedule_unban(&sched, guild, UserId(42), UserId(7), "1s", "spam")
                .await
                .unwrap();
        }

        // Second process life: register first, then resume and tick
        let registry = Arc::new(TaskRegistry::new());
        let executor = Arc::new(RecordingExecutor::default());
        crate::register_task_kinds(&registry, executor.clone());
        let sched = Scheduler::new(
            registry,
            store.clone(),
            std::time::Duration::from_millis(50),
        );

        let resumed = sched.resume_guild(guild).await.unwrap();
        assert_eq!(resumed.len(), 1);

        sched
            .tick(resumed[0].date() + chrono::Duration::seconds(1))
            .await;

        assert_eq!(executor.removed.lock().unwrap().len(), 1);
        assert!(store.docs.get(&guild).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_unban_rejects_bad_input() {
        let (sched, store, _executor) = test_scheduler();

        let guild = GuildId(1);

        assert!(
            schedule_unban(&sched, guild, UserId(1), UserId(2), "eventually", "reason")
                .await
                .is_err()
        );

        let long_reason = "a".repeat(400);
        assert!(
            schedule_unban(&sched, guild, UserId(1), UserId(2), "1h", &long_reason)
                .await
                .is_err()
        );

        assert!(store.docs.get(&guild).is_none());
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = UnbanPayload {
            user_id: UserId(42),
            moderator: UserId(7),
            reason: "spam".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["user_id"], "42");

        let decoded: UnbanPayload = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, payload);
    }
}
