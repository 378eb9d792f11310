use crate::task::TaskRecord;
use crate::Error;
use wardencore_rs::types::GuildId;

/// Durable storage consumed by the scheduler
///
/// The scheduler is the sole mutator of the `scheduler` section of each
/// guild's document. Implementations must rewrite the full document on
/// save so sections owned by other subsystems survive.
#[async_trait::async_trait]
pub trait SchedulerStore: Send + Sync {
    /// Reads the persisted scheduler records for a guild
    ///
    /// Returns the raw JSON of each record. Records are decoded one by
    /// one during resume so a single corrupt record cannot poison the
    /// rest of the guild's tasks.
    async fn load(&self, guild_id: GuildId) -> Result<Vec<serde_json::Value>, Error>;

    /// Durably replaces the scheduler records for a guild
    async fn save(&self, guild_id: GuildId, records: &[TaskRecord]) -> Result<(), Error>;
}
