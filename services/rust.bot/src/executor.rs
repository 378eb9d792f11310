use async_trait::async_trait;
use bot_modules_moderation::ModerationExecutor;
use wardencore_rs::types::{GuildId, UserId};

/// Executor wired in place of the chat-platform client: logs every
/// action it is asked to perform. The gateway integration implements
/// `ModerationExecutor` against the platform's HTTP API instead.
pub struct LogExecutor;

#[async_trait]
impl ModerationExecutor for LogExecutor {
    async fn remove_ban(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), scheduler::Error> {
        log::info!(
            "remove_ban: guild={} user={} reason={}",
            guild_id,
            user_id,
            reason
        );

        Ok(())
    }
}
