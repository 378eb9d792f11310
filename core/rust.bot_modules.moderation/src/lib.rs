pub mod tasks;

use async_trait::async_trait;
use futures_util::future::FutureExt;
use std::sync::Arc;
use wardencore_rs::types::{GuildId, UserId};

/// Task kind for lifting an expired temporary ban
pub const UNBAN_KIND: &str = "moderation/unban";

/// Boundary to the chat platform for moderation side effects
///
/// The production implementation calls the platform's HTTP API; tests
/// record the calls instead. Implementations should treat an
/// already-lifted ban as success.
#[async_trait]
pub trait ModerationExecutor: Send + Sync {
    async fn remove_ban(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), scheduler::Error>;
}

/// Registers this module's task kinds
///
/// Must run during process bootstrap, before any guild is resumed, or
/// resumed tasks of these kinds cannot fire.
pub fn register_task_kinds(
    registry: &scheduler::TaskRegistry,
    executor: Arc<dyn ModerationExecutor>,
) {
    registry.register(
        UNBAN_KIND,
        Box::new(move |ctx| {
            let executor = executor.clone();
            tasks::unban_task(ctx, executor).boxed()
        }),
    );
}
