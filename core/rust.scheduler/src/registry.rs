use crate::core::TaskContext;
use crate::Error;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// A task handler
///
/// Functions cannot be persisted, so scheduled work is stored under a
/// stable `kind` string and the live handler is looked up here when the
/// task fires.
pub type TaskHandler =
    Box<dyn Send + Sync + for<'a> Fn(&'a TaskContext) -> BoxFuture<'a, Result<(), Error>>>;

/// Maps a task kind to the handler that runs it
///
/// Every module that schedules resumable work must register its kinds
/// during process bootstrap, before any guild is resumed.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: dashmap::DashMap<String, Arc<TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a kind with a handler
    ///
    /// Re-registering an existing kind replaces the previous handler
    pub fn register(&self, kind: impl Into<String>, handler: TaskHandler) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn get(&self, kind: &str) -> Option<Arc<TaskHandler>> {
        self.handlers.get(kind).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }
}

#[cfg(test)]
mod test {
    pub use super::*;
    use futures_util::future::FutureExt;

    #[test]
    fn test_last_registration_wins() {
        let registry = TaskRegistry::new();

        registry.register("noop", Box::new(move |_ctx| async move { Ok(()) }.boxed()));
        assert!(registry.is_registered("noop"));

        registry.register(
            "noop",
            Box::new(move |_ctx| async move { Err("second handler".into()) }.boxed()),
        );

        // Still exactly one handler for the kind
        assert!(registry.get("noop").is_some());
        assert!(registry.get("never registered").is_none());
    }
}
