pub mod core;
pub mod registry;
pub mod store;
pub mod task;

pub use crate::core::{Scheduler, TaskContext};
pub use crate::registry::{TaskHandler, TaskRegistry};
pub use crate::store::SchedulerStore;
pub use crate::task::{Plan, ScheduledTask, TaskRecord};

pub type Error = Box<dyn std::error::Error + Send + Sync>; // This is constant and should be copy pasted
