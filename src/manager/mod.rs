pub mod process;
pub mod store;
pub mod task_manager;

pub use task_manager::{CleanupReport, TaskManager, DEFAULT_RETENTION};
