//! Dispatches coding-assistant tasks to named project directories and tracks
//! background runs in a file-backed task registry.

pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod worker;

pub use config::{Config, Project};
pub use error::{ConfigError, DispatchError, RegistryError};
pub use manager::{CleanupReport, TaskManager, DEFAULT_RETENTION};
pub use models::{TaskId, TaskMessage, TaskPatch, TaskRecord, TaskStatus};
pub use worker::{BackgroundHandle, CommandPlan, DispatchOptions, DispatchOutcome, Dispatcher};
