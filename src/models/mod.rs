pub mod message;
pub mod task;

pub use message::TaskMessage;
pub use task::{TaskId, TaskPatch, TaskRecord, TaskStatus};
