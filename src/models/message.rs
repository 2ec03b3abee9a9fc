use super::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMessage {
    Exited {
        id: TaskId,
        status: TaskStatus,
        exit_code: Option<i32>,
    },
    SpawnFailed {
        id: TaskId,
        error: String,
    },
}

impl TaskMessage {
    pub fn id(&self) -> &TaskId {
        match self {
            TaskMessage::Exited { id, .. } | TaskMessage::SpawnFailed { id, .. } => id,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            TaskMessage::Exited { status, .. } => *status,
            TaskMessage::SpawnFailed { .. } => TaskStatus::Failed,
        }
    }
}
