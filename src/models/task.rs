use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Killed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Killed => "killed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// `running` may move to any terminal state; terminal states are final.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self == next || (self == TaskStatus::Running && next.is_terminal())
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown status '{s}' (expected running, completed, failed or killed)")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub project: String,
    pub task: String,
    pub pid: u32,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub log_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl TaskRecord {
    pub fn running(
        id: TaskId,
        project: impl Into<String>,
        task: impl Into<String>,
        pid: u32,
        log_file: PathBuf,
    ) -> Self {
        Self {
            id,
            project: project.into(),
            task: task.into(),
            pid,
            status: TaskStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            log_file,
            exit_code: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Returns whether the record changed. Finished records are frozen.
    pub fn apply(&mut self, patch: &TaskPatch) -> bool {
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                warn!(
                    "Ignoring status change {} -> {} for task '{}'.",
                    self.status, next, self.id
                );
                return false;
            }
        }
        if self.status.is_terminal() {
            return false;
        }

        if let Some(next) = patch.status {
            self.status = next;
        }
        if self.is_running() {
            return false;
        }

        self.ended_at = Some(patch.ended_at.unwrap_or_else(Utc::now));
        self.exit_code = patch.exit_code;
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl TaskPatch {
    pub fn finished(status: TaskStatus, exit_code: Option<i32>) -> Self {
        Self {
            status: Some(status),
            ended_at: Some(Utc::now()),
            exit_code,
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
