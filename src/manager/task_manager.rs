use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;

use crate::error::RegistryError;
use crate::manager::process;
use crate::manager::store::TaskStore;
use crate::models::task::{TaskId, TaskPatch, TaskRecord, TaskStatus};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const TASKS_FILE: &str = "tasks.json";
const LOGS_DIR: &str = "logs";
const ID_SUFFIX_LEN: usize = 9;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub kept: usize,
}

/// File-backed registry of background tasks.
///
/// Every mutation is a locked load/mutate/save of the whole collection; reads
/// load the current document without locking.
#[derive(Debug, Clone)]
pub struct TaskManager {
    root: PathBuf,
    store: TaskStore,
}

impl TaskManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let store = TaskStore::new(root.join(TASKS_FILE));
        TaskManager { root, store }
    }

    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".claude-projects"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn ensure_directories(&self) -> Result<(), RegistryError> {
        let logs = self.logs_dir();
        fs::create_dir_all(&logs).map_err(|e| RegistryError::io(&logs, e))
    }

    pub fn generate_task_id() -> TaskId {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        TaskId(format!("task-{millis}-{suffix}"))
    }

    pub fn log_file_path(&self, id: &TaskId) -> PathBuf {
        self.logs_dir().join(format!("{id}.log"))
    }

    pub fn add_task(&self, task: TaskRecord) -> Result<(), RegistryError> {
        let id = task.id.clone();
        self.mutate(|tasks| {
            tasks.push(task);
            true
        })?;
        info!("Task '{}' added to registry.", id);
        Ok(())
    }

    /// Merges `patch` into the task. Returns false when no such task exists,
    /// which is not an error: cleanup may have removed it concurrently.
    pub fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<bool, RegistryError> {
        let mut found = false;
        self.mutate(|tasks| match tasks.iter_mut().find(|t| &t.id == id) {
            Some(task) => {
                found = true;
                task.apply(&patch)
            }
            None => false,
        })?;

        if found {
            debug!("Task '{}' updated: {:?}", id, patch);
        } else {
            debug!("Update for unknown task '{}' ignored.", id);
        }
        Ok(found)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, RegistryError> {
        Ok(self.store.load()?.into_iter().find(|t| &t.id == id))
    }

    pub fn get_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TaskRecord>, RegistryError> {
        let tasks = self.store.load()?;
        Ok(match status {
            Some(status) => tasks.into_iter().filter(|t| t.status == status).collect(),
            None => tasks,
        })
    }

    pub fn is_process_alive(pid: u32) -> bool {
        process::is_process_alive(pid)
    }

    /// Marks running tasks whose process is gone as `completed`.
    ///
    /// The exit code is unknown here, so a crash also reads as `completed`.
    pub fn reconcile_statuses(&self) -> Result<usize, RegistryError> {
        let mut changed = 0;
        self.mutate(|tasks| {
            let now = Utc::now();
            for task in tasks.iter_mut().filter(|t| t.is_running()) {
                if process::is_process_alive(task.pid) {
                    continue;
                }
                let patch = TaskPatch {
                    status: Some(TaskStatus::Completed),
                    ended_at: Some(now),
                    exit_code: None,
                };
                if task.apply(&patch) {
                    info!("Task '{}' (pid {}) no longer running.", task.id, task.pid);
                    changed += 1;
                }
            }
            changed > 0
        })?;
        Ok(changed)
    }

    /// Sends SIGTERM to a running task and marks it `killed`.
    ///
    /// Returns false when the task is unknown, not running, or the signal could
    /// not be delivered; the record is left untouched in those cases.
    pub fn kill_task(&self, id: &TaskId) -> Result<bool, RegistryError> {
        let mut killed = false;
        self.mutate(|tasks| {
            let Some(task) = tasks.iter_mut().find(|t| &t.id == id) else {
                return false;
            };
            if !task.is_running() {
                return false;
            }

            match process::terminate(task.pid) {
                Ok(()) => {
                    killed = task.apply(&TaskPatch::finished(TaskStatus::Killed, None));
                    info!("Task '{}' killed.", id);
                    killed
                }
                Err(e) => {
                    warn!("Failed to signal task '{}' (pid {}): {}", id, task.pid, e);
                    false
                }
            }
        })?;
        Ok(killed)
    }

    pub fn cleanup_old_tasks(&self, retention: Duration) -> Result<CleanupReport, RegistryError> {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = CleanupReport::default();
        self.mutate(|tasks| {
            let (keep, discard): (Vec<_>, Vec<_>) = tasks
                .drain(..)
                .partition(|t| t.is_running() || t.started_at > cutoff);

            for task in &discard {
                remove_log(&task.log_file);
            }

            report = CleanupReport {
                removed: discard.len(),
                kept: keep.len(),
            };
            *tasks = keep;
            report.removed > 0
        })?;

        info!(
            "Cleanup removed {} task(s), kept {}.",
            report.removed, report.kept
        );
        Ok(report)
    }

    fn mutate<F>(&self, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut Vec<TaskRecord>) -> bool,
    {
        fs::create_dir_all(&self.root).map_err(|e| RegistryError::io(&self.root, e))?;
        let _lock = self.store.lock()?;

        let mut tasks = self.store.load()?;
        if f(&mut tasks) {
            self.store.save(&tasks)?;
        }
        Ok(())
    }
}

fn remove_log(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed log {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove log {}: {}", path.display(), e),
    }
}
