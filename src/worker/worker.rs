use std::{
    fmt,
    io::{self, Write},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};

use crate::error::DispatchError;
use crate::manager::task_manager::TaskManager;
use crate::models::{
    message::TaskMessage,
    task::{TaskId, TaskPatch, TaskRecord, TaskStatus},
};
use crate::worker::log_file::{self, Termination};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub project: String,
    pub workdir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub task: String,
}

impl CommandPlan {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped());
        command
    }
}

impl fmt::Display for CommandPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cd {}", self.workdir.display())?;
        writeln!(f, "{}", self.command_line())?;
        write!(f, "(with input: {})", self.task)
    }
}

fn feed_task(child: &mut Child, task: &str) -> io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    match writeln!(stdin, "{task}") {
        // The assistant may exit without reading its input.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn describe_exit(status: ExitStatus) -> Termination {
    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(signal)) => Termination::Signaled(signal),
        (None, None) => Termination::Error(format!("unknown exit status {status}")),
    }
}

pub fn run_foreground(plan: &CommandPlan) -> Result<(), DispatchError> {
    let mut child = plan
        .command()
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| DispatchError::Spawn {
            program: plan.program.clone(),
            source,
        })?;

    feed_task(&mut child, &plan.task)?;
    let status = child.wait()?;
    info!("Foreground task in '{}' finished: {}", plan.project, status);

    if status.success() {
        Ok(())
    } else {
        Err(DispatchError::ExitStatus {
            program: plan.program.clone(),
            status: match describe_exit(status) {
                Termination::Exited(code) => format!("code {code}"),
                Termination::Signaled(signal) => format!("signal {signal}"),
                Termination::Error(message) => message,
            },
            code: status.code(),
        })
    }
}

/// A launched background task. Dropping the handle does not affect the task.
#[derive(Debug)]
pub struct BackgroundHandle {
    pub id: TaskId,
    pub pid: Option<u32>,
    pub log_file: PathBuf,
    receiver: Receiver<TaskMessage>,
}

impl BackgroundHandle {
    pub fn wait(&self) -> Option<TaskMessage> {
        self.receiver.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskMessage> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn receiver(&self) -> &Receiver<TaskMessage> {
        &self.receiver
    }
}

/// Spawns the plan detached into its own session with output appended to the
/// task log, registers it as running and hands completion to a waiter thread.
///
/// A spawn failure is recorded as a `failed` task rather than returned.
pub fn spawn_background(
    plan: &CommandPlan,
    manager: &TaskManager,
) -> Result<BackgroundHandle, DispatchError> {
    manager.ensure_directories()?;
    let id = TaskManager::generate_task_id();
    let log_path = manager.log_file_path(&id);
    let started_at = Utc::now();

    let log_err = |source| DispatchError::Log {
        path: log_path.clone(),
        source,
    };
    let mut log = log_file::open_append(&log_path).map_err(log_err)?;
    log_file::write_header(&mut log, &id, &plan.project, &plan.task, started_at)
        .map_err(log_err)?;
    let stdout = log.try_clone().map_err(log_err)?;
    let stderr = log.try_clone().map_err(log_err)?;

    let mut command = plan.command();
    command.stdout(stdout).stderr(stderr);
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let (sender, receiver) = bounded(1);
    let mut record =
        TaskRecord::running(id.clone(), &plan.project, &plan.task, 0, log_path.clone());
    record.started_at = started_at;

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!("Failed to start task '{}': {}", id, e);
            let message = format!("failed to start {}: {}", plan.program, e);
            if let Err(e) = writeln!(log, "{message}") {
                warn!("Could not write to log {}: {}", log_path.display(), e);
            }
            drop(log);
            let footer = Termination::Error(message.clone());
            if let Err(e) = log_file::write_footer(&log_path, Utc::now(), &footer) {
                warn!("Could not write footer to {}: {}", log_path.display(), e);
            }

            record.apply(&TaskPatch::status(TaskStatus::Failed));
            manager.add_task(record)?;
            let _ = sender.send(TaskMessage::SpawnFailed {
                id: id.clone(),
                error: message,
            });
            return Ok(BackgroundHandle {
                id,
                pid: None,
                log_file: log_path,
                receiver,
            });
        }
    };
    drop(log);

    let pid = child.id();
    record.pid = pid;
    if let Err(e) = manager.add_task(record) {
        // Unregistered, the task would be invisible to status and kill.
        let _ = child.kill();
        let _ = child.wait();
        return Err(e.into());
    }
    info!("Task '{}' started in background (pid {}).", id, pid);

    spawn_waiter(
        child,
        plan.task.clone(),
        id.clone(),
        log_path.clone(),
        manager.clone(),
        sender,
    );

    Ok(BackgroundHandle {
        id,
        pid: Some(pid),
        log_file: log_path,
        receiver,
    })
}

fn spawn_waiter(
    mut child: Child,
    task: String,
    id: TaskId,
    log_path: PathBuf,
    manager: TaskManager,
    sender: Sender<TaskMessage>,
) {
    thread::spawn(move || {
        // May block until the assistant drains its input.
        if let Err(e) = feed_task(&mut child, &task) {
            warn!("Could not send task to pid {}: {}", child.id(), e);
        }

        let (status, exit_code, termination) = match child.wait() {
            Ok(status) => {
                let new_status = if status.success() {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                (new_status, status.code(), describe_exit(status))
            }
            Err(e) => {
                error!("Failed to wait for task '{}': {}", id, e);
                (TaskStatus::Failed, None, Termination::Error(e.to_string()))
            }
        };

        let ended_at = Utc::now();
        let patch = TaskPatch {
            status: Some(status),
            ended_at: Some(ended_at),
            exit_code,
        };
        match manager.update_task(&id, patch) {
            Ok(_) => info!("Task '{}' finished: {}", id, termination),
            Err(e) => error!("Failed to record completion of task '{}': {}", id, e),
        }

        if let Err(e) = log_file::write_footer(&log_path, ended_at, &termination) {
            warn!("Could not write footer to {}: {}", log_path.display(), e);
        }

        let _ = sender.send(TaskMessage::Exited {
            id,
            status,
            exit_code,
        });
    });
}
