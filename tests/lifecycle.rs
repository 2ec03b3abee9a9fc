use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::{Duration, Instant},
};

use ccode::{
    config::ProjectEntry, Config, DispatchOptions, DispatchOutcome, Dispatcher, TaskManager,
    TaskMessage, TaskRecord, TaskStatus,
};

struct Workspace {
    _dir: tempfile::TempDir,
    project_dir: PathBuf,
    state_dir: PathBuf,
    config_path: PathBuf,
}

fn workspace(script: &str) -> Workspace {
    let dir = tempfile::tempdir().expect("tempdir");
    let project_dir = dir.path().join("alpha");
    fs::create_dir_all(&project_dir).expect("project dir");

    let mut config = Config::default();
    config.settings.claude_path = Some("sh".to_string());
    config.projects.insert(
        "alpha".to_string(),
        ProjectEntry {
            path: project_dir.to_string_lossy().into_owned(),
            description: Some("integration project".to_string()),
            default_args: vec!["-c".to_string(), script.to_string()],
        },
    );
    let config_path = dir.path().join("projects.yaml");
    config.save(&config_path).expect("save config");

    Workspace {
        state_dir: dir.path().join("state"),
        project_dir,
        config_path,
        _dir: dir,
    }
}

fn dispatcher(ws: &Workspace) -> Dispatcher {
    let config = Config::load(&ws.config_path).expect("load config");
    Dispatcher::with_home(config, TaskManager::new(&ws.state_dir), ws.project_dir.clone())
}

fn wait_for_status(manager: &TaskManager, status: TaskStatus) -> TaskRecord {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let tasks = manager.get_tasks(None).expect("tasks");
        if let Some(task) = tasks.iter().find(|t| t.status == status) {
            return task.clone();
        }
        assert!(Instant::now() < deadline, "timed out waiting for {status}: {tasks:?}");
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn background_dispatch_completes_and_records_exit_code() {
    let ws = workspace("read task; echo \"working on $task\"; sleep 1; pwd");
    let dispatcher = dispatcher(&ws);
    let options = DispatchOptions {
        background: true,
        ..DispatchOptions::default()
    };

    let started = Instant::now();
    let outcome = dispatcher
        .dispatch("alpha", "add tests", options)
        .expect("dispatch");
    assert!(started.elapsed() < Duration::from_millis(900));

    let DispatchOutcome::Background(handle) = outcome else {
        panic!("expected a background handle");
    };

    let running = dispatcher.manager().get_tasks(None).expect("tasks");
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, handle.id);
    assert_eq!(running[0].status, TaskStatus::Running);
    assert_eq!(running[0].pid, handle.pid.expect("pid"));
    assert!(running[0].ended_at.is_none());
    assert_eq!(running[0].log_file, dispatcher.manager().log_file_path(&handle.id));

    let message = handle.wait().expect("completion");
    assert_eq!(
        message,
        TaskMessage::Exited {
            id: handle.id.clone(),
            status: TaskStatus::Completed,
            exit_code: Some(0),
        }
    );

    let task = dispatcher
        .manager()
        .get_task(&handle.id)
        .expect("get")
        .expect("present");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.exit_code, Some(0));
    assert!(task.ended_at.is_some());

    let log = fs::read_to_string(&task.log_file).expect("log");
    assert!(log.starts_with(&format!("Task ID: {}", handle.id)));
    assert!(log.contains("working on add tests"));
    assert!(log.contains(&ws.project_dir.display().to_string()));
    assert!(log.trim_end().ends_with("Exit code: 0"));
}

#[test]
fn killed_background_task_stays_killed() {
    let ws = workspace("exec sleep 30");
    let dispatcher = dispatcher(&ws);
    let options = DispatchOptions {
        background: true,
        ..DispatchOptions::default()
    };

    let DispatchOutcome::Background(handle) =
        dispatcher.dispatch("alpha", "wait", options).expect("dispatch")
    else {
        panic!("expected a background handle");
    };

    let manager = dispatcher.manager();
    assert!(manager.kill_task(&handle.id).expect("kill"));
    let message = handle.wait_timeout(Duration::from_secs(10)).expect("exited");
    assert_eq!(message.status(), TaskStatus::Failed);

    let task = manager.get_task(&handle.id).expect("get").expect("present");
    assert_eq!(task.status, TaskStatus::Killed);
    assert!(task.exit_code.is_none());
    assert!(fs::read_to_string(&task.log_file)
        .expect("log")
        .contains("Terminated by signal 15"));

    assert_eq!(manager.reconcile_statuses().expect("reconcile"), 0);
}

fn ccode(ws: &Workspace, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ccode"))
        .arg("--config")
        .arg(&ws.config_path)
        .arg("--state-dir")
        .arg(&ws.state_dir)
        .args(args)
        .output()
        .expect("run ccode")
}

fn log_dir_is_empty(state_dir: &Path) -> bool {
    fs::read_dir(state_dir.join("logs"))
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

#[test]
fn cli_background_dispatch_is_finalized_by_supervisor() {
    let ws = workspace("cat >/dev/null; exit 0");

    let output = ccode(&ws, &["dispatch", "alpha", "document the api", "--background"]);
    assert!(output.status.success(), "{output:?}");

    let manager = TaskManager::new(&ws.state_dir);
    let tasks = manager.get_tasks(None).expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert!(String::from_utf8_lossy(&output.stdout).contains(tasks[0].id.as_str()));

    let task = wait_for_status(&manager, TaskStatus::Completed);
    assert_eq!(task.exit_code, Some(0));
    assert_eq!(task.project, "alpha");
    assert_eq!(task.task, "document the api");
}

#[test]
fn cli_dry_run_leaves_no_trace() {
    let ws = workspace("exit 0");
    for extra in [None, Some("--background")] {
        let mut args = vec!["dispatch", "alpha", "noop", "--dry-run"];
        args.extend(extra);
        let output = ccode(&ws, &args);
        assert!(output.status.success(), "{output:?}");
        assert!(String::from_utf8_lossy(&output.stdout).contains("Dry run"));
    }

    let manager = TaskManager::new(&ws.state_dir);
    assert!(manager.get_tasks(None).expect("tasks").is_empty());
    assert!(log_dir_is_empty(&ws.state_dir));
}

#[test]
fn cli_reports_unknown_project_and_task() {
    let ws = workspace("exit 0");

    let output = ccode(&ws, &["dispatch", "nope", "t"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Available projects: alpha"));

    let output = ccode(&ws, &["kill", "task-0-missing"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("task not found"));
}

#[test]
fn cli_batch_isolates_failures() {
    let ws = workspace("cat >/dev/null; exit 0");
    let batch = ws.config_path.with_file_name("batch.yaml");
    fs::write(&batch, "alpha: first task\nghost: second task\n").expect("batch file");

    let output = ccode(&ws, &["batch", batch.to_str().expect("utf8 path")]);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Started: 1"));
    assert!(stdout.contains("Failed: 1"));

    let manager = TaskManager::new(&ws.state_dir);
    let task = wait_for_status(&manager, TaskStatus::Completed);
    assert_eq!(task.task, "first task");
}

#[test]
fn large_task_input_does_not_block_background_dispatch() {
    let ws = workspace("sleep 3; cat >/dev/null");
    let dispatcher = dispatcher(&ws);
    let options = DispatchOptions {
        background: true,
        ..DispatchOptions::default()
    };
    let task = "x".repeat(256 * 1024);

    let started = Instant::now();
    let DispatchOutcome::Background(handle) =
        dispatcher.dispatch("alpha", &task, options).expect("dispatch")
    else {
        panic!("expected a background handle");
    };
    assert!(started.elapsed() < Duration::from_secs(1));

    let running = dispatcher
        .manager()
        .get_task(&handle.id)
        .expect("get")
        .expect("registered before input is consumed");
    assert_eq!(running.status, TaskStatus::Running);

    let message = handle.wait_timeout(Duration::from_secs(15)).expect("exited");
    assert_eq!(message.status(), TaskStatus::Completed);
}

#[test]
fn registry_is_final_before_log_footer_appears() {
    let ws = workspace("cat >/dev/null; exit 3");
    let dispatcher = dispatcher(&ws);
    let options = DispatchOptions {
        background: true,
        ..DispatchOptions::default()
    };

    let DispatchOutcome::Background(handle) =
        dispatcher.dispatch("alpha", "fail", options).expect("dispatch")
    else {
        panic!("expected a background handle");
    };

    let deadline = Instant::now() + Duration::from_secs(15);
    while !fs::read_to_string(&handle.log_file)
        .unwrap_or_default()
        .contains("Exit code: 3")
    {
        assert!(Instant::now() < deadline, "footer never written");
        thread::sleep(Duration::from_millis(10));
    }

    let manager = dispatcher.manager();
    assert_eq!(manager.reconcile_statuses().expect("reconcile"), 0);
    let task = manager.get_task(&handle.id).expect("get").expect("present");
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.exit_code, Some(3));
}
