use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Local, Utc};
use crossterm::style::Stylize;
use log::{info, warn};

use ccode::{
    worker::log_file, CommandPlan, Config, DispatchOptions, DispatchOutcome, TaskId, TaskRecord,
    TaskStatus,
};

use super::{supervisor, Context};

const RECENT_WINDOW_HOURS: i64 = 24;
const FOLLOW_POLL: Duration = Duration::from_millis(500);
const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn init(ctx: &Context) -> Result<()> {
    Config::write_sample(&ctx.config_path)?;
    println!(
        "{} {}",
        "✓ Created sample config at:".green(),
        ctx.config_path.display()
    );
    println!("{}", "\nEdit this file to add your projects.".blue());
    println!("{} {}", "Then run:".blue(), "ccode list".bold());
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let projects = ctx.load_config()?.projects();
    if projects.is_empty() {
        println!("{}", "No projects configured.".yellow());
        println!("{} {}", "Add one with:".blue(), "ccode add <name> [path]".bold());
        return Ok(());
    }

    println!("{}", "\nConfigured Projects:\n".bold());
    for project in projects {
        println!("  {}", project.name.cyan());
        println!("    {}", format!("Path: {}", project.path).dark_grey());
        if let Some(description) = &project.description {
            println!("    {}", description.as_str().dark_grey());
        }
        if !project.default_args.is_empty() {
            let args = format!("Args: {}", project.default_args.join(" "));
            println!("    {}", args.dark_grey());
        }
        println!();
    }
    Ok(())
}

pub fn add(
    ctx: &Context,
    name: &str,
    path: Option<PathBuf>,
    description: Option<String>,
) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => env::current_dir()?,
    };
    let path = fs::canonicalize(&path)
        .with_context(|| format!("directory does not exist: {}", path.display()))?;
    if !path.is_dir() {
        bail!("path is not a directory: {}", path.display());
    }

    let mut config = ctx.load_config()?;
    config.add_project(name, &path, description.clone())?;
    config.save(&ctx.config_path)?;

    println!("{}", "\n✓ Project added successfully".green());
    println!("  {}", format!("Name: {name}").cyan());
    println!("  {}", format!("Path: {}", path.display()).dark_grey());
    if let Some(description) = description {
        println!("  {}", format!("Description: {description}").dark_grey());
    }
    println!();
    Ok(())
}

pub fn remove(ctx: &Context, name: &str) -> Result<()> {
    let mut config = ctx.load_config()?;
    let project = config.remove_project(name)?;
    config.save(&ctx.config_path)?;

    println!("{}", "\n✓ Project removed successfully".green());
    println!("  {}", format!("Name: {}", project.name).dark_grey());
    println!();
    Ok(())
}

fn print_plan_header(plan: &CommandPlan) {
    println!("\n{} {}", "📦 Project:".bold(), plan.project.as_str().cyan());
    println!(
        "{} {}",
        "📁 Path:".bold(),
        plan.workdir.display().to_string().dark_grey()
    );
    println!("{} {}", "💬 Task:".bold(), plan.task.as_str().white());
    println!();
}

fn print_dry_run(plan: &CommandPlan) {
    println!("{}", "🏃 Dry run - would execute:".yellow());
    for line in plan.to_string().lines() {
        println!("  {}", line.dark_grey());
    }
    println!();
}

pub fn dispatch(
    ctx: &Context,
    project: &str,
    task: &str,
    background: bool,
    dry_run: bool,
) -> Result<()> {
    let dispatcher = ctx.dispatcher()?;
    let plan = dispatcher.plan(project, task)?;
    print_plan_header(&plan);

    let options = DispatchOptions {
        verbose: ctx.verbose,
        dry_run,
        background,
    };

    if dry_run {
        if let DispatchOutcome::DryRun(plan) = dispatcher.dispatch(project, task, options)? {
            print_dry_run(&plan);
        }
        return Ok(());
    }

    if background {
        // The dispatcher logs the command line inside the supervisor process.
        if ctx.verbose {
            info!("Executing: {}", plan.command_line());
            info!("Working directory: {}", plan.workdir.display());
        }
        let id = supervisor::launch_detached(ctx, project, task)?;
        println!("{}", "🚀 Task started in background".green());
        println!("  {}", format!("Task ID: {id}").cyan());
        println!(
            "  {} {}",
            "View logs:".dark_grey(),
            format!("ccode logs {id}").bold()
        );
        println!(
            "  {} {}\n",
            "Check status:".dark_grey(),
            "ccode status".bold()
        );
        return Ok(());
    }

    println!("{}", "🚀 Launching assistant...\n".blue());
    println!("{}\n", rule().dark_grey());
    let result = dispatcher.dispatch(project, task, options);
    println!("\n{}", rule().dark_grey());
    result?;
    println!("{}", "\n✓ Task completed successfully".green());
    Ok(())
}

/// Dispatches each `project: task` entry independently and prints a summary.
pub fn batch(ctx: &Context, file: &Path, background: bool) -> Result<()> {
    let content =
        fs::read_to_string(file).with_context(|| format!("file not found: {}", file.display()))?;
    let entries: serde_yaml::Mapping = serde_yaml::from_str(&content)
        .context("invalid task file format, expected YAML with project: task pairs")?;

    let dispatcher = ctx.dispatcher()?;
    println!("{}", "\n📋 Batch Execution\n".bold());

    let mut started = 0usize;
    let mut failed = 0usize;
    for (project, task) in &entries {
        let (Some(project), Some(task)) = (project.as_str(), task.as_str()) else {
            let name = serde_yaml::to_string(project).unwrap_or_default();
            println!(
                "{}",
                format!("⚠ Skipping {}: task must be a string", name.trim()).yellow()
            );
            failed += 1;
            continue;
        };

        let result = if background {
            dispatcher
                .plan(project, task)
                .map_err(anyhow::Error::from)
                .and_then(|_| supervisor::launch_detached(ctx, project, task))
                .map(|id| {
                    let id = id.to_string();
                    println!("{} {} {}", "✓".green(), project.cyan(), id.dark_grey());
                })
        } else {
            let options = DispatchOptions {
                verbose: ctx.verbose,
                ..DispatchOptions::default()
            };
            dispatcher
                .dispatch(project, task, options)
                .map(|_| println!("{} {}", "✓".green(), project.cyan()))
                .map_err(anyhow::Error::from)
        };

        match result {
            Ok(()) => started += 1,
            Err(err) => {
                eprintln!("{} {err:#}", format!("✗ Failed {project}:").red());
                failed += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    let verb = if background { "Started" } else { "Completed" };
    println!("{}", format!("  ✓ {verb}: {started}").green());
    if failed > 0 {
        println!("{}", format!("  ✗ Failed: {failed}").red());
    }
    println!();
    Ok(())
}

fn status_icon(status: TaskStatus) -> String {
    match status {
        TaskStatus::Running => "●".blue().to_string(),
        TaskStatus::Completed => "✓".green().to_string(),
        TaskStatus::Failed => "✗".red().to_string(),
        TaskStatus::Killed => "⊗".dark_grey().to_string(),
    }
}

fn status_heading(status: TaskStatus) -> String {
    let heading = match status {
        TaskStatus::Running => "Running:".blue(),
        TaskStatus::Completed => "Completed:".green(),
        TaskStatus::Failed => "Failed:".red(),
        TaskStatus::Killed => "Killed:".dark_grey(),
    };
    heading.bold().to_string()
}

fn print_task(task: &TaskRecord) {
    println!(
        "{} {} - {}",
        status_icon(task.status),
        task.id.to_string().cyan(),
        task.project.as_str().white()
    );
    println!("  {}", task.task.as_str().dark_grey());
    println!(
        "  {}",
        format!("Started: {}", local_time(task.started_at)).dark_grey()
    );
    if let Some(ended_at) = task.ended_at {
        println!("  {}", format!("Ended: {}", local_time(ended_at)).dark_grey());
    }
    if let Some(code) = task.exit_code.filter(|code| *code != 0) {
        println!("  {}", format!("Exit code: {code}").dark_grey());
    }
    println!();
}

fn is_recent(task: &TaskRecord, now: DateTime<Utc>) -> bool {
    task.is_running()
        || task
            .ended_at
            .is_some_and(|ended| ended > now - chrono::Duration::hours(RECENT_WINDOW_HOURS))
}

pub fn status(ctx: &Context, all: bool, filter: Option<TaskStatus>) -> Result<()> {
    ctx.manager.reconcile_statuses()?;
    let all_tasks = ctx.manager.get_tasks(filter)?;

    if all_tasks.is_empty() {
        println!("{}", "\nNo background tasks found.".yellow());
        println!(
            "{} {}\n",
            "Run a task with:".blue(),
            "ccode dispatch <project> <task> --background".bold()
        );
        return Ok(());
    }

    let now = Utc::now();
    let tasks: Vec<TaskRecord> = all_tasks
        .into_iter()
        .filter(|task| all || is_recent(task, now))
        .collect();

    if tasks.is_empty() {
        println!("{}", "\nNo recent background tasks.".yellow());
        println!("{}\n", "Use --all to show all tasks".dark_grey());
        return Ok(());
    }

    println!("{}", "\n📊 Background Tasks\n".bold());
    for status in TaskStatus::ALL {
        let group: Vec<&TaskRecord> = tasks.iter().filter(|t| t.status == status).collect();
        if group.is_empty() {
            continue;
        }
        println!("{}\n", status_heading(status));
        group.into_iter().for_each(print_task);
    }

    println!("{}", format!("Total: {} tasks", tasks.len()).dark_grey());
    if !all {
        println!("{}", "Use --all to show all tasks".dark_grey());
    }
    println!();
    Ok(())
}

fn find_task(ctx: &Context, id: &TaskId) -> Result<TaskRecord> {
    match ctx.manager.get_task(id)? {
        Some(task) => Ok(task),
        None => bail!("task not found: {id}\nRun 'ccode status' to see all tasks"),
    }
}

pub fn logs(ctx: &Context, id: &TaskId, follow: bool) -> Result<()> {
    let task = find_task(ctx, id)?;
    if !task.log_file.exists() {
        bail!("log file not found: {}", task.log_file.display());
    }

    println!("{}", "\n📄 Task Logs\n".bold());
    println!("{}", format!("Task ID: {}", task.id).dark_grey());
    println!("{}", format!("Project: {}", task.project).dark_grey());
    println!("{}", format!("Status: {}", task.status).dark_grey());
    println!("{}\n", rule().dark_grey());

    let mut out = io::stdout().lock();
    if follow {
        let manager = &ctx.manager;
        log_file::follow(
            &task.log_file,
            FOLLOW_POLL,
            || match manager.get_task(id) {
                Ok(Some(task)) => task.is_running(),
                Ok(None) => false,
                Err(e) => {
                    warn!("Could not refresh task '{}': {}", id, e);
                    false
                }
            },
            &mut out,
        )?;
    } else {
        let mut file = fs::File::open(&task.log_file)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

pub fn kill(ctx: &Context, id: &TaskId) -> Result<()> {
    let task = find_task(ctx, id)?;
    if !task.is_running() {
        println!(
            "{}",
            format!("\n⚠ Task is not running (status: {})\n", task.status).yellow()
        );
        return Ok(());
    }

    if !ctx.manager.kill_task(id)? {
        bail!("failed to kill task {id}");
    }
    println!("{}", "\n✓ Task killed successfully".green());
    println!("  {}", format!("Task ID: {id}").dark_grey());
    println!("  {}\n", format!("Project: {}", task.project).dark_grey());
    Ok(())
}

pub fn cleanup(ctx: &Context, days: u64) -> Result<()> {
    let retention = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
    let report = ctx.manager.cleanup_old_tasks(retention)?;
    println!(
        "{}",
        format!(
            "\n✓ Cleaned up {} old task(s), {} remaining\n",
            report.removed, report.kept
        )
        .green()
    );
    Ok(())
}
