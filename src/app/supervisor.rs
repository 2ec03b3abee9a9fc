//! Background dispatch from the CLI.
//!
//! The invoking process re-executes itself as a hidden `__supervise` command in
//! a new session. The supervisor performs the background dispatch, reports the
//! task id on its stdout pipe and then stays alive to wait for the assistant,
//! so the registry receives the real exit code after the CLI has returned.

use std::{
    env,
    io::{self, BufRead, BufReader, Write},
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context as _, Result};
use log::{debug, error};

use ccode::{worker::log_file, DispatchOptions, DispatchOutcome, TaskId};

use super::Context;

const OK_PREFIX: &str = "ok ";
const ERR_PREFIX: &str = "err ";
const SUPERVISOR_LOG: &str = "supervisor.log";

fn supervisor_log_path(ctx: &Context) -> PathBuf {
    ctx.manager.root().join(SUPERVISOR_LOG)
}

/// Starts a detached supervisor for the task and returns its id once the task
/// is registered.
pub fn launch_detached(ctx: &Context, project: &str, task: &str) -> Result<TaskId> {
    let exe = env::current_exe().context("could not locate the ccode executable")?;

    let log_path = supervisor_log_path(ctx);
    let stderr = log_file::open_append(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let mut command = Command::new(exe);
    command
        .arg("--config")
        .arg(&ctx.config_path)
        .arg("--state-dir")
        .arg(ctx.manager.root());
    if ctx.verbose {
        command.arg("--verbose");
    }
    command
        .args(["__supervise", "--", project, task])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(stderr);
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = command.spawn().context("failed to start background supervisor")?;
    debug!("Supervisor for '{}' started (pid {}).", project, child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("supervisor stdout was not captured"))?;
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .context("failed to read from background supervisor")?;

    if line.is_empty() {
        let status = child.wait()?;
        bail!("background supervisor exited ({status}) before reporting a task id");
    }
    parse_report(line.trim_end())
}

fn parse_report(line: &str) -> Result<TaskId> {
    if let Some(id) = line.strip_prefix(OK_PREFIX) {
        return Ok(TaskId::new(id.trim()));
    }
    if let Some(message) = line.strip_prefix(ERR_PREFIX) {
        bail!("{message}");
    }
    bail!("unexpected reply from background supervisor: {line:?}")
}

pub fn supervise(ctx: &Context, project: &str, task: &str) -> Result<()> {
    let options = DispatchOptions {
        verbose: ctx.verbose,
        dry_run: false,
        background: true,
    };
    let outcome = ctx.dispatcher().and_then(|dispatcher| {
        dispatcher
            .dispatch(project, task, options)
            .map_err(anyhow::Error::from)
    });

    let mut out = io::stdout().lock();
    match outcome {
        Ok(DispatchOutcome::Background(handle)) => {
            writeln!(out, "{OK_PREFIX}{}", handle.id)?;
            out.flush()?;
            drop(out);

            match handle.wait() {
                Some(message) => debug!("Task '{}' settled: {}", message.id(), message.status()),
                None => error!("Waiter for task '{}' stopped unexpectedly.", handle.id),
            }
            Ok(())
        }
        Ok(_) => {
            writeln!(out, "{ERR_PREFIX}dispatch did not run in the background")?;
            bail!("dispatch did not run in the background")
        }
        Err(err) => {
            let message = format!("{err:#}").replace('\n', " ");
            writeln!(out, "{ERR_PREFIX}{message}")?;
            out.flush()?;
            Err(err)
        }
    }
}
