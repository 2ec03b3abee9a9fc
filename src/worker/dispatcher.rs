use std::{fs, path::PathBuf};

use log::{debug, info};

use crate::config::{resolve_project_path, Config};
use crate::error::{ConfigError, DispatchError};
use crate::manager::task_manager::TaskManager;
use crate::worker::worker::{self, BackgroundHandle, CommandPlan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    pub verbose: bool,
    pub dry_run: bool,
    pub background: bool,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    DryRun(CommandPlan),
    Completed(CommandPlan),
    Background(BackgroundHandle),
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Config,
    manager: TaskManager,
    home: PathBuf,
}

impl Dispatcher {
    pub fn new(config: Config, manager: TaskManager) -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::with_home(config, manager, home))
    }

    pub fn with_home(config: Config, manager: TaskManager, home: PathBuf) -> Self {
        Dispatcher {
            config,
            manager,
            home,
        }
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves and validates the project directory and builds the command.
    pub fn plan(&self, project_name: &str, task: &str) -> Result<CommandPlan, DispatchError> {
        let project = self.config.project(project_name)?;
        let workdir = resolve_project_path(&project.path, &self.home);

        match fs::metadata(&workdir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(DispatchError::NotADirectory(workdir)),
            Err(_) => return Err(DispatchError::MissingDirectory(workdir)),
        }

        Ok(CommandPlan {
            project: project.name,
            workdir,
            program: self.config.assistant_path().to_string(),
            args: project.default_args,
            task: task.to_string(),
        })
    }

    pub fn dispatch(
        &self,
        project_name: &str,
        task: &str,
        options: DispatchOptions,
    ) -> Result<DispatchOutcome, DispatchError> {
        let plan = self.plan(project_name, task)?;

        if options.dry_run {
            return Ok(DispatchOutcome::DryRun(plan));
        }

        if options.verbose {
            info!("Executing: {}", plan.command_line());
            info!("Working directory: {}", plan.workdir.display());
        } else {
            debug!("Executing: {} in {}", plan.command_line(), plan.workdir.display());
        }

        if options.background {
            let handle = worker::spawn_background(&plan, &self.manager)?;
            Ok(DispatchOutcome::Background(handle))
        } else {
            worker::run_foreground(&plan)?;
            Ok(DispatchOutcome::Completed(plan))
        }
    }
}
