pub mod cli;
mod commands;
mod supervisor;

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use ccode::{config, Config, Dispatcher, TaskManager};

use cli::{Cli, Commands};

pub struct Context {
    pub config_path: PathBuf,
    pub manager: TaskManager,
    pub verbose: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => config::default_config_path()?,
        };
        let root = match &cli.state_dir {
            Some(dir) => dir.clone(),
            None => TaskManager::default_root().context("could not determine the home directory")?,
        };
        Ok(Context {
            config_path,
            manager: TaskManager::new(root),
            verbose: cli.verbose,
        })
    }

    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(&self.config_path)?)
    }

    pub fn dispatcher(&self) -> Result<Dispatcher> {
        Ok(Dispatcher::new(self.load_config()?, self.manager.clone())?)
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context::from_cli(&cli)?;

    match cli.command {
        Commands::Init => commands::init(&ctx),
        Commands::List => commands::list(&ctx),
        Commands::Add {
            name,
            path,
            description,
        } => commands::add(&ctx, &name, path, description),
        Commands::Remove { name } => commands::remove(&ctx, &name),
        Commands::Dispatch {
            project,
            task,
            background,
            dry_run,
        } => commands::dispatch(&ctx, &project, &task, background, dry_run),
        Commands::Batch { file, foreground } => commands::batch(&ctx, &file, !foreground),
        Commands::Status { all, status } => commands::status(&ctx, all, status),
        Commands::Logs { task_id, follow } => commands::logs(&ctx, &task_id.into(), follow),
        Commands::Kill { task_id } => commands::kill(&ctx, &task_id.into()),
        Commands::Cleanup { days } => commands::cleanup(&ctx, days),
        Commands::Supervise { project, task } => supervisor::supervise(&ctx, &project, &task),
    }
}
