use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ccode::TaskStatus;

#[derive(Parser, Debug)]
#[command(
    name = "ccode",
    version,
    about = "Multi-project task dispatcher for coding assistants"
)]
pub struct Cli {
    /// Project config file (default: ~/.claude-projects.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the task registry and logs (default: ~/.claude-projects)
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a sample config file
    Init,

    /// List all projects from config
    List,

    /// Add a new project to the config
    Add {
        name: String,
        /// Project path (defaults to current directory)
        path: Option<PathBuf>,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove a project from the config
    #[command(alias = "rm")]
    Remove { name: String },

    /// Run a task in the specified project
    Dispatch {
        project: String,
        task: String,
        /// Run task in background
        #[arg(short, long)]
        background: bool,
        /// Show what would be executed without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute project: task pairs from a YAML file
    Batch {
        file: PathBuf,
        /// Run tasks one after another in the foreground
        #[arg(long)]
        foreground: bool,
    },

    /// Show status of background tasks
    Status {
        /// Show all tasks (default: running and ended in the last 24h)
        #[arg(short, long)]
        all: bool,
        /// Only show tasks with this status
        #[arg(long, value_name = "STATUS")]
        status: Option<TaskStatus>,
    },

    /// View logs for a background task
    Logs {
        task_id: String,
        /// Keep printing new output while the task runs
        #[arg(short, long)]
        follow: bool,
    },

    /// Stop a running background task
    Kill { task_id: String },

    /// Remove finished tasks older than the retention period
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: u64,
    },

    #[command(name = "__supervise", hide = true)]
    Supervise { project: String, task: String },
}
