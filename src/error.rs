use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found at {}\nRun 'ccode init' to create a sample config file.", .path.display())]
    NotFound { path: PathBuf },
    #[error("config file already exists at {}", .path.display())]
    AlreadyExists { path: PathBuf },
    #[error("failed to load config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("project \"{name}\" not found in config.\nAvailable projects: {available}")]
    UnknownProject { name: String, available: String },
    #[error("project \"{0}\" already exists in config")]
    DuplicateProject(String),
    #[error("could not determine the home directory")]
    NoHomeDir,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("task registry {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize task registry: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("project directory does not exist: {}\nPlease check the path in your config file.", .0.display())]
    MissingDirectory(PathBuf),
    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to start {program}: {source}\nMake sure the assistant is installed and accessible.")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    ExitStatus {
        program: String,
        status: String,
        code: Option<i32>,
    },
    #[error("log file io error at {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
