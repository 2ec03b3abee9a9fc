pub mod project_config;

pub use project_config::{
    default_config_path, resolve_project_path, Config, Project, ProjectEntry, Settings,
};
