use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = ".claude-projects.yaml";
pub const DEFAULT_ASSISTANT: &str = "claude";
pub const SAMPLE_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_path: Option<String>,
    /// Accepted and written back, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Contents of `~/.claude-projects.yaml`.
///
/// Keys ccode does not know about are kept in `extra` so that `add` and
/// `remove` write them back untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub projects: BTreeMap<String, ProjectEntry>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub default_args: Vec<String>,
}

impl Project {
    fn from_entry(name: &str, entry: &ProjectEntry) -> Self {
        Project {
            name: name.to_string(),
            path: entry.path.clone(),
            description: entry.description.clone(),
            default_args: entry.default_args.clone(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Expands a leading `~` and anchors relative paths at `home`.
pub fn resolve_project_path(path: &str, home: &Path) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        return home.join(rest.trim_start_matches('/'));
    }

    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        if !value.get("projects").is_some_and(serde_yaml::Value::is_mapping) {
            return Err("config must have a \"projects\" section".to_string());
        }
        serde_yaml::from_value(value).map_err(|e| e.to_string())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    pub fn sample() -> Self {
        let mut projects = BTreeMap::new();
        projects.insert(
            "example-project".to_string(),
            ProjectEntry {
                path: "~/workspace/example-project".to_string(),
                description: Some("An example project".to_string()),
                default_args: Vec::new(),
            },
        );
        projects.insert(
            "another-project".to_string(),
            ProjectEntry {
                path: "~/workspace/another-project".to_string(),
                description: Some("Another example project".to_string()),
                default_args: vec!["--continue".to_string()],
            },
        );
        Config {
            projects,
            settings: Settings {
                claude_path: Some(DEFAULT_ASSISTANT.to_string()),
                timeout: Some(SAMPLE_TIMEOUT_MS),
                extra: Mapping::new(),
            },
            extra: Mapping::new(),
        }
    }

    pub fn write_sample(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        Self::sample().save(path)
    }

    pub fn assistant_path(&self) -> &str {
        self.settings
            .claude_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_ASSISTANT)
    }

    pub fn project(&self, name: &str) -> Result<Project, ConfigError> {
        self.projects
            .get(name)
            .map(|entry| Project::from_entry(name, entry))
            .ok_or_else(|| ConfigError::UnknownProject {
                name: name.to_string(),
                available: self.projects.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects
            .iter()
            .map(|(name, entry)| Project::from_entry(name, entry))
            .collect()
    }

    pub fn add_project(
        &mut self,
        name: &str,
        path: &Path,
        description: Option<String>,
    ) -> Result<(), ConfigError> {
        if self.projects.contains_key(name) {
            return Err(ConfigError::DuplicateProject(name.to_string()));
        }
        self.projects.insert(
            name.to_string(),
            ProjectEntry {
                path: path.to_string_lossy().into_owned(),
                description,
                default_args: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn remove_project(&mut self, name: &str) -> Result<Project, ConfigError> {
        let project = self.project(name)?;
        self.projects.remove(name);
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
projects:
  alpha:
    path: ~/code/alpha
    description: First project
  beta:
    path: /srv/beta
    defaultArgs: ["--continue", "--verbose"]
settings:
  claudePath: /opt/bin/claude
  timeout: 300000
"#;

    #[test]
    fn parses_projects_and_settings() {
        let config = Config::parse(SAMPLE).expect("parse");
        let beta = config.project("beta").expect("beta");
        assert_eq!(beta.default_args, vec!["--continue", "--verbose"]);
        assert_eq!(config.assistant_path(), "/opt/bin/claude");
        assert_eq!(
            config.project("alpha").expect("alpha").description.as_deref(),
            Some("First project")
        );
    }

    #[test]
    fn missing_projects_section_is_rejected() {
        let err = Config::parse("settings:\n  claudePath: claude\n").expect_err("no projects");
        assert!(err.contains("projects"));
    }

    #[test]
    fn unknown_project_lists_available_names() {
        let config = Config::parse(SAMPLE).expect("parse");
        let err = config.project("gamma").expect_err("unknown");
        assert!(err.to_string().contains("Available projects: alpha, beta"));
    }

    #[test]
    fn assistant_defaults_to_claude() {
        let config = Config::parse("projects: {}\n").expect("parse");
        assert_eq!(config.assistant_path(), DEFAULT_ASSISTANT);
    }

    #[test]
    fn resolves_tilde_relative_and_absolute_paths() {
        let home = Path::new("/home/dev");
        assert_eq!(resolve_project_path("~/code/a", home), home.join("code/a"));
        assert_eq!(resolve_project_path("~", home), home.to_path_buf());
        assert_eq!(resolve_project_path("code/b", home), home.join("code/b"));
        assert_eq!(resolve_project_path("/srv/c", home), PathBuf::from("/srv/c"));
    }

    #[test]
    fn sample_config_is_written_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        Config::write_sample(&path).expect("write sample");
        assert_eq!(Config::load(&path).expect("load"), Config::sample());
        assert!(matches!(
            Config::write_sample(&path),
            Err(ConfigError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn add_and_remove_projects() {
        let mut config = Config::default();
        config
            .add_project("alpha", Path::new("/srv/alpha"), None)
            .expect("add");
        assert!(matches!(
            config.add_project("alpha", Path::new("/srv/other"), None),
            Err(ConfigError::DuplicateProject(_))
        ));

        let removed = config.remove_project("alpha").expect("remove");
        assert_eq!(removed.path, "/srv/alpha");
        assert!(config.remove_project("alpha").is_err());
    }

    #[test]
    fn rewrite_keeps_timeout_and_unknown_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "projects:\n  a:\n    path: /srv/a\nsettings:\n  claudePath: claude\n  timeout: 300000\n  theme: dark\nowner: ops\n",
        )
        .expect("write");

        let mut config = Config::load(&path).expect("load");
        config
            .add_project("b", Path::new("/srv/b"), Some("second".to_string()))
            .expect("add");
        config.save(&path).expect("save");

        let reloaded = Config::load(&path).expect("reload");
        assert_eq!(reloaded.settings.timeout, Some(300_000));
        assert_eq!(reloaded.settings.extra.get("theme"), Some(&"dark".into()));
        assert_eq!(reloaded.extra.get("owner"), Some(&"ops".into()));
        assert_eq!(reloaded.projects.len(), 2);
    }

    #[test]
    fn sample_carries_timeout() {
        assert_eq!(Config::sample().settings.timeout, Some(SAMPLE_TIMEOUT_MS));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Config::load(&dir.path().join("nope.yaml")).expect_err("missing");
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
