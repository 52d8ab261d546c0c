use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

pub const PROJECT_PATH_ENV: &str = "QDG_PROJECT_PATH";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectPathError {
    #[error("Project path does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Project path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("Cannot expand ~ without a home directory (set HOME): {0}")]
    NoHome(String),
}

/// Process surroundings used for path discovery. Core code never reads globals directly;
/// binaries call [`Environment::capture`] once and pass the value down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub cwd: PathBuf,
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new<I, K, V>(cwd: impl Into<PathBuf>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cwd: cwd.into(),
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn capture() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            vars: std::env::vars().collect(),
        }
    }

    /// Trimmed, non-empty value of an environment variable.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn home_dir(&self) -> Option<PathBuf> {
        self.var("HOME")
            .or_else(|| self.var("USERPROFILE"))
            .map(PathBuf::from)
    }

    fn expand(&self, raw: &str) -> Result<PathBuf, ProjectPathError> {
        let expanded = if raw == "~" {
            self.home_dir()
                .ok_or_else(|| ProjectPathError::NoHome(raw.to_string()))?
        } else if let Some(rest) = raw.strip_prefix("~/") {
            self.home_dir()
                .ok_or_else(|| ProjectPathError::NoHome(raw.to_string()))?
                .join(rest)
        } else {
            PathBuf::from(raw)
        };
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.cwd.join(expanded)
        };
        Ok(normalize_lexically(&absolute))
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Resolves the project path from, in order: the explicit argument, the server/CLI default,
/// `QDG_PROJECT_PATH`, the working directory. Returns the path and where it came from.
pub fn resolve_project_path_with_source(
    env: &Environment,
    requested: Option<&str>,
    default: Option<&Path>,
) -> Result<(PathBuf, &'static str), ProjectPathError> {
    let (candidate, source) = if let Some(raw) = non_empty(requested) {
        (env.expand(raw)?, "argument")
    } else if let Some(default) = default {
        (env.expand(&default.to_string_lossy())?, "default")
    } else if let Some(raw) = env.var(PROJECT_PATH_ENV) {
        (env.expand(raw)?, "env")
    } else {
        (normalize_lexically(&env.cwd), "cwd")
    };

    if !candidate.exists() {
        return Err(ProjectPathError::NotFound(candidate));
    }
    if !candidate.is_dir() {
        return Err(ProjectPathError::NotADirectory(candidate));
    }
    tracing::debug!(path = %candidate.display(), source, "resolved project path");
    Ok((candidate, source))
}

pub fn resolve_project_path(
    env: &Environment,
    requested: Option<&str>,
    default: Option<&Path>,
) -> Result<PathBuf, ProjectPathError> {
    resolve_project_path_with_source(env, requested, default).map(|(path, _)| path)
}
