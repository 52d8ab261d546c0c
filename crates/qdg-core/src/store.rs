use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::write_default_config;
use crate::identity::{config_dir, config_path, metadata_root, tasks_dir};
use crate::lock::ProjectLock;

#[derive(Debug, Clone, Serialize)]
pub struct FailedPath {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`initialize_store`].
///
/// `created` / `existed` are best-effort diagnostics: a directory counts as created when it
/// was empty right after `create_dir_all`. Nothing should branch on them.
#[derive(Debug, Clone, Serialize)]
pub struct StoreLayout {
    pub root: PathBuf,
    pub created: Vec<PathBuf>,
    pub existed: Vec<PathBuf>,
    pub failed: Vec<FailedPath>,
    pub config_created: bool,
}

impl StoreLayout {
    /// True when the metadata root exists and no subpath failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.root.is_dir()
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Ensures `<project>/.qdg/{config,tasks}` and a default settings document exist.
///
/// Idempotent. A failing subpath is recorded in `failed` and the remaining ones are still
/// attempted; an existing settings document is never rewritten. The project directory itself
/// must already exist and is never created.
pub fn initialize_store(project: &Path) -> StoreLayout {
    let root = metadata_root(project);
    let mut layout = StoreLayout {
        root: root.clone(),
        created: Vec::new(),
        existed: Vec::new(),
        failed: Vec::new(),
        config_created: false,
    };

    if !project.is_dir() {
        tracing::warn!(path = %project.display(), "project directory does not exist");
        layout.failed.push(FailedPath {
            path: project.to_path_buf(),
            error: "project directory does not exist".to_string(),
        });
        return layout;
    }

    // The lock file lives inside the root, so classify the root before locking.
    let root_existed = root.is_dir();
    let _lock = match ProjectLock::acquire(project) {
        Ok(lock) => Some(lock),
        Err(err) => {
            tracing::warn!(path = %root.display(), "initializing without project lock: {err}");
            None
        }
    };

    for dir in [root.clone(), config_dir(project), tasks_dir(project)] {
        match fs::create_dir_all(&dir) {
            Ok(()) if dir == root && root_existed => layout.existed.push(dir),
            Ok(()) if dir == root => layout.created.push(dir),
            Ok(()) if is_empty_dir(&dir) => layout.created.push(dir),
            Ok(()) => layout.existed.push(dir),
            Err(err) => {
                tracing::warn!(path = %dir.display(), "failed to create store directory: {err}");
                layout.failed.push(FailedPath {
                    path: dir,
                    error: err.to_string(),
                });
            }
        }
    }

    if config_dir(project).is_dir() {
        match write_default_config(project) {
            Ok(written) => layout.config_created = written,
            Err(err) => {
                tracing::warn!("failed to write default settings: {err}");
                layout.failed.push(FailedPath {
                    path: config_path(project),
                    error: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        root = %layout.root.display(),
        created = layout.created.len(),
        existed = layout.existed.len(),
        failed = layout.failed.len(),
        "initialized project store"
    );
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_settings, set_dimension_count};
    use tempfile::TempDir;

    #[test]
    fn first_initialization_creates_tree_and_config() {
        let temp = TempDir::new().expect("tempdir");
        let layout = initialize_store(temp.path());
        assert!(layout.is_complete());
        assert!(layout.config_created);
        assert_eq!(layout.created.len(), 3);
        assert!(layout.existed.is_empty());
        assert!(config_path(temp.path()).is_file());
        assert!(tasks_dir(temp.path()).is_dir());
    }

    #[test]
    fn reinitialization_keeps_existing_config() {
        let temp = TempDir::new().expect("tempdir");
        initialize_store(temp.path());
        set_dimension_count(temp.path(), 9).expect("update");
        let before = fs::read_to_string(config_path(temp.path())).expect("read");

        let layout = initialize_store(temp.path());
        assert!(!layout.config_created);
        assert!(layout.existed.contains(&metadata_root(temp.path())));
        assert!(layout.existed.contains(&config_dir(temp.path())));
        assert_eq!(fs::read_to_string(config_path(temp.path())).expect("read"), before);
        assert_eq!(load_settings(temp.path()).dimension_count, 9);
    }

    #[test]
    fn missing_project_directory_is_reported_not_created() {
        let temp = TempDir::new().expect("tempdir");
        let missing = temp.path().join("nope");
        let layout = initialize_store(&missing);
        assert!(!layout.is_complete());
        assert_eq!(layout.failed.len(), 1);
        assert_eq!(layout.failed[0].path, missing);
        assert!(layout.created.is_empty());
        assert!(!missing.exists());
    }

    #[test]
    fn blocked_subpath_is_reported_and_others_continue() {
        let temp = TempDir::new().expect("tempdir");
        fs::create_dir_all(metadata_root(temp.path())).expect("root");
        fs::write(config_dir(temp.path()), "not a directory").expect("blocker");

        let layout = initialize_store(temp.path());
        assert!(!layout.is_complete());
        assert_eq!(layout.failed.len(), 1);
        assert_eq!(layout.failed[0].path, config_dir(temp.path()));
        assert!(tasks_dir(temp.path()).is_dir());
        assert!(!layout.config_created);
    }
}
