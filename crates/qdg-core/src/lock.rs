use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::identity::metadata_root;

const LOCK_FILE: &str = ".lock";

/// Advisory, per-project exclusive lock on `<project>/.qdg/.lock`.
///
/// Serializes initialization, settings read-merge-write and record writes between
/// processes using this crate. The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Fails with `NotFound` when `project` is not an existing directory; only the
    /// metadata root below it is created.
    pub fn acquire(project: &Path) -> Result<Self, std::io::Error> {
        if !project.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("project directory does not exist: {}", project.display()),
            ));
        }
        let root = metadata_root(project);
        fs::create_dir_all(&root)?;
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        tracing::trace!(path = %path.display(), "acquired project lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
