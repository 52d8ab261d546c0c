use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::analysis::{TaskAnalysis, COMPLEXITY_MAX};
use crate::identity::{
    leading_task_id, legacy_record_path, metadata_root, record_file_name, record_path,
    tasks_dir, TaskId,
};
use crate::lock::ProjectLock;

pub const SCORE_MIN: u8 = 0;
pub const SCORE_MAX: u8 = 10;
/// Advisory tiers on the 0-10 scale. Scores between tiers are allowed.
pub const SCORE_TIERS: [(u8, &str); 3] = [
    (6, "acceptable: the basic requirement is met"),
    (8, "good: solid result with minor gaps"),
    (10, "excellent: nothing meaningful to improve"),
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Task record was written but is empty: {}", .0.display())]
    EmptyWrite(PathBuf),
    #[error("Task record at {} does not contain {missing}", .path.display())]
    Unverified { path: PathBuf, missing: String },
    #[error("Task id {task_id} does not match the task analysis fingerprint {fingerprint}")]
    FingerprintMismatch { task_id: TaskId, fingerprint: String },
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.to_path_buf();
    move |source| StorageError::Io {
        action,
        path,
        source,
    }
}

pub fn scoring_legend() -> String {
    let mut lines = vec![format!(
        "- Score every dimension on a continuous {SCORE_MIN}-{SCORE_MAX} scale (decimals allowed)."
    )];
    for (score, meaning) in SCORE_TIERS {
        lines.push(format!("- {score}: {meaning}"));
    }
    lines.push(
        "- Final score = arithmetic mean of all dimension scores, every dimension weighted equally."
            .to_string(),
    );
    let mut legend = lines.join("\n");
    legend.push('\n');
    legend
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Renders the Markdown document stored for a task. Both LLM outputs are embedded verbatim.
pub fn render_record(
    task_id: &TaskId,
    task_name: &str,
    metadata: Option<&TaskAnalysis>,
    refined_description: &str,
    dimensions: &str,
) -> String {
    let title = if task_name.trim().is_empty() {
        "(untitled task)"
    } else {
        task_name.trim()
    };
    let created = task_id
        .created_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    let mut doc = Vec::new();
    doc.push(format!("# {}", title));
    doc.push(String::new());
    doc.push(format!("- Task ID: `{}`", task_id));
    doc.push(format!("- Fingerprint: `{}`", task_id.fingerprint()));
    doc.push(format!("- Created: {}", created));
    if let Some(meta) = metadata {
        doc.push(format!("- Core task: {}", meta.core_task));
        doc.push(format!("- Type: {}", meta.task_type));
        doc.push(format!("- Domain: {}", meta.domain));
        doc.push(format!("- Complexity: {}/{}", meta.complexity, COMPLEXITY_MAX));
        doc.push(format!("- Key elements: {}", join_or_none(&meta.key_elements)));
        doc.push(format!("- Objectives: {}", join_or_none(&meta.objectives)));
    }
    doc.push(String::new());
    doc.push(refined_description.to_string());
    doc.push(String::new());
    doc.push("---".to_string());
    doc.push(String::new());
    doc.push(dimensions.to_string());
    doc.push(String::new());
    doc.push("---".to_string());
    doc.push(String::new());
    doc.push("## Scoring Guide".to_string());
    doc.push(String::new());
    doc.push(scoring_legend());
    doc.join("\n")
}

/// Writes `content` with `write`, then confirms the file is non-empty and carries `marker`.
pub(crate) fn write_verified<F>(
    path: &Path,
    content: &str,
    marker: &str,
    write: F,
) -> Result<(), StorageError>
where
    F: FnOnce(&Path, &str) -> std::io::Result<()>,
{
    write(path, content).map_err(io_error("write", path))?;
    let written = fs::metadata(path).map_err(io_error("stat", path))?;
    if written.len() == 0 {
        return Err(StorageError::EmptyWrite(path.to_path_buf()));
    }
    let stored = fs::read_to_string(path).map_err(io_error("re-read", path))?;
    if !stored.contains(marker) {
        return Err(StorageError::Unverified {
            path: path.to_path_buf(),
            missing: marker.to_string(),
        });
    }
    Ok(())
}

/// Persists the final record for a task under `tasks/<taskId>_<name>.md` and returns the path.
///
/// The document is written and verified in a temp file, then renamed into place, so a failed
/// write leaves the previous record intact. Earlier flat records for the same id under another
/// name are removed. When `metadata` is given its fingerprint must match the id.
pub fn save_task_record(
    project: &Path,
    task_id: &TaskId,
    task_name: &str,
    metadata: Option<&TaskAnalysis>,
    refined_description: &str,
    dimensions: &str,
) -> Result<PathBuf, StorageError> {
    save_task_record_with(
        project,
        task_id,
        task_name,
        metadata,
        refined_description,
        dimensions,
        |path, content| fs::write(path, content),
    )
}

fn save_task_record_with<F>(
    project: &Path,
    task_id: &TaskId,
    task_name: &str,
    metadata: Option<&TaskAnalysis>,
    refined_description: &str,
    dimensions: &str,
    write: F,
) -> Result<PathBuf, StorageError>
where
    F: FnOnce(&Path, &str) -> std::io::Result<()>,
{
    if let Some(meta) = metadata {
        let fingerprint = meta.fingerprint();
        if fingerprint != task_id.fingerprint() {
            return Err(StorageError::FingerprintMismatch {
                task_id: task_id.clone(),
                fingerprint,
            });
        }
    }

    let _lock =
        ProjectLock::acquire(project).map_err(io_error("lock", &metadata_root(project)))?;
    let dir = tasks_dir(project);
    fs::create_dir_all(&dir).map_err(io_error("create", &dir))?;

    let path = record_path(project, task_id, task_name);
    let file_name = record_file_name(task_id, task_name);
    // Leading dot keeps the temp file out of task id scans.
    let tmp = dir.join(format!(".{}.tmp", file_name));
    let document = render_record(task_id, task_name, metadata, refined_description, dimensions);
    if let Err(err) = write_verified(&tmp, &document, &task_id.to_string(), write) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    if let Err(source) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::Io {
            action: "rename",
            path,
            source,
        });
    }
    remove_superseded_records(project, task_id, &file_name);
    tracing::info!(task_id = %task_id, path = %path.display(), "saved task record");
    Ok(path)
}

/// Deletes flat records for `task_id` other than `keep`, left behind by a save under an
/// earlier task name.
fn remove_superseded_records(project: &Path, task_id: &TaskId, keep: &str) {
    let Some(entries) = sorted_task_entries(project) else {
        return;
    };
    for (name, path) in entries {
        if name == keep || !path.is_file() {
            continue;
        }
        if leading_task_id(&name).as_ref() != Some(task_id) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed superseded task record"),
            Err(err) => {
                tracing::warn!(path = %path.display(), "failed to remove superseded record: {err}")
            }
        }
    }
}

fn sorted_task_entries(project: &Path) -> Option<Vec<(String, PathBuf)>> {
    let dir = tasks_dir(project);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %dir.display(), "cannot scan task records: {err}");
            }
            return None;
        }
    };
    let mut names: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    // Oldest task first; timestamps have no fixed width, so compare them numerically.
    names.sort_by(|(a, _), (b, _)| {
        let created = |name: &str| leading_task_id(name).map(|id| id.timestamp_millis());
        created(a).cmp(&created(b)).then_with(|| a.cmp(b))
    });
    Some(names)
}

/// Advisory dedup lookup: the first stored task whose fingerprint segment contains
/// `fingerprint`. The timestamp segment is not searched.
pub fn find_existing_task(project: &Path, fingerprint: &str) -> Option<TaskId> {
    let needle = fingerprint.trim();
    if needle.is_empty() {
        return None;
    }
    sorted_task_entries(project)?
        .into_iter()
        .filter_map(|(name, _)| leading_task_id(&name))
        .find(|task_id| task_id.fingerprint().contains(needle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLayout {
    Flat,
    Legacy,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecordSummary {
    pub task_id: TaskId,
    pub task_name: Option<String>,
    pub path: PathBuf,
    pub layout: RecordLayout,
    pub modified: Option<String>,
}

fn modified_rfc3339(path: &Path) -> Option<String> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).to_rfc3339())
}

fn flat_record_name(file_name: &str, task_id: &TaskId) -> Option<String> {
    let rest = file_name.strip_prefix(&task_id.to_string())?;
    let name = rest.strip_prefix('_')?.strip_suffix(".md")?;
    Some(name.to_string())
}

/// Lists stored records oldest task id first, both layouts.
pub fn list_task_records(project: &Path) -> Vec<TaskRecordSummary> {
    let Some(entries) = sorted_task_entries(project) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for (name, path) in entries {
        let Some(task_id) = leading_task_id(&name) else {
            continue;
        };
        if path.is_file() {
            let Some(task_name) = flat_record_name(&name, &task_id) else {
                continue;
            };
            records.push(TaskRecordSummary {
                modified: modified_rfc3339(&path),
                task_id,
                task_name: Some(task_name),
                path,
                layout: RecordLayout::Flat,
            });
        } else if path.is_dir() {
            let legacy = legacy_record_path(project, &task_id);
            if legacy.is_file() {
                records.push(TaskRecordSummary {
                    modified: modified_rfc3339(&legacy),
                    task_id,
                    task_name: None,
                    path: legacy,
                    layout: RecordLayout::Legacy,
                });
            }
        }
    }
    records
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedRecord {
    pub task_id: TaskId,
    pub path: PathBuf,
    pub content: String,
}

/// Reads a stored record, preferring the flat layout over the nested legacy one.
pub fn load_task_record(
    project: &Path,
    task_id: &TaskId,
) -> Result<Option<LoadedRecord>, StorageError> {
    let found = list_task_records(project)
        .into_iter()
        .filter(|record| &record.task_id == task_id)
        .min_by_key(|record| record.layout == RecordLayout::Legacy);
    let Some(record) = found else {
        return Ok(None);
    };
    let content = fs::read_to_string(&record.path).map_err(io_error("read", &record.path))?;
    Ok(Some(LoadedRecord {
        task_id: record.task_id,
        path: record.path,
        content,
    }))
}
