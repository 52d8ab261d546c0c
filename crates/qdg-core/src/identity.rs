use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const METADATA_DIR: &str = ".qdg";
pub const CONFIG_DIR: &str = "config";
pub const TASKS_DIR: &str = "tasks";
pub const CONFIG_FILE: &str = "qdg.config.json";
pub const FINGERPRINT_LEN: usize = 8;
pub const MAX_NAME_LEN: usize = 50;

const TASK_ID_PREFIX: &str = "task_";
const UNTITLED: &str = "untitled";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskIdError {
    #[error("Invalid task id: {0} (expected task_<unixMillis>_<8 hex chars>)")]
    Malformed(String),
    #[error("Invalid fingerprint: {0} (expected 8 lowercase hex chars)")]
    Fingerprint(String),
    #[error("Task id timestamp must not be negative: {0}")]
    Timestamp(i64),
}

pub fn metadata_root(project: &Path) -> PathBuf {
    project.join(METADATA_DIR)
}

pub fn config_dir(project: &Path) -> PathBuf {
    metadata_root(project).join(CONFIG_DIR)
}

pub fn tasks_dir(project: &Path) -> PathBuf {
    metadata_root(project).join(TASKS_DIR)
}

pub fn config_path(project: &Path) -> PathBuf {
    config_dir(project).join(CONFIG_FILE)
}

pub fn record_file_name(task_id: &TaskId, task_name: &str) -> String {
    format!("{}_{}.md", task_id, sanitize_name(task_name))
}

/// Flat layout: `tasks/<taskId>_<SanitizedName>.md`.
pub fn record_path(project: &Path, task_id: &TaskId, task_name: &str) -> PathBuf {
    tasks_dir(project).join(record_file_name(task_id, task_name))
}

/// Older nested layout: `tasks/<taskId>/<taskId>_dimension.md`. Read-only.
pub fn legacy_record_path(project: &Path, task_id: &TaskId) -> PathBuf {
    let id = task_id.to_string();
    tasks_dir(project)
        .join(&id)
        .join(format!("{}_dimension.md", id))
}

/// The task-content fields that identify a task independently of when it was submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    pub core_task: String,
    pub task_type: String,
    pub domain: String,
    pub key_elements: Option<Vec<String>>,
    pub objectives: Option<Vec<String>>,
}

impl TaskFields {
    fn canonical_json(&self) -> String {
        serde_json::json!({
            "coreTask": self.core_task.trim(),
            "taskType": self.task_type.trim(),
            "domain": self.domain.trim(),
            "keyElements": normalized_list(self.key_elements.as_deref()),
            "objectives": normalized_list(self.objectives.as_deref()),
        })
        .to_string()
    }
}

fn normalized_list(values: Option<&[String]>) -> Vec<String> {
    let mut items: Vec<String> = values
        .unwrap_or_default()
        .iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    items.sort();
    items
}

/// Short content hash over the normalized task fields. List order does not matter.
pub fn task_fingerprint(fields: &TaskFields) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fields.canonical_json().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

fn is_fingerprint(value: &str) -> bool {
    value.len() == FINGERPRINT_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    timestamp_millis: i64,
    fingerprint: String,
}

impl TaskId {
    pub fn new(timestamp_millis: i64, fingerprint: &str) -> Result<Self, TaskIdError> {
        if timestamp_millis < 0 {
            return Err(TaskIdError::Timestamp(timestamp_millis));
        }
        let fingerprint = fingerprint.trim();
        if !is_fingerprint(fingerprint) {
            return Err(TaskIdError::Fingerprint(fingerprint.to_string()));
        }
        Ok(Self {
            timestamp_millis,
            fingerprint: fingerprint.to_string(),
        })
    }

    pub fn parse(value: &str) -> Result<Self, TaskIdError> {
        let trimmed = value.trim();
        let malformed = || TaskIdError::Malformed(trimmed.to_string());
        let rest = trimmed.strip_prefix(TASK_ID_PREFIX).ok_or_else(malformed)?;
        let (millis, fingerprint) = rest.split_once('_').ok_or_else(malformed)?;
        if millis.is_empty() || !millis.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed());
        }
        let millis = millis.parse::<i64>().map_err(|_| malformed())?;
        if !is_fingerprint(fingerprint) {
            return Err(malformed());
        }
        Self::new(millis, fingerprint)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_millis).single()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}_{}",
            TASK_ID_PREFIX, self.timestamp_millis, self.fingerprint
        )
    }
}

impl FromStr for TaskId {
    type Err = TaskIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TaskId {
    type Error = TaskIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.to_string()
    }
}

pub fn derive_task_id(timestamp_millis: i64, fingerprint: &str) -> Result<TaskId, TaskIdError> {
    TaskId::new(timestamp_millis, fingerprint)
}

fn leading_task_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^task_\d+_[0-9a-f]{8}").expect("task id regex"))
}

/// Extracts the task id a record file or directory name starts with.
pub fn leading_task_id(entry_name: &str) -> Option<TaskId> {
    let found = leading_task_id_re().find(entry_name)?;
    TaskId::parse(found.as_str()).ok()
}

fn illegal_name_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F\x7F]"#).expect("name regex"))
}

/// Makes a task name safe to embed in a file name. Deterministic for a given input.
pub fn sanitize_name(raw: &str) -> String {
    let stripped = illegal_name_chars_re().replace_all(raw, "");
    let joined = stripped.split_whitespace().collect::<Vec<_>>().join("_");
    let bounded: String = joined.chars().take(MAX_NAME_LEN).collect();
    let trimmed = bounded.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(key_elements: Option<Vec<&str>>, objectives: Option<Vec<&str>>) -> TaskFields {
        TaskFields {
            core_task: "Write docs".to_string(),
            task_type: "writing".to_string(),
            domain: "software".to_string(),
            key_elements: key_elements
                .map(|items| items.into_iter().map(|item| item.to_string()).collect()),
            objectives: objectives
                .map(|items| items.into_iter().map(|item| item.to_string()).collect()),
        }
    }

    #[test]
    fn fingerprint_ignores_list_order() {
        let left = task_fingerprint(&fields(Some(vec!["a", "b"]), Some(vec!["x", "y"])));
        let right = task_fingerprint(&fields(Some(vec!["b", "a"]), Some(vec!["y", "x"])));
        assert_eq!(left, right);
    }

    #[test]
    fn fingerprint_treats_absent_lists_as_empty() {
        let absent = task_fingerprint(&fields(None, None));
        let empty = task_fingerprint(&fields(Some(Vec::new()), Some(Vec::new())));
        assert_eq!(absent, empty);
    }

    #[test]
    fn fingerprint_is_short_lowercase_hex() {
        let fingerprint = task_fingerprint(&fields(Some(vec!["a"]), None));
        assert_eq!(fingerprint.len(), FINGERPRINT_LEN);
        assert!(is_fingerprint(&fingerprint));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let base = task_fingerprint(&fields(Some(vec!["a"]), None));
        let mut other = fields(Some(vec!["a"]), None);
        other.domain = "marketing".to_string();
        assert_ne!(base, task_fingerprint(&other));
    }

    #[test]
    fn task_id_formats_and_parses() {
        let id = derive_task_id(1_700_000_000_000, "abc12345").expect("task id");
        assert_eq!(id.to_string(), "task_1700000000000_abc12345");
        assert_eq!(TaskId::parse("task_1700000000000_abc12345"), Ok(id.clone()));
        assert_eq!(id.fingerprint(), "abc12345");
        assert_eq!(id.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn task_id_rejects_path_like_input() {
        for raw in [
            "task_1_abc1234",
            "task_x_abc12345",
            "task_1_ABC12345",
            "../task_1_abc12345",
            "task_1_abc12345/../../etc",
            "",
        ] {
            assert!(TaskId::parse(raw).is_err(), "accepted {raw:?}");
        }
        assert_eq!(
            derive_task_id(-1, "abc12345"),
            Err(TaskIdError::Timestamp(-1))
        );
    }

    #[test]
    fn leading_task_id_reads_flat_and_nested_names() {
        let flat = leading_task_id("task_1700000000000_abc12345_Write_Blog_Post.md");
        assert_eq!(
            flat.map(|id| id.to_string()).as_deref(),
            Some("task_1700000000000_abc12345")
        );
        let nested = leading_task_id("task_1700000000000_abc12345");
        assert!(nested.is_some());
        assert!(leading_task_id("notes.md").is_none());
    }

    #[test]
    fn sanitize_strips_path_breaking_characters() {
        let safe = sanitize_name("My/Task:Name?");
        assert!(!safe.contains(['/', ':', '?']));
        assert!(safe.chars().count() <= MAX_NAME_LEN);
        assert_eq!(safe, "MyTaskName");
    }

    #[test]
    fn sanitize_collapses_whitespace_and_bounds_length() {
        assert_eq!(sanitize_name("  Write   Blog\tPost "), "Write_Blog_Post");
        let long = "word ".repeat(40);
        let safe = sanitize_name(&long);
        assert!(safe.chars().count() <= MAX_NAME_LEN);
        assert_eq!(safe, sanitize_name(&long));
        assert_eq!(sanitize_name("???"), "untitled");
        assert_eq!(sanitize_name(".."), "untitled");
    }

    #[test]
    fn record_path_uses_flat_layout() {
        let id = TaskId::parse("task_1700000000000_abc12345").expect("task id");
        let path = record_path(Path::new("/tmp/p"), &id, "Write Blog Post");
        assert_eq!(
            path,
            PathBuf::from("/tmp/p/.qdg/tasks/task_1700000000000_abc12345_Write_Blog_Post.md")
        );
        assert_eq!(
            legacy_record_path(Path::new("/tmp/p"), &id),
            PathBuf::from(
                "/tmp/p/.qdg/tasks/task_1700000000000_abc12345/task_1700000000000_abc12345_dimension.md"
            )
        );
    }
}
