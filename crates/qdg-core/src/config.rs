use std::fs::{self, OpenOptions};
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{config_dir, config_path};
use crate::lock::ProjectLock;

pub const DEFAULT_DIMENSION_COUNT: u32 = 5;
pub const DEFAULT_EXPECTED_SCORE: f64 = 8.0;
pub const DIMENSION_COUNT_RANGE: RangeInclusive<i64> = 1..=10;
pub const EXPECTED_SCORE_RANGE: RangeInclusive<f64> = 0.0..=10.0;

const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid settings: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Number of evaluation dimensions the LLM is asked to produce.
    pub dimension_count: u32,
    /// Score (0-10) the task output is expected to reach.
    pub expected_score: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dimension_count: DEFAULT_DIMENSION_COUNT,
            expected_score: DEFAULT_EXPECTED_SCORE,
        }
    }
}

/// Partial settings as supplied by a caller or read from disk. Wide types so that
/// out-of-range input can be reported instead of failing to deserialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_score: Option<f64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.dimension_count.is_none() && self.expected_score.is_none()
    }
}

impl From<Settings> for SettingsPatch {
    fn from(settings: Settings) -> Self {
        Self {
            dimension_count: Some(i64::from(settings.dimension_count)),
            expected_score: Some(settings.expected_score),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default = "default_config_version")]
    version: u32,
    #[serde(default)]
    settings: SettingsPatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn dimension_count_error(value: i64) -> Option<String> {
    if DIMENSION_COUNT_RANGE.contains(&value) {
        return None;
    }
    Some(format!(
        "dimensionCount must be between {} and {} (got {})",
        DIMENSION_COUNT_RANGE.start(),
        DIMENSION_COUNT_RANGE.end(),
        value
    ))
}

// The upper bound applies to the whole-point part: 10.5 passes, 11 does not.
fn expected_score_error(value: f64) -> Option<String> {
    if value >= *EXPECTED_SCORE_RANGE.start() && value.trunc() <= *EXPECTED_SCORE_RANGE.end() {
        return None;
    }
    Some(format!(
        "expectedScore must be between {} and {} (got {})",
        EXPECTED_SCORE_RANGE.start(),
        EXPECTED_SCORE_RANGE.end(),
        value
    ))
}

/// Range-checks a partial settings value without touching disk.
pub fn validate_settings(patch: &SettingsPatch) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(error) = patch.dimension_count.and_then(dimension_count_error) {
        errors.push(error);
    }
    if let Some(error) = patch.expected_score.and_then(expected_score_error) {
        errors.push(error);
    }
    errors
}

impl Settings {
    /// Field-by-field merge. Invalid fields are skipped and keep the current value.
    pub fn merged(self, patch: &SettingsPatch) -> Settings {
        let mut merged = self;
        if let Some(value) = patch.dimension_count {
            match dimension_count_error(value) {
                None => merged.dimension_count = value as u32,
                Some(error) => tracing::warn!("ignoring stored setting: {error}"),
            }
        }
        if let Some(value) = patch.expected_score {
            match expected_score_error(value) {
                None => merged.expected_score = value,
                Some(error) => tracing::warn!("ignoring stored setting: {error}"),
            }
        }
        merged
    }
}

fn read_config_file(path: &Path) -> Option<ConfigFile> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to read settings, using defaults: {err}");
            return None;
        }
    };
    match serde_json::from_str::<ConfigFile>(&text) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), "invalid settings JSON, using defaults: {err}");
            None
        }
    }
}

/// Reads the project settings. Missing, unreadable or corrupt config yields the defaults.
pub fn load_settings(project: &Path) -> Settings {
    read_config_file(&config_path(project))
        .map(|config| Settings::default().merged(&config.settings))
        .unwrap_or_default()
}

fn config_document(settings: Settings) -> Result<String, serde_json::Error> {
    let config = ConfigFile {
        version: CONFIG_VERSION,
        settings: settings.into(),
        updated_at: Some(Utc::now().to_rfc3339()),
    };
    let mut body = serde_json::to_string_pretty(&config)?;
    body.push('\n');
    Ok(body)
}

/// Writes the default settings document unless one already exists. Returns whether it wrote.
///
/// Uses `create_new`, so an existing document is never replaced even when two initializers race.
pub fn write_default_config(project: &Path) -> Result<bool, ConfigError> {
    let path = config_path(project);
    let body = config_document(Settings::default())?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    file.write_all(body.as_bytes())?;
    tracing::debug!(path = %path.display(), "wrote default settings");
    Ok(true)
}

/// Validates, merges into the stored settings and persists. Returns the merged settings.
pub fn save_settings(project: &Path, patch: &SettingsPatch) -> Result<Settings, ConfigError> {
    let errors = validate_settings(patch);
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    let _lock = ProjectLock::acquire(project)?;
    let merged = load_settings(project).merged(patch);
    fs::create_dir_all(config_dir(project))?;
    let path = write_settings(project, merged)?;
    tracing::info!(path = %path.display(), ?merged, "saved settings");
    Ok(merged)
}

// Temp file plus rename, so a failed write never leaves a truncated settings document.
fn write_settings(project: &Path, settings: Settings) -> Result<PathBuf, ConfigError> {
    let path = config_path(project);
    let tmp = path.with_extension("json.tmp");
    let body = config_document(settings)?;
    if let Err(err) = fs::write(&tmp, body).and_then(|()| fs::rename(&tmp, &path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(path)
}

pub fn set_dimension_count(project: &Path, value: i64) -> Result<Settings, ConfigError> {
    save_settings(
        project,
        &SettingsPatch {
            dimension_count: Some(value),
            expected_score: None,
        },
    )
}

pub fn set_expected_score(project: &Path, value: f64) -> Result<Settings, ConfigError> {
    save_settings(
        project,
        &SettingsPatch {
            dimension_count: None,
            expected_score: Some(value),
        },
    )
}
