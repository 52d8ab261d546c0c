use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::identity::{task_fingerprint, TaskFields};

pub const COMPLEXITY_MIN: i64 = 1;
pub const COMPLEXITY_MAX: i64 = 5;
pub const TASK_NAME_MIN_CHARS: usize = 3;
pub const TASK_NAME_MAX_CHARS: usize = 15;

const REQUIRED_TEXT_FIELDS: [&str; 4] = ["coreTask", "taskName", "taskType", "domain"];

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Task analysis is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid task analysis: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Structured task description the LLM returns for the analysis prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnalysis {
    pub core_task: String,
    pub task_name: String,
    pub task_type: String,
    pub complexity: u8,
    pub domain: String,
    #[serde(default)]
    pub key_elements: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
}

impl TaskAnalysis {
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            core_task: self.core_task.clone(),
            task_type: self.task_type.clone(),
            domain: self.domain.clone(),
            key_elements: Some(self.key_elements.clone()),
            objectives: Some(self.objectives.clone()),
        }
    }

    pub fn fingerprint(&self) -> String {
        task_fingerprint(&self.fields())
    }
}

/// Removes a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn check_string_list(value: &Value, field: &str, errors: &mut Vec<String>) {
    match value.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            if items.iter().any(|item| !item.is_string()) {
                errors.push(format!("{field} must contain only strings"));
            }
        }
        Some(_) => errors.push(format!("{field} must be an array of strings")),
    }
}

/// Checks a decoded JSON value against the TaskAnalysis shape and collects every problem.
pub fn validate_task_analysis(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if !value.is_object() {
        errors.push("task analysis must be a JSON object".to_string());
        return errors;
    }

    for field in REQUIRED_TEXT_FIELDS {
        match value.get(field) {
            None | Some(Value::Null) => errors.push(format!("missing required field: {field}")),
            Some(Value::String(text)) if text.trim().is_empty() => {
                errors.push(format!("{field} must not be empty"))
            }
            Some(Value::String(_)) => {}
            Some(_) => errors.push(format!("{field} must be a string")),
        }
    }

    if let Some(name) = value.get("taskName").and_then(Value::as_str) {
        let chars = name.trim().chars().count();
        if chars > 0 && !(TASK_NAME_MIN_CHARS..=TASK_NAME_MAX_CHARS).contains(&chars) {
            errors.push(format!(
                "taskName must be {TASK_NAME_MIN_CHARS}-{TASK_NAME_MAX_CHARS} characters (got {chars})"
            ));
        }
    }

    match value.get("complexity") {
        None | Some(Value::Null) => errors.push("missing required field: complexity".to_string()),
        Some(raw) => match raw.as_i64() {
            Some(level) if (COMPLEXITY_MIN..=COMPLEXITY_MAX).contains(&level) => {}
            Some(level) => errors.push(format!(
                "complexity must be between {COMPLEXITY_MIN} and {COMPLEXITY_MAX} (got {level})"
            )),
            None => errors.push(format!(
                "complexity must be an integer between {COMPLEXITY_MIN} and {COMPLEXITY_MAX}"
            )),
        },
    }

    check_string_list(value, "keyElements", &mut errors);
    check_string_list(value, "objectives", &mut errors);
    errors
}

/// Turns a validated JSON value into a typed TaskAnalysis with trimmed text fields.
pub fn task_analysis_from_value(mut value: Value) -> Result<TaskAnalysis, AnalysisError> {
    let errors = validate_task_analysis(&value);
    if !errors.is_empty() {
        return Err(AnalysisError::Invalid(errors));
    }
    if let Some(object) = value.as_object_mut() {
        object.retain(|key, field| {
            !(field.is_null() && (key == "keyElements" || key == "objectives"))
        });
    }
    let mut analysis: TaskAnalysis = serde_json::from_value(value)?;
    analysis.core_task = analysis.core_task.trim().to_string();
    analysis.task_name = analysis.task_name.trim().to_string();
    analysis.task_type = analysis.task_type.trim().to_string();
    analysis.domain = analysis.domain.trim().to_string();
    Ok(analysis)
}

/// Parses the raw LLM response (optionally fenced) into a TaskAnalysis.
pub fn parse_task_analysis(raw: &str) -> Result<TaskAnalysis, AnalysisError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))?;
    task_analysis_from_value(value)
}
