use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::analysis::TaskAnalysis;
use crate::config::{load_settings, Settings};
use crate::identity::{derive_task_id, sanitize_name, TaskId, TaskIdError};
use crate::prompts::{render_dimension_prompt, DimensionPromptInput, TimeContext};
use crate::record::find_existing_task;
use crate::store::{initialize_store, StoreLayout};

/// Everything stage two hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionPlan {
    pub task_id: TaskId,
    pub task_name: String,
    pub file_name_stem: String,
    pub fingerprint: String,
    /// A stored task with the same fingerprint, if any. Advisory only.
    pub existing_task_id: Option<TaskId>,
    pub settings: Settings,
    pub store: StoreLayout,
    pub prompt: String,
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fingerprints the analysis, looks for an earlier record, mints a fresh task id, makes sure
/// the store exists and renders the dimension prompt with the current settings.
pub fn plan_dimensions(
    project: &Path,
    analysis: &TaskAnalysis,
    timestamp_millis: i64,
    time: &TimeContext,
) -> Result<DimensionPlan, TaskIdError> {
    let fingerprint = analysis.fingerprint();
    let existing_task_id = find_existing_task(project, &fingerprint);
    if let Some(existing) = &existing_task_id {
        tracing::info!(%existing, %fingerprint, "found stored task with same content");
    }
    let task_id = derive_task_id(timestamp_millis, &fingerprint)?;
    let store = initialize_store(project);
    let settings = load_settings(project);
    let prompt = render_dimension_prompt(&DimensionPromptInput {
        analysis,
        time,
        settings,
        task_id: Some(&task_id),
    });
    Ok(DimensionPlan {
        file_name_stem: format!("{}_{}", task_id, sanitize_name(&analysis.task_name)),
        task_name: analysis.task_name.clone(),
        task_id,
        fingerprint,
        existing_task_id,
        settings,
        store,
        prompt,
    })
}
