use std::path::PathBuf;

use async_trait::async_trait;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{
    schema_utils::CallToolError, CallToolRequestParams, CallToolResult, ListToolsResult,
    PaginatedRequestParams, RpcError, TextContent,
};
use rust_mcp_sdk::tool_box;
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde::{Deserialize, Serialize};

use crate::version;

use qdg_core::analysis::{parse_task_analysis, AnalysisError, TaskAnalysis};
use qdg_core::config::{load_settings, save_settings, validate_settings, ConfigError, SettingsPatch};
use qdg_core::environment::{resolve_project_path, Environment};
use qdg_core::identity::{config_path, TaskId};
use qdg_core::prompts::{render_analysis_prompt, TimeContext};
use qdg_core::record::{
    find_existing_task, list_task_records, load_task_record, save_task_record, scoring_legend,
    StorageError,
};
use qdg_core::store::initialize_store;
use qdg_core::workflow::{now_millis, plan_dimensions};

#[derive(Clone)]
pub struct McpContext {
    pub default_project: Option<PathBuf>,
    pub env: Environment,
}

fn resolve_project(
    context: &McpContext,
    project_path: Option<&str>,
) -> Result<PathBuf, serde_json::Value> {
    resolve_project_path(
        &context.env,
        project_path,
        context.default_project.as_deref(),
    )
    .map_err(|err| serde_json::json!({ "error": err.to_string() }))
}

fn ok_text(content: String) -> Result<CallToolResult, CallToolError> {
    Ok(CallToolResult::text_content(vec![TextContent::from(
        content,
    )]))
}

fn ok_json(value: serde_json::Value) -> Result<CallToolResult, CallToolError> {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
    ok_text(text)
}

fn analysis_error_json(err: AnalysisError) -> serde_json::Value {
    match err {
        AnalysisError::Invalid(errors) => serde_json::json!({
            "error": "Invalid task analysis",
            "errors": errors,
        }),
        AnalysisError::Parse(err) => serde_json::json!({
            "error": format!("task_analysis is not valid JSON: {}", err),
        }),
    }
}

fn parse_optional_analysis(
    raw: Option<&str>,
) -> Result<Option<TaskAnalysis>, serde_json::Value> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_task_analysis(raw)
            .map(Some)
            .map_err(analysis_error_json),
    }
}

fn workflow_steps() -> Vec<&'static str> {
    vec![
        "1. analyze_task: send the user's request, answer the returned prompt with TaskAnalysis JSON.",
        "2. generate_dimensions: pass that JSON as task_analysis, answer the returned prompt.",
        "3. save_task_record: store the refined description and dimensions under the returned task_id.",
    ]
}

fn tool_catalog() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({"name": "version", "summary": "Return qdg version information."}),
        serde_json::json!({"name": "help", "summary": "Show the workflow and available tools."}),
        serde_json::json!({"name": "analyze_task", "summary": "Stage 1: prompt that extracts a TaskAnalysis JSON object from the conversation."}),
        serde_json::json!({"name": "generate_dimensions", "summary": "Stage 2: validate TaskAnalysis, assign a task id, return the evaluation-dimension prompt."}),
        serde_json::json!({"name": "save_task_record", "summary": "Stage 3: save refined description + dimensions to .qdg/tasks."}),
        serde_json::json!({"name": "init_store", "summary": "Create .qdg/config and .qdg/tasks with default settings."}),
        serde_json::json!({"name": "get_settings", "summary": "Show dimensionCount and expectedScore."}),
        serde_json::json!({"name": "update_settings", "summary": "Update dimensionCount (1-10) and/or expectedScore (0-10)."}),
        serde_json::json!({"name": "find_task", "summary": "Find a stored task by fingerprint or TaskAnalysis."}),
        serde_json::json!({"name": "list_tasks", "summary": "List stored task records."}),
        serde_json::json!({"name": "show_task", "summary": "Show a stored task record by id."}),
    ]
}

#[mcp_tool(name = "version", description = "Return qdg version information.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct VersionTool {
    #[serde(default = "default_format")]
    pub format: String,
}

#[mcp_tool(name = "help", description = "Show the workflow and available tools.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct HelpTool {
    #[serde(default = "default_text_format")]
    pub format: String,
}

#[mcp_tool(
    name = "analyze_task",
    description = "Stage 1: return a prompt that turns the conversation into TaskAnalysis JSON."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct AnalyzeTaskTool {
    /// Latest user message describing the task.
    pub user_message: String,
    /// Earlier conversation, as plain text.
    pub conversation_history: Option<String>,
}

#[mcp_tool(
    name = "generate_dimensions",
    description = "Stage 2: validate TaskAnalysis JSON, assign a task id and return the evaluation-dimension prompt."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GenerateDimensionsTool {
    /// TaskAnalysis JSON produced from the analyze_task prompt.
    pub task_analysis: String,
    pub project_path: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

#[mcp_tool(
    name = "save_task_record",
    description = "Stage 3: save the refined task description and evaluation dimensions for a task id."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SaveTaskRecordTool {
    pub task_id: String,
    pub task_name: String,
    pub refined_description: String,
    pub dimensions: String,
    /// Optional TaskAnalysis JSON to include as record metadata.
    pub task_analysis: Option<String>,
    pub project_path: Option<String>,
}

#[mcp_tool(
    name = "init_store",
    description = "Create the .qdg metadata directory with default settings (idempotent)."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct InitStoreTool {
    pub project_path: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

#[mcp_tool(name = "get_settings", description = "Show the project's dimension settings.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GetSettingsTool {
    pub project_path: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

#[mcp_tool(
    name = "update_settings",
    description = "Update dimension_count (1-10) and/or expected_score (0-10)."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateSettingsTool {
    pub project_path: Option<String>,
    pub dimension_count: Option<i64>,
    pub expected_score: Option<f64>,
}

#[mcp_tool(
    name = "find_task",
    description = "Find a stored task by fingerprint, or by the fingerprint of a TaskAnalysis."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct FindTaskTool {
    pub project_path: Option<String>,
    pub fingerprint: Option<String>,
    pub task_analysis: Option<String>,
}

#[mcp_tool(name = "list_tasks", description = "List stored task records.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListTasksTool {
    pub project_path: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
}

#[mcp_tool(name = "show_task", description = "Show a stored task record by id.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ShowTaskTool {
    pub task_id: String,
    pub project_path: Option<String>,
    #[serde(default = "default_text_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_text_format() -> String {
    "text".to_string()
}

// Generates enum QdgTools with variants for each tool
tool_box!(
    QdgTools,
    [
        VersionTool,
        HelpTool,
        AnalyzeTaskTool,
        GenerateDimensionsTool,
        SaveTaskRecordTool,
        InitStoreTool,
        GetSettingsTool,
        UpdateSettingsTool,
        FindTaskTool,
        ListTasksTool,
        ShowTaskTool
    ]
);

pub struct QdgServerHandler {
    pub context: McpContext,
}

#[async_trait]
impl ServerHandler for QdgServerHandler {
    async fn handle_list_tools_request(
        &self,
        _params: Option<PaginatedRequestParams>,
        _runtime: std::sync::Arc<dyn McpServer>,
    ) -> Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: QdgTools::tools(),
        })
    }

    async fn handle_call_tool_request(
        &self,
        params: CallToolRequestParams,
        _runtime: std::sync::Arc<dyn McpServer>,
    ) -> Result<CallToolResult, CallToolError> {
        let tool = QdgTools::try_from(params).map_err(CallToolError::new)?;
        match tool {
            QdgTools::VersionTool(tool) => tool.call(&self.context),
            QdgTools::HelpTool(tool) => tool.call(&self.context),
            QdgTools::AnalyzeTaskTool(tool) => tool.call(&self.context),
            QdgTools::GenerateDimensionsTool(tool) => tool.call(&self.context),
            QdgTools::SaveTaskRecordTool(tool) => tool.call(&self.context),
            QdgTools::InitStoreTool(tool) => tool.call(&self.context),
            QdgTools::GetSettingsTool(tool) => tool.call(&self.context),
            QdgTools::UpdateSettingsTool(tool) => tool.call(&self.context),
            QdgTools::FindTaskTool(tool) => tool.call(&self.context),
            QdgTools::ListTasksTool(tool) => tool.call(&self.context),
            QdgTools::ShowTaskTool(tool) => tool.call(&self.context),
        }
    }
}

impl VersionTool {
    fn call(&self, _context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if self.format == "text" {
            return ok_text(format!("qdg-mcp {}\n", version::FULL));
        }
        ok_json(serde_json::json!({
            "name": "qdg-mcp",
            "version": env!("CARGO_PKG_VERSION"),
            "full": version::FULL,
        }))
    }
}

impl HelpTool {
    fn call(&self, _context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if self.format == "json" {
            return ok_json(serde_json::json!({
                "summary": "qdg MCP help",
                "workflow": workflow_steps(),
                "tools": tool_catalog(),
                "scoring": scoring_legend(),
                "notes": [
                    "project_path is optional; it defaults to --project, then QDG_PROJECT_PATH, then the server's working directory.",
                    "Records are stored as .qdg/tasks/<task_id>_<task_name>.md and overwritten when saved again.",
                ],
            }));
        }
        let catalog = tool_catalog()
            .iter()
            .map(|tool| {
                let name = tool.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let summary = tool.get("summary").and_then(|v| v.as_str()).unwrap_or("");
                format!("- {}: {}", name, summary)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let body = format!(
            "qdg MCP help\n\nWorkflow:\n{}\n\nAvailable tools:\n{}\n\nScoring convention:\n{}",
            workflow_steps().join("\n"),
            catalog,
            scoring_legend()
        );
        ok_text(body)
    }
}

impl AnalyzeTaskTool {
    fn call(&self, _context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if self.user_message.trim().is_empty() {
            return ok_json(serde_json::json!({"error": "user_message is required"}));
        }
        ok_text(render_analysis_prompt(
            &self.user_message,
            self.conversation_history.as_deref(),
        ))
    }
}

impl GenerateDimensionsTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let analysis = match parse_task_analysis(&self.task_analysis) {
            Ok(analysis) => analysis,
            Err(err) => return ok_json(analysis_error_json(err)),
        };
        let plan = plan_dimensions(&project, &analysis, now_millis(), &TimeContext::now())
            .map_err(CallToolError::new)?;
        if self.format == "text" {
            let mut body = format!("task_id: {}\ntask_name: {}\n", plan.task_id, plan.task_name);
            if let Some(existing) = &plan.existing_task_id {
                body.push_str(&format!("existing_task_id: {}\n", existing));
            }
            body.push('\n');
            body.push_str(&plan.prompt);
            return ok_text(body);
        }
        let mut hints = Vec::new();
        if let Some(existing) = &plan.existing_task_id {
            hints.push(format!(
                "A record with the same content already exists ({}). Reuse that task_id in save_task_record to overwrite it.",
                existing
            ));
        }
        if !plan.store.failed.is_empty() {
            hints.push("Some store directories could not be created; saving may fail.".to_string());
        }
        ok_json(serde_json::json!({
            "ok": true,
            "task_id": plan.task_id,
            "task_name": plan.task_name,
            "fingerprint": plan.fingerprint,
            "existing_task_id": plan.existing_task_id,
            "settings": plan.settings,
            "prompt": plan.prompt,
            "hints": hints,
            "next_steps": [
                "Answer the prompt with a refined task description and the dimensions.",
                "Call save_task_record with task_id, task_name, refined_description and dimensions.",
            ],
        }))
    }
}

impl SaveTaskRecordTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let task_id = match TaskId::parse(&self.task_id) {
            Ok(task_id) => task_id,
            Err(err) => return ok_json(serde_json::json!({"error": err.to_string()})),
        };
        let analysis = match parse_optional_analysis(self.task_analysis.as_deref()) {
            Ok(analysis) => analysis,
            Err(err) => return ok_json(err),
        };
        let path = match save_task_record(
            &project,
            &task_id,
            &self.task_name,
            analysis.as_ref(),
            &self.refined_description,
            &self.dimensions,
        ) {
            Ok(path) => path,
            Err(StorageError::FingerprintMismatch {
                task_id,
                fingerprint,
            }) => {
                return ok_json(serde_json::json!({
                    "error": "task_analysis does not match task_id",
                    "task_id": task_id,
                    "expected_fingerprint": task_id.fingerprint(),
                    "analysis_fingerprint": fingerprint,
                }))
            }
            Err(err) => return Err(CallToolError::new(err)),
        };
        ok_json(serde_json::json!({
            "ok": true,
            "task_id": task_id,
            "path": path,
        }))
    }
}

impl InitStoreTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let layout = initialize_store(&project);
        if self.format == "text" {
            let status = if layout.is_complete() { "ok" } else { "incomplete" };
            return ok_text(format!(
                "{}: {} (created {}, existed {}, failed {})\n",
                status,
                layout.root.display(),
                layout.created.len(),
                layout.existed.len(),
                layout.failed.len()
            ));
        }
        ok_json(serde_json::json!({
            "ok": layout.is_complete(),
            "root": layout.root,
            "created": layout.created,
            "existed": layout.existed,
            "failed": layout.failed,
            "config_created": layout.config_created,
        }))
    }
}

impl GetSettingsTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let settings = load_settings(&project);
        if self.format == "text" {
            return ok_text(format!(
                "dimensionCount: {}\nexpectedScore: {}\n",
                settings.dimension_count, settings.expected_score
            ));
        }
        ok_json(serde_json::json!({
            "settings": settings,
            "path": config_path(&project),
        }))
    }
}

impl UpdateSettingsTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let patch = SettingsPatch {
            dimension_count: self.dimension_count,
            expected_score: self.expected_score,
        };
        if patch.is_empty() {
            return ok_json(serde_json::json!({
                "error": "Provide dimension_count and/or expected_score",
            }));
        }
        let errors = validate_settings(&patch);
        if !errors.is_empty() {
            return ok_json(serde_json::json!({
                "error": "Invalid settings",
                "errors": errors,
            }));
        }
        match save_settings(&project, &patch) {
            Ok(settings) => ok_json(serde_json::json!({
                "ok": true,
                "settings": settings,
            })),
            Err(ConfigError::Validation(errors)) => ok_json(serde_json::json!({
                "error": "Invalid settings",
                "errors": errors,
            })),
            Err(err) => Err(CallToolError::new(err)),
        }
    }
}

impl FindTaskTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let fingerprint = match self
            .fingerprint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(fingerprint) => fingerprint.to_string(),
            None => match parse_optional_analysis(self.task_analysis.as_deref()) {
                Ok(Some(analysis)) => analysis.fingerprint(),
                Ok(None) => {
                    return ok_json(serde_json::json!({
                        "error": "Provide fingerprint or task_analysis",
                    }))
                }
                Err(err) => return ok_json(err),
            },
        };
        let found = find_existing_task(&project, &fingerprint);
        ok_json(serde_json::json!({
            "fingerprint": fingerprint,
            "found": found.is_some(),
            "task_id": found,
        }))
    }
}

impl ListTasksTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let records = list_task_records(&project);
        if self.format == "text" {
            if records.is_empty() {
                return ok_text("No task records.\n".to_string());
            }
            let body = records
                .iter()
                .map(|record| {
                    format!(
                        "{} | {} | {}",
                        record.task_id,
                        record.task_name.as_deref().unwrap_or("(legacy)"),
                        record.path.display()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            return ok_text(body);
        }
        ok_json(serde_json::to_value(&records).map_err(CallToolError::new)?)
    }
}

impl ShowTaskTool {
    fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let project = match resolve_project(context, self.project_path.as_deref()) {
            Ok(path) => path,
            Err(err) => return ok_json(err),
        };
        let task_id = match TaskId::parse(&self.task_id) {
            Ok(task_id) => task_id,
            Err(err) => return ok_json(serde_json::json!({"error": err.to_string()})),
        };
        let Some(record) = load_task_record(&project, &task_id).map_err(CallToolError::new)?
        else {
            return ok_json(
                serde_json::json!({"error": format!("Task not found: {}", self.task_id)}),
            );
        };
        if self.format == "text" {
            return ok_text(record.content);
        }
        ok_json(serde_json::to_value(&record).map_err(CallToolError::new)?)
    }
}
