use tempfile::TempDir;

use rust_mcp_sdk::schema::{
    CallToolRequestParams, ClientCapabilities, Implementation, InitializeRequestParams,
    LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{
    mcp_client::{client_runtime, ClientHandler, McpClientOptions},
    McpClient, StdioTransport, ToMcpClientHandler, TransportOptions,
};

use async_trait::async_trait;

struct NoopClientHandler;

#[async_trait]
impl ClientHandler for NoopClientHandler {}

fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "qdg-mcp-test".into(),
            version: "0.1.0".into(),
            title: Some("QDG MCP Test".into()),
            description: Some("Integration test client".into()),
            icons: vec![],
            website_url: None,
        },
        protocol_version: LATEST_PROTOCOL_VERSION.into(),
        meta: None,
    }
}

// Runs a tool call and returns the first text block.
macro_rules! call {
    ($client:expr, $name:expr, $args:expr $(,)?) => {{
        let result = $client
            .request_tool_call(CallToolRequestParams {
                name: $name.to_string(),
                arguments: Some($args.as_object().unwrap().clone()),
                meta: None,
                task: None,
            })
            .await
            .expect($name);
        result
            .content
            .first()
            .unwrap()
            .as_text_content()
            .unwrap()
            .text
            .clone()
    }};
}

macro_rules! call_json {
    ($client:expr, $name:expr, $args:expr $(,)?) => {{
        let text = call!($client, $name, $args);
        serde_json::from_str::<serde_json::Value>(&text).expect("json payload")
    }};
}

#[tokio::test]
async fn mcp_full_dimension_workflow() {
    let temp = TempDir::new().expect("tempdir");
    let project = temp.path().display().to_string();

    let server_bin = env!("CARGO_BIN_EXE_qdg-mcp");
    let transport = StdioTransport::create_with_server_launch(
        server_bin,
        vec![],
        None,
        TransportOptions::default(),
    )
    .expect("transport");

    let client = client_runtime::create_client(McpClientOptions {
        client_details: client_details(),
        transport,
        handler: NoopClientHandler.to_mcp_client_handler(),
        task_store: None,
        server_task_store: None,
    });

    client.clone().start().await.expect("start client");

    let version = call!(client, "version", serde_json::json!({}));
    assert!(version.contains("qdg-mcp"));

    let init = call_json!(client, "init_store", serde_json::json!({"project_path": project}));
    assert_eq!(init["ok"], true);
    assert!(temp.path().join(".qdg/config/qdg.config.json").is_file());

    let updated = call_json!(
        client,
        "update_settings",
        serde_json::json!({"project_path": project, "dimension_count": 6}),
    );
    assert_eq!(updated["settings"]["dimensionCount"], 6);

    let rejected = call_json!(
        client,
        "update_settings",
        serde_json::json!({"project_path": project, "expected_score": 11.0}),
    );
    assert_eq!(rejected["error"], "Invalid settings");

    let settings = call_json!(client, "get_settings", serde_json::json!({"project_path": project}));
    assert_eq!(settings["settings"]["dimensionCount"], 6);
    assert_eq!(settings["settings"]["expectedScore"], 8.0);

    let prompt = call!(
        client,
        "analyze_task",
        serde_json::json!({"user_message": "Draft the Q4 launch email"}),
    );
    assert!(prompt.contains("Draft the Q4 launch email"));

    let analysis = serde_json::json!({
        "coreTask": "Draft the Q4 launch email",
        "taskName": "Launch Email",
        "taskType": "writing",
        "complexity": 2,
        "domain": "marketing",
        "keyElements": ["subject line", "call to action"],
        "objectives": ["drive signups"]
    })
    .to_string();

    let plan = call_json!(
        client,
        "generate_dimensions",
        serde_json::json!({"project_path": project, "task_analysis": analysis}),
    );
    let task_id = plan["task_id"].as_str().expect("task_id").to_string();
    assert!(task_id.starts_with("task_"));
    assert!(plan["prompt"].as_str().unwrap().contains("exactly 6 numbered dimensions"));

    let saved = call_json!(
        client,
        "save_task_record",
        serde_json::json!({
            "project_path": project,
            "task_id": task_id,
            "task_name": "Launch Email",
            "refined_description": "## Task\nWrite the launch email.",
            "dimensions": "## Dimensions\n1. Clarity",
        }),
    );
    assert_eq!(saved["ok"], true);
    assert!(temp
        .path()
        .join(format!(".qdg/tasks/{}_Launch_Email.md", task_id))
        .is_file());

    let found = call_json!(
        client,
        "find_task",
        serde_json::json!({"project_path": project, "task_analysis": analysis}),
    );
    assert_eq!(found["task_id"], serde_json::json!(task_id));

    let listed = call!(
        client,
        "list_tasks",
        serde_json::json!({"project_path": project, "format": "text"}),
    );
    assert!(listed.contains(&task_id));

    let shown = call!(
        client,
        "show_task",
        serde_json::json!({"project_path": project, "task_id": task_id}),
    );
    assert!(shown.contains("Write the launch email."));
    assert!(shown.contains("## Scoring Guide"));

    client.shut_down().await.expect("shutdown");
}
