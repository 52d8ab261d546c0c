mod tools;
mod version;

use std::path::PathBuf;

use clap::Parser;
use rust_mcp_sdk::error::SdkResult;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ProtocolVersion, ServerCapabilities, ServerCapabilitiesTools,
};
use rust_mcp_sdk::{
    mcp_server::{server_runtime, McpServerOptions},
    McpServer, StdioTransport, ToMcpServerHandler, TransportOptions,
};
use tracing_subscriber::EnvFilter;

use qdg_core::environment::Environment;

use crate::tools::{McpContext, QdgServerHandler};

#[derive(Parser)]
#[command(name = "qdg-mcp", version = version::FULL)]
struct Args {
    /// Default project directory for tool calls that omit `project_path`.
    #[arg(long)]
    project: Option<PathBuf>,
}

// Stdout carries the MCP protocol, so logs go to stderr.
fn init_logging() {
    let filter = std::env::var("QDG_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[tokio::main]
async fn main() -> SdkResult<()> {
    let args = Args::parse();
    init_logging();

    let server_details = InitializeResult {
        server_info: Implementation {
            name: "qdg".into(),
            version: version::FULL.into(),
            title: Some("QDG MCP Server".into()),
            description: Some(
                "Turns a task request into a refined description with scored evaluation dimensions"
                    .into(),
            ),
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Call analyze_task, then generate_dimensions, then save_task_record. See the help tool."
                .into(),
        ),
        protocol_version: ProtocolVersion::V2025_11_25.into(),
    };

    let transport = StdioTransport::new(TransportOptions::default())?;
    let handler = QdgServerHandler {
        context: McpContext {
            default_project: args.project,
            env: Environment::capture(),
        },
    };
    tracing::debug!("starting qdg-mcp {}", version::FULL);

    let server = server_runtime::create_server(McpServerOptions {
        server_details,
        transport,
        handler: handler.to_mcp_server_handler(),
        task_store: None,
        client_task_store: None,
    });

    server.start().await
}
