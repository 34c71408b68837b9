//! MCP protocol handlers: initialize, tools/list, resources/list.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Supported protocol versions, latest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2024-11-05"];

/// Initialize response payload
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: Value,
}

/// Tool descriptor for tools/list
#[derive(Debug, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Handle an initialize request, negotiating the protocol version.
pub fn handle_initialize(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    // Notifications must not produce a response
    request.id.as_ref()?;

    let requested = request
        .params
        .as_ref()
        .and_then(|params| params.get("protocolVersion").and_then(Value::as_str));

    let protocol_version = match requested {
        Some(version) if SUPPORTED_VERSIONS.contains(&version) => version.to_string(),
        Some(version) => {
            info!(
                requested = version,
                using = SUPPORTED_VERSIONS[0],
                "client requested unsupported protocol version"
            );
            SUPPORTED_VERSIONS[0].to_string()
        }
        None => SUPPORTED_VERSIONS[0].to_string(),
    };
    info!(version = %protocol_version, "negotiated protocol version");

    let result = InitializeResult {
        protocol_version,
        capabilities: json!({
            "tools": { "listChanged": false },
            "resources": {}
        }),
        server_info: json!({
            "name": "engram-mcp-server",
            "version": env!("CARGO_PKG_VERSION")
        }),
    };

    match serde_json::to_value(result) {
        Ok(value) => Some(JsonRpcResponse::success(request.id.clone(), value)),
        Err(e) => Some(JsonRpcResponse::failure(
            request.id.clone(),
            JsonRpcError::new(
                crate::jsonrpc::INTERNAL_ERROR,
                format!("response serialization failed: {e}"),
            ),
        )),
    }
}

/// Handle a tools/list request.
pub fn handle_list_tools(
    request: &JsonRpcRequest,
    tools: Vec<ToolDescriptor>,
) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    info!("handling tools/list request");
    Some(JsonRpcResponse::success(
        request.id.clone(),
        json!({ "tools": tools }),
    ))
}

/// Handle a resources/list request: one named resource per known project.
pub fn handle_list_resources(
    request: &JsonRpcRequest,
    project_ids: &[String],
) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    let resources: Vec<Value> = project_ids
        .iter()
        .map(|project_id| {
            json!({
                "uri": format!("memory://projects/{project_id}"),
                "name": format!("Memory for {project_id}"),
                "mimeType": "application/json"
            })
        })
        .collect();
    Some(JsonRpcResponse::success(
        request.id.clone(),
        json!({ "resources": resources }),
    ))
}

/// Handle a shutdown request.
pub fn handle_shutdown(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    info!("handling shutdown request");
    Some(JsonRpcResponse::success(request.id.clone(), json!(null)))
}
