//! Line-delimited JSON-RPC 2.0 over stdin/stdout.

use super::server::McpServer;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(json!({ "code": code, "message": message.into() })),
        }
    }
}

/// Serve requests until the reader reaches EOF. Calls are handled one at a
/// time, in arrival order.
pub async fn serve<R, W>(server: &McpServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_message(server, &line).await {
            let mut text = serde_json::to_string(&response)?;
            text.push('\n');
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    tracing::info!("Input closed, stopping MCP server");
    Ok(())
}

/// Handle one JSON-RPC message. Notifications produce no response.
pub async fn handle_message(server: &McpServer, line: &str) -> Option<Value> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable JSON-RPC message");
            let response = JsonRpcResponse::error(Value::Null, -32700, format!("Parse error: {}", e));
            return serde_json::to_value(response).ok();
        }
    };

    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "Ignoring notification");
        return None;
    };

    tracing::debug!(method = %request.method, "Handling request");
    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "xcpilot",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),
        "ping" => JsonRpcResponse::result(id, json!({})),
        "tools/list" => JsonRpcResponse::result(id, json!({ "tools": server.tool_schemas() })),
        "tools/call" => call_tool(server, id, request.params).await,
        other => JsonRpcResponse::error(id, -32601, format!("Method not found: {}", other)),
    };
    serde_json::to_value(response).ok()
}

async fn call_tool(server: &McpServer, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let Some(name) = params
        .as_ref()
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    else {
        return JsonRpcResponse::error(id, -32602, "Invalid params: missing tool 'name'");
    };
    let arguments = params
        .as_ref()
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    match server.call_tool(name, arguments).await {
        Ok(result) => {
            let is_error = !result.get("ok").and_then(Value::as_bool).unwrap_or(true);
            let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
            JsonRpcResponse::result(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": is_error
                }),
            )
        }
        Err(e) => {
            tracing::warn!(tool = %name, error = %e, "Tool call failed");
            JsonRpcResponse::error(id, -32603, format!("Tool execution error: {}", e))
        }
    }
}
