//! MCP server over stdio.
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout and exposes the
//! tools from [`crate::tools`]. Requests are handled one at a time, in the
//! order they arrive. Logging goes to stderr, so stdout carries protocol
//! messages only.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::registry::RegistryBackend;
use crate::tools::{tool_specs, Dispatcher};

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Serve MCP requests from stdin until it closes.
pub async fn serve<B: RegistryBackend>(mut dispatcher: Dispatcher<B>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("scriptbook MCP server running on stdio");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_line(&mut dispatcher, &line).await {
            stdout.write_all(response.to_string().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Handle one JSON-RPC message. Returns the response to write, or `None` for
/// notifications.
pub async fn handle_line<B: RegistryBackend>(
    dispatcher: &mut Dispatcher<B>,
    line: &str,
) -> Option<Value> {
    let message: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable message");
            return Some(error_response(Value::Null, PARSE_ERROR, &format!("Parse error: {e}")));
        }
    };

    let Some(method) = message.get("method").and_then(Value::as_str) else {
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        return Some(error_response(id, INVALID_REQUEST, "Missing method"));
    };
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    // No id means notification: act on it, never answer.
    let Some(id) = message.get("id").cloned() else {
        debug!(method = %method, "notification");
        return None;
    };

    debug!(method = %method, "request");
    let outcome = match method {
        "initialize" => Ok(initialize_result(&params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_specs() })),
        "tools/call" => call_tool(dispatcher, params).await,
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
    };

    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => error_response(id, code, &message),
    })
}

fn initialize_result(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "scriptbook",
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

async fn call_tool<B: RegistryBackend>(
    dispatcher: &mut Dispatcher<B>,
    params: Value,
) -> Result<Value, (i64, String)> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or((INVALID_PARAMS, "Missing tool name".to_string()))?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let (text, is_error) = dispatcher.call_text(name, arguments).await;
    Ok(json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    }))
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
