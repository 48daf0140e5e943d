//! C11: JSON-RPC 2.0 dispatcher for `POST /api/mcp`, protected by C6's
//! access-token middleware.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth_context::{AccessAuth, AuthContext};
use crate::state::AppState;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "casfa-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct Envelope {
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Value,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

fn error_response(id: Value, code: i64, message: impl Into<String>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": RpcError { code, message: message.into() },
    }))
}

fn result_response(id: Value, result: Value) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
}

/// A callable MCP tool. Tool bodies live outside this crate (spec §1
/// "the MCP tool handlers themselves" is out of scope); this trait is
/// the seam a deployment plugs them into.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn call(&self, auth: &AuthContext, arguments: Value) -> Result<Value, String>;
}

/// Static registry of tools available to `tools/list` and `tools/call`.
/// Empty by default - a deployment populates it at startup with its
/// own `Tool` implementations.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    fn descriptors(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| json!({"name": t.name(), "description": t.description(), "inputSchema": t.input_schema()}))
            .collect()
    }
}

/// `POST /api/mcp`. Parses raw bytes itself (rather than via `Json<T>`)
/// so a malformed body produces a JSON-RPC `-32700` error body instead
/// of axum's default rejection response.
pub async fn dispatch(State(state): State<Arc<AppState>>, AccessAuth(auth): AccessAuth, body: Bytes) -> Json<Value> {
    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(_) => return error_response(Value::Null, PARSE_ERROR, "invalid JSON"),
    };

    if envelope.jsonrpc.as_deref() != Some("2.0") {
        return error_response(envelope.id, INVALID_REQUEST, "jsonrpc must be \"2.0\"");
    }
    let Some(method) = envelope.method else {
        return error_response(envelope.id, INVALID_REQUEST, "method is required");
    };

    match method.as_str() {
        "initialize" => result_response(
            envelope.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
            }),
        ),
        "tools/list" => result_response(envelope.id, json!({"tools": state.tools.descriptors()})),
        "tools/call" => handle_tools_call(&state, &auth, envelope.id, envelope.params).await,
        _ => error_response(envelope.id, METHOD_NOT_FOUND, format!("unknown method: {method}")),
    }
}

async fn handle_tools_call(state: &AppState, auth: &AuthContext, id: Value, params: Value) -> Json<Value> {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return error_response(id, INVALID_PARAMS, "params.name is required");
    };
    let Some(tool) = state.tools.get(name) else {
        return error_response(id, METHOD_NOT_FOUND, format!("unknown tool: {name}"));
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match tool.call(auth, arguments).await {
        Ok(result) => result_response(id, result),
        Err(message) => error_response(id, INVALID_PARAMS, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.descriptors().is_empty());
        assert!(registry.get("anything").is_none());
    }

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments back"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn call(&self, _auth: &AuthContext, arguments: Value) -> Result<Value, String> {
            Ok(arguments)
        }
    }

    #[test]
    fn registered_tool_is_listed_and_reachable() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.descriptors().len(), 1);
        assert!(registry.get("echo").is_some());
    }
}
