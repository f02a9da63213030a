use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{Connector, ThingsError};
use rmcp::model::*;

/// MCP server over a single connector. Tool names are passed through
/// unprefixed.
pub struct McpServer {
    connector: Arc<dyn Connector>,
}

impl McpServer {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        info!(
            target: "things::mcp",
            connector = connector.name(),
            description = connector.description(),
            "serving connector"
        );
        Self { connector }
    }

    pub async fn handle_initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ThingsError> {
        info!(
            target: "things::mcp",
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            "initializing"
        );
        self.connector.initialize(request).await
    }

    pub async fn handle_list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ThingsError> {
        self.connector.list_tools(request).await
    }

    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ThingsError> {
        let tool = request.name.to_string();
        let result = self.connector.call_tool(request).await;
        match &result {
            Ok(r) if r.is_error == Some(true) => {
                debug!(target: "things::mcp", tool = %tool, "tool returned an error result")
            }
            Ok(_) => debug!(target: "things::mcp", tool = %tool, "tool succeeded"),
            Err(e) => warn!(target: "things::mcp", tool = %tool, error = %e, "tool call rejected"),
        }
        result
    }
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process one JSON-RPC message. Notifications (no `id`) get `None`.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        let id = match request.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
                debug!(target: "things::mcp", method, "notification");
                return None;
            }
        };
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(json!({}));
        debug!(target: "things::mcp", method, "request");

        let result = match method {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => to_json(self.server.handle_initialize(req).await),
                Err(e) => Err(ThingsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "ping" => Ok(json!({})),
            "tools/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => to_json(self.server.handle_list_tools(req).await),
                Err(e) => Err(ThingsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => to_json(self.server.handle_call_tool(req).await),
                Err(e) => Err(ThingsError::SerdeJson(e).to_jsonrpc_error()),
            },
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(ThingsError::MethodNotFound.to_jsonrpc_error()),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}

fn to_json<T: serde::Serialize>(result: Result<T, ThingsError>) -> Result<Value, Value> {
    result
        .and_then(|r| serde_json::to_value(r).map_err(ThingsError::SerdeJson))
        .map_err(|e| e.to_jsonrpc_error())
}
