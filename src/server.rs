//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 as the Model Context Protocol defines it, over stdio
//! here and over HTTP in the SSE transport. Every `tools/call` runs as its own
//! task, so a slow query never blocks unrelated calls; responses are written
//! in completion order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{rpc_codes, McpError, Result};
use crate::session::McpSession;
use crate::tools::ToolRegistry;

/// MCP protocol version we support.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server information.
const SERVER_NAME: &str = "mongo-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Responses buffered ahead of the writer.
const RESPONSE_BUFFER: usize = 64;

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
}

/// In-flight tool calls by request id.
///
/// Each registration gets a ticket; a finishing call removes its entry only
/// while the ticket still matches, so a reused id keeps the newer call
/// cancellable.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    calls: Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>,
    next_ticket: Arc<AtomicU64>,
}

impl InFlight {
    async fn register(&self, key: String, token: CancellationToken) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if self.calls.lock().await.insert(key.clone(), (ticket, token)).is_some() {
            tracing::debug!(request_id = %key, "request id reused while in flight");
        }
        ticket
    }

    async fn finish(&self, key: &str, ticket: u64) {
        let mut calls = self.calls.lock().await;
        if calls.get(key).is_some_and(|(current, _)| *current == ticket) {
            calls.remove(key);
        }
    }

    async fn cancel(&self, key: &str) -> bool {
        match self.calls.lock().await.get(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// One client connection: where its responses go and which of its calls
/// are still running.
#[derive(Clone)]
pub(crate) struct Connection {
    tx: mpsc::Sender<JsonRpcResponse>,
    in_flight: InFlight,
}

impl Connection {
    pub(crate) fn new(tx: mpsc::Sender<JsonRpcResponse>) -> Self {
        Self {
            tx,
            in_flight: InFlight::default(),
        }
    }

    /// Queue a response; false once the client is gone.
    pub(crate) async fn send(&self, response: JsonRpcResponse) -> bool {
        self.tx.send(response).await.is_ok()
    }
}

/// A parsed `tools/call`.
struct ToolCall {
    id: Option<JsonValue>,
    name: String,
    arguments: Map<String, JsonValue>,
}

/// MCP server.
pub struct McpServer {
    session: McpSession,
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create a new MCP server with the given session.
    pub fn new(session: McpSession) -> Self {
        Self {
            session,
            registry: Arc::new(ToolRegistry::new()),
        }
    }

    /// Run the server, reading from stdin and writing to stdout.
    pub async fn run(&self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, writing responses to `writer`.
    ///
    /// Returns at end of input once every in-flight call has answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let writer_task = tokio::spawn(write_responses(rx, writer));
        let conn = Connection::new(tx);

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_message(&line, &conn).await {
                if !conn.send(response).await {
                    break;
                }
            }
        }

        // Spawned calls hold their own senders; the writer drains until they finish.
        drop(conn);
        writer_task
            .await
            .map_err(|e| McpError::Io(format!("response writer failed: {}", e)))?
    }

    /// Handle one raw JSON-RPC message from `conn`.
    ///
    /// Returns the immediate response, if any. Tool calls answer later
    /// through the connection from their own task.
    pub(crate) async fn handle_message(
        &self,
        text: &str,
        conn: &Connection,
    ) -> Option<JsonRpcResponse> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcRequest>(text) {
            Ok(request) => self.handle_request(request, conn).await,
            Err(e) => Some(JsonRpcResponse::error(
                None,
                rpc_codes::PARSE_ERROR,
                format!("Parse error: {}", e),
            )),
        }
    }

    /// Handle a single JSON-RPC request.
    ///
    /// Returns `None` for notifications and for tool calls.
    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        conn: &Connection,
    ) -> Option<JsonRpcResponse> {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            ));
        }

        // Route to appropriate handler
        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request)),
            "notifications/initialized" | "initialized" => {
                tracing::debug!("client initialized");
                None
            }
            "notifications/cancelled" => {
                handle_cancelled(request, conn).await;
                None
            }
            "tools/list" => Some(self.handle_tools_list(request)),
            "tools/call" => match parse_tool_call(request) {
                Ok(call) => {
                    self.spawn_tool_call(call, conn.clone()).await;
                    None
                }
                Err(response) => Some(response),
            },
            "ping" => Some(JsonRpcResponse::success(request.id, serde_json::json!({}))),
            _ if request.id.is_none() => {
                tracing::debug!(method = %request.method, "ignoring notification");
                None
            }
            _ => Some(JsonRpcResponse::error(
                request.id,
                rpc_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        }
    }

    /// Handle the initialize request.
    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<JsonValue> = self
            .registry
            .tools()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema()
                })
            })
            .collect();

        JsonRpcResponse::success(request.id, serde_json::json!({ "tools": tools }))
    }

    /// Run a tool call on its own task.
    async fn spawn_tool_call(&self, call: ToolCall, conn: Connection) {
        let session = self.session.clone();
        let registry = Arc::clone(&self.registry);

        let ctx = session.call_context();
        let key = call.id.as_ref().map(request_key);
        let ticket = match &key {
            Some(key) => Some(
                conn.in_flight
                    .register(key.clone(), ctx.cancel_token().clone())
                    .await,
            ),
            None => None,
        };

        tokio::spawn(async move {
            let response = match registry
                .call(&session, &ctx, &call.name, call.arguments)
                .await
            {
                Ok(result) => JsonRpcResponse::success(call.id, result.to_json()),
                Err(err) => JsonRpcResponse::from_error(call.id, err),
            };

            if let (Some(key), Some(ticket)) = (key, ticket) {
                conn.in_flight.finish(&key, ticket).await;
            }
            if !conn.send(response).await {
                tracing::warn!(tool = %call.name, "response dropped, client gone");
            }
        });
    }
}

/// Cancel the in-flight call named by `params.requestId`.
async fn handle_cancelled(request: JsonRpcRequest, conn: &Connection) {
    let Some(request_id) = request
        .params
        .as_ref()
        .and_then(|p| p.get("requestId"))
        .map(request_key)
    else {
        return;
    };

    if conn.in_flight.cancel(&request_id).await {
        tracing::debug!(request_id = %request_id, "cancelled tool call");
    }
}

/// Stable key for a JSON-RPC id, which may be a number or a string.
fn request_key(id: &JsonValue) -> String {
    id.to_string()
}

/// Extract name and arguments from a tools/call request.
fn parse_tool_call(request: JsonRpcRequest) -> std::result::Result<ToolCall, JsonRpcResponse> {
    let params = match request.params {
        Some(JsonValue::Object(obj)) => obj,
        _ => {
            return Err(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_PARAMS,
                "Missing params object".to_string(),
            ))
        }
    };

    let name = match params.get("name").and_then(|v| v.as_str()) {
        Some(n) => n.to_string(),
        None => {
            return Err(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_PARAMS,
                "Missing 'name' in params".to_string(),
            ))
        }
    };

    let arguments = match params.get("arguments") {
        Some(JsonValue::Object(obj)) => obj.clone(),
        Some(JsonValue::Null) | None => Map::new(),
        _ => {
            return Err(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_PARAMS,
                "'arguments' must be an object".to_string(),
            ))
        }
    };

    Ok(ToolCall {
        id: request.id,
        name,
        arguments,
    })
}

/// Write responses as they arrive, one JSON document per line.
async fn write_responses<W>(mut rx: mpsc::Receiver<JsonRpcResponse>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(JsonValue::Number(1.into())), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_json_rpc_response_error() {
        let response = JsonRpcResponse::error(Some(JsonValue::Number(1.into())), -32600, "Invalid".to_string());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_parse_tool_call_rejects_bad_arguments() {
        let request: JsonRpcRequest = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "Find", "arguments": [1, 2]}
        }))
        .unwrap();
        let response = parse_tool_call(request).err().unwrap();
        assert_eq!(response.error.unwrap().code, rpc_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_reused_request_id_stays_cancellable() {
        let in_flight = InFlight::default();
        let first = CancellationToken::new();
        let second = CancellationToken::new();

        let first_ticket = in_flight.register("1".to_string(), first.clone()).await;
        in_flight.register("1".to_string(), second.clone()).await;

        // The first call finishing must not evict the second.
        in_flight.finish("1", first_ticket).await;
        assert!(in_flight.cancel("1").await);
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
    }

    #[tokio::test]
    async fn test_finished_call_is_no_longer_cancellable() {
        let in_flight = InFlight::default();
        let ticket = in_flight.register("\"a\"".to_string(), CancellationToken::new()).await;
        in_flight.finish("\"a\"", ticket).await;
        assert!(!in_flight.cancel("\"a\"").await);
    }

    #[tokio::test]
    async fn test_blank_and_malformed_messages() {
        let server = McpServer::new(McpSession::new(Arc::new(crate::store::MemoryStore::new())));
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(tx);

        assert!(server.handle_message("   ", &conn).await.is_none());
        let response = server.handle_message("{oops", &conn).await.unwrap();
        assert_eq!(response.error.unwrap().code, rpc_codes::PARSE_ERROR);
    }

    #[test]
    fn test_request_key_distinguishes_types() {
        assert_ne!(
            request_key(&serde_json::json!(1)),
            request_key(&serde_json::json!("1"))
        );
    }
}
