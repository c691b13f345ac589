// crates/mindscape-gateway-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: JSON-RPC 2.0 server over stdio and HTTP transports.
// Purpose: Expose the gateway dispatcher to MCP clients.
// Dependencies: mindscape-gateway-config, mindscape-gateway-core, axum, tokio
// ============================================================================

//! ## Overview
//! The server speaks MCP JSON-RPC 2.0 over stdio (`Content-Length` framing)
//! or HTTP (`POST /rpc`). Every request goes through transport auth, then
//! through [`GatewayDispatcher`], and produces one `mcp_request` audit event
//! and one metric observation. Inputs are untrusted: bodies are size-limited
//! before parsing and malformed requests get JSON-RPC errors, not panics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use mindscape_gateway_config::GatewayConfig;
use mindscape_gateway_config::ServerAuthMode;
use mindscape_gateway_config::ServerConfig;
use mindscape_gateway_config::ServerTransport;
use mindscape_gateway_core::ExternalContext;
use mindscape_gateway_core::ToolDefinition;
use mindscape_gateway_core::ToolStatus;
use mindscape_gateway_core::schema::EXTERNAL_CONTEXT_FIELD;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditEventParams;
use crate::audit::GatewayAuditSink;
use crate::audit::build_audit_sink;
use crate::auth::AuthAuditEvent;
use crate::auth::DefaultRequestAuthz;
use crate::auth::RequestAuthz;
use crate::auth::RequestContext;
use crate::backend::HttpBackendClient;
use crate::dispatcher::DispatcherOptions;
use crate::dispatcher::GatewayDispatcher;
use crate::telemetry::GatewayMethod;
use crate::telemetry::GatewayMetricEvent;
use crate::telemetry::GatewayMetrics;
use crate::telemetry::GatewayOutcome;
use crate::telemetry::NoopMetrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MCP protocol revision advertised when the client does not name one.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported by `initialize`.
const SERVER_NAME: &str = "mindscape-gateway";

/// Response used when a response cannot be serialized.
const SERIALIZATION_FAILED: &[u8] =
    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32060,"message":"serialization failed"}}"#;

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Server section of the configuration.
    server: ServerConfig,
    /// Shared request-handling state.
    state: Arc<ServerState>,
}

/// Shared state for both transports.
struct ServerState {
    /// Tool dispatcher.
    dispatcher: GatewayDispatcher,
    /// Transport auth.
    authz: Arc<dyn RequestAuthz>,
    /// Audit sink for request and auth events.
    audit: Arc<dyn GatewayAuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn GatewayMetrics>,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

impl McpServer {
    /// Builds a server, its backend client, and its dispatcher from config.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when validation or initialization fails.
    pub fn from_config(config: GatewayConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config.audit)
            .map_err(|err| McpServerError::Init(format!("audit sink: {err}")))?;
        let backend = HttpBackendClient::from_config(&config.backend)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        let options = DispatcherOptions::from_config(&config, Arc::clone(&audit))
            .map_err(|err| McpServerError::Config(err.to_string()))?;
        let dispatcher = GatewayDispatcher::new(Arc::new(backend), options);
        emit_local_only_warning(&config.server);
        Ok(Self::new(config.server, dispatcher, audit))
    }

    /// Builds a server around an existing dispatcher.
    #[must_use]
    pub fn new(
        server: ServerConfig,
        dispatcher: GatewayDispatcher,
        audit: Arc<dyn GatewayAuditSink>,
    ) -> Self {
        let state = Arc::new(ServerState {
            dispatcher,
            authz: Arc::new(DefaultRequestAuthz::from_config(&server.auth)),
            audit,
            metrics: Arc::new(NoopMetrics),
            max_body_bytes: server.max_body_bytes,
        });
        Self {
            server,
            state,
        }
    }

    /// Replaces the metrics sink.
    ///
    /// Must be called before the server starts serving.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn GatewayMetrics>) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.metrics = metrics;
        }
        self
    }

    /// Handles one raw JSON-RPC payload as if received on `context`.
    pub async fn handle_rpc(&self, context: RequestContext, bytes: &[u8]) -> RpcReply {
        handle_payload(&self.state, context, bytes).await
    }

    /// Serves requests using the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the server fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        match self.server.transport {
            ServerTransport::Stdio => serve_stdio(&self.state).await,
            ServerTransport::Http => serve_http(&self.server, self.state).await,
        }
    }
}

/// Outcome of handling one payload.
#[derive(Debug, Clone)]
pub struct RpcReply {
    /// HTTP status for the HTTP transport.
    pub status: StatusCode,
    /// Serialized JSON-RPC response, or `None` for notifications.
    pub body: Option<Vec<u8>>,
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves JSON-RPC requests over stdin/stdout until stdin closes.
async fn serve_stdio(state: &ServerState) -> Result<(), McpServerError> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = tokio::io::stdout();
    while let Some(bytes) = read_framed(&mut reader, state.max_body_bytes).await? {
        let reply = handle_payload(state, RequestContext::stdio(), &bytes).await;
        if let Some(body) = reply.body {
            write_framed(&mut writer, &body).await?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Serves JSON-RPC requests over HTTP.
async fn serve_http(server: &ServerConfig, state: Arc<ServerState>) -> Result<(), McpServerError> {
    let addr = server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
    let app = Router::new()
        .route("/rpc", post(handle_http))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| McpServerError::Transport("http bind failed".to_string()))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|_| McpServerError::Transport("http server failed".to_string()))
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let auth_header =
        headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()).map(str::to_string);
    let context = RequestContext::http(Some(peer.ip()), auth_header);
    let reply = handle_payload(&state, context, &bytes).await;
    match reply.body {
        Some(body) => (reply.status, [(CONTENT_TYPE, "application/json")], body).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

// ============================================================================
// SECTION: JSON-RPC Types
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    const fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// MCP tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Exposed tool definitions.
    tools: Vec<ToolDefinition>,
}

/// Tool call response payload.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Tool output content.
    content: Vec<ToolContent>,
    /// Structured copy of the outcome.
    #[serde(rename = "structuredContent")]
    structured_content: Value,
    /// True for failed and timed-out calls.
    #[serde(rename = "isError")]
    is_error: bool,
}

/// Tool output payloads for JSON-RPC responses.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// Text tool output.
    Text {
        /// Serialized outcome.
        text: String,
    },
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Facts about a handled request, collected for audit and metrics.
struct RequestFacts {
    /// Method classification.
    method: GatewayMethod,
    /// Called tool name.
    tool: Option<String>,
    /// Call status.
    status: Option<ToolStatus>,
    /// Caller context from the call arguments.
    external_context: Option<ExternalContext>,
}

impl RequestFacts {
    /// Facts for a request that never reached method dispatch.
    const fn invalid() -> Self {
        Self {
            method: GatewayMethod::Invalid,
            tool: None,
            status: None,
            external_context: None,
        }
    }
}

/// Authenticates, dispatches, serializes, and records one payload.
async fn handle_payload(state: &ServerState, context: RequestContext, bytes: &[u8]) -> RpcReply {
    let started = Instant::now();
    let (context, status, response, facts) = dispatch_payload(state, context, bytes).await;
    let body = response.as_ref().map(|response| {
        serde_json::to_vec(response).unwrap_or_else(|_| SERIALIZATION_FAILED.to_vec())
    });
    let error_code = response.as_ref().and_then(|response| response.error.as_ref()).map(|e| e.code);
    let call_failed = facts.status.is_some_and(ToolStatus::is_error);
    let outcome = if error_code.is_some() || call_failed {
        GatewayOutcome::Error
    } else {
        GatewayOutcome::Ok
    };
    let response_bytes = body.as_ref().map_or(0, Vec::len);
    let metric = GatewayMetricEvent {
        transport: context.transport,
        method: facts.method,
        tool: facts.tool.clone(),
        outcome,
        status: facts.status,
        error_code,
        request_bytes: bytes.len(),
        response_bytes,
    };
    state.metrics.record_request(metric.clone());
    state.metrics.record_latency(metric, started.elapsed());
    let external = facts.external_context.unwrap_or_default();
    state.audit.record_request(&GatewayAuditEvent::new(GatewayAuditEventParams {
        request_id: context.request_id.clone(),
        transport: context.transport,
        peer_ip: context.peer_ip.map(|ip| ip.to_string()),
        method: facts.method,
        tool: facts.tool,
        outcome,
        status: facts.status,
        error_code,
        request_bytes: bytes.len(),
        response_bytes,
        surface_type: external.surface_type,
        conversation_id: external.conversation_id,
    }));
    RpcReply {
        status,
        body,
    }
}

/// Parses and routes one payload.
async fn dispatch_payload(
    state: &ServerState,
    context: RequestContext,
    bytes: &[u8],
) -> (RequestContext, StatusCode, Option<JsonRpcResponse>, RequestFacts) {
    if bytes.len() > state.max_body_bytes {
        let response = JsonRpcResponse::error(Value::Null, -32070, "request body too large");
        return (context, StatusCode::PAYLOAD_TOO_LARGE, Some(response), RequestFacts::invalid());
    }
    let Ok(request) = serde_json::from_slice::<JsonRpcRequest>(bytes) else {
        let response = JsonRpcResponse::error(Value::Null, -32600, "invalid json-rpc request");
        return (context, StatusCode::BAD_REQUEST, Some(response), RequestFacts::invalid());
    };
    let context = match &request.id {
        Some(id) => context.with_request_id(id.to_string()),
        None => context,
    };
    match state.authz.authorize(&context) {
        Ok(auth) => state.audit.record_auth(&AuthAuditEvent::allowed(&context, &auth)),
        Err(err) => {
            state.audit.record_auth(&AuthAuditEvent::denied(&context, &err));
            let id = request.id.unwrap_or(Value::Null);
            let response = JsonRpcResponse::error(id, -32001, "unauthenticated");
            return (context, StatusCode::UNAUTHORIZED, Some(response), RequestFacts::invalid());
        }
    }
    let (status, response, facts) = handle_request(&state.dispatcher, request).await;
    (context, status, response, facts)
}

/// Dispatches a parsed JSON-RPC request.
async fn handle_request(
    dispatcher: &GatewayDispatcher,
    request: JsonRpcRequest,
) -> (StatusCode, Option<JsonRpcResponse>, RequestFacts) {
    let method = GatewayMethod::classify(&request.method);
    let mut facts = RequestFacts {
        method,
        ..RequestFacts::invalid()
    };
    if request.jsonrpc != "2.0" {
        facts.method = GatewayMethod::Invalid;
        let id = request.id.unwrap_or(Value::Null);
        let response = JsonRpcResponse::error(id, -32600, "invalid json-rpc version");
        return (StatusCode::BAD_REQUEST, Some(response), facts);
    }
    let Some(id) = request.id else {
        // Notifications (for example `notifications/initialized`) get no reply.
        return (StatusCode::ACCEPTED, None, facts);
    };
    let params = request.params.unwrap_or(Value::Null);
    let (status, response) = match method {
        GatewayMethod::Initialize => {
            (StatusCode::OK, JsonRpcResponse::ok(id, initialize_result(&params)))
        }
        GatewayMethod::ToolsList => match dispatcher.list_tools().await {
            Ok(tools) => match serde_json::to_value(ToolListResult {
                tools,
            }) {
                Ok(value) => (StatusCode::OK, JsonRpcResponse::ok(id, value)),
                Err(_) => (StatusCode::OK, JsonRpcResponse::error(id, -32060, "serialization failed")),
            },
            Err(err) => (
                StatusCode::OK,
                JsonRpcResponse::error(id, -32020, format!("backend unavailable: {err}")),
            ),
        },
        GatewayMethod::ToolsCall => match serde_json::from_value::<ToolCallParams>(params) {
            Ok(call) => {
                facts.external_context = call
                    .arguments
                    .get(EXTERNAL_CONTEXT_FIELD)
                    .and_then(|value| serde_json::from_value(value.clone()).ok());
                facts.tool = Some(call.name.clone());
                let outcome = dispatcher.call_tool(&call.name, call.arguments).await;
                facts.status = Some(outcome.status());
                match (serde_json::to_value(&outcome), serde_json::to_string(&outcome)) {
                    (Ok(structured_content), Ok(text)) => {
                        let result = ToolCallResult {
                            content: vec![ToolContent::Text {
                                text,
                            }],
                            structured_content,
                            is_error: outcome.is_error(),
                        };
                        match serde_json::to_value(result) {
                            Ok(value) => (StatusCode::OK, JsonRpcResponse::ok(id, value)),
                            Err(_) => (
                                StatusCode::OK,
                                JsonRpcResponse::error(id, -32060, "serialization failed"),
                            ),
                        }
                    }
                    _ => (StatusCode::OK, JsonRpcResponse::error(id, -32060, "serialization failed")),
                }
            }
            Err(_) => {
                (StatusCode::BAD_REQUEST, JsonRpcResponse::error(id, -32602, "invalid tool params"))
            }
        },
        GatewayMethod::Invalid | GatewayMethod::Other => {
            (StatusCode::BAD_REQUEST, JsonRpcResponse::error(id, -32601, "method not found"))
        }
    };
    (status, Some(response), facts)
}

/// Builds the `initialize` result, echoing the client's protocol version.
fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .filter(|version| !version.is_empty())
        .unwrap_or(MCP_PROTOCOL_VERSION);
    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
    })
}

/// Warns when HTTP runs without explicit auth.
fn emit_local_only_warning(server: &ServerConfig) {
    if server.transport == ServerTransport::Http && server.auth.mode == ServerAuthMode::LocalOnly {
        let _ = writeln!(
            std::io::stderr(),
            "mindscape-gateway: WARNING: http transport in local-only mode; configure \
             server.auth to enable bearer_token"
        );
    }
}

// ============================================================================
// SECTION: Framing Helpers
// ============================================================================

/// Reads a framed stdio payload using MCP Content-Length headers.
///
/// Returns `None` when the stream ends cleanly between messages.
async fn read_framed<R>(
    reader: &mut R,
    max_body_bytes: usize,
) -> Result<Option<Vec<u8>>, McpServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .await
            .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
        if bytes == 0 {
            if saw_header {
                return Err(McpServerError::Transport("stdio closed".to_string()));
            }
            return Ok(None);
        }
        if line.trim().is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            if content_length.is_some() {
                return Err(McpServerError::Transport("duplicate content length".to_string()));
            }
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| McpServerError::Transport("invalid content length".to_string()))?;
            content_length = Some(parsed);
        }
    }
    let len = content_length
        .ok_or_else(|| McpServerError::Transport("missing content length".to_string()))?;
    if len > max_body_bytes {
        return Err(McpServerError::Transport("payload too large".to_string()));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
    Ok(Some(buf))
}

/// Writes a framed stdio payload using MCP Content-Length headers.
async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> Result<(), McpServerError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
    writer.flush().await.map_err(|_| McpServerError::Transport("stdio write failed".to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only framing assertions."
    )]

    use tokio::io::BufReader;

    use super::read_framed;
    use super::write_framed;

    /// Sample request body.
    const PAYLOAD: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn read_framed_rejects_payload_over_limit() {
        let bytes = framed(PAYLOAD);
        let mut reader = BufReader::new(bytes.as_slice());
        assert!(read_framed(&mut reader, PAYLOAD.len() - 1).await.is_err());
    }

    #[tokio::test]
    async fn read_framed_accepts_payload_at_limit() {
        let bytes = framed(PAYLOAD);
        let mut reader = BufReader::new(bytes.as_slice());
        let read = read_framed(&mut reader, PAYLOAD.len()).await.unwrap();
        assert_eq!(read.as_deref(), Some(PAYLOAD));
        assert!(read_framed(&mut reader, PAYLOAD.len()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_framed_rejects_duplicate_content_length_headers() {
        let bytes = b"Content-Length: 2\r\nContent-Length: 2\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(bytes.as_slice());
        assert!(read_framed(&mut reader, 64).await.is_err());
    }

    #[tokio::test]
    async fn read_framed_rejects_truncated_stream() {
        let bytes = b"Content-Length: 10\r\n".to_vec();
        let mut reader = BufReader::new(bytes.as_slice());
        assert!(read_framed(&mut reader, 64).await.is_err());
    }

    #[tokio::test]
    async fn write_then_read_preserves_payload() {
        let mut out = Vec::new();
        write_framed(&mut out, PAYLOAD).await.unwrap();
        let mut reader = BufReader::new(out.as_slice());
        assert_eq!(read_framed(&mut reader, 1024).await.unwrap().as_deref(), Some(PAYLOAD));
    }
}
