// crates/mindscape-gateway-mcp/tests/http_backend.rs
// ============================================================================
// Module: HTTP Backend Client Tests
// Description: Exercises the reqwest backend client against a local server.
// Purpose: Pin request paths, bodies, credentials and failure classification.
// Dependencies: mindscape-gateway-mcp, tiny_http, tokio
// ============================================================================

//! ## Overview
//! Each test starts a one-shot `tiny_http` server on a loopback port, points
//! [`HttpBackendClient`] at it and asserts both what the client sent and how
//! it classified the reply. The backend is treated as untrusted: oversized
//! bodies, error statuses and slow replies must all end in a typed error.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mindscape_gateway_config::BackendConfig;
use mindscape_gateway_core::ExternalContext;
use mindscape_gateway_mcp::BackendClient;
use mindscape_gateway_mcp::BackendError;
use mindscape_gateway_mcp::ExecuteRequest;
use mindscape_gateway_mcp::HttpBackendClient;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// What the fake backend observed.
struct Captured {
    /// HTTP method.
    method: String,
    /// Request path including any query.
    url: String,
    /// Authorization header, when sent.
    authorization: Option<String>,
    /// User-Agent header, when sent.
    user_agent: Option<String>,
    /// Request body.
    body: String,
}

/// Serves a single request with `status` and `body`, reporting what it saw.
fn serve_once(status: u16, body: String) -> (String, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv(name))
                    .map(|header| header.value.as_str().to_string())
            };
            let authorization = header("Authorization");
            let user_agent = header("User-Agent");
            let method = request.method().as_str().to_string();
            let url = request.url().to_string();
            let mut body_in = String::new();
            let _ = request.as_reader().read_to_string(&mut body_in);
            let _ = tx.send(Captured {
                method,
                url,
                authorization,
                user_agent,
                body: body_in,
            });
            let content_type = Header::from_bytes("Content-Type", "application/json").unwrap();
            let response =
                Response::from_string(body).with_status_code(status).with_header(content_type);
            let _ = request.respond(response);
        }
    });
    (format!("http://{addr}"), rx)
}

/// Backend configuration pointing at `base_url`.
fn config(base_url: &str) -> BackendConfig {
    BackendConfig {
        base_url: base_url.to_string(),
        timeout_ms: 5_000,
        max_response_bytes: 64 * 1024,
        user_agent: "gateway-tests/1".to_string(),
        api_key: None,
        tools_path: "/api/v1/tools".to_string(),
        playbooks_path: "/api/v1/playbooks".to_string(),
    }
}

/// Inputs used by execution tests.
fn inputs() -> Map<String, Value> {
    let mut inputs = Map::new();
    inputs.insert("page_id".to_string(), json!(42));
    inputs
}

// ============================================================================
// SECTION: Listing
// ============================================================================

#[tokio::test]
async fn list_tools_reads_wrapped_listing_with_credentials() {
    let (base_url, seen) = serve_once(
        200,
        json!({"tools": [{"name": "wordpress.list_posts", "description": "List posts"}, "notion.search"]})
            .to_string(),
    );
    let mut backend = config(&base_url);
    backend.api_key = Some("secret-key".to_string());
    let client = HttpBackendClient::from_config(&backend).unwrap();

    let tools = client.list_tools().await.unwrap();

    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name.as_deref(), Some("wordpress.list_posts"));
    assert_eq!(tools[0].description.as_deref(), Some("List posts"));
    assert_eq!(tools[1].name.as_deref(), Some("notion.search"));
    let captured = seen.recv().unwrap();
    assert_eq!(captured.method, "GET");
    assert_eq!(captured.url, "/api/v1/tools");
    assert_eq!(captured.authorization.as_deref(), Some("Bearer secret-key"));
    assert_eq!(captured.user_agent.as_deref(), Some("gateway-tests/1"));
}

#[tokio::test]
async fn list_playbooks_keeps_base_path_prefix() {
    let (base_url, seen) = serve_once(200, json!([{"code": "wordpress.divi_content_update"}]).to_string());
    let client = HttpBackendClient::from_config(&config(&format!("{base_url}/backend/"))).unwrap();

    let playbooks = client.list_playbooks().await.unwrap();

    assert_eq!(playbooks[0].code.as_deref(), Some("wordpress.divi_content_update"));
    let captured = seen.recv().unwrap();
    assert_eq!(captured.url, "/backend/api/v1/playbooks");
    assert!(captured.authorization.is_none());
}

#[tokio::test]
async fn listing_with_unknown_shape_is_a_decode_error() {
    let (base_url, _seen) = serve_once(200, json!({"items": []}).to_string());
    let client = HttpBackendClient::from_config(&config(&base_url)).unwrap();

    let err = client.list_tools().await.unwrap_err();

    assert!(matches!(err, BackendError::Decode(_)));
}

// ============================================================================
// SECTION: Execution
// ============================================================================

#[tokio::test]
async fn execute_tool_posts_body_to_id_path() {
    let (base_url, seen) = serve_once(200, json!({"status": "completed", "outputs": {"ok": true}}).to_string());
    let client = HttpBackendClient::from_config(&config(&base_url)).unwrap();
    let inputs = inputs();
    let context = ExternalContext {
        surface_type: Some("slack".to_string()),
        ..ExternalContext::default()
    };
    let request = ExecuteRequest {
        id: "wordpress.update_page_content",
        workspace_id: "ws-1",
        inputs: &inputs,
        external_context: Some(&context),
    };

    let raw = client.execute_tool(&request).await.unwrap();

    assert_eq!(raw["status"], "completed");
    let captured = seen.recv().unwrap();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.url, "/api/v1/tools/wordpress.update_page_content/execute");
    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(
        body,
        json!({
            "workspace_id": "ws-1",
            "inputs": {"page_id": 42},
            "external_context": {"surface_type": "slack"}
        })
    );
}

#[tokio::test]
async fn execute_playbook_escapes_id_and_omits_empty_context() {
    let (base_url, seen) = serve_once(200, json!({"execution_id": "exec-9"}).to_string());
    let client = HttpBackendClient::from_config(&config(&base_url)).unwrap();
    let inputs = inputs();
    let context = ExternalContext::default();
    let request = ExecuteRequest {
        id: "../admin",
        workspace_id: "ws-1",
        inputs: &inputs,
        external_context: Some(&context),
    };

    let raw = client.execute_playbook(&request).await.unwrap();

    assert_eq!(raw["execution_id"], "exec-9");
    let captured = seen.recv().unwrap();
    assert_eq!(captured.url, "/api/v1/playbooks/..%2Fadmin/execute");
    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert!(body.get("external_context").is_none());
}

#[tokio::test]
async fn error_status_carries_body_message() {
    let (base_url, _seen) = serve_once(502, json!({"detail": "upstream unavailable"}).to_string());
    let client = HttpBackendClient::from_config(&config(&base_url)).unwrap();
    let inputs = inputs();
    let request = ExecuteRequest {
        id: "notion.search",
        workspace_id: "ws-1",
        inputs: &inputs,
        external_context: None,
    };

    let err = client.execute_tool(&request).await.unwrap_err();

    match err {
        BackendError::Status {
            status,
            message,
        } => {
            assert_eq!(status, 502);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// SECTION: Limits
// ============================================================================

#[tokio::test]
async fn oversized_response_is_rejected() {
    let payload = json!({"blob": "x".repeat(4096)}).to_string();
    let (base_url, _seen) = serve_once(200, payload);
    let mut backend = config(&base_url);
    backend.max_response_bytes = 1024;
    let client = HttpBackendClient::from_config(&backend).unwrap();

    let err = client.list_tools().await.unwrap_err();

    assert!(matches!(err, BackendError::TooLarge { limit: 1024 }));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            thread::sleep(Duration::from_millis(800));
            drop(stream);
        }
    });
    let mut backend = config(&format!("http://{addr}"));
    backend.timeout_ms = 150;
    let client = HttpBackendClient::from_config(&backend).unwrap();

    let err = client.list_tools().await.unwrap_err();

    assert!(matches!(err, BackendError::Timeout));
    handle.join().unwrap();
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = HttpBackendClient::from_config(&config(&format!("http://{addr}"))).unwrap();

    let err = client.list_playbooks().await.unwrap_err();

    assert!(matches!(err, BackendError::Transport(_)));
}
