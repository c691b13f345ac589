// crates/mindscape-gateway-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared mocks and fixtures for gateway integration tests.
// Purpose: Provide a counting backend and a collecting audit sink.
// Dependencies: mindscape-gateway-core, mindscape-gateway-mcp
// ============================================================================

//! ## Overview
//! [`MockBackend`] records every call it receives so tests can assert that
//! gated paths never reach the backend. [`CollectingAuditSink`] keeps every
//! audit event as JSON for assertions on event shape.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mindscape_gateway_core::ConfirmationIssuer;
use mindscape_gateway_core::Ed25519ConfirmationVerifier;
use mindscape_gateway_core::FixedClock;
use mindscape_gateway_core::RawToolDescriptor;
use mindscape_gateway_mcp::BackendClient;
use mindscape_gateway_mcp::BackendError;
use mindscape_gateway_mcp::DispatcherOptions;
use mindscape_gateway_mcp::ExecuteRequest;
use mindscape_gateway_mcp::GatewayAuditSink;
use mindscape_gateway_mcp::GatewayDispatcher;
use mindscape_gateway_mcp::audit::GatewayAuditEvent;
use mindscape_gateway_mcp::audit::PolicyAuditEvent;
use mindscape_gateway_mcp::audit::ResolverAuditEvent;
use mindscape_gateway_mcp::auth::AuthAuditEvent;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed wall-clock seconds used by dispatcher fixtures.
pub const NOW: i64 = 1_700_000_000;

/// Secret for the fixture confirmation issuer.
pub const ISSUER_SECRET: [u8; 32] = [7u8; 32];

// ============================================================================
// SECTION: Mock Backend
// ============================================================================

/// Which backend operation a call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `execute_tool`.
    Tool,
    /// `execute_playbook`.
    Playbook,
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Operation hit.
    pub kind: CallKind,
    /// Backend id.
    pub id: String,
    /// Workspace.
    pub workspace_id: String,
    /// Inputs forwarded.
    pub inputs: Map<String, Value>,
    /// Whether an external context was forwarded.
    pub had_context: bool,
}

/// Scripted execution reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful raw response.
    Value(Value),
    /// Non-2xx status.
    Status(u16, String),
    /// Timeout.
    Timeout,
}

/// Backend double that counts calls.
pub struct MockBackend {
    /// Tool listing.
    pub tools: Vec<RawToolDescriptor>,
    /// Playbook listing.
    pub playbooks: Vec<RawToolDescriptor>,
    /// When true, listing fails.
    pub listing_fails: bool,
    /// Reply for every execution.
    pub reply: Mutex<MockReply>,
    /// Executions received.
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl MockBackend {
    /// Builds a backend from JSON descriptor arrays.
    pub fn new(tools: Value, playbooks: Value) -> Self {
        Self {
            tools: serde_json::from_value(tools).unwrap(),
            playbooks: serde_json::from_value(playbooks).unwrap(),
            listing_fails: false,
            reply: Mutex::new(MockReply::Value(json!({"status": "completed", "outputs": {"ok": true}}))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Builds a backend with no descriptors.
    pub fn empty() -> Self {
        Self::new(json!([]), json!([]))
    }

    /// Sets the execution reply.
    pub fn reply_with(&self, reply: MockReply) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Returns the number of executions received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns the recorded executions.
    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Records a call and produces the scripted reply.
    fn execute(&self, kind: CallKind, request: &ExecuteRequest<'_>) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push(RecordedCall {
            kind,
            id: request.id.to_string(),
            workspace_id: request.workspace_id.to_string(),
            inputs: request.inputs.clone(),
            had_context: request.external_context.is_some(),
        });
        match self.reply.lock().unwrap().clone() {
            MockReply::Value(value) => Ok(value),
            MockReply::Status(status, message) => Err(BackendError::Status {
                status,
                message,
            }),
            MockReply::Timeout => Err(BackendError::Timeout),
        }
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn list_tools(&self) -> Result<Vec<RawToolDescriptor>, BackendError> {
        if self.listing_fails {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(self.tools.clone())
    }

    async fn list_playbooks(&self) -> Result<Vec<RawToolDescriptor>, BackendError> {
        if self.listing_fails {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(self.playbooks.clone())
    }

    async fn execute_tool(&self, request: &ExecuteRequest<'_>) -> Result<Value, BackendError> {
        self.execute(CallKind::Tool, request)
    }

    async fn execute_playbook(
        &self,
        request: &ExecuteRequest<'_>,
    ) -> Result<Value, BackendError> {
        self.execute(CallKind::Playbook, request)
    }
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Audit sink that keeps every event as JSON.
#[derive(Default)]
pub struct CollectingAuditSink {
    /// Events in arrival order.
    events: Mutex<Vec<Value>>,
}

impl CollectingAuditSink {
    /// Returns every event whose `event` field equals `name`.
    pub fn events(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event["event"] == name)
            .cloned()
            .collect()
    }

    /// Stores one event.
    fn push<T: serde::Serialize>(&self, event: &T) {
        self.events.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }
}

impl GatewayAuditSink for CollectingAuditSink {
    fn record_request(&self, event: &GatewayAuditEvent) {
        self.push(event);
    }

    fn record_resolver(&self, event: &ResolverAuditEvent) {
        self.push(event);
    }

    fn record_policy(&self, event: &PolicyAuditEvent) {
        self.push(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        self.push(event);
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Dispatcher plus handles to its collaborators.
pub struct Harness {
    /// Dispatcher under test.
    pub dispatcher: GatewayDispatcher,
    /// Backend double.
    pub backend: Arc<MockBackend>,
    /// Audit collector.
    pub audit: Arc<CollectingAuditSink>,
    /// Clock shared with the dispatcher.
    pub clock: Arc<FixedClock>,
    /// Issuer whose key the dispatcher trusts.
    pub issuer: ConfirmationIssuer,
}

/// Builds a dispatcher trusting [`ISSUER_SECRET`] at time [`NOW`].
pub fn harness(backend: MockBackend) -> Harness {
    let backend = Arc::new(backend);
    let audit = Arc::new(CollectingAuditSink::default());
    let clock = Arc::new(FixedClock::at(NOW));
    let issuer = ConfirmationIssuer::from_secret(&ISSUER_SECRET);
    let options = DispatcherOptions {
        verifier: Arc::new(Ed25519ConfirmationVerifier::new(issuer.verifying_key(), 900)),
        clock: clock.clone(),
        audit: audit.clone(),
        ..DispatcherOptions::default()
    };
    let dispatcher = GatewayDispatcher::new(backend.clone(), options);
    Harness {
        dispatcher,
        backend,
        audit,
        clock,
        issuer,
    }
}

/// Builds call arguments with a workspace and inputs.
pub fn args(inputs: Value) -> Value {
    json!({"workspace_id": "ws-1", "inputs": inputs})
}
