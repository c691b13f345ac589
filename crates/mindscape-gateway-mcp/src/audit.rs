// crates/mindscape-gateway-mcp/src/audit.rs
// ============================================================================
// Module: Gateway Audit Logging
// Description: Structured audit events for requests, resolution, and policy.
// Purpose: Emit redacted JSON-line audit logs without a logging framework.
// Dependencies: mindscape-gateway-config, mindscape-gateway-core, serde
// ============================================================================

//! ## Overview
//! This module defines the audit event payloads the gateway emits and the
//! sinks that write them. Four event families exist:
//!
//! - `mcp_request`: one per JSON-RPC request handled by the server.
//! - `resolver_warning`: one per resolver diagnostic seen while listing.
//! - `policy_decision`: one per `tools/call` that reaches the policy check.
//! - `mcp_authn`: one per transport auth decision.
//!
//! Confirmation tokens and bearer tokens never appear in any event; token
//! validation is reported only as a stable outcome label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use mindscape_gateway_config::AuditConfig;
use mindscape_gateway_config::AuditSinkKind;
use mindscape_gateway_config::ServerTransport;
use mindscape_gateway_core::AccessTier;
use mindscape_gateway_core::ClassificationReason;
use mindscape_gateway_core::ResolutionSource;
use mindscape_gateway_core::ResolverDiagnostic;
use mindscape_gateway_core::ToolLayer;
use mindscape_gateway_core::ToolStatus;
use serde::Serialize;

use crate::auth::AuthAuditEvent;
use crate::telemetry::GatewayMethod;
use crate::telemetry::GatewayOutcome;

// ============================================================================
// SECTION: Types
// ============================================================================

/// JSON-RPC request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Transport used for the request.
    pub transport: ServerTransport,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// JSON-RPC method classification.
    pub method: GatewayMethod,
    /// MCP tool name for `tools/call`.
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: GatewayOutcome,
    /// Normalized call status for `tools/call`.
    pub status: Option<ToolStatus>,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
    /// Caller surface reported in the external context.
    pub surface_type: Option<String>,
    /// Conversation reported in the external context.
    pub conversation_id: Option<String>,
}

/// Resolver diagnostic audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ResolverAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Layer the descriptor was listed under.
    pub layer: ToolLayer,
    /// Canonical identity produced despite the diagnostic.
    pub canonical: String,
    /// Signal the identity came from.
    pub source: ResolutionSource,
    /// Diagnostic detail.
    pub diagnostic: ResolverDiagnostic,
    /// True when the descriptor was dropped from the listing.
    pub skipped: bool,
}

/// Policy decision audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// MCP tool name as called.
    pub tool: String,
    /// Canonical identity decoded from the name.
    pub canonical: String,
    /// Decoded layer.
    pub layer: ToolLayer,
    /// Workspace the call targets.
    pub workspace_id: String,
    /// Assigned tier.
    pub tier: AccessTier,
    /// Why the tier was assigned.
    pub reason: ClassificationReason,
    /// Whether the identity is exposed at all.
    pub exposed: bool,
    /// Whether the call was held for confirmation.
    pub requires_confirmation: bool,
    /// Token outcome label (`absent`, `valid`, or a rejection label).
    pub token: &'static str,
}

/// Inputs required to construct a request audit event.
pub struct GatewayAuditEventParams {
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Transport used for the request.
    pub transport: ServerTransport,
    /// Peer IP address if known.
    pub peer_ip: Option<String>,
    /// JSON-RPC method classification.
    pub method: GatewayMethod,
    /// MCP tool name for `tools/call`.
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: GatewayOutcome,
    /// Normalized call status for `tools/call`.
    pub status: Option<ToolStatus>,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
    /// Caller surface reported in the external context.
    pub surface_type: Option<String>,
    /// Conversation reported in the external context.
    pub conversation_id: Option<String>,
}

/// Inputs required to construct a policy audit event.
pub struct PolicyAuditEventParams {
    /// MCP tool name as called.
    pub tool: String,
    /// Canonical identity decoded from the name.
    pub canonical: String,
    /// Decoded layer.
    pub layer: ToolLayer,
    /// Workspace the call targets.
    pub workspace_id: String,
    /// Assigned tier.
    pub tier: AccessTier,
    /// Why the tier was assigned.
    pub reason: ClassificationReason,
    /// Whether the identity is exposed at all.
    pub exposed: bool,
    /// Whether the call was held for confirmation.
    pub requires_confirmation: bool,
    /// Token outcome label.
    pub token: &'static str,
}

impl GatewayAuditEvent {
    /// Creates a new request audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: GatewayAuditEventParams) -> Self {
        Self {
            event: "mcp_request",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            transport: params.transport,
            peer_ip: params.peer_ip,
            method: params.method,
            tool: params.tool,
            outcome: params.outcome,
            status: params.status,
            error_code: params.error_code,
            request_bytes: params.request_bytes,
            response_bytes: params.response_bytes,
            surface_type: params.surface_type,
            conversation_id: params.conversation_id,
        }
    }
}

impl ResolverAuditEvent {
    /// Creates a new resolver audit event with a consistent timestamp.
    #[must_use]
    pub fn new(
        layer: ToolLayer,
        canonical: &str,
        source: ResolutionSource,
        diagnostic: ResolverDiagnostic,
        skipped: bool,
    ) -> Self {
        Self {
            event: "resolver_warning",
            timestamp_ms: now_ms(),
            layer,
            canonical: canonical.to_string(),
            source,
            diagnostic,
            skipped,
        }
    }
}

impl PolicyAuditEvent {
    /// Creates a new policy audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: PolicyAuditEventParams) -> Self {
        Self {
            event: "policy_decision",
            timestamp_ms: now_ms(),
            tool: params.tool,
            canonical: params.canonical,
            layer: params.layer,
            workspace_id: params.workspace_id,
            tier: params.tier,
            reason: params.reason,
            exposed: params.exposed,
            requires_confirmation: params.requires_confirmation,
            token: params.token,
        }
    }
}

/// Milliseconds since the Unix epoch, zero when the clock is before it.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for gateway events.
pub trait GatewayAuditSink: Send + Sync {
    /// Record a JSON-RPC request event.
    fn record_request(&self, event: &GatewayAuditEvent);

    /// Record a resolver diagnostic event.
    fn record_resolver(&self, _event: &ResolverAuditEvent) {}

    /// Record a policy decision event.
    fn record_policy(&self, _event: &PolicyAuditEvent) {}

    /// Record a transport auth decision.
    fn record_auth(&self, _event: &AuthAuditEvent) {}
}

/// Builds the sink selected by configuration.
///
/// # Errors
///
/// Returns an error if the file sink cannot open its log.
pub fn build_audit_sink(config: &AuditConfig) -> io::Result<Arc<dyn GatewayAuditSink>> {
    match (config.sink, config.path.as_deref()) {
        (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkKind::None, _) => Ok(Arc::new(NoopAuditSink)),
        (AuditSinkKind::File, Some(path)) => Ok(Arc::new(FileAuditSink::new(Path::new(path))?)),
        (AuditSinkKind::File, None) => {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "file audit sink requires a path"))
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event line.
    fn emit<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl GatewayAuditSink for StderrAuditSink {
    fn record_request(&self, event: &GatewayAuditEvent) {
        Self::emit(event);
    }

    fn record_resolver(&self, event: &ResolverAuditEvent) {
        Self::emit(event);
    }

    fn record_policy(&self, event: &PolicyAuditEvent) {
        Self::emit(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event line.
    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl GatewayAuditSink for FileAuditSink {
    fn record_request(&self, event: &GatewayAuditEvent) {
        self.emit(event);
    }

    fn record_resolver(&self, event: &ResolverAuditEvent) {
        self.emit(event);
    }

    fn record_policy(&self, event: &PolicyAuditEvent) {
        self.emit(event);
    }

    fn record_auth(&self, event: &AuthAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record_request(&self, _event: &GatewayAuditEvent) {}
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
        reason = "Test-only assertions."
    )]

    use mindscape_gateway_config::AuditConfig;
    use mindscape_gateway_config::AuditSinkKind;
    use mindscape_gateway_core::AccessTier;
    use mindscape_gateway_core::ClassificationReason;
    use mindscape_gateway_core::ResolutionSource;
    use mindscape_gateway_core::ResolverDiagnostic;
    use mindscape_gateway_core::ToolLayer;
    use serde_json::Value;

    use super::PolicyAuditEvent;
    use super::PolicyAuditEventParams;
    use super::ResolverAuditEvent;
    use super::build_audit_sink;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let config = AuditConfig {
            sink: AuditSinkKind::File,
            path: Some(path.display().to_string()),
        };
        let sink = build_audit_sink(&config).unwrap();
        sink.record_resolver(&ResolverAuditEvent::new(
            ToolLayer::Tool,
            "wordpress.list_posts",
            ResolutionSource::NamePrefix,
            ResolverDiagnostic::PackConflict {
                name: "wordpress.list_posts".to_string(),
                name_pack: "wordpress".to_string(),
                declared_pack: "seo".to_string(),
            },
            false,
        ));
        sink.record_policy(&PolicyAuditEvent::new(PolicyAuditEventParams {
            tool: "mindscape_tool_git_merge".to_string(),
            canonical: "git.merge".to_string(),
            layer: ToolLayer::Tool,
            workspace_id: "ws-1".to_string(),
            tier: AccessTier::Governed,
            reason: ClassificationReason::GovernedPattern {
                pattern: "merge".to_string(),
            },
            exposed: true,
            requires_confirmation: true,
            token: "absent",
        }));
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> =
            contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "resolver_warning");
        assert_eq!(lines[0]["diagnostic"]["kind"], "pack_conflict");
        assert_eq!(lines[1]["event"], "policy_decision");
        assert_eq!(lines[1]["tier"], "governed");
        assert_eq!(lines[1]["reason"]["pattern"], "merge");
    }

    #[test]
    fn file_sink_without_path_is_rejected() {
        let config = AuditConfig {
            sink: AuditSinkKind::File,
            path: None,
        };
        assert!(build_audit_sink(&config).is_err());
    }
}
