// crates/mindscape-gateway-mcp/src/lib.rs
// ============================================================================
// Module: Mindscape Gateway MCP Library
// Description: MCP server, dispatcher, and backend client for the gateway.
// Purpose: Serve gateway tools over JSON-RPC with strict, fail-closed policy.
// Dependencies: mindscape-gateway-core, mindscape-gateway-config, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! This crate wires the pure gateway core to the outside world: it fetches
//! descriptors from the backend, applies naming and access policy in
//! [`GatewayDispatcher`], and serves the result as MCP tools over stdio or
//! HTTP. Every failure below the dispatcher ends in a normalized result.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod backend;
pub mod dispatcher;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::GatewayAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::RequestContext;
pub use backend::BackendClient;
pub use backend::BackendError;
pub use backend::ExecuteRequest;
pub use backend::HttpBackendClient;
pub use dispatcher::CallOutcome;
pub use dispatcher::DispatcherOptions;
pub use dispatcher::GatewayDispatcher;
pub use server::McpServer;
pub use server::McpServerError;
pub use telemetry::GatewayMetrics;
pub use telemetry::NoopMetrics;
