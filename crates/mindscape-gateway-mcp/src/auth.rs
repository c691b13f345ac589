// crates/mindscape-gateway-mcp/src/auth.rs
// ============================================================================
// Module: Transport Auth
// Description: Authentication enforcement for inbound JSON-RPC requests.
// Purpose: Provide strict, fail-closed transport auth for the gateway.
// Dependencies: mindscape-gateway-config, mindscape-gateway-core, serde
// ============================================================================

//! ## Overview
//! Transport auth decides whether a caller may talk to the gateway at all. It
//! is separate from the per-tool access policy: a caller that passes here
//! still sees only exposed tools and still needs confirmation tokens for
//! governed ones. Two modes exist: `local_only` (stdio or loopback peers) and
//! `bearer_token`. Raw tokens are never logged; only a SHA-256 fingerprint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use mindscape_gateway_config::ServerAuthConfig;
use mindscape_gateway_config::ServerAuthMode;
use mindscape_gateway_config::ServerTransport;
use mindscape_gateway_core::hashing::digest_bytes;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on an accepted `Authorization` header.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context used for auth decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Transport used by the caller.
    pub transport: ServerTransport,
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Authorization header value (HTTP).
    pub auth_header: Option<String>,
    /// Optional request identifier for auditing.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds a stdio request context.
    #[must_use]
    pub const fn stdio() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            peer_ip: None,
            auth_header: None,
            request_id: None,
        }
    }

    /// Builds an HTTP request context.
    #[must_use]
    pub const fn http(peer_ip: Option<IpAddr>, auth_header: Option<String>) -> Self {
        Self {
            transport: ServerTransport::Http,
            peer_ip,
            auth_header,
            request_id: None,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true when the peer IP is loopback.
    #[must_use]
    pub fn peer_is_loopback(&self) -> bool {
        self.peer_ip.is_some_and(|ip| ip.is_loopback())
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Authenticated caller context.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authentication method.
    pub method: AuthMethod,
    /// Subject label (`stdio`, `loopback`, or none for bearer callers).
    pub subject: Option<String>,
    /// Token fingerprint for bearer auth (hashed).
    pub token_fingerprint: Option<String>,
}

/// Authentication method used for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Local-only loopback or stdio access.
    Local,
    /// Bearer token authentication.
    BearerToken,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Transport auth interface.
pub trait RequestAuthz: Send + Sync {
    /// Authenticates a request. Returns the caller context on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the caller is not allowed in.
    fn authorize(&self, ctx: &RequestContext) -> Result<AuthContext, AuthError>;
}

/// Default transport auth derived from server config.
pub struct DefaultRequestAuthz {
    /// Configured mode.
    mode: ServerAuthMode,
    /// Accepted bearer tokens.
    bearer_tokens: BTreeSet<String>,
}

impl DefaultRequestAuthz {
    /// Builds the policy from server auth configuration.
    #[must_use]
    pub fn from_config(config: &ServerAuthConfig) -> Self {
        Self {
            mode: config.mode,
            bearer_tokens: config.bearer_tokens.iter().cloned().collect(),
        }
    }

    /// Returns the configured auth mode.
    #[must_use]
    pub const fn mode(&self) -> ServerAuthMode {
        self.mode
    }
}

impl RequestAuthz for DefaultRequestAuthz {
    fn authorize(&self, ctx: &RequestContext) -> Result<AuthContext, AuthError> {
        match self.mode {
            ServerAuthMode::LocalOnly => authorize_local_only(ctx),
            ServerAuthMode::BearerToken => authorize_bearer(ctx, &self.bearer_tokens),
        }
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Auth audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Decision outcome.
    pub decision: &'static str,
    /// Transport used by the caller.
    pub transport: ServerTransport,
    /// Caller IP address (if available).
    pub peer_ip: Option<String>,
    /// Auth method used.
    pub auth_method: Option<AuthMethod>,
    /// Caller subject label.
    pub subject: Option<String>,
    /// Bearer token fingerprint.
    pub token_fingerprint: Option<String>,
    /// Failure reason (for deny events).
    pub reason: Option<String>,
    /// Request identifier (if provided).
    pub request_id: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub fn allowed(ctx: &RequestContext, auth: &AuthContext) -> Self {
        Self {
            event: "mcp_authn",
            timestamp_ms: now_ms(),
            decision: "allow",
            transport: ctx.transport,
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: Some(auth.method),
            subject: auth.subject.clone(),
            token_fingerprint: auth.token_fingerprint.clone(),
            reason: None,
            request_id: ctx.request_id.clone(),
        }
    }

    /// Builds a deny event.
    #[must_use]
    pub fn denied(ctx: &RequestContext, error: &AuthError) -> Self {
        Self {
            event: "mcp_authn",
            timestamp_ms: now_ms(),
            decision: "deny",
            transport: ctx.transport,
            peer_ip: ctx.peer_ip.map(|ip| ip.to_string()),
            auth_method: None,
            subject: None,
            token_fingerprint: None,
            reason: Some(error.to_string()),
            request_id: ctx.request_id.clone(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// Admits stdio callers and loopback HTTP peers.
fn authorize_local_only(ctx: &RequestContext) -> Result<AuthContext, AuthError> {
    match ctx.transport {
        ServerTransport::Stdio => Ok(AuthContext {
            method: AuthMethod::Local,
            subject: Some("stdio".to_string()),
            token_fingerprint: None,
        }),
        ServerTransport::Http => {
            if ctx.peer_is_loopback() {
                Ok(AuthContext {
                    method: AuthMethod::Local,
                    subject: Some("loopback".to_string()),
                    token_fingerprint: None,
                })
            } else {
                Err(AuthError::Unauthenticated(
                    "local-only mode requires loopback access".to_string(),
                ))
            }
        }
    }
}

/// Admits callers presenting one of the configured bearer tokens.
fn authorize_bearer(
    ctx: &RequestContext,
    tokens: &BTreeSet<String>,
) -> Result<AuthContext, AuthError> {
    let token = parse_bearer_token(ctx.auth_header.as_deref())?;
    if !tokens.contains(&token) {
        return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
    }
    Ok(AuthContext {
        method: AuthMethod::BearerToken,
        subject: None,
        token_fingerprint: Some(digest_bytes(token.as_bytes())),
    })
}

/// Extracts the token from a `Bearer <token>` header.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
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

    use std::net::IpAddr;
    use std::net::Ipv4Addr;

    use mindscape_gateway_config::ServerAuthConfig;
    use mindscape_gateway_config::ServerAuthMode;

    use super::AuthMethod;
    use super::DefaultRequestAuthz;
    use super::RequestAuthz;
    use super::RequestContext;

    fn bearer_authz() -> DefaultRequestAuthz {
        DefaultRequestAuthz::from_config(&ServerAuthConfig {
            mode: ServerAuthMode::BearerToken,
            bearer_tokens: vec!["secret-token".to_string()],
        })
    }

    #[test]
    fn local_only_admits_stdio_and_loopback() {
        let authz = DefaultRequestAuthz::from_config(&ServerAuthConfig::default());
        assert!(authz.authorize(&RequestContext::stdio()).is_ok());
        let loopback = RequestContext::http(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), None);
        assert_eq!(authz.authorize(&loopback).unwrap().method, AuthMethod::Local);
    }

    #[test]
    fn local_only_rejects_remote_peers() {
        let authz = DefaultRequestAuthz::from_config(&ServerAuthConfig::default());
        let remote = RequestContext::http(Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))), None);
        assert!(authz.authorize(&remote).is_err());
        assert!(authz.authorize(&RequestContext::http(None, None)).is_err());
    }

    #[test]
    fn bearer_accepts_configured_token_and_fingerprints_it() {
        let ctx = RequestContext::http(None, Some("Bearer secret-token".to_string()));
        let auth = bearer_authz().authorize(&ctx).unwrap();
        let fingerprint = auth.token_fingerprint.unwrap();
        assert!(fingerprint.starts_with("sha256:"));
        assert!(!fingerprint.contains("secret-token"));
    }

    #[test]
    fn bearer_rejects_wrong_or_malformed_headers() {
        let authz = bearer_authz();
        for header in [None, Some("Bearer nope"), Some("Basic secret-token"), Some("Bearer ")] {
            let ctx = RequestContext::http(None, header.map(str::to_string));
            assert!(authz.authorize(&ctx).is_err());
        }
    }
}
