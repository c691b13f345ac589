// crates/mindscape-gateway-config/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: Configuration loading and validation for the MCP gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: mindscape-gateway-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `MINDSCAPE_GATEWAY_CONFIG`, then
//! `mindscape-gateway.toml` in the working directory. Missing or invalid
//! configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use mindscape_gateway_core::AccessTier;
use mindscape_gateway_core::ConfirmationVerifier;
use mindscape_gateway_core::DenyAllVerifier;
use mindscape_gateway_core::Ed25519ConfirmationVerifier;
use mindscape_gateway_core::McpToolName;
use mindscape_gateway_core::PatternRule;
use mindscape_gateway_core::ToolAccessPolicy;
use mindscape_gateway_core::ToolLayer;
use mindscape_gateway_core::from_mcp_name;
use mindscape_gateway_core::policy::DEFAULT_BLOCKED_SEGMENTS;
use mindscape_gateway_core::policy::DEFAULT_GOVERNED_PATTERNS;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "mindscape-gateway.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "MINDSCAPE_GATEWAY_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of server auth tokens.
pub(crate) const MAX_AUTH_TOKENS: usize = 64;
/// Maximum length of a server auth token.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum number of custom policy rules.
pub(crate) const MAX_POLICY_RULES: usize = 256;
/// Maximum number of seed packs.
pub(crate) const MAX_SEED_PACKS: usize = 1024;
/// Maximum backend timeout in milliseconds.
pub(crate) const MAX_BACKEND_TIMEOUT_MS: u64 = 600_000;
/// Maximum accepted confirmation validity window in seconds.
pub(crate) const MAX_CONFIRMATION_TTL_SECONDS: i64 = 86_400;
/// Default confirmation-request tool advertised in `next_action`.
pub const DEFAULT_CONFIRMATION_TOOL: &str = "mindscape_tool_governance_request_confirmation";

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Gateway configuration loaded from `mindscape-gateway.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend API configuration.
    pub backend: BackendConfig,
    /// Resolver configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Access policy configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Confirmation token configuration.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl GatewayConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.backend.validate()?;
        self.resolver.validate()?;
        self.policy.validate()?;
        self.confirmation.validate()?;
        self.audit.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Supported MCP transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Use stdin/stdout transport.
    #[default]
    Stdio,
    /// Use HTTP JSON-RPC transport.
    Http,
}

/// Inbound auth modes for MCP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerAuthMode {
    /// Local-only loopback or stdio access.
    #[default]
    LocalOnly,
    /// Bearer token authentication.
    BearerToken,
}

/// Server authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuthConfig {
    /// Auth mode for inbound requests.
    #[serde(default)]
    pub mode: ServerAuthMode,
    /// Accepted bearer tokens (required for `bearer_token` mode).
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
}

impl ServerAuthConfig {
    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bearer_tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid("too many auth tokens".to_string()));
        }
        for token in &self.bearer_tokens {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("auth token must be non-empty".to_string()));
            }
            if token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("auth token too long".to_string()));
            }
            if token.trim() != token {
                return Err(ConfigError::Invalid(
                    "auth token must not contain whitespace".to_string(),
                ));
            }
        }
        if self.mode == ServerAuthMode::BearerToken && self.bearer_tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "bearer_token mode requires at least one token".to_string(),
            ));
        }
        Ok(())
    }
}

/// MCP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport type for MCP.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Inbound authentication.
    #[serde(default)]
    pub auth: ServerAuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            auth: ServerAuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address for the HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address is missing or invalid.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or_default().trim();
        if bind.is_empty() {
            return Err(ConfigError::Invalid("http transport requires bind address".to_string()));
        }
        bind.parse().map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))
    }

    /// Validates server transport configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        self.auth.validate()?;
        match self.transport {
            ServerTransport::Http => {
                let addr = self.bind_addr()?;
                if !addr.ip().is_loopback() && self.auth.mode == ServerAuthMode::LocalOnly {
                    return Err(ConfigError::Invalid(
                        "non-loopback bind disallowed without auth policy".to_string(),
                    ));
                }
            }
            ServerTransport::Stdio => {
                if self.auth.mode != ServerAuthMode::LocalOnly {
                    return Err(ConfigError::Invalid(
                        "stdio transport only supports local_only auth".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the backend API.
    pub base_url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum accepted response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// User-Agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional API key sent as a bearer credential.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Tool listing path.
    #[serde(default = "default_tools_path")]
    pub tools_path: String,
    /// Playbook listing path.
    #[serde(default = "default_playbooks_path")]
    pub playbooks_path: String,
}

impl BackendConfig {
    /// Returns the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URL is invalid.
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|err| ConfigError::Invalid(format!("backend.base_url is invalid: {err}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "backend.base_url scheme must be http or https: {other}"
                )));
            }
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ConfigError::Invalid(
                "backend.base_url must not embed credentials".to_string(),
            ));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::Invalid("backend.base_url requires a host".to_string()));
        }
        Ok(url)
    }

    /// Validates backend configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.timeout_ms == 0 || self.timeout_ms > MAX_BACKEND_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "backend.timeout_ms must be between 1 and {MAX_BACKEND_TIMEOUT_MS}"
            )));
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::Invalid(
                "backend.max_response_bytes must be greater than zero".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.user_agent must be non-empty".to_string()));
        }
        if let Some(key) = &self.api_key
            && (key.trim().is_empty() || key.trim() != key)
        {
            return Err(ConfigError::Invalid(
                "backend.api_key must be non-empty without whitespace".to_string(),
            ));
        }
        validate_endpoint_path("backend.tools_path", &self.tools_path)?;
        validate_endpoint_path("backend.playbooks_path", &self.playbooks_path)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolver configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Packs that are always part of the known-pack set.
    #[serde(default)]
    pub seed_packs: Vec<String>,
}

impl ResolverConfig {
    /// Validates resolver configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.seed_packs.len() > MAX_SEED_PACKS {
            return Err(ConfigError::Invalid("too many resolver.seed_packs".to_string()));
        }
        if self.seed_packs.iter().any(|pack| pack.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "resolver.seed_packs entries must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// One custom classification rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRuleConfig {
    /// Pack pattern (`*`, `prefix*`, or exact).
    pub pack: String,
    /// Action pattern (`*`, `prefix*`, or exact).
    pub action: String,
    /// Optional layer restriction.
    #[serde(default)]
    pub layer: Option<ToolLayer>,
    /// Tier assigned on match.
    pub tier: AccessTier,
}

impl PolicyRuleConfig {
    /// Parses the rule into a pattern rule.
    fn to_rule(&self) -> Result<PatternRule, ConfigError> {
        PatternRule::parse(&self.pack, &self.action, self.layer, self.tier)
            .map_err(|err| ConfigError::Invalid(format!("policy.rules: {err}")))
    }
}

/// Access policy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Segments that mark an identity internal.
    #[serde(default = "default_blocked_segments")]
    pub blocked_segments: Vec<String>,
    /// Segment patterns that mark an identity governed.
    #[serde(default = "default_governed_patterns")]
    pub governed_patterns: Vec<String>,
    /// Custom rules consulted before the defaults.
    #[serde(default)]
    pub rules: Vec<PolicyRuleConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            blocked_segments: default_blocked_segments(),
            governed_patterns: default_governed_patterns(),
            rules: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Builds the access policy described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a custom rule is invalid.
    pub fn build_policy(&self) -> Result<ToolAccessPolicy, ConfigError> {
        let mut policy = ToolAccessPolicy::new(&self.blocked_segments, &self.governed_patterns);
        for rule in &self.rules {
            policy = policy.with_rule(Arc::new(rule.to_rule()?));
        }
        Ok(policy)
    }

    /// Validates policy configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.len() > MAX_POLICY_RULES {
            return Err(ConfigError::Invalid("too many policy.rules".to_string()));
        }
        for entry in self.blocked_segments.iter().chain(&self.governed_patterns) {
            if entry.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "policy segment patterns must be non-empty".to_string(),
                ));
            }
        }
        for rule in &self.rules {
            rule.to_rule()?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Confirmation
// ============================================================================

/// Confirmation token configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationConfig {
    /// Base64 Ed25519 public key of the issuing authority.
    #[serde(default)]
    pub verifying_key: Option<String>,
    /// MCP tool advertised in `next_action` for confirmation requests.
    #[serde(default = "default_confirmation_tool")]
    pub request_tool: String,
    /// Maximum accepted validity window in seconds.
    #[serde(default = "default_confirmation_ttl_seconds")]
    pub max_ttl_seconds: i64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            verifying_key: None,
            request_tool: default_confirmation_tool(),
            max_ttl_seconds: default_confirmation_ttl_seconds(),
        }
    }
}

impl ConfirmationConfig {
    /// Builds the verifier described by this configuration.
    ///
    /// Without a verifying key every governed call requires confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the verifying key is invalid.
    pub fn build_verifier(&self) -> Result<Arc<dyn ConfirmationVerifier>, ConfigError> {
        match &self.verifying_key {
            Some(key) => {
                let verifier = Ed25519ConfirmationVerifier::from_base64(key, self.max_ttl_seconds)
                    .map_err(|err| ConfigError::Invalid(format!("confirmation: {err}")))?;
                Ok(Arc::new(verifier))
            }
            None => Ok(Arc::new(DenyAllVerifier)),
        }
    }

    /// Validates confirmation configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ttl_seconds <= 0 || self.max_ttl_seconds > MAX_CONFIRMATION_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "confirmation.max_ttl_seconds must be between 1 and {MAX_CONFIRMATION_TTL_SECONDS}"
            )));
        }
        let decoded: McpToolName = from_mcp_name(self.request_tool.trim()).map_err(|err| {
            ConfigError::Invalid(format!("confirmation.request_tool is not a gateway name: {err}"))
        })?;
        if decoded.encode() != self.request_tool.trim() {
            return Err(ConfigError::Invalid(
                "confirmation.request_tool is not in canonical form".to_string(),
            ));
        }
        self.build_verifier().map(|_| ())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// Discard audit events.
    None,
}

/// Audit sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Audit log path (required for the file sink).
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        if self.sink == AuditSinkKind::File && self.path.is_none() {
            return Err(ConfigError::Invalid("audit.sink = file requires audit.path".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an absolute URL path used for backend endpoints.
fn validate_endpoint_path(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::Invalid(format!("{field} must start with '/'")));
    }
    if value.len() > 1 && value.ends_with('/') {
        return Err(ConfigError::Invalid(format!("{field} must not end with '/'")));
    }
    if value.contains(['?', '#']) || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("{field} must be a plain path")));
    }
    if value.split('/').any(|segment| segment == "..") {
        return Err(ConfigError::Invalid(format!("{field} must not contain traversal")));
    }
    Ok(())
}

/// Default maximum request body size in bytes.
pub(crate) const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default backend request timeout in milliseconds.
pub(crate) const fn default_backend_timeout_ms() -> u64 {
    30_000
}

/// Default maximum backend response size in bytes.
pub(crate) const fn default_max_response_bytes() -> usize {
    4 * 1024 * 1024
}

/// Default backend User-Agent.
pub(crate) fn default_user_agent() -> String {
    format!("mindscape-gateway/{}", env!("CARGO_PKG_VERSION"))
}

/// Default tool listing path.
pub(crate) fn default_tools_path() -> String {
    "/api/v1/tools".to_string()
}

/// Default playbook listing path.
pub(crate) fn default_playbooks_path() -> String {
    "/api/v1/playbooks".to_string()
}

/// Default blocked segments.
pub(crate) fn default_blocked_segments() -> Vec<String> {
    DEFAULT_BLOCKED_SEGMENTS.iter().map(|segment| (*segment).to_string()).collect()
}

/// Default governed patterns.
pub(crate) fn default_governed_patterns() -> Vec<String> {
    DEFAULT_GOVERNED_PATTERNS.iter().map(|pattern| (*pattern).to_string()).collect()
}

/// Default confirmation-request tool.
pub(crate) fn default_confirmation_tool() -> String {
    DEFAULT_CONFIRMATION_TOOL.to_string()
}

/// Default confirmation validity window.
pub(crate) const fn default_confirmation_ttl_seconds() -> i64 {
    900
}
