// crates/mindscape-gateway-mcp/src/dispatcher.rs
// ============================================================================
// Module: Gateway Dispatcher
// Description: List and call state machine over the backend client.
// Purpose: Resolve, filter, gate, execute, and normalize every tool call.
// Dependencies: mindscape-gateway-core, mindscape-gateway-config, tokio
// ============================================================================

//! ## Overview
//! [`GatewayDispatcher`] is the entry point behind `tools/list` and
//! `tools/call`.
//!
//! Listing fetches tools and playbooks concurrently, rebuilds the known-pack
//! snapshot, resolves every descriptor against it, drops internal entries and
//! wraps the survivors' schemas. Calling decodes the MCP name, validates the
//! argument envelope, re-classifies the identity (tiers are never cached from
//! listing time), checks the confirmation token for governed identities and
//! only then reaches the backend.
//!
//! Invariants:
//! - `call_tool` never fails; every path ends in a [`CallOutcome`].
//! - The known-pack snapshot is replaced whole, never mutated in place.
//! - Governed calls without a valid bound token make zero backend calls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use mindscape_gateway_config::ConfigError;
use mindscape_gateway_config::DEFAULT_CONFIRMATION_TOOL;
use mindscape_gateway_config::GatewayConfig;
use mindscape_gateway_core::AccessDecision;
use mindscape_gateway_core::AccessTier;
use mindscape_gateway_core::CallBinding;
use mindscape_gateway_core::CatalogEntry;
use mindscape_gateway_core::Clock;
use mindscape_gateway_core::ConfirmationVerifier;
use mindscape_gateway_core::DenyAllVerifier;
use mindscape_gateway_core::ErrorDetail;
use mindscape_gateway_core::ExternalContext;
use mindscape_gateway_core::KnownPackSet;
use mindscape_gateway_core::McpToolName;
use mindscape_gateway_core::PlaybookMapper;
use mindscape_gateway_core::ResolverDiagnostic;
use mindscape_gateway_core::SystemClock;
use mindscape_gateway_core::ToolAccessPolicy;
use mindscape_gateway_core::ToolDefinition;
use mindscape_gateway_core::ToolLayer;
use mindscape_gateway_core::ToolNameResolver;
use mindscape_gateway_core::ToolResult;
use mindscape_gateway_core::ToolStatus;
use mindscape_gateway_core::format_call_result;
use mindscape_gateway_core::format_rfc3339;
use mindscape_gateway_core::from_mcp_name;
use mindscape_gateway_core::result::BACKEND_ERROR;
use mindscape_gateway_core::result::BACKEND_TIMEOUT;
use mindscape_gateway_core::result::INVALID_ARGUMENTS;
use mindscape_gateway_core::result::INVALID_INPUTS;
use mindscape_gateway_core::result::INVALID_TOOL_NAME;
use mindscape_gateway_core::result::MISSING_INPUTS;
use mindscape_gateway_core::result::MISSING_WORKSPACE_ID;
use mindscape_gateway_core::result::TOOL_NOT_EXPOSED;
use mindscape_gateway_core::schema::CONFIRM_TOKEN_FIELD;
use mindscape_gateway_core::schema::EXTERNAL_CONTEXT_FIELD;
use mindscape_gateway_core::schema::INPUTS_FIELD;
use mindscape_gateway_core::schema::WORKSPACE_ID_FIELD;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::audit::GatewayAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::PolicyAuditEvent;
use crate::audit::PolicyAuditEventParams;
use crate::audit::ResolverAuditEvent;
use crate::backend::BackendClient;
use crate::backend::BackendError;
use crate::backend::ExecuteRequest;

// ============================================================================
// SECTION: Call Outcome
// ============================================================================

/// Structured hint returned when a governed call needs confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRequired {
    /// Always [`ToolStatus::ConfirmationRequired`].
    pub status: ToolStatus,
    /// Human-readable explanation.
    pub message: String,
    /// Canonical identity awaiting confirmation.
    pub action: String,
    /// Follow-up call that obtains a token.
    pub next_action: NextAction,
}

/// Follow-up call advertised by [`ConfirmationRequired`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextAction {
    /// MCP name of the confirmation-request tool.
    pub tool: String,
    /// Arguments for that tool.
    pub args: NextActionArgs,
}

/// Arguments for the confirmation-request tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextActionArgs {
    /// Canonical identity to confirm.
    pub action: String,
}

/// Result of a `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallOutcome {
    /// Normalized result envelope (including local failures).
    Result(ToolResult),
    /// Governed call held for confirmation.
    ConfirmationRequired(ConfirmationRequired),
}

impl CallOutcome {
    /// Returns the status carried by the outcome.
    #[must_use]
    pub const fn status(&self) -> ToolStatus {
        match self {
            Self::Result(result) => result.status,
            Self::ConfirmationRequired(hint) => hint.status,
        }
    }

    /// Returns true when clients should see the outcome as an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.status().is_error()
    }

    /// Returns the result envelope, if any.
    #[must_use]
    pub const fn as_result(&self) -> Option<&ToolResult> {
        match self {
            Self::Result(result) => Some(result),
            Self::ConfirmationRequired(_) => None,
        }
    }
}

// ============================================================================
// SECTION: Known Packs
// ============================================================================

/// Copy-on-write holder for the known-pack snapshot.
///
/// Readers clone the inner `Arc` and keep a complete set for as long as they
/// need it; writers swap in a new set in one assignment.
#[derive(Debug, Default)]
pub struct KnownPacks {
    /// Current snapshot.
    current: RwLock<Arc<KnownPackSet>>,
}

impl KnownPacks {
    /// Creates a holder with an initial snapshot.
    #[must_use]
    pub fn new(initial: KnownPackSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KnownPackSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the snapshot wholesale.
    pub fn replace(&self, next: Arc<KnownPackSet>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Collaborators and settings for a dispatcher.
pub struct DispatcherOptions {
    /// Access policy applied at list and call time.
    pub policy: ToolAccessPolicy,
    /// Confirmation token verifier.
    pub verifier: Arc<dyn ConfirmationVerifier>,
    /// Time source for token checks and result stamps.
    pub clock: Arc<dyn Clock>,
    /// Audit sink for resolver and policy events.
    pub audit: Arc<dyn GatewayAuditSink>,
    /// Packs always treated as known.
    pub seed_packs: Vec<String>,
    /// MCP name advertised in `next_action`.
    pub request_tool: String,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            policy: ToolAccessPolicy::default(),
            verifier: Arc::new(DenyAllVerifier),
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
            seed_packs: Vec::new(),
            request_tool: DEFAULT_CONFIRMATION_TOOL.to_string(),
        }
    }
}

impl DispatcherOptions {
    /// Builds options from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the policy or verifier cannot be built.
    pub fn from_config(
        config: &GatewayConfig,
        audit: Arc<dyn GatewayAuditSink>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            policy: config.policy.build_policy()?,
            verifier: config.confirmation.build_verifier()?,
            clock: Arc::new(SystemClock),
            audit,
            seed_packs: config.resolver.seed_packs.clone(),
            request_tool: config.confirmation.request_tool.clone(),
        })
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Validated call envelope.
struct CallEnvelope {
    /// Target workspace.
    workspace_id: String,
    /// Tool inputs.
    inputs: Map<String, Value>,
    /// Presented confirmation token.
    confirm_token: Option<String>,
    /// Caller context.
    external_context: Option<ExternalContext>,
}

/// Entry point for listing and calling gateway tools.
pub struct GatewayDispatcher {
    /// Backend collaborator.
    backend: Arc<dyn BackendClient>,
    /// Access policy.
    policy: ToolAccessPolicy,
    /// Confirmation token verifier.
    verifier: Arc<dyn ConfirmationVerifier>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn GatewayAuditSink>,
    /// Packs always treated as known.
    seed_packs: Vec<String>,
    /// MCP name advertised in `next_action`.
    request_tool: String,
    /// Known-pack snapshot refreshed by each listing.
    known_packs: KnownPacks,
}

impl GatewayDispatcher {
    /// Creates a dispatcher over a backend client.
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>, options: DispatcherOptions) -> Self {
        let known_packs = KnownPacks::new(KnownPackSet::new(&options.seed_packs));
        Self {
            backend,
            policy: options.policy,
            verifier: options.verifier,
            clock: options.clock,
            audit: options.audit,
            seed_packs: options.seed_packs,
            request_tool: options.request_tool,
            known_packs,
        }
    }

    /// Returns the current known-pack snapshot.
    #[must_use]
    pub fn known_packs(&self) -> Arc<KnownPackSet> {
        self.known_packs.snapshot()
    }

    /// Lists every exposed tool and playbook.
    ///
    /// Tools come first, then playbooks; duplicate MCP names keep the first
    /// occurrence and audit the dropped one. The fresh known-pack snapshot is
    /// stored before resolution and the resolver borrows the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when either listing fails.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BackendError> {
        let (tools, playbooks) =
            tokio::join!(self.backend.list_tools(), self.backend.list_playbooks());
        let tools = tools?;
        let playbooks = playbooks?;

        self.known_packs.replace(Arc::new(KnownPackSet::from_descriptors(
            tools.iter().chain(playbooks.iter()),
            &self.seed_packs,
        )));
        let known = self.known_packs.snapshot();

        let resolver = ToolNameResolver::new(&known);
        let mapper = PlaybookMapper::new(resolver);
        let entries = tools
            .iter()
            .map(|descriptor| CatalogEntry::from_tool(&resolver, descriptor))
            .chain(playbooks.iter().map(|descriptor| mapper.map(descriptor)));

        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        let mut definitions = Vec::new();
        for entry in entries {
            if self.audit_resolution(&entry) {
                continue;
            }
            let decision = self.policy.evaluate(entry.identity(), entry.layer);
            let Some(definition) = entry.to_definition(decision) else {
                continue;
            };
            if let Some(kept) = seen.get(&definition.name) {
                self.audit.record_resolver(&ResolverAuditEvent::new(
                    entry.layer,
                    entry.identity().canonical(),
                    entry.resolution.source,
                    ResolverDiagnostic::DuplicateMcpName {
                        mcp_name: definition.name,
                        kept: kept.clone(),
                    },
                    true,
                ));
                continue;
            }
            seen.insert(definition.name.clone(), entry.identity().canonical().to_string());
            definitions.push(definition);
        }
        Ok(definitions)
    }

    /// Handles one `tools/call`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> CallOutcome {
        let timestamp = format_rfc3339(self.clock.now());
        let fail = |code: &str, message: String, inputs: Map<String, Value>| {
            CallOutcome::Result(ToolResult::failure(
                name,
                ErrorDetail::new(code, message),
                inputs,
                &timestamp,
            ))
        };

        let tool = match from_mcp_name(name) {
            Ok(tool) => tool,
            Err(err) => return fail(INVALID_TOOL_NAME, err.to_string(), Map::new()),
        };
        let envelope = match parse_envelope(arguments) {
            Ok(envelope) => envelope,
            Err(detail) => return CallOutcome::Result(ToolResult::failure(
                name,
                detail,
                Map::new(),
                &timestamp,
            )),
        };

        let classification = self.policy.classify(&tool.identity, tool.layer);
        let (has_valid_token, token_label) = match classification.tier {
            AccessTier::Governed => self.check_token(&tool, &envelope),
            AccessTier::Primitive | AccessTier::Internal => (false, "not_required"),
        };
        let decision = AccessDecision::for_call(classification.tier, has_valid_token);
        self.audit.record_policy(&PolicyAuditEvent::new(PolicyAuditEventParams {
            tool: name.to_string(),
            canonical: tool.identity.canonical().to_string(),
            layer: tool.layer,
            workspace_id: envelope.workspace_id.clone(),
            tier: classification.tier,
            reason: classification.reason,
            exposed: decision.exposed,
            requires_confirmation: decision.requires_confirmation,
            token: token_label,
        }));

        if !decision.exposed {
            return fail(
                TOOL_NOT_EXPOSED,
                format!("{} is not exposed by this gateway", tool.identity),
                envelope.inputs,
            );
        }
        if decision.requires_confirmation {
            return CallOutcome::ConfirmationRequired(self.confirmation_hint(&tool));
        }

        let request = ExecuteRequest {
            id: tool.identity.backend_id(),
            workspace_id: &envelope.workspace_id,
            inputs: &envelope.inputs,
            external_context: envelope.external_context.as_ref(),
        };
        let response = match tool.layer {
            ToolLayer::Tool | ToolLayer::Lens => self.backend.execute_tool(&request).await,
            ToolLayer::Playbook | ToolLayer::Run => self.backend.execute_playbook(&request).await,
        };
        // Stamp after the backend returns so the time reflects observation.
        let timestamp = format_rfc3339(self.clock.now());
        let result = match response {
            Ok(raw) => format_call_result(&raw, name, &envelope.inputs, &timestamp),
            Err(BackendError::Timeout) => ToolResult::timeout(
                name,
                ErrorDetail::new(BACKEND_TIMEOUT, BackendError::Timeout.to_string()),
                envelope.inputs,
                &timestamp,
            ),
            Err(err) => {
                let mut detail = ErrorDetail::new(BACKEND_ERROR, backend_message(&err));
                if let BackendError::Status {
                    status, ..
                } = &err
                {
                    detail.details = Some(json!({ "status": status }));
                }
                ToolResult::failure(name, detail, envelope.inputs, &timestamp)
            }
        };
        CallOutcome::Result(result)
    }

    /// Forwards resolver diagnostics to the audit sink.
    ///
    /// Returns true when the entry must be dropped from the listing.
    fn audit_resolution(&self, entry: &CatalogEntry) -> bool {
        let skipped = entry.resolution.is_unnamed();
        for diagnostic in &entry.resolution.diagnostics {
            self.audit.record_resolver(&ResolverAuditEvent::new(
                entry.layer,
                entry.identity().canonical(),
                entry.resolution.source,
                diagnostic.clone(),
                skipped,
            ));
        }
        if !skipped && !entry.name_round_trips() {
            self.audit.record_resolver(&ResolverAuditEvent::new(
                entry.layer,
                entry.identity().canonical(),
                entry.resolution.source,
                ResolverDiagnostic::AmbiguousMcpName {
                    mcp_name: entry.mcp_name(),
                },
                false,
            ));
        }
        skipped
    }

    /// Verifies the presented token. Invalid tokens count as absent.
    fn check_token(&self, tool: &McpToolName, envelope: &CallEnvelope) -> (bool, &'static str) {
        let Some(token) = envelope.confirm_token.as_deref() else {
            return (false, "absent");
        };
        let binding = CallBinding {
            action: tool.identity.canonical(),
            workspace_id: &envelope.workspace_id,
            inputs: &envelope.inputs,
        };
        match self.verifier.verify(token, &binding, self.clock.unix_seconds()) {
            Ok(_) => (true, "valid"),
            Err(err) => (false, err.label()),
        }
    }

    /// Builds the `confirmation_required` hint for a governed identity.
    fn confirmation_hint(&self, tool: &McpToolName) -> ConfirmationRequired {
        let action = tool.identity.canonical().to_string();
        ConfirmationRequired {
            status: ToolStatus::ConfirmationRequired,
            message: format!(
                "{action} is governed; request a confirmation token and retry with \
                 `{CONFIRM_TOKEN_FIELD}`"
            ),
            action: action.clone(),
            next_action: NextAction {
                tool: self.request_tool.clone(),
                args: NextActionArgs {
                    action,
                },
            },
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the argument envelope in a fixed order.
fn parse_envelope(arguments: Value) -> Result<CallEnvelope, ErrorDetail> {
    let Value::Object(mut arguments) = arguments else {
        return Err(ErrorDetail::new(INVALID_ARGUMENTS, "arguments must be an object"));
    };
    let workspace_id = match arguments.get(WORKSPACE_ID_FIELD) {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        _ => {
            return Err(ErrorDetail::new(
                MISSING_WORKSPACE_ID,
                format!("`{WORKSPACE_ID_FIELD}` must be a non-empty string"),
            ));
        }
    };
    let inputs = match arguments.remove(INPUTS_FIELD) {
        None => {
            return Err(ErrorDetail::new(MISSING_INPUTS, format!("`{INPUTS_FIELD}` is required")));
        }
        Some(Value::Object(inputs)) => inputs,
        Some(_) => {
            return Err(ErrorDetail::new(
                INVALID_INPUTS,
                format!("`{INPUTS_FIELD}` must be an object"),
            ));
        }
    };
    let confirm_token = match arguments.get(CONFIRM_TOKEN_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(token)) => Some(token.clone()),
        Some(_) => {
            return Err(ErrorDetail::new(
                INVALID_ARGUMENTS,
                format!("`{CONFIRM_TOKEN_FIELD}` must be a string"),
            ));
        }
    };
    let external_context = match arguments.remove(EXTERNAL_CONTEXT_FIELD) {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::from_value::<ExternalContext>(value).map_err(|_| {
            ErrorDetail::new(
                INVALID_ARGUMENTS,
                format!("`{EXTERNAL_CONTEXT_FIELD}` must be an object of strings"),
            )
        })?),
    };
    Ok(CallEnvelope {
        workspace_id,
        inputs,
        confirm_token,
        external_context,
    })
}

/// Message preserved from a backend failure.
fn backend_message(err: &BackendError) -> String {
    match err {
        BackendError::Status {
            message, ..
        } => message.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
