// crates/mindscape-gateway-core/src/lib.rs
// ============================================================================
// Module: Mindscape Gateway Core Library
// Description: Public API surface for the gateway's naming and policy core.
// Purpose: Expose identity resolution, access policy, envelopes, and results.
// Dependencies: crate::{catalog, clock, confirmation, context, hashing, identity, naming, policy, resolver, result, schema}
// ============================================================================

//! ## Overview
//! The gateway core translates loosely-shaped backend tool and playbook
//! descriptors into canonical identities and MCP-legal names, classifies each
//! identity into an access tier, and normalizes backend responses into one
//! result envelope. Everything here is synchronous and performs no I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod clock;
pub mod confirmation;
pub mod context;
pub mod hashing;
pub mod identity;
pub mod naming;
pub mod policy;
pub mod resolver;
pub mod result;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::CatalogEntry;
pub use catalog::PlaybookMapper;
pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use clock::format_rfc3339;
pub use confirmation::CallBinding;
pub use confirmation::ConfirmationClaims;
pub use confirmation::ConfirmationError;
pub use confirmation::ConfirmationIssuer;
pub use confirmation::ConfirmationVerifier;
pub use confirmation::DenyAllVerifier;
pub use confirmation::Ed25519ConfirmationVerifier;
pub use context::ExternalContext;
pub use identity::DEFAULT_PACK;
pub use identity::ToolIdentity;
pub use naming::McpNameError;
pub use naming::McpToolName;
pub use naming::ToolLayer;
pub use naming::from_mcp_name;
pub use naming::to_mcp_name;
pub use policy::AccessDecision;
pub use policy::AccessTier;
pub use policy::Classification;
pub use policy::ClassificationReason;
pub use policy::ClassificationRule;
pub use policy::NamePattern;
pub use policy::PatternRule;
pub use policy::PolicyError;
pub use policy::ToolAccessPolicy;
pub use resolver::KnownPackSet;
pub use resolver::RawToolDescriptor;
pub use resolver::Resolution;
pub use resolver::ResolutionSource;
pub use resolver::ResolverDiagnostic;
pub use resolver::ToolNameResolver;
pub use result::ErrorDetail;
pub use result::LogEntry;
pub use result::ResultMetadata;
pub use result::ToolResult;
pub use result::ToolStatus;
pub use result::format_call_result;
pub use result::format_result;
pub use result::parse_backend_error;
pub use schema::EnvelopeKind;
pub use schema::ToolDefinition;
pub use schema::wrap_input_schema;
