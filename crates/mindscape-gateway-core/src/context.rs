// crates/mindscape-gateway-core/src/context.rs
// ============================================================================
// Module: External Context
// Description: Provenance of the conversational turn behind a tool call.
// Purpose: Carry optional surface metadata to the backend and audit trail.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`ExternalContext`] describes where a call came from (chat surface,
//! conversation, user). It is optional; its absence never changes how a call
//! is classified or executed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Provenance attached to a single call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContext {
    /// Message text that triggered the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
    /// Surface kind (for example `slack` or `line`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_type: Option<String>,
    /// User identifier on the surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_user_id: Option<String>,
    /// Conversation identifier on the surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Caller-supplied intent hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_hint: Option<String>,
}

impl ExternalContext {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.original_message.is_none()
            && self.surface_type.is_none()
            && self.surface_user_id.is_none()
            && self.conversation_id.is_none()
            && self.intent_hint.is_none()
    }
}
