// crates/mindscape-gateway-core/src/schema.rs
// ============================================================================
// Module: Call Envelopes
// Description: Uniform input-schema envelopes for listed tools.
// Purpose: Give every listed tool the same predictable top-level call shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Backend tools declare arbitrary parameter schemas. Every listed tool is
//! wrapped into one of two envelopes so callers can predict the top-level
//! shape of any call:
//!
//! - plain: `{ workspace_id, inputs, external_context? }`
//! - governed: plain plus a required `confirm_token`
//!
//! Only the nested `inputs` schema varies per tool. Wrapping is structural;
//! validation of `inputs` beyond "is an object" belongs to the backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Argument carrying the target workspace.
pub const WORKSPACE_ID_FIELD: &str = "workspace_id";

/// Argument carrying tool-specific inputs.
pub const INPUTS_FIELD: &str = "inputs";

/// Argument carrying the confirmation token for governed calls.
pub const CONFIRM_TOKEN_FIELD: &str = "confirm_token";

/// Optional argument carrying call provenance.
pub const EXTERNAL_CONTEXT_FIELD: &str = "external_context";

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// Which envelope a listed tool advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// `workspace_id` and `inputs` only.
    Plain,
    /// Plain plus `confirm_token`.
    Governed,
}

/// Wraps a tool's own parameter schema into a call envelope.
///
/// Non-object tool schemas are replaced by an open object schema.
#[must_use]
pub fn wrap_input_schema(tool_schema: Option<&Value>, kind: EnvelopeKind) -> Value {
    let inputs = match tool_schema {
        Some(schema @ Value::Object(_)) => schema.clone(),
        _ => json!({ "type": "object" }),
    };

    let mut properties = Map::new();
    properties.insert(
        WORKSPACE_ID_FIELD.to_string(),
        json!({ "type": "string", "description": "Target workspace identifier." }),
    );
    properties.insert(INPUTS_FIELD.to_string(), inputs);
    properties.insert(
        EXTERNAL_CONTEXT_FIELD.to_string(),
        json!({
            "type": "object",
            "description": "Optional provenance of the conversational turn behind this call."
        }),
    );

    let mut required = vec![Value::from(WORKSPACE_ID_FIELD), Value::from(INPUTS_FIELD)];
    if kind == EnvelopeKind::Governed {
        properties.insert(
            CONFIRM_TOKEN_FIELD.to_string(),
            json!({
                "type": "string",
                "description": "Confirmation token bound to this action and these inputs."
            }),
        );
        required.push(Value::from(CONFIRM_TOKEN_FIELD));
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

// ============================================================================
// SECTION: Listed Tools
// ============================================================================

/// One entry of a `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// MCP tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Call envelope schema.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
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

    use serde_json::json;

    use super::EnvelopeKind;
    use super::wrap_input_schema;

    /// Returns the `required` names of an envelope.
    fn required(schema: &serde_json::Value) -> Vec<&str> {
        schema["required"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect()
    }

    #[test]
    fn plain_envelope_nests_tool_schema() {
        let tool_schema = json!({"type": "object", "properties": {"page_id": {"type": "integer"}}});
        let envelope = wrap_input_schema(Some(&tool_schema), EnvelopeKind::Plain);
        assert_eq!(envelope["properties"]["inputs"], tool_schema);
        assert_eq!(required(&envelope), vec!["workspace_id", "inputs"]);
        assert!(envelope["properties"].get("confirm_token").is_none());
    }

    #[test]
    fn governed_envelope_requires_token() {
        let envelope = wrap_input_schema(None, EnvelopeKind::Governed);
        assert_eq!(required(&envelope), vec!["workspace_id", "inputs", "confirm_token"]);
        assert_eq!(envelope["properties"]["confirm_token"]["type"], "string");
    }

    #[test]
    fn non_object_schema_becomes_open_object() {
        let envelope = wrap_input_schema(Some(&json!("bogus")), EnvelopeKind::Plain);
        assert_eq!(envelope["properties"]["inputs"], json!({"type": "object"}));
    }
}
