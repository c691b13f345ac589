// crates/mindscape-gateway-core/src/naming.rs
// ============================================================================
// Module: MCP Tool Naming
// Description: Conversion between canonical identities and MCP tool names.
// Purpose: Map dotted identities onto the MCP `[a-zA-Z0-9_-]` name charset.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! MCP clients only accept tool names drawn from `[a-zA-Z0-9_-]`, so dotted
//! canonical identities are exposed as `mindscape_{layer}_{pack}_{action}`.
//! The reverse mapping recovers the layer by prefix and treats the first
//! underscore-delimited segment as the pack.
//!
//! ## Known Limitation
//! The reverse mapping is lossy when a pack contains an underscore: the name
//! `mindscape_tool_my_pack_run` decodes to pack `my` and action `pack_run`.
//! Round-trips are exact only for packs without underscores. Dots inside an
//! action also come back as underscores.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identity::ToolIdentity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix shared by every externally visible tool name.
pub const MCP_NAME_PREFIX: &str = "mindscape";

// ============================================================================
// SECTION: Layers
// ============================================================================

/// Coarse category embedded in every externally visible tool name.
///
/// # Invariants
/// - The set is closed; names outside it are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolLayer {
    /// Primitive backend tool.
    Tool,
    /// Playbook exposed as a tool.
    Playbook,
    /// Playbook run trigger (always governed).
    Run,
    /// Read-only lens over backend state.
    Lens,
}

impl ToolLayer {
    /// All recognized layers in prefix-match order.
    pub const ALL: [Self; 4] = [Self::Tool, Self::Playbook, Self::Run, Self::Lens];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Playbook => "playbook",
            Self::Run => "run",
            Self::Lens => "lens",
        }
    }
}

impl fmt::Display for ToolLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolLayer {
    type Err = McpNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|layer| layer.as_str() == value)
            .ok_or_else(|| McpNameError::UnknownLayer(value.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while decoding an MCP tool name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpNameError {
    /// The name does not start with the gateway prefix.
    #[error("tool name must start with `{MCP_NAME_PREFIX}_`: {0}")]
    MissingPrefix(String),
    /// The layer segment is not one of the recognized layers.
    #[error("unknown tool layer: {0}")]
    UnknownLayer(String),
    /// The pack/action remainder is missing or incomplete.
    #[error("tool name is missing a pack or action: {0}")]
    Incomplete(String),
    /// The name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("tool name contains illegal characters: {0}")]
    IllegalCharacters(String),
}

// ============================================================================
// SECTION: MCP Tool Name
// ============================================================================

/// A decoded MCP tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpToolName {
    /// Naming layer.
    pub layer: ToolLayer,
    /// Recovered identity.
    pub identity: ToolIdentity,
}

impl McpToolName {
    /// Returns the encoded MCP name for this layer and identity.
    #[must_use]
    pub fn encode(&self) -> String {
        to_mcp_name(&self.identity, self.layer)
    }
}

/// Encodes an identity as `mindscape_{layer}_{pack}_{action}`.
///
/// Dots become underscores; any other character outside the MCP charset is
/// also replaced with an underscore.
#[must_use]
pub fn to_mcp_name(identity: &ToolIdentity, layer: ToolLayer) -> String {
    let raw = format!("{MCP_NAME_PREFIX}_{layer}_{}_{}", identity.pack(), identity.action());
    raw.chars().map(|ch| if is_mcp_name_char(ch) { ch } else { '_' }).collect()
}

/// Decodes an MCP tool name into its layer and identity.
///
/// # Errors
///
/// Returns [`McpNameError`] when the prefix or layer is unknown, when the
/// name has no pack/action remainder, or when it carries illegal characters.
pub fn from_mcp_name(name: &str) -> Result<McpToolName, McpNameError> {
    if !name.chars().all(is_mcp_name_char) {
        return Err(McpNameError::IllegalCharacters(name.to_string()));
    }
    let rest = name
        .strip_prefix(MCP_NAME_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or_else(|| McpNameError::MissingPrefix(name.to_string()))?;
    let (layer, remainder) = ToolLayer::ALL
        .into_iter()
        .find_map(|layer| {
            rest.strip_prefix(layer.as_str())
                .and_then(|tail| tail.strip_prefix('_'))
                .map(|tail| (layer, tail))
        })
        .ok_or_else(|| {
            let label = rest.split('_').next().unwrap_or_default();
            McpNameError::UnknownLayer(label.to_string())
        })?;
    let (pack, action) =
        remainder.split_once('_').ok_or_else(|| McpNameError::Incomplete(name.to_string()))?;
    if pack.is_empty() || action.is_empty() {
        return Err(McpNameError::Incomplete(name.to_string()));
    }
    Ok(McpToolName {
        layer,
        identity: ToolIdentity::new(pack, action),
    })
}

/// Returns true for characters allowed in MCP tool names.
const fn is_mcp_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
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

    use super::McpNameError;
    use super::ToolLayer;
    use super::from_mcp_name;
    use super::to_mcp_name;
    use crate::identity::ToolIdentity;

    #[test]
    fn encodes_dots_as_underscores() {
        let identity = ToolIdentity::new("wordpress", "posts.list");
        assert_eq!(
            to_mcp_name(&identity, ToolLayer::Tool),
            "mindscape_tool_wordpress_posts_list"
        );
    }

    #[test]
    fn encodes_illegal_characters_as_underscores() {
        let identity = ToolIdentity::new("seo", "audit page/v2");
        assert_eq!(to_mcp_name(&identity, ToolLayer::Lens), "mindscape_lens_seo_audit_page_v2");
    }

    #[test]
    fn decodes_layer_pack_and_action() {
        let decoded = from_mcp_name("mindscape_playbook_wordpress_divi_content_update").unwrap();
        assert_eq!(decoded.layer, ToolLayer::Playbook);
        assert_eq!(decoded.identity.pack(), "wordpress");
        assert_eq!(decoded.identity.action(), "divi_content_update");
    }

    #[test]
    fn underscore_pack_decodes_lossily() {
        let identity = ToolIdentity::new("my_pack", "run");
        let decoded = from_mcp_name(&to_mcp_name(&identity, ToolLayer::Tool)).unwrap();
        assert_eq!(decoded.identity.canonical(), "my.pack_run");
    }

    #[test]
    fn rejects_unknown_layer() {
        assert_eq!(
            from_mcp_name("mindscape_widget_wordpress_list"),
            Err(McpNameError::UnknownLayer("widget".to_string()))
        );
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(matches!(
            from_mcp_name("other_tool_wordpress_list"),
            Err(McpNameError::MissingPrefix(_))
        ));
        assert!(matches!(from_mcp_name("mindscapetool_a_b"), Err(McpNameError::MissingPrefix(_))));
    }

    #[test]
    fn rejects_missing_action() {
        assert!(matches!(from_mcp_name("mindscape_tool_wordpress"), Err(McpNameError::Incomplete(_))));
        assert!(matches!(from_mcp_name("mindscape_tool_wordpress_"), Err(McpNameError::Incomplete(_))));
    }

    #[test]
    fn rejects_dotted_names() {
        assert!(matches!(
            from_mcp_name("mindscape_tool_wordpress.list"),
            Err(McpNameError::IllegalCharacters(_))
        ));
    }

    #[test]
    fn layer_parses_from_label() {
        assert_eq!("run".parse::<ToolLayer>(), Ok(ToolLayer::Run));
        assert!("tools".parse::<ToolLayer>().is_err());
    }
}
