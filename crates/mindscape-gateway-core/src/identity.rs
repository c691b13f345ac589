// crates/mindscape-gateway-core/src/identity.rs
// ============================================================================
// Module: Tool Identity
// Description: Canonical `pack.action` identity for invocable units.
// Purpose: Give tools and playbooks one namespace with a stable canonical form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ToolIdentity`] names one invocable unit (a primitive tool or a playbook
//! action) as a `pack` namespace plus an `action` within it. The canonical
//! dotted form is derived at construction and never drifts from its parts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::mem;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pack assigned when no pack signal is available.
pub const DEFAULT_PACK: &str = "default";

/// Action assigned when a descriptor carries no usable name at all.
pub const UNNAMED_ACTION: &str = "unnamed";

// ============================================================================
// SECTION: Tool Identity
// ============================================================================

/// Canonical identity of a tool or playbook action.
///
/// # Invariants
/// - `canonical == format!("{pack}.{action}")`.
/// - `action` is never empty; `pack` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentityParts", into = "IdentityParts")]
pub struct ToolIdentity {
    /// Namespace grouping (connector or capability pack).
    pack: String,
    /// Operation name within the pack.
    action: String,
    /// Dotted `pack.action` form.
    canonical: String,
}

impl ToolIdentity {
    /// Builds an identity from a pack and action.
    ///
    /// Empty parts degrade to [`DEFAULT_PACK`] and [`UNNAMED_ACTION`] so the
    /// invariants always hold.
    #[must_use]
    pub fn new(pack: impl Into<String>, action: impl Into<String>) -> Self {
        let mut pack = pack.into().trim().to_string();
        let mut action = action.into().trim().to_string();
        if pack.is_empty() {
            pack = DEFAULT_PACK.to_string();
        }
        if action.is_empty() {
            action = UNNAMED_ACTION.to_string();
        }
        let canonical = format!("{pack}.{action}");
        Self {
            pack,
            action,
            canonical,
        }
    }

    /// Parses a dotted canonical string, splitting on the first `.`.
    ///
    /// Strings without a `.` land in the [`DEFAULT_PACK`].
    #[must_use]
    pub fn parse_canonical(value: &str) -> Self {
        match value.split_once('.') {
            Some((pack, action)) => Self::new(pack, action),
            None => Self::new(DEFAULT_PACK, value),
        }
    }

    /// Returns the pack namespace.
    #[must_use]
    pub fn pack(&self) -> &str {
        &self.pack
    }

    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the canonical `pack.action` string.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Returns true when the identity fell back to the default pack.
    #[must_use]
    pub fn is_default_pack(&self) -> bool {
        self.pack == DEFAULT_PACK
    }

    /// Returns the identifier the backend expects for execution.
    ///
    /// Identities in the default pack were reported without a namespace, so
    /// the backend knows them by their bare action.
    #[must_use]
    pub fn backend_id(&self) -> &str {
        if self.is_default_pack() { &self.action } else { &self.canonical }
    }

    /// Returns the lowercase name segments of pack and action.
    ///
    /// See [`split_segments`] for the splitting rules.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        split_segments(&self.canonical)
    }
}

/// Splits a name into lowercase word segments.
///
/// Words are separated by `.`, `_`, `-`, whitespace and camelCase humps, so
/// `crm.adminResetPasswords` yields `crm`, `admin`, `reset`, `passwords` and
/// `HTTPRequest` yields `http`, `request`.
#[must_use]
pub fn split_segments(value: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for piece in value.split(|ch: char| ch == '.' || ch == '_' || ch == '-' || ch.is_whitespace()) {
        let chars: Vec<char> = piece.chars().collect();
        let mut current = String::new();
        for (index, ch) in chars.iter().copied().enumerate() {
            if ch.is_uppercase() && !current.is_empty() {
                let prev = chars[index - 1];
                let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
                let hump = prev.is_lowercase() || prev.is_ascii_digit();
                let acronym_end = prev.is_uppercase() && next_is_lower;
                if hump || acronym_end {
                    segments.push(mem::take(&mut current));
                }
            }
            current.extend(ch.to_lowercase());
        }
        if !current.is_empty() {
            segments.push(current);
        }
    }
    segments
}

impl fmt::Display for ToolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

// ============================================================================
// SECTION: Serde Support
// ============================================================================

/// Wire form of a [`ToolIdentity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityParts {
    /// Pack namespace.
    pack: String,
    /// Action name.
    action: String,
    /// Canonical form (recomputed on input).
    #[serde(default)]
    canonical: String,
}

impl TryFrom<IdentityParts> for ToolIdentity {
    type Error = String;

    fn try_from(parts: IdentityParts) -> Result<Self, Self::Error> {
        if parts.action.trim().is_empty() {
            return Err("tool identity action must not be empty".to_string());
        }
        Ok(Self::new(parts.pack, parts.action))
    }
}

impl From<ToolIdentity> for IdentityParts {
    fn from(identity: ToolIdentity) -> Self {
        Self {
            pack: identity.pack,
            action: identity.action,
            canonical: identity.canonical,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
