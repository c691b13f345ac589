// crates/mindscape-gateway-core/src/resolver.rs
// ============================================================================
// Module: Tool Name Resolver
// Description: Deterministic identity resolution for backend tool descriptors.
// Purpose: Turn inconsistent backend naming metadata into one canonical identity.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Backend descriptors come from several registries that disagree on how a
//! tool's pack is reported: a dotted `full_name`, a pack-prefixed `name`, an
//! explicit `pack` (string or object), a `provider`, or a `code`. The resolver
//! applies a fixed precedence and always yields exactly one [`ToolIdentity`].
//!
//! ## Precedence (first match wins)
//! 1. `full_name`, split on the first `.` (no dot means the default pack).
//! 2. `name` prefixed by a known pack; a disagreeing explicit pack is recorded
//!    as a [`ResolverDiagnostic::PackConflict`] and the name-derived pack wins.
//! 3. Explicit `pack` (then `provider`) combined with `name`.
//! 4. `code` prefixed by a known pack.
//! 5. Default pack with the bare name.
//!
//! ## Invariants
//! - Resolution never fails; missing data degrades to the default pack.
//! - Output depends only on the descriptor and the known-pack set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use crate::identity::DEFAULT_PACK;
use crate::identity::ToolIdentity;

// ============================================================================
// SECTION: Raw Descriptors
// ============================================================================

/// Tool or playbook descriptor exactly as reported by the backend.
///
/// # Invariants
/// - No field is guaranteed present or consistent with any other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawToolDescriptor {
    /// Reported name, possibly pack-prefixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explicit pack, normalized from a string or `{code|name|id}` object.
    #[serde(default, deserialize_with = "deserialize_pack", skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    /// Registry code, possibly pack-prefixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Fully qualified dotted name.
    #[serde(default, alias = "fullName", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Provider or connector that registered the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backend-specific parameter schema.
    #[serde(
        default,
        alias = "inputSchema",
        alias = "parameters",
        alias = "schema",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

impl RawToolDescriptor {
    /// Builds a descriptor carrying only a `full_name`.
    #[must_use]
    pub fn with_full_name(full_name: impl Into<String>) -> Self {
        Self {
            full_name: Some(full_name.into()),
            ..Self::default()
        }
    }

    /// Builds a descriptor carrying only a `name`.
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Returns the explicit pack signal: `pack`, then `provider`.
    fn declared_pack(&self) -> Option<&str> {
        non_empty(self.pack.as_deref()).or_else(|| non_empty(self.provider.as_deref()))
    }
}

/// Accepts a pack reported as a string, an object, or null.
fn deserialize_pack<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| pack_from_value(&value)))
}

/// Extracts a pack name from a loosely-shaped JSON value.
fn pack_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_empty(Some(text)).map(str::to_string),
        Value::Object(map) => ["code", "name", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .and_then(|text| non_empty(Some(text)))
            .map(str::to_string),
        _ => None,
    }
}

/// Returns the trimmed string when it is non-empty.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

// ============================================================================
// SECTION: Known Packs
// ============================================================================

/// Snapshot of pack names used for prefix matching.
///
/// # Invariants
/// - Immutable once built; refreshes replace the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownPackSet {
    /// Known pack names.
    packs: BTreeSet<String>,
}

impl KnownPackSet {
    /// Builds a set from pack names, ignoring blanks.
    #[must_use]
    pub fn new<I, S>(packs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let packs = packs
            .into_iter()
            .filter_map(|pack| non_empty(Some(pack.as_ref())).map(str::to_string))
            .collect();
        Self {
            packs,
        }
    }

    /// Derives the pack set advertised by a batch of descriptors.
    ///
    /// Packs come from explicit `pack`/`provider` fields and from dotted
    /// `full_name` prefixes, merged with `seeds`.
    #[must_use]
    pub fn from_descriptors<'a, I, S>(descriptors: I, seeds: &[S]) -> Self
    where
        I: IntoIterator<Item = &'a RawToolDescriptor>,
        S: AsRef<str>,
    {
        let mut packs: BTreeSet<String> = Self::new(seeds).packs;
        for descriptor in descriptors {
            if let Some(pack) = non_empty(descriptor.pack.as_deref()) {
                packs.insert(pack.to_string());
            }
            if let Some(provider) = non_empty(descriptor.provider.as_deref()) {
                packs.insert(provider.to_string());
            }
            if let Some((pack, _)) =
                non_empty(descriptor.full_name.as_deref()).and_then(|full| full.split_once('.'))
                && !pack.is_empty()
            {
                packs.insert(pack.to_string());
            }
        }
        Self {
            packs,
        }
    }

    /// Returns true when the pack is known.
    #[must_use]
    pub fn contains(&self, pack: &str) -> bool {
        self.packs.contains(pack)
    }

    /// Returns the number of known packs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Returns true when no packs are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Iterates the known packs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.packs.iter().map(String::as_str)
    }

    /// Splits `value` as `<known-pack>.<action>`, preferring the longest pack.
    fn split_prefixed<'v>(&self, value: &'v str) -> Option<(&'v str, &'v str)> {
        self.packs
            .iter()
            .filter(|pack| {
                value.len() > pack.len() + 1
                    && value.starts_with(pack.as_str())
                    && value.as_bytes().get(pack.len()) == Some(&b'.')
            })
            .max_by_key(|pack| pack.len())
            .map(|pack| (&value[.. pack.len()], &value[pack.len() + 1 ..]))
    }
}

// ============================================================================
// SECTION: Resolution Output
// ============================================================================

/// Which descriptor signal produced the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Dotted `full_name`.
    FullName,
    /// Known-pack prefix on `name`.
    NamePrefix,
    /// Explicit `pack` or `provider` field.
    DeclaredPack,
    /// Known-pack prefix on `code`.
    CodePrefix,
    /// Default pack fallback.
    Fallback,
}

/// Data-quality signal collected during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolverDiagnostic {
    /// The name-derived pack disagrees with the declared pack.
    PackConflict {
        /// Reported name.
        name: String,
        /// Pack derived from the name prefix (used).
        name_pack: String,
        /// Pack declared on the descriptor (ignored).
        declared_pack: String,
    },
    /// No `full_name`, `name`, or `code` was present.
    MissingName,
    /// The listed MCP name decodes to a different identity.
    ///
    /// Raised by listing, not by [`ToolNameResolver::resolve`].
    AmbiguousMcpName {
        /// Name advertised to clients.
        mcp_name: String,
    },
    /// Another identity already claimed this MCP name; this one was dropped.
    ///
    /// Raised by listing, not by [`ToolNameResolver::resolve`].
    DuplicateMcpName {
        /// Contested name.
        mcp_name: String,
        /// Canonical identity that kept the name.
        kept: String,
    },
}

/// Resolved identity together with its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical identity.
    pub identity: ToolIdentity,
    /// Signal that produced the identity.
    pub source: ResolutionSource,
    /// Diagnostics recorded along the way (may be empty).
    pub diagnostics: Vec<ResolverDiagnostic>,
}

impl Resolution {
    /// Returns true when resolution recorded no diagnostics.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns true when the descriptor carried no usable name.
    #[must_use]
    pub fn is_unnamed(&self) -> bool {
        self.diagnostics.contains(&ResolverDiagnostic::MissingName)
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Stateless resolver over a borrowed known-pack snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ToolNameResolver<'a> {
    /// Known packs used for prefix matching.
    known_packs: &'a KnownPackSet,
}

impl<'a> ToolNameResolver<'a> {
    /// Creates a resolver bound to a known-pack snapshot.
    #[must_use]
    pub const fn new(known_packs: &'a KnownPackSet) -> Self {
        Self {
            known_packs,
        }
    }

    /// Resolves one descriptor into a canonical identity.
    #[must_use]
    pub fn resolve(&self, descriptor: &RawToolDescriptor) -> Resolution {
        if let Some(full_name) = non_empty(descriptor.full_name.as_deref()) {
            return clean(ToolIdentity::parse_canonical(full_name), ResolutionSource::FullName);
        }

        let name = non_empty(descriptor.name.as_deref());
        if let Some(name) = name
            && let Some((pack, action)) = self.known_packs.split_prefixed(name)
        {
            let mut diagnostics = Vec::new();
            if let Some(declared) = descriptor.declared_pack()
                && declared != pack
            {
                diagnostics.push(ResolverDiagnostic::PackConflict {
                    name: name.to_string(),
                    name_pack: pack.to_string(),
                    declared_pack: declared.to_string(),
                });
            }
            return Resolution {
                identity: ToolIdentity::new(pack, action),
                source: ResolutionSource::NamePrefix,
                diagnostics,
            };
        }

        let code = non_empty(descriptor.code.as_deref());
        if let Some(declared) = descriptor.declared_pack() {
            let Some(action) = name.or(code) else {
                return unnamed(declared, ResolutionSource::DeclaredPack);
            };
            let action = action
                .strip_prefix(declared)
                .and_then(|rest| rest.strip_prefix('.'))
                .filter(|rest| !rest.is_empty())
                .unwrap_or(action);
            return clean(ToolIdentity::new(declared, action), ResolutionSource::DeclaredPack);
        }

        if let Some((pack, action)) = code.and_then(|code| self.known_packs.split_prefixed(code)) {
            return clean(ToolIdentity::new(pack, action), ResolutionSource::CodePrefix);
        }

        match name.or(code) {
            Some(action) => clean(ToolIdentity::new(DEFAULT_PACK, action), ResolutionSource::Fallback),
            None => unnamed(DEFAULT_PACK, ResolutionSource::Fallback),
        }
    }
}

/// Builds a diagnostic-free resolution.
fn clean(identity: ToolIdentity, source: ResolutionSource) -> Resolution {
    Resolution {
        identity,
        source,
        diagnostics: Vec::new(),
    }
}

/// Builds a resolution for a descriptor without any usable name.
fn unnamed(pack: &str, source: ResolutionSource) -> Resolution {
    Resolution {
        identity: ToolIdentity::new(pack, ""),
        source,
        diagnostics: vec![ResolverDiagnostic::MissingName],
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
