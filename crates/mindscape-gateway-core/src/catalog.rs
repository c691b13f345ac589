// crates/mindscape-gateway-core/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Resolved catalog entries for tools and playbooks.
// Purpose: Put tools and playbooks in one namespace behind one policy pass.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A [`CatalogEntry`] is one backend descriptor after identity resolution,
//! tagged with the layer it is listed under. Tools are listed under
//! [`ToolLayer::Tool`]; [`PlaybookMapper`] lists playbooks under
//! [`ToolLayer::Playbook`] and never under any other layer. Both go through
//! the same [`ToolNameResolver`] so a playbook `wordpress.divi_content_update`
//! and a tool `wordpress.list_posts` share the `wordpress` pack.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::identity::ToolIdentity;
use crate::naming::ToolLayer;
use crate::naming::from_mcp_name;
use crate::naming::to_mcp_name;
use crate::policy::AccessDecision;
use crate::policy::AccessTier;
use crate::resolver::RawToolDescriptor;
use crate::resolver::Resolution;
use crate::resolver::ToolNameResolver;
use crate::schema::CONFIRM_TOKEN_FIELD;
use crate::schema::EnvelopeKind;
use crate::schema::ToolDefinition;
use crate::schema::wrap_input_schema;

// ============================================================================
// SECTION: Catalog Entry
// ============================================================================

/// One resolved descriptor ready for policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Layer the entry is listed under.
    pub layer: ToolLayer,
    /// Resolver output, including diagnostics.
    pub resolution: Resolution,
    /// Backend description, if any.
    pub description: Option<String>,
    /// Backend parameter schema, if any.
    pub input_schema: Option<Value>,
}

impl CatalogEntry {
    /// Resolves a primitive tool descriptor.
    #[must_use]
    pub fn from_tool(resolver: &ToolNameResolver<'_>, descriptor: &RawToolDescriptor) -> Self {
        Self::resolve(resolver, descriptor, ToolLayer::Tool)
    }

    /// Resolves a descriptor under a fixed layer.
    fn resolve(
        resolver: &ToolNameResolver<'_>,
        descriptor: &RawToolDescriptor,
        layer: ToolLayer,
    ) -> Self {
        Self {
            layer,
            resolution: resolver.resolve(descriptor),
            description: descriptor
                .description
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            input_schema: descriptor.input_schema.clone(),
        }
    }

    /// Returns the resolved identity.
    #[must_use]
    pub const fn identity(&self) -> &ToolIdentity {
        &self.resolution.identity
    }

    /// Returns the MCP tool name for this entry.
    #[must_use]
    pub fn mcp_name(&self) -> String {
        to_mcp_name(self.identity(), self.layer)
    }

    /// Returns true when the MCP name decodes back to this identity.
    ///
    /// Packs containing `_` and actions containing `.` do not survive the
    /// trip; calls through such names reach a different identity.
    #[must_use]
    pub fn name_round_trips(&self) -> bool {
        from_mcp_name(&self.mcp_name())
            .is_ok_and(|decoded| decoded.layer == self.layer && decoded.identity == *self.identity())
    }

    /// Builds the listed definition, or `None` when the decision hides it.
    #[must_use]
    pub fn to_definition(&self, decision: AccessDecision) -> Option<ToolDefinition> {
        if !decision.exposed {
            return None;
        }
        let kind = match decision.tier {
            AccessTier::Governed => EnvelopeKind::Governed,
            AccessTier::Primitive | AccessTier::Internal => EnvelopeKind::Plain,
        };
        let base = self.description.clone().unwrap_or_else(|| match self.layer {
            ToolLayer::Playbook | ToolLayer::Run => format!("Playbook {}", self.identity()),
            ToolLayer::Tool | ToolLayer::Lens => format!("Tool {}", self.identity()),
        });
        let description = match kind {
            EnvelopeKind::Governed => {
                format!("{base} (requires `{CONFIRM_TOKEN_FIELD}` bound to the call)")
            }
            EnvelopeKind::Plain => base,
        };
        Some(ToolDefinition {
            name: self.mcp_name(),
            description,
            input_schema: wrap_input_schema(self.input_schema.as_ref(), kind),
        })
    }
}

// ============================================================================
// SECTION: Playbook Mapper
// ============================================================================

/// Adapts playbook descriptors into the shared identity space.
#[derive(Debug, Clone, Copy)]
pub struct PlaybookMapper<'a> {
    /// Resolver shared with tool resolution.
    resolver: ToolNameResolver<'a>,
}

impl<'a> PlaybookMapper<'a> {
    /// Creates a mapper over a resolver.
    #[must_use]
    pub const fn new(resolver: ToolNameResolver<'a>) -> Self {
        Self {
            resolver,
        }
    }

    /// Resolves a playbook descriptor; the layer is always `playbook`.
    #[must_use]
    pub fn map(&self, descriptor: &RawToolDescriptor) -> CatalogEntry {
        CatalogEntry::resolve(&self.resolver, descriptor, ToolLayer::Playbook)
    }
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

    use super::CatalogEntry;
    use super::PlaybookMapper;
    use crate::naming::ToolLayer;
    use crate::policy::AccessDecision;
    use crate::policy::AccessTier;
    use crate::resolver::KnownPackSet;
    use crate::resolver::RawToolDescriptor;
    use crate::resolver::ToolNameResolver;

    #[test]
    fn underscore_packs_do_not_round_trip() {
        let known = KnownPackSet::new(["google_drive", "wordpress"]);
        let resolver = ToolNameResolver::new(&known);
        let lossy =
            CatalogEntry::from_tool(&resolver, &RawToolDescriptor::with_name("google_drive.list_files"));
        assert_eq!(lossy.mcp_name(), "mindscape_tool_google_drive_list_files");
        assert!(!lossy.name_round_trips());
        let exact =
            CatalogEntry::from_tool(&resolver, &RawToolDescriptor::with_name("wordpress.list_posts"));
        assert!(exact.name_round_trips());
    }

    #[test]
    fn playbooks_share_tool_namespace() {
        let known = KnownPackSet::new(["wordpress"]);
        let resolver = ToolNameResolver::new(&known);
        let tool = CatalogEntry::from_tool(&resolver, &RawToolDescriptor::with_name("wordpress.list_posts"));
        let playbook = PlaybookMapper::new(resolver)
            .map(&RawToolDescriptor::with_name("wordpress.divi_content_update"));
        assert_eq!(tool.identity().pack(), playbook.identity().pack());
        assert_eq!(playbook.layer, ToolLayer::Playbook);
        assert_eq!(playbook.mcp_name(), "mindscape_playbook_wordpress_divi_content_update");
    }

    #[test]
    fn internal_entries_have_no_definition() {
        let known = KnownPackSet::default();
        let resolver = ToolNameResolver::new(&known);
        let entry = CatalogEntry::from_tool(&resolver, &RawToolDescriptor::with_full_name("system.migrate_db"));
        assert!(entry.to_definition(AccessDecision::for_listing(AccessTier::Internal)).is_none());
    }

    #[test]
    fn governed_definition_advertises_token() {
        let known = KnownPackSet::default();
        let resolver = ToolNameResolver::new(&known);
        let mut descriptor = RawToolDescriptor::with_full_name("wordpress.delete_page");
        descriptor.description = Some("Delete a page".to_string());
        descriptor.input_schema = Some(json!({"type": "object"}));
        let entry = CatalogEntry::from_tool(&resolver, &descriptor);
        let definition = entry.to_definition(AccessDecision::for_listing(AccessTier::Governed)).unwrap();
        assert_eq!(definition.name, "mindscape_tool_wordpress_delete_page");
        assert!(definition.description.starts_with("Delete a page"));
        let required = definition.input_schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("confirm_token")));
    }
}
