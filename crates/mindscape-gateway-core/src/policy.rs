// crates/mindscape-gateway-core/src/policy.rs
// ============================================================================
// Module: Tool Access Policy
// Description: Risk-tier classification for resolved tool identities.
// Purpose: Decide listing visibility and confirmation gating per identity.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every resolved identity is classified into exactly one [`AccessTier`]:
//! `internal` identities are hidden from external listings and cannot be
//! called, `governed` identities require a confirmation token bound to the
//! call, and everything else is `primitive`.
//!
//! ## Rule Order (first match wins)
//! 1. Host-supplied [`ClassificationRule`]s, in registration order.
//! 2. Any name segment in the blocked set -> `internal`.
//! 3. A governed pattern occurs as a verb in the action, or the layer is
//!    [`ToolLayer::Run`] -> `governed`.
//! 4. Otherwise -> `primitive`.
//!
//! Name segments are the lowercase words of the canonical identity, split on
//! `.`, `_`, `-`, whitespace and camelCase humps, so `system.migrate_db` and
//! `core.systemMigrate` both contain `system` and `migrate`. Blocked segments
//! match anywhere in the name.
//!
//! Governed patterns are verbs. They match when they lead the action or when
//! more segments follow them: `update_page_content`, `deletePage` and
//! `bulk_delete_posts` are governed. A pattern that only ends the action reads
//! as a trailing noun and does not match, so `divi_content_update` and
//! `post_delete` stay primitive unless a custom rule says otherwise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identity::ToolIdentity;
use crate::identity::split_segments;
use crate::naming::ToolLayer;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Segments that mark an identity as internal-only.
pub const DEFAULT_BLOCKED_SEGMENTS: &[&str] = &["system", "migrate", "debug", "admin"];

/// Mutating or destructive patterns that mark an identity as governed.
pub const DEFAULT_GOVERNED_PATTERNS: &[&str] =
    &["delete", "update", "write", "merge", "remove", "execute_shell"];

// ============================================================================
// SECTION: Tiers and Decisions
// ============================================================================

/// Access classification for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Hidden from listings and never callable externally.
    Internal,
    /// Listed and callable without confirmation.
    Primitive,
    /// Listed; calls require a bound confirmation token.
    Governed,
}

impl AccessTier {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Primitive => "primitive",
            Self::Governed => "governed",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = PolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "internal" => Ok(Self::Internal),
            "primitive" => Ok(Self::Primitive),
            "governed" => Ok(Self::Governed),
            other => Err(PolicyError::UnknownTier(other.to_string())),
        }
    }
}

/// Policy outcome for one identity.
///
/// # Invariants
/// - `tier == Internal` implies `!exposed`.
/// - `requires_confirmation` implies `tier == Governed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    /// Assigned tier.
    pub tier: AccessTier,
    /// Whether the identity appears in external listings.
    pub exposed: bool,
    /// Whether the call must be confirmed before execution.
    pub requires_confirmation: bool,
}

impl AccessDecision {
    /// Decision at listing time, where no token can be present.
    #[must_use]
    pub const fn for_listing(tier: AccessTier) -> Self {
        Self::for_call(tier, false)
    }

    /// Decision at call time given whether a valid bound token was presented.
    #[must_use]
    pub const fn for_call(tier: AccessTier, has_valid_token: bool) -> Self {
        Self {
            tier,
            exposed: !matches!(tier, AccessTier::Internal),
            requires_confirmation: matches!(tier, AccessTier::Governed) && !has_valid_token,
        }
    }
}

/// Why an identity received its tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationReason {
    /// A host-supplied rule matched.
    CustomRule {
        /// Rule label.
        rule: String,
    },
    /// A blocked segment matched.
    BlockedSegment {
        /// Matching segment.
        segment: String,
    },
    /// A governed pattern matched.
    GovernedPattern {
        /// Matching pattern.
        pattern: String,
    },
    /// The identity was addressed through the run layer.
    RunLayer,
    /// No rule matched.
    Default,
}

/// Tier plus the reason it was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Assigned tier.
    pub tier: AccessTier,
    /// Matching rule.
    pub reason: ClassificationReason,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building policy rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Unknown tier label.
    #[error("unknown access tier: {0}")]
    UnknownTier(String),
    /// Invalid name pattern.
    #[error("invalid name pattern: {0}")]
    InvalidPattern(String),
}

// ============================================================================
// SECTION: Custom Rules
// ============================================================================

/// Host-supplied classification override, consulted before the defaults.
pub trait ClassificationRule: Send + Sync {
    /// Returns a tier when the rule applies to the identity.
    fn classify(&self, identity: &ToolIdentity, layer: ToolLayer) -> Option<AccessTier>;

    /// Returns a label used in audit output.
    fn label(&self) -> String;
}

/// Pattern over a pack or action name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// Matches anything (`*`).
    Any,
    /// Matches names starting with the prefix (`foo*`).
    Prefix(String),
    /// Matches one exact name.
    Exact(String),
}

impl NamePattern {
    /// Returns true when the value matches.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Self::Exact(exact) => value == exact,
        }
    }
}

impl FromStr for NamePattern {
    type Err = PolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value == "*" {
            return Ok(Self::Any);
        }
        if value.is_empty() {
            return Err(PolicyError::InvalidPattern("pattern must not be empty".to_string()));
        }
        match value.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => Err(PolicyError::InvalidPattern(value.to_string())),
            Some(prefix) => Ok(Self::Prefix(prefix.to_string())),
            None if value.contains('*') => Err(PolicyError::InvalidPattern(value.to_string())),
            None => Ok(Self::Exact(value.to_string())),
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

/// Declarative rule matching pack, action, and optionally layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    /// Pack pattern.
    pub pack: NamePattern,
    /// Action pattern.
    pub action: NamePattern,
    /// Optional layer restriction.
    pub layer: Option<ToolLayer>,
    /// Tier assigned on match.
    pub tier: AccessTier,
}

impl PatternRule {
    /// Parses a rule from pattern strings.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when a pattern or tier is invalid.
    pub fn parse(
        pack: &str,
        action: &str,
        layer: Option<ToolLayer>,
        tier: AccessTier,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            pack: pack.parse()?,
            action: action.parse()?,
            layer,
            tier,
        })
    }
}

impl ClassificationRule for PatternRule {
    fn classify(&self, identity: &ToolIdentity, layer: ToolLayer) -> Option<AccessTier> {
        let layer_matches = self.layer.is_none_or(|expected| expected == layer);
        (layer_matches && self.pack.matches(identity.pack()) && self.action.matches(identity.action()))
            .then_some(self.tier)
    }

    fn label(&self) -> String {
        match self.layer {
            Some(layer) => format!("{layer}:{}.{} -> {}", self.pack, self.action, self.tier),
            None => format!("{}.{} -> {}", self.pack, self.action, self.tier),
        }
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Ordered rule set mapping identities to tiers.
///
/// # Invariants
/// - Classification is total: every identity receives exactly one tier.
#[derive(Clone)]
pub struct ToolAccessPolicy {
    /// Host rules consulted before the defaults.
    custom_rules: Vec<Arc<dyn ClassificationRule>>,
    /// Segments that mark an identity internal.
    blocked_segments: BTreeSet<String>,
    /// Leading action segment sequences that mark an identity governed.
    governed_patterns: Vec<Vec<String>>,
}

impl fmt::Debug for ToolAccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.custom_rules.iter().map(|rule| rule.label()).collect();
        f.debug_struct("ToolAccessPolicy")
            .field("custom_rules", &labels)
            .field("blocked_segments", &self.blocked_segments)
            .field("governed_patterns", &self.governed_patterns)
            .finish()
    }
}

impl Default for ToolAccessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_SEGMENTS, DEFAULT_GOVERNED_PATTERNS)
    }
}

impl ToolAccessPolicy {
    /// Builds a policy from blocked segments and governed patterns.
    #[must_use]
    pub fn new<S: AsRef<str>>(blocked_segments: &[S], governed_patterns: &[S]) -> Self {
        let blocked_segments = blocked_segments
            .iter()
            .map(|segment| segment.as_ref().trim().to_ascii_lowercase())
            .filter(|segment| !segment.is_empty())
            .collect();
        let governed_patterns = governed_patterns
            .iter()
            .map(|pattern| split_segments(pattern.as_ref()))
            .filter(|segments| !segments.is_empty())
            .collect();
        Self {
            custom_rules: Vec::new(),
            blocked_segments,
            governed_patterns,
        }
    }

    /// Returns a copy with an additional custom rule appended.
    #[must_use]
    pub fn with_rule(mut self, rule: Arc<dyn ClassificationRule>) -> Self {
        self.custom_rules.push(rule);
        self
    }

    /// Classifies an identity addressed through `layer`.
    #[must_use]
    pub fn classify(&self, identity: &ToolIdentity, layer: ToolLayer) -> Classification {
        for rule in &self.custom_rules {
            if let Some(tier) = rule.classify(identity, layer) {
                return Classification {
                    tier,
                    reason: ClassificationReason::CustomRule {
                        rule: rule.label(),
                    },
                };
            }
        }

        let segments = identity.segments();
        if let Some(segment) = segments.iter().find(|segment| self.blocked_segments.contains(*segment))
        {
            return Classification {
                tier: AccessTier::Internal,
                reason: ClassificationReason::BlockedSegment {
                    segment: segment.clone(),
                },
            };
        }

        let action_segments = split_segments(identity.action());
        if let Some(pattern) =
            self.governed_patterns.iter().find(|pattern| governs_action(&action_segments, pattern))
        {
            return Classification {
                tier: AccessTier::Governed,
                reason: ClassificationReason::GovernedPattern {
                    pattern: pattern.join("_"),
                },
            };
        }

        if layer == ToolLayer::Run {
            return Classification {
                tier: AccessTier::Governed,
                reason: ClassificationReason::RunLayer,
            };
        }

        Classification {
            tier: AccessTier::Primitive,
            reason: ClassificationReason::Default,
        }
    }

    /// Returns the listing-time decision for an identity.
    #[must_use]
    pub fn evaluate(&self, identity: &ToolIdentity, layer: ToolLayer) -> AccessDecision {
        AccessDecision::for_listing(self.classify(identity, layer).tier)
    }
}

/// Returns true when `pattern` occurs in `action` as a verb.
///
/// A verb either leads the action or is followed by at least one more
/// segment. A pattern that only closes the action is a trailing noun.
fn governs_action(action: &[String], pattern: &[String]) -> bool {
    if action.starts_with(pattern) {
        return true;
    }
    action.len() > pattern.len()
        && action[.. action.len() - 1].windows(pattern.len()).any(|window| window == pattern)
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

    use std::sync::Arc;

    use super::AccessDecision;
    use super::AccessTier;
    use super::ClassificationReason;
    use super::NamePattern;
    use super::PatternRule;
    use super::ToolAccessPolicy;
    use crate::identity::ToolIdentity;
    use crate::naming::ToolLayer;

    fn tier(policy: &ToolAccessPolicy, canonical: &str, layer: ToolLayer) -> AccessTier {
        policy.classify(&ToolIdentity::parse_canonical(canonical), layer).tier
    }

    #[test]
    fn blocked_segments_are_internal() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "system.migrate_db", ToolLayer::Tool), AccessTier::Internal);
        assert_eq!(tier(&policy, "wordpress.debug_dump", ToolLayer::Tool), AccessTier::Internal);
        assert_eq!(tier(&policy, "crm.admin", ToolLayer::Tool), AccessTier::Internal);
    }

    #[test]
    fn blocked_match_requires_whole_segment() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "crm.list_administrators", ToolLayer::Tool), AccessTier::Primitive);
        assert_eq!(tier(&policy, "weather.systemic_risk", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn internal_wins_over_governed() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "system.delete_cache", ToolLayer::Tool), AccessTier::Internal);
    }

    #[test]
    fn mutating_verbs_are_governed() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "wordpress.delete_page", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(
            tier(&policy, "wordpress.update_page_content", ToolLayer::Tool),
            AccessTier::Governed
        );
        assert_eq!(tier(&policy, "git.merge", ToolLayer::Tool), AccessTier::Governed);
    }

    #[test]
    fn governed_verbs_ignore_pack_and_trailing_position() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(
            tier(&policy, "wordpress.divi_content_update", ToolLayer::Playbook),
            AccessTier::Primitive
        );
        assert_eq!(tier(&policy, "update.list_posts", ToolLayer::Tool), AccessTier::Primitive);
        assert_eq!(tier(&policy, "crm.updated_since", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn camel_case_blocked_segments_are_internal() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "core.systemMigrate", ToolLayer::Tool), AccessTier::Internal);
        assert_eq!(tier(&policy, "crm.adminResetPasswords", ToolLayer::Tool), AccessTier::Internal);
        assert_eq!(tier(&policy, "crm.listAdministrators", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn camel_case_verbs_are_governed() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "wordpress.deletePage", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(tier(&policy, "host.executeShell", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(tier(&policy, "crm.DeleteContact", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(tier(&policy, "crm.getUpdatedSince", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn verbs_inside_the_action_are_governed() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "wordpress.bulk_delete_posts", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(tier(&policy, "crm.contacts_merge_duplicates", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(tier(&policy, "host.run_execute_shell_now", ToolLayer::Tool), AccessTier::Governed);
    }

    #[test]
    fn trailing_verbs_are_read_as_nouns() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "wordpress.post_delete", ToolLayer::Tool), AccessTier::Primitive);
        assert_eq!(tier(&policy, "crm.lastUpdate", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn multi_segment_pattern_requires_sequence() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "host.execute_shell", ToolLayer::Tool), AccessTier::Governed);
        assert_eq!(tier(&policy, "host.execute_query", ToolLayer::Tool), AccessTier::Primitive);
        assert_eq!(tier(&policy, "host.shell_execute", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn run_layer_is_governed() {
        let policy = ToolAccessPolicy::default();
        assert_eq!(tier(&policy, "wordpress.list_posts", ToolLayer::Run), AccessTier::Governed);
        assert_eq!(tier(&policy, "wordpress.list_posts", ToolLayer::Tool), AccessTier::Primitive);
    }

    #[test]
    fn custom_rules_run_before_defaults() {
        let rule = PatternRule::parse("wordpress", "update_cache", None, AccessTier::Primitive).unwrap();
        let policy = ToolAccessPolicy::default().with_rule(Arc::new(rule));
        let classification =
            policy.classify(&ToolIdentity::new("wordpress", "update_cache"), ToolLayer::Tool);
        assert_eq!(classification.tier, AccessTier::Primitive);
        assert!(matches!(classification.reason, ClassificationReason::CustomRule { .. }));
    }

    #[test]
    fn custom_rule_can_expose_internal_identity() {
        let rule = PatternRule::parse("system", "migrate*", None, AccessTier::Governed).unwrap();
        let policy = ToolAccessPolicy::default().with_rule(Arc::new(rule));
        assert_eq!(tier(&policy, "system.migrate_db", ToolLayer::Tool), AccessTier::Governed);
    }

    #[test]
    fn layer_restricted_rule_only_applies_to_that_layer() {
        let rule =
            PatternRule::parse("*", "*", Some(ToolLayer::Lens), AccessTier::Primitive).unwrap();
        let policy = ToolAccessPolicy::default().with_rule(Arc::new(rule));
        assert_eq!(tier(&policy, "crm.delete_contact", ToolLayer::Lens), AccessTier::Primitive);
        assert_eq!(tier(&policy, "crm.delete_contact", ToolLayer::Tool), AccessTier::Governed);
    }

    #[test]
    fn name_patterns_parse() {
        assert_eq!("*".parse::<NamePattern>(), Ok(NamePattern::Any));
        assert_eq!("list_*".parse::<NamePattern>(), Ok(NamePattern::Prefix("list_".to_string())));
        assert_eq!("seo".parse::<NamePattern>(), Ok(NamePattern::Exact("seo".to_string())));
        assert!("a*b".parse::<NamePattern>().is_err());
        assert!("".parse::<NamePattern>().is_err());
    }

    #[test]
    fn decisions_respect_invariants() {
        let internal = AccessDecision::for_listing(AccessTier::Internal);
        assert!(!internal.exposed);
        assert!(!internal.requires_confirmation);
        let governed = AccessDecision::for_listing(AccessTier::Governed);
        assert!(governed.exposed);
        assert!(governed.requires_confirmation);
        let confirmed = AccessDecision::for_call(AccessTier::Governed, true);
        assert!(!confirmed.requires_confirmation);
        let primitive = AccessDecision::for_call(AccessTier::Primitive, false);
        assert!(!primitive.requires_confirmation);
    }
}
