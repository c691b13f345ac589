//! Naming and resolution property-based tests.
//!
//! ## Purpose
//! These tests exercise identity resolution and MCP name conversion with
//! randomized descriptors and identities.
//!
//! ## What is covered
//! - Resolution is deterministic for a fixed descriptor and pack set.
//! - Resolved identities always satisfy the canonical-form invariant.
//! - MCP names round-trip for packs without underscores.
//! - Encoded names only use the MCP name charset.
//!
//! ## What is intentionally out of scope
//! - Packs containing underscores (documented lossy decoding).
// crates/mindscape-gateway-core/tests/proptest_naming.rs
// ============================================================================
// Module: Naming Property-Based Tests
// Description: Randomized checks for resolution and MCP name mapping.
// Purpose: Ensure resolution is total and deterministic and names round-trip.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use mindscape_gateway_core::KnownPackSet;
use mindscape_gateway_core::RawToolDescriptor;
use mindscape_gateway_core::ToolIdentity;
use mindscape_gateway_core::ToolLayer;
use mindscape_gateway_core::ToolNameResolver;
use mindscape_gateway_core::from_mcp_name;
use mindscape_gateway_core::to_mcp_name;
use proptest::prelude::*;

fn layer() -> impl Strategy<Value = ToolLayer> {
    prop_oneof![
        Just(ToolLayer::Tool),
        Just(ToolLayer::Playbook),
        Just(ToolLayer::Run),
        Just(ToolLayer::Lens),
    ]
}

fn field() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z ._-]{0,16}")
}

fn descriptor() -> impl Strategy<Value = RawToolDescriptor> {
    (field(), field(), field(), field(), field()).prop_map(
        |(name, pack, code, full_name, provider)| RawToolDescriptor {
            name,
            pack,
            code,
            full_name,
            provider,
            ..RawToolDescriptor::default()
        },
    )
}

proptest! {
    #[test]
    fn resolution_is_deterministic(
        descriptor in descriptor(),
        packs in proptest::collection::vec("[a-z.]{1,8}", 0 .. 6),
    ) {
        let known = KnownPackSet::new(&packs);
        let resolver = ToolNameResolver::new(&known);
        let first = resolver.resolve(&descriptor);
        let second = resolver.resolve(&descriptor);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn resolution_is_total(
        descriptor in descriptor(),
        packs in proptest::collection::vec("[a-z]{1,8}", 0 .. 6),
    ) {
        let known = KnownPackSet::new(&packs);
        let identity = ToolNameResolver::new(&known).resolve(&descriptor).identity;
        prop_assert!(!identity.action().is_empty());
        prop_assert!(!identity.pack().is_empty());
        prop_assert_eq!(identity.canonical(), format!("{}.{}", identity.pack(), identity.action()));
    }

    #[test]
    fn mcp_names_round_trip_without_underscore_packs(
        pack in "[a-z0-9-]{1,12}",
        action in "[a-z0-9_-]{1,20}",
        layer in layer(),
    ) {
        let identity = ToolIdentity::new(pack, action);
        let decoded = from_mcp_name(&to_mcp_name(&identity, layer)).unwrap();
        prop_assert_eq!(decoded.layer, layer);
        prop_assert_eq!(decoded.identity.canonical(), identity.canonical());
    }

    #[test]
    fn encoded_names_use_mcp_charset(
        pack in ".{1,12}",
        action in ".{1,24}",
        layer in layer(),
    ) {
        let name = to_mcp_name(&ToolIdentity::new(pack, action), layer);
        prop_assert!(name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'));
    }

    #[test]
    fn decoding_never_panics(raw in ".{0,48}") {
        let _ = from_mcp_name(&raw);
    }
}
