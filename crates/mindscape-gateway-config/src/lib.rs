// crates/mindscape-gateway-config/src/lib.rs
// ============================================================================
// Module: Mindscape Gateway Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for mindscape-gateway.toml semantics.
// Dependencies: mindscape-gateway-core, serde, toml, url
// ============================================================================

//! ## Overview
//! `mindscape-gateway-config` defines the configuration model for the MCP
//! gateway and builds the access policy and confirmation verifier it
//! describes. Validation is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
