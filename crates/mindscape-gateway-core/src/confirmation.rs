// crates/mindscape-gateway-core/src/confirmation.rs
// ============================================================================
// Module: Confirmation Tokens
// Description: Call-bound, time-limited confirmation tokens for governed tools.
// Purpose: Authorize one governed call without allowing replay on other inputs.
// Dependencies: base64, ed25519-dalek, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Governed calls must carry a confirmation token minted by an external
//! authority. A token is `base64url(claims_json) "." base64url(signature)`
//! where the Ed25519 signature covers the raw claims bytes and the claims bind
//! the token to one call:
//!
//! - `action`: canonical identity
//! - `workspace_id`: target workspace
//! - `inputs_hash`: digest of the RFC 8785 canonical form of `inputs`
//! - `issued_at` / `expires_at`: unix seconds
//!
//! ## Invariants
//! - A token verified for one `(action, workspace_id, inputs)` never verifies
//!   for any other.
//! - Every rejection reason, expiry included, means "no valid token".

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as Base64Url;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::hashing::digest_canonical_json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum validity window in seconds.
pub const DEFAULT_MAX_TTL_SECONDS: i64 = 900;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Signed claims carried by a confirmation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationClaims {
    /// Canonical identity the token approves.
    pub action: String,
    /// Workspace the token approves.
    pub workspace_id: String,
    /// Digest of the approved inputs.
    pub inputs_hash: String,
    /// Issue time in unix seconds.
    pub issued_at: i64,
    /// Expiry time in unix seconds (exclusive).
    pub expires_at: i64,
}

/// The call a token must be bound to.
#[derive(Debug, Clone, Copy)]
pub struct CallBinding<'a> {
    /// Canonical identity being called.
    pub action: &'a str,
    /// Target workspace.
    pub workspace_id: &'a str,
    /// Call inputs.
    pub inputs: &'a Map<String, Value>,
}

impl CallBinding<'_> {
    /// Returns the digest of the bound inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Hash`] when canonicalization fails.
    pub fn inputs_hash(&self) -> Result<String, ConfirmationError> {
        digest_canonical_json(self.inputs).map_err(|err| ConfirmationError::Hash(err.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    /// No verifying key is configured.
    #[error("confirmation verification is not configured")]
    NotConfigured,
    /// The token is not `claims.signature` in base64url.
    #[error("malformed confirmation token")]
    Malformed,
    /// The signature does not verify.
    #[error("confirmation token signature is invalid")]
    BadSignature,
    /// The token approves a different action.
    #[error("confirmation token is bound to a different action")]
    ActionMismatch,
    /// The token approves a different workspace.
    #[error("confirmation token is bound to a different workspace")]
    WorkspaceMismatch,
    /// The token approves different inputs.
    #[error("confirmation token is bound to different inputs")]
    InputsMismatch,
    /// The token is not valid yet.
    #[error("confirmation token is not yet valid")]
    NotYetValid,
    /// The token has expired.
    #[error("confirmation token has expired")]
    Expired,
    /// The validity window exceeds the configured maximum.
    #[error("confirmation token validity window exceeds {0} seconds")]
    WindowTooLong(i64),
    /// The verifying or signing key is invalid.
    #[error("invalid confirmation key: {0}")]
    InvalidKey(String),
    /// Inputs could not be hashed.
    #[error("failed to hash inputs: {0}")]
    Hash(String),
}

impl ConfirmationError {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::ActionMismatch => "action_mismatch",
            Self::WorkspaceMismatch => "workspace_mismatch",
            Self::InputsMismatch => "inputs_mismatch",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::WindowTooLong(_) => "window_too_long",
            Self::InvalidKey(_) => "invalid_key",
            Self::Hash(_) => "hash_failed",
        }
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Validates confirmation tokens against the call they accompany.
pub trait ConfirmationVerifier: Send + Sync {
    /// Returns the claims when `token` is valid for `binding` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError`] describing why the token was rejected.
    fn verify(
        &self,
        token: &str,
        binding: &CallBinding<'_>,
        now: i64,
    ) -> Result<ConfirmationClaims, ConfirmationError>;
}

/// Verifier used when no issuing authority is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllVerifier;

impl ConfirmationVerifier for DenyAllVerifier {
    fn verify(
        &self,
        _token: &str,
        _binding: &CallBinding<'_>,
        _now: i64,
    ) -> Result<ConfirmationClaims, ConfirmationError> {
        Err(ConfirmationError::NotConfigured)
    }
}

/// Ed25519 verifier for tokens minted by the issuing authority.
#[derive(Debug, Clone)]
pub struct Ed25519ConfirmationVerifier {
    /// Issuer public key.
    key: VerifyingKey,
    /// Maximum accepted `expires_at - issued_at`.
    max_ttl_seconds: i64,
}

impl Ed25519ConfirmationVerifier {
    /// Creates a verifier from a public key.
    #[must_use]
    pub const fn new(key: VerifyingKey, max_ttl_seconds: i64) -> Self {
        Self {
            key,
            max_ttl_seconds,
        }
    }

    /// Creates a verifier from a standard base64 public key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::InvalidKey`] when decoding fails.
    pub fn from_base64(text: &str, max_ttl_seconds: i64) -> Result<Self, ConfirmationError> {
        let bytes = Base64
            .decode(text.trim())
            .map_err(|_| ConfirmationError::InvalidKey("invalid base64 public key".to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ConfirmationError::InvalidKey("public key must be 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| ConfirmationError::InvalidKey("invalid ed25519 public key".to_string()))?;
        Ok(Self::new(key, max_ttl_seconds))
    }
}

impl ConfirmationVerifier for Ed25519ConfirmationVerifier {
    fn verify(
        &self,
        token: &str,
        binding: &CallBinding<'_>,
        now: i64,
    ) -> Result<ConfirmationClaims, ConfirmationError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(ConfirmationError::Malformed)?;
        let payload = Base64Url.decode(payload).map_err(|_| ConfirmationError::Malformed)?;
        let signature = Base64Url.decode(signature).map_err(|_| ConfirmationError::Malformed)?;
        let signature =
            Signature::from_slice(&signature).map_err(|_| ConfirmationError::Malformed)?;
        self.key
            .verify_strict(&payload, &signature)
            .map_err(|_| ConfirmationError::BadSignature)?;
        let claims: ConfirmationClaims =
            serde_json::from_slice(&payload).map_err(|_| ConfirmationError::Malformed)?;

        if claims.action != binding.action {
            return Err(ConfirmationError::ActionMismatch);
        }
        if claims.workspace_id != binding.workspace_id {
            return Err(ConfirmationError::WorkspaceMismatch);
        }
        if claims.inputs_hash != binding.inputs_hash()? {
            return Err(ConfirmationError::InputsMismatch);
        }
        if claims.expires_at.saturating_sub(claims.issued_at) > self.max_ttl_seconds {
            return Err(ConfirmationError::WindowTooLong(self.max_ttl_seconds));
        }
        if now < claims.issued_at {
            return Err(ConfirmationError::NotYetValid);
        }
        if now >= claims.expires_at {
            return Err(ConfirmationError::Expired);
        }
        Ok(claims)
    }
}

// ============================================================================
// SECTION: Issuance
// ============================================================================

/// Mints tokens for the issuing authority.
#[derive(Debug, Clone)]
pub struct ConfirmationIssuer {
    /// Issuer signing key.
    key: SigningKey,
}

impl ConfirmationIssuer {
    /// Creates an issuer from a 32-byte secret key.
    #[must_use]
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Returns the matching public key as standard base64.
    #[must_use]
    pub fn verifying_key_base64(&self) -> String {
        Base64.encode(self.key.verifying_key().as_bytes())
    }

    /// Mints a token for `binding`, valid from `issued_at` for `ttl_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Hash`] when inputs cannot be hashed.
    pub fn issue(
        &self,
        binding: &CallBinding<'_>,
        issued_at: i64,
        ttl_seconds: i64,
    ) -> Result<String, ConfirmationError> {
        let claims = ConfirmationClaims {
            action: binding.action.to_string(),
            workspace_id: binding.workspace_id.to_string(),
            inputs_hash: binding.inputs_hash()?,
            issued_at,
            expires_at: issued_at.saturating_add(ttl_seconds),
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|err| ConfirmationError::Hash(err.to_string()))?;
        let signature = self.key.sign(&payload);
        Ok(format!(
            "{}.{}",
            Base64Url.encode(&payload),
            Base64Url.encode(signature.to_bytes())
        ))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
