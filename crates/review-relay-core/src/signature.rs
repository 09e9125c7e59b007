//! # Webhook Signature Verification
//!
//! Authenticity checks over the exact raw request bytes, before any payload
//! parsing. Each provider signs deliveries with an HMAC-SHA256 scheme of its
//! own shape:
//!
//! | Provider | Header | Signed content | Encoding |
//! |----------|--------|----------------|----------|
//! | Stripe | `Stripe-Signature` | `"{t}.{body}"` | hex |
//! | Square | `x-square-hmacsha256-signature` | notification URL + body | base64 |
//! | Shopify | `X-Shopify-Hmac-Sha256` | body | base64 |
//!
//! A request that fails verification must produce zero side effects. All
//! digest comparisons are constant-time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Provider, Timestamp};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// WebhookSecret
// ============================================================================

/// Signing secret held in memory for the lifetime of a verifier.
///
/// The inner value is zeroized on drop and never appears in `Debug` output.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    /// Wrap a raw secret value (not base64 or hex-encoded).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw secret bytes for HMAC key derivation.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check whether the secret is blank.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WebhookSecret").field(&"<REDACTED>").finish()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for signature verification failures.
///
/// All variants fail closed at the HTTP layer (401); the distinction exists
/// for structured logging and metrics only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is malformed: {message}")]
    Malformed { message: String },

    #[error("Signature digest does not match payload")]
    Mismatch,

    #[error("Signature timestamp is {age_seconds}s old, outside tolerance")]
    Expired { age_seconds: i64 },
}

// ============================================================================
// SignatureVerifier
// ============================================================================

/// Verifies a provider signature against the exact raw request body.
///
/// Implementations hold their secret and are pure over their inputs apart
/// from the system clock (Stripe timestamp tolerance). No IO.
pub trait SignatureVerifier: Send + Sync {
    /// HTTP header carrying the signature for this scheme.
    fn expected_header(&self) -> &'static str;

    /// Verify `signature` over `body`.
    ///
    /// `body` must be the unmodified request bytes; re-serialized JSON will
    /// not verify.
    fn verify(&self, body: &[u8], signature: &str) -> Result<(), SignatureError>;
}

/// Secrets arrive through configuration as literal values. Operators are
/// reminded at startup to rotate them through a secret manager.
fn warn_literal_secret(provider: &str) {
    warn!(
        provider,
        "signing secret supplied as literal configuration; \
         store it in a secret manager before production"
    );
}

fn hmac_sha256(secret: &WebhookSecret) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret.expose().as_bytes()).map_err(|_| {
        SignatureError::Malformed {
            message: "secret cannot be used as HMAC key".to_string(),
        }
    })
}

// ============================================================================
// StripeSignatureVerifier
// ============================================================================

/// Verifier for Stripe's `Stripe-Signature` scheme.
///
/// The header carries comma-separated entries: a `t=<unix-seconds>` timestamp
/// and one or more `v1=<hex-digest>` signatures (multiple appear during
/// secret rotation; any match accepts). The signed content is the literal
/// timestamp string, a `.`, and the raw body.
///
/// Deliveries older than `tolerance` are rejected as replays even when the
/// digest matches. A zero tolerance disables the age check.
pub struct StripeSignatureVerifier {
    secret: WebhookSecret,
    tolerance: Duration,
}

impl StripeSignatureVerifier {
    /// Default replay tolerance, matching Stripe's own SDK verification.
    pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

    pub fn new(secret: WebhookSecret, tolerance: Duration) -> Self {
        warn_literal_secret("stripe");
        Self { secret, tolerance }
    }
}

impl fmt::Debug for StripeSignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeSignatureVerifier")
            .field("secret", &"<REDACTED>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier for StripeSignatureVerifier {
    fn expected_header(&self) -> &'static str {
        "Stripe-Signature"
    }

    fn verify(&self, body: &[u8], signature: &str) -> Result<(), SignatureError> {
        let mut timestamp_raw: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for entry in signature.split(',') {
            let mut parts = entry.trim().splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some("t"), Some(value)) => timestamp_raw = Some(value),
                (Some("v1"), Some(value)) => candidates.push(value),
                // v0 and future schemes are ignored, not rejected
                _ => {}
            }
        }

        let timestamp_raw = timestamp_raw.ok_or_else(|| SignatureError::Malformed {
            message: "missing t= entry".to_string(),
        })?;
        let timestamp = timestamp_raw
            .parse::<i64>()
            .map_err(|_| SignatureError::Malformed {
                message: "timestamp is not an integer".to_string(),
            })?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed {
                message: "missing v1= entry".to_string(),
            });
        }

        // Signed content uses the literal timestamp string from the header.
        let mut mac = hmac_sha256(&self.secret)?;
        mac.update(timestamp_raw.as_bytes());
        mac.update(b".");
        mac.update(body);
        let computed = mac.finalize().into_bytes();

        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| computed.as_slice().ct_eq(&bytes).into())
                .unwrap_or(false)
        });
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        if !self.tolerance.is_zero() {
            let age_seconds = Timestamp::now().unix_seconds() - timestamp;
            if age_seconds > self.tolerance.as_secs() as i64 {
                return Err(SignatureError::Expired { age_seconds });
            }
        }

        Ok(())
    }
}

// ============================================================================
// SquareSignatureVerifier
// ============================================================================

/// Verifier for Square's `x-square-hmacsha256-signature` scheme.
///
/// The signed content is the exact notification URL registered with Square
/// concatenated with the raw body; the header is the base64 digest.
pub struct SquareSignatureVerifier {
    signature_key: WebhookSecret,
    notification_url: String,
}

impl SquareSignatureVerifier {
    pub fn new(signature_key: WebhookSecret, notification_url: impl Into<String>) -> Self {
        warn_literal_secret("square");
        Self {
            signature_key,
            notification_url: notification_url.into(),
        }
    }
}

impl fmt::Debug for SquareSignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SquareSignatureVerifier")
            .field("signature_key", &"<REDACTED>")
            .field("notification_url", &self.notification_url)
            .finish()
    }
}

impl SignatureVerifier for SquareSignatureVerifier {
    fn expected_header(&self) -> &'static str {
        "x-square-hmacsha256-signature"
    }

    fn verify(&self, body: &[u8], signature: &str) -> Result<(), SignatureError> {
        let provided = BASE64
            .decode(signature.trim())
            .map_err(|_| SignatureError::Malformed {
                message: "signature is not valid base64".to_string(),
            })?;

        let mut mac = hmac_sha256(&self.signature_key)?;
        mac.update(self.notification_url.as_bytes());
        mac.update(body);
        let computed = mac.finalize().into_bytes();

        if bool::from(computed.as_slice().ct_eq(&provided)) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

// ============================================================================
// ShopifySignatureVerifier
// ============================================================================

/// Verifier for Shopify's `X-Shopify-Hmac-Sha256` scheme: a base64 HMAC over
/// the raw body, keyed with the app's shared secret.
pub struct ShopifySignatureVerifier {
    shared_secret: WebhookSecret,
}

impl ShopifySignatureVerifier {
    pub fn new(shared_secret: WebhookSecret) -> Self {
        warn_literal_secret("shopify");
        Self { shared_secret }
    }
}

impl fmt::Debug for ShopifySignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopifySignatureVerifier")
            .field("shared_secret", &"<REDACTED>")
            .finish()
    }
}

impl SignatureVerifier for ShopifySignatureVerifier {
    fn expected_header(&self) -> &'static str {
        "X-Shopify-Hmac-Sha256"
    }

    fn verify(&self, body: &[u8], signature: &str) -> Result<(), SignatureError> {
        let provided = BASE64
            .decode(signature.trim())
            .map_err(|_| SignatureError::Malformed {
                message: "signature is not valid base64".to_string(),
            })?;

        let mut mac = hmac_sha256(&self.shared_secret)?;
        mac.update(body);
        let computed = mac.finalize().into_bytes();

        if bool::from(computed.as_slice().ct_eq(&provided)) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

// ============================================================================
// VerifierRegistry
// ============================================================================

/// Maps each configured provider to its signature verifier.
///
/// An absent entry means the provider is not configured; its endpoint fails
/// closed (401) rather than accepting unverified payloads.
pub struct VerifierRegistry {
    verifiers: HashMap<Provider, Arc<dyn SignatureVerifier>>,
}

impl VerifierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    /// Register a verifier for a provider, replacing any existing entry.
    pub fn register(&mut self, provider: Provider, verifier: Arc<dyn SignatureVerifier>) {
        self.verifiers.insert(provider, verifier);
    }

    /// Look up the verifier for a provider.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn SignatureVerifier>> {
        self.verifiers.get(&provider).cloned()
    }

    /// Check whether a provider has a configured verifier.
    pub fn contains(&self, provider: Provider) -> bool {
        self.verifiers.contains_key(&provider)
    }

    /// Providers with configured verifiers.
    pub fn configured(&self) -> Vec<Provider> {
        self.verifiers.keys().copied().collect()
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
