//! # Event Normalization
//!
//! Turns verified provider payloads into a provider-neutral shape the rest
//! of the pipeline can evaluate. Routing is a single match on
//! `(provider, event_type)`; each handler owns the payload knowledge for one
//! event type and nothing else.
//!
//! A handler produces either a [`TransactionCandidate`] (a purchase worth
//! evaluating for dispatch) or [`NormalizedEvent::Ignored`] with a reason
//! (a recognized delivery with nothing to act on). Unknown event types are
//! ignored, not rejected; providers must keep seeing success for event types
//! outside this service's interest.
//!
//! Monetary conversion happens here exactly once: integer minor units for
//! Stripe and Square, decimal strings for Shopify.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::EventLedger;
use crate::{
    CorrelationId, Decimal, Provider, SkipReason, StoreError, Timestamp, TransactionOrigin,
    UserId,
};

mod shopify;
mod square;
mod stripe;

// ============================================================================
// WebhookEvent
// ============================================================================

/// Verified webhook delivery as handed off by the HTTP layer.
///
/// The payload has passed signature verification and parsed as JSON, nothing
/// more. Field meanings inside it are still provider-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: Provider,
    /// Provider-assigned delivery identifier; the ledger key.
    pub event_id: String,
    pub event_type: String,
    pub payload: Value,
    /// Account identity carried on transport headers rather than in the
    /// payload (Shopify shop domain).
    pub account_hint: Option<String>,
    pub received_at: Timestamp,
    pub correlation_id: CorrelationId,
}

impl WebhookEvent {
    pub fn new(
        provider: Provider,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            provider,
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            account_hint: None,
            received_at: Timestamp::now(),
            correlation_id: CorrelationId::new(),
        }
    }

    pub fn with_account_hint(mut self, hint: impl Into<String>) -> Self {
        self.account_hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Phone sources
// ============================================================================

/// Where a phone candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneSourceKind {
    /// Merchant-supplied metadata on the payment object.
    Metadata,
    /// Details the customer entered during checkout.
    CheckoutDetails,
    /// Stored customer profile fields.
    CustomerProfile,
    /// Shipping address contact.
    Shipping,
    /// Billing address contact.
    Billing,
    /// External directory lookup.
    Lookup,
}

impl PhoneSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::CheckoutDetails => "checkout_details",
            Self::CustomerProfile => "customer_profile",
            Self::Shipping => "shipping",
            Self::Billing => "billing",
            Self::Lookup => "lookup",
        }
    }
}

/// Raw phone candidate collected from the payload, unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneSource {
    pub kind: PhoneSourceKind,
    pub raw: String,
}

/// Provider customer to consult in the external directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub provider: Provider,
    pub customer_id: String,
}

// ============================================================================
// Merchant identity evidence
// ============================================================================

/// Identity evidence for integration resolution, strongest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MerchantRef {
    /// Internal account id the merchant embedded in payment metadata.
    pub explicit_user_id: Option<UserId>,
    /// Provider-scoped account identifier (Square merchant id, Shopify shop
    /// domain).
    pub account_ref: Option<String>,
    /// Provider customer identifier with a possible stored mapping.
    pub customer_ref: Option<String>,
}

// ============================================================================
// Transaction candidate
// ============================================================================

/// Ledger id claimed atomically alongside the event id. A conflict means a
/// sibling event already handled this purchase; the event skips with the
/// attached reason instead of dispatching.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardRef {
    pub object_id: String,
    pub conflict_reason: SkipReason,
}

/// Normalized purchase awaiting resolution, policy, and phone evaluation.
#[derive(Debug, Clone)]
pub struct TransactionCandidate {
    /// Provider transaction identifier (session, payment, or order id).
    pub external_transaction_id: String,
    pub customer_name: Option<String>,
    /// Decimal currency amount; minor-unit conversion already applied.
    pub purchase_amount: Decimal,
    pub location_id: Option<String>,
    pub location_name: Option<String>,
    pub origin: TransactionOrigin,
    pub merchant: MerchantRef,
    /// In-payload phone candidates, highest priority first.
    pub phone_sources: Vec<PhoneSource>,
    /// Customer to consult externally when no in-payload source yields a
    /// number.
    pub lookup_ref: Option<CustomerRef>,
    /// Ids whose prior claim means this purchase was already handled.
    pub guard_refs: Vec<GuardRef>,
    /// Ids to claim on this event's behalf so sibling events dedupe.
    pub mark_refs: Vec<String>,
}

/// Result of normalizing one verified delivery.
#[derive(Debug, Clone)]
pub enum NormalizedEvent {
    Transaction(Box<TransactionCandidate>),
    Ignored { reason: SkipReason },
}

impl NormalizedEvent {
    pub(crate) fn ignored(reason: SkipReason) -> Self {
        Self::Ignored { reason }
    }

    pub(crate) fn transaction(candidate: TransactionCandidate) -> Self {
        Self::Transaction(Box::new(candidate))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for payload normalization failures.
///
/// These indicate a payload that verified but does not carry the fields its
/// event type promises. They surface as background-task errors, never as
/// provider-visible failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NormalizeError {
    #[error("Payload missing required field '{field}'")]
    MissingField { field: String },

    #[error("Payload field '{field}' is invalid: {message}")]
    InvalidField { field: String, message: String },

    #[error(transparent)]
    Ledger(#[from] StoreError),
}

// ============================================================================
// Entry point
// ============================================================================

/// Normalize a verified event.
///
/// The ledger is consulted only by handlers that cross-reference sibling
/// events (Stripe charges against their payment intent).
pub async fn normalize(
    event: &WebhookEvent,
    ledger: &dyn EventLedger,
) -> Result<NormalizedEvent, NormalizeError> {
    match (event.provider, event.event_type.as_str()) {
        (Provider::Stripe, "checkout.session.completed") => {
            stripe::checkout_session_completed(event)
        }
        (Provider::Stripe, "payment_intent.succeeded") => stripe::payment_intent_succeeded(event),
        (Provider::Stripe, "charge.succeeded") => stripe::charge_succeeded(event, ledger).await,
        (Provider::Square, "payment.created") => square::payment_created(event),
        // Recognized Square notifications that carry no purchase to act on
        (Provider::Square, "order.created" | "refund.created" | "oauth.authorization.revoked") => {
            Ok(NormalizedEvent::ignored(SkipReason::UnhandledEventType))
        }
        (Provider::Shopify, "orders/create") => shopify::orders_create(event),
        // Offboarding is handled by account-settings flows, not the relay
        (Provider::Shopify, "app/uninstalled") => {
            Ok(NormalizedEvent::ignored(SkipReason::UnhandledEventType))
        }
        _ => Ok(NormalizedEvent::ignored(SkipReason::UnhandledEventType)),
    }
}

// ============================================================================
// Payload access helpers
// ============================================================================

/// Walk `path` through nested objects, returning a trimmed non-empty string.
pub(crate) fn optional_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn required_str<'a>(value: &'a Value, path: &[&str]) -> Result<&'a str, NormalizeError> {
    optional_str(value, path).ok_or_else(|| NormalizeError::MissingField {
        field: path.join("."),
    })
}

pub(crate) fn required_i64(value: &Value, path: &[&str]) -> Result<i64, NormalizeError> {
    let mut current = value;
    for key in path {
        current = current.get(key).ok_or_else(|| NormalizeError::MissingField {
            field: path.join("."),
        })?;
    }
    current.as_i64().ok_or_else(|| NormalizeError::InvalidField {
        field: path.join("."),
        message: "expected an integer amount".to_string(),
    })
}

/// Append a phone candidate when the field is present and non-empty.
pub(crate) fn push_phone_source(
    sources: &mut Vec<PhoneSource>,
    kind: PhoneSourceKind,
    value: Option<&str>,
) {
    if let Some(raw) = value {
        sources.push(PhoneSource {
            kind,
            raw: raw.to_string(),
        });
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
