//! # Review-Relay Core
//!
//! Core business logic for the Review Relay webhook ingestion service.
//!
//! This crate turns purchase-event webhooks from commerce platforms (Stripe,
//! Square, Shopify) into a single decision per event: trigger a review-request
//! SMS for the customer, or skip with an auditable reason.
//!
//! ## Architecture
//!
//! The pipeline is a straight line of small components:
//! - Signature verification over the raw request bytes ([`signature`])
//! - Duplicate suppression through an append-only ledger ([`ledger`])
//! - Provider-specific payload normalization ([`normalize`])
//! - Merchant account resolution with ordered fallbacks ([`resolver`])
//! - Trigger policy evaluation ([`policy`]) and phone resolution ([`phone`])
//! - Dispatch plus audit logging ([`pipeline`])
//!
//! Business logic depends only on trait abstractions; stores and outbound
//! collaborators are injected at runtime.
//!
//! ## Usage
//!
//! ```rust
//! use review_relay_core::{Provider, TransactionLogId};
//!
//! let provider: Provider = "stripe".parse().unwrap();
//! let log_id = TransactionLogId::new();
//! assert_eq!(provider.as_str(), "stripe");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export commonly used types
pub use rust_decimal::Decimal;
pub use ulid::Ulid;
pub use uuid::Uuid;

// ============================================================================
// Provider
// ============================================================================

/// Commerce platform that delivers purchase-event webhooks.
///
/// The lowercase string form doubles as the URL path segment
/// (`POST /webhooks/{provider}`) and the ledger partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Square,
    Shopify,
}

impl Provider {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Square => "square",
            Self::Shopify => "shopify",
        }
    }

    /// All providers the service knows how to verify and normalize.
    pub fn all() -> [Provider; 3] {
        [Self::Stripe, Self::Square, Self::Shopify]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "square" => Ok(Self::Square),
            "shopify" => Ok(Self::Shopify),
            _ => Err(ParseError::InvalidFormat {
                expected: "stripe, square, or shopify".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier for a merchant's provider connection (numeric storage ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationId(u64);

impl IntegrationId {
    /// Create new integration ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IntegrationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse::<u64>().map_err(|_| ParseError::InvalidFormat {
            expected: "positive integer".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self::new(id))
    }
}

/// Merchant account identifier for attribution and audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Create new user ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse::<u64>().map_err(|_| ParseError::InvalidFormat {
            expected: "positive integer".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self::new(id))
    }
}

/// Unique identifier for transaction audit log entries
///
/// Uses ULID for lexicographic sorting and global uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionLogId(Ulid);

impl TransactionLogId {
    /// Generate a new unique log entry ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TransactionLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionLogId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "ULID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

/// Identifier for tracing one webhook delivery across the response boundary
/// and into the detached processing task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

// ============================================================================
// Phone Numbers
// ============================================================================

/// Dialable phone number in near-E.164 form.
///
/// Construction normalizes common formatting (spaces, dashes, dots,
/// parentheses) and keeps a single leading `+`. Anything that does not
/// reduce to 7-15 digits is rejected; callers treat a rejected value the
/// same as an absent one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a raw phone value.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required {
                field: "phone_number".to_string(),
            });
        }

        let mut normalized = String::with_capacity(trimmed.len() + 1);
        for (index, c) in trimmed.chars().enumerate() {
            match c {
                '+' if index == 0 => normalized.push('+'),
                '0'..='9' => normalized.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => {
                    return Err(ValidationError::InvalidCharacters {
                        field: "phone_number".to_string(),
                        invalid_chars: c.to_string(),
                    });
                }
            }
        }

        let digit_count = normalized.chars().filter(|c| c.is_ascii_digit()).count();
        if digit_count < 7 {
            return Err(ValidationError::InvalidFormat {
                field: "phone_number".to_string(),
                message: "fewer than 7 digits".to_string(),
            });
        }
        if digit_count > 15 {
            return Err(ValidationError::TooLong {
                field: "phone_number".to_string(),
                max_length: 15,
            });
        }

        Ok(Self(normalized))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Transaction Classification
// ============================================================================

/// How the purchase reached the provider.
///
/// `Checkout` covers hosted/online flows, `Terminal` covers card-present
/// point-of-sale payments, and `Charge` covers direct charges that arrived
/// outside a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionOrigin {
    Checkout,
    Terminal,
    Charge,
}

impl TransactionOrigin {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Terminal => "terminal",
            Self::Charge => "charge",
        }
    }
}

impl fmt::Display for TransactionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason a webhook event was accepted but produced no SMS dispatch.
///
/// Every skip is a successful outcome from the provider's point of view
/// (HTTP 200); the reason surfaces through structured logs and the
/// transaction audit trail under the stable codes returned by [`code`].
///
/// [`code`]: SkipReason::code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Event ID already present in the processed-event ledger.
    Duplicate,
    /// Event type carries no purchase to act on.
    UnhandledEventType,
    /// Checkout session belongs to the subscription billing flow.
    SubscriptionCheckout,
    /// The payment intent behind this event was already handled.
    AlreadyProcessedViaPaymentIntent,
    /// No merchant account could be resolved for the event.
    NoIntegration,
    /// A merchant account matched but is switched off.
    IntegrationInactive,
    /// The matching account disabled triggers for this origin.
    TriggerDisabled(TransactionOrigin),
    /// No usable phone number from any source.
    NoPhoneNumber,
}

impl SkipReason {
    /// Stable wire code used in logs and audit rows.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::UnhandledEventType => "unhandled_event_type",
            Self::SubscriptionCheckout => "subscription_checkout",
            Self::AlreadyProcessedViaPaymentIntent => "already_processed_via_pi",
            Self::NoIntegration => "no_integration",
            Self::IntegrationInactive => "integration_inactive",
            Self::TriggerDisabled(TransactionOrigin::Checkout) => "checkout_trigger_disabled",
            Self::TriggerDisabled(TransactionOrigin::Terminal) => "terminal_trigger_disabled",
            Self::TriggerDisabled(TransactionOrigin::Charge) => "charge_trigger_disabled",
            Self::NoPhoneNumber => "no_phone_number",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for SkipReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

// ============================================================================
// Money
// ============================================================================

/// Convert an integer minor-unit amount (cents) to a decimal currency amount.
///
/// Providers that report amounts as minor units do so for two-decimal
/// currencies in this integration; 4999 becomes 49.99. Conversion happens
/// exactly once, during normalization.
pub fn amount_from_minor_units(minor_units: i64) -> Decimal {
    Decimal::new(minor_units, 2)
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Seconds since the Unix epoch
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Error type for store operations (ledger, integrations, audit log)
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Store not available: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Check if the failure is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OperationFailed { .. } => true,
            Self::Unavailable { .. } => true,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Signature verification for raw webhook bodies
pub mod signature;

/// Processed-event ledger for duplicate suppression
pub mod ledger;

/// Provider payload normalization
pub mod normalize;

/// Merchant account (integration) records and store
pub mod integration;

/// Ordered integration resolution chain
pub mod resolver;

/// Trigger policy evaluation
pub mod policy;

/// Phone number resolution
pub mod phone;

/// Transaction dispatch pipeline and audit log
pub mod pipeline;

// Re-export key types for convenience
pub use integration::{
    InMemoryIntegrationStore, Integration, IntegrationQuery, IntegrationStore, LocationEntry,
    LocationSettings,
};
pub use ledger::{ClaimOutcome, EventLedger, InMemoryEventLedger, ProcessedEventRecord};
pub use normalize::{
    normalize, CustomerRef, GuardRef, MerchantRef, NormalizeError, NormalizedEvent, PhoneSource,
    PhoneSourceKind, TransactionCandidate, WebhookEvent,
};
pub use phone::{
    CustomerDirectory, DirectoryError, NullCustomerDirectory, PhoneResolver, ResolvedPhone,
};
pub use pipeline::{
    DispatchReceipt, DispatchRequest, InMemoryTransactionLogStore, PipelineError, PipelineOutcome,
    ReviewTrigger, SmsStatus, TransactionLog, TransactionLogStore, TransactionPipeline,
    TriggerError,
};
pub use resolver::{IntegrationResolver, Resolution};
pub use signature::{
    SignatureError, SignatureVerifier, ShopifySignatureVerifier, SquareSignatureVerifier,
    StripeSignatureVerifier, VerifierRegistry, WebhookSecret,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
