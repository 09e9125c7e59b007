//! # Phone Resolution
//!
//! Finds the number the review request should go to. In-payload sources
//! (collected by the normalizer in priority order) always win over the
//! external directory; the directory call is a last resort behind a hard
//! timeout because it sits on the webhook processing path.
//!
//! Lookup failure of any kind (timeout, not found, API error) degrades to
//! "no phone from this source". A missing phone is an auditable skip, never
//! a processing error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::normalize::{CustomerRef, PhoneSource, PhoneSourceKind};
use crate::PhoneNumber;

// ============================================================================
// CustomerDirectory
// ============================================================================

/// Error type for external customer lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory not reachable: {message}")]
    Unavailable { message: String },

    #[error("Directory request failed: {message}")]
    RequestFailed { message: String },

    #[error("Directory returned an unreadable response: {message}")]
    InvalidResponse { message: String },
}

/// Provider customer-profile lookup.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Fetch the customer's stored phone, if the profile has one.
    async fn lookup_phone(
        &self,
        customer: &CustomerRef,
    ) -> Result<Option<PhoneNumber>, DirectoryError>;
}

/// Directory for deployments without provider API credentials; every lookup
/// is an empty result.
#[derive(Debug, Default)]
pub struct NullCustomerDirectory;

#[async_trait]
impl CustomerDirectory for NullCustomerDirectory {
    async fn lookup_phone(
        &self,
        _customer: &CustomerRef,
    ) -> Result<Option<PhoneNumber>, DirectoryError> {
        Ok(None)
    }
}

// ============================================================================
// PhoneResolver
// ============================================================================

/// A usable number and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPhone {
    pub number: PhoneNumber,
    pub source: PhoneSourceKind,
}

/// Ordered phone resolution over payload sources plus the directory.
pub struct PhoneResolver {
    directory: Arc<dyn CustomerDirectory>,
    lookup_timeout: Duration,
}

impl PhoneResolver {
    pub fn new(directory: Arc<dyn CustomerDirectory>, lookup_timeout: Duration) -> Self {
        Self {
            directory,
            lookup_timeout,
        }
    }

    /// Resolve the first usable phone number, or `None` when every source is
    /// exhausted.
    ///
    /// The first payload source that parses wins; later sources are not
    /// consulted. The directory runs only when no payload source yielded a
    /// number and the candidate carries a customer ref.
    pub async fn resolve(
        &self,
        sources: &[PhoneSource],
        lookup: Option<&CustomerRef>,
    ) -> Option<ResolvedPhone> {
        for source in sources {
            match PhoneNumber::parse(&source.raw) {
                Ok(number) => {
                    return Some(ResolvedPhone {
                        number,
                        source: source.kind,
                    });
                }
                Err(error) => {
                    debug!(
                        source = source.kind.as_str(),
                        error = %error,
                        "discarding unusable phone candidate"
                    );
                }
            }
        }

        let customer = lookup?;
        match tokio::time::timeout(self.lookup_timeout, self.directory.lookup_phone(customer))
            .await
        {
            Ok(Ok(Some(number))) => Some(ResolvedPhone {
                number,
                source: PhoneSourceKind::Lookup,
            }),
            Ok(Ok(None)) => {
                debug!(customer_id = %customer.customer_id, "customer profile has no phone");
                None
            }
            Ok(Err(error)) => {
                warn!(
                    customer_id = %customer.customer_id,
                    error = %error,
                    "customer lookup failed; treating as no phone"
                );
                None
            }
            Err(_) => {
                warn!(
                    customer_id = %customer.customer_id,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "customer lookup timed out; treating as no phone"
                );
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "phone_tests.rs"]
mod tests;
