//! Provider customer-profile lookups over HTTP.
//!
//! When a webhook payload carries a customer id but no phone number, the
//! pipeline falls back to the provider's customer API. This module implements
//! that lookup against the Stripe and Square REST APIs.
//!
//! Lookups are strictly best-effort. A profile without a phone, a 404, or a
//! provider without configured credentials all read as "no phone"; only
//! transport and protocol failures surface as errors, and the caller treats
//! those as "no phone" too.

use async_trait::async_trait;
use review_relay_core::{CustomerDirectory, CustomerRef, DirectoryError, PhoneNumber, Provider};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

// ============================================================================
// Configuration
// ============================================================================

/// Credentials and endpoints for the directory client.
///
/// Base URLs exist so tests can point the client at a local mock server.
pub struct DirectoryConfig {
    /// Stripe secret API key; `None` disables Stripe lookups.
    pub stripe_api_key: Option<String>,

    /// Square access token; `None` disables Square lookups.
    pub square_access_token: Option<String>,

    /// Per-request timeout for directory calls.
    pub timeout: Duration,

    /// Stripe API base URL.
    pub stripe_base_url: String,

    /// Square API base URL.
    pub square_base_url: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: None,
            square_access_token: None,
            timeout: Duration::from_secs(5),
            stripe_base_url: "https://api.stripe.com".to_string(),
            square_base_url: "https://connect.squareup.com".to_string(),
        }
    }
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field(
                "stripe_api_key",
                &self.stripe_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "square_access_token",
                &self.square_access_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("timeout", &self.timeout)
            .field("stripe_base_url", &self.stripe_base_url)
            .field("square_base_url", &self.square_base_url)
            .finish()
    }
}

// ============================================================================
// HttpCustomerDirectory
// ============================================================================

/// [`CustomerDirectory`] backed by the providers' customer REST APIs.
pub struct HttpCustomerDirectory {
    client: reqwest::Client,
    config: DirectoryConfig,
}

impl HttpCustomerDirectory {
    pub fn new(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("review-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DirectoryError::Unavailable {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// GET a provider endpoint with bearer auth. A 404 means the customer
    /// does not exist and reads as an empty result.
    async fn fetch_json(&self, url: &str, token: &str) -> Result<Option<Value>, DirectoryError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable {
                message: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(DirectoryError::RequestFailed {
                message: format!("directory returned status {}", response.status()),
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| DirectoryError::InvalidResponse {
                message: e.to_string(),
            })?;

        Ok(Some(body))
    }

    /// Stripe customer objects carry the phone at the top level.
    async fn stripe_phone(&self, customer_id: &str) -> Result<Option<String>, DirectoryError> {
        let api_key = match self.config.stripe_api_key.as_deref() {
            Some(key) => key,
            None => {
                debug!("no Stripe API key configured; skipping directory lookup");
                return Ok(None);
            }
        };

        let url = format!(
            "{}/v1/customers/{}",
            self.config.stripe_base_url, customer_id
        );
        let body = match self.fetch_json(&url, api_key).await? {
            Some(body) => body,
            None => return Ok(None),
        };

        Ok(body.get("phone").and_then(Value::as_str).map(str::to_string))
    }

    /// Square wraps the customer object and names the field `phone_number`.
    async fn square_phone(&self, customer_id: &str) -> Result<Option<String>, DirectoryError> {
        let token = match self.config.square_access_token.as_deref() {
            Some(token) => token,
            None => {
                debug!("no Square access token configured; skipping directory lookup");
                return Ok(None);
            }
        };

        let url = format!(
            "{}/v2/customers/{}",
            self.config.square_base_url, customer_id
        );
        let body = match self.fetch_json(&url, token).await? {
            Some(body) => body,
            None => return Ok(None),
        };

        Ok(body
            .get("customer")
            .and_then(|customer| customer.get("phone_number"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl CustomerDirectory for HttpCustomerDirectory {
    #[instrument(skip(self), fields(provider = %customer.provider, customer_id = %customer.customer_id))]
    async fn lookup_phone(
        &self,
        customer: &CustomerRef,
    ) -> Result<Option<PhoneNumber>, DirectoryError> {
        let raw = match customer.provider {
            Provider::Stripe => self.stripe_phone(&customer.customer_id).await?,
            Provider::Square => self.square_phone(&customer.customer_id).await?,
            // Shopify order payloads already carry the phone; there is no
            // profile lookup behind them
            Provider::Shopify => None,
        };

        Ok(raw.as_deref().and_then(parse_stored_phone))
    }
}

/// Stored profile phones are free-form text; an unusable value reads as
/// absent rather than an error.
fn parse_stored_phone(raw: &str) -> Option<PhoneNumber> {
    match PhoneNumber::parse(raw) {
        Ok(number) => Some(number),
        Err(error) => {
            debug!(error = %error, "discarding unusable directory phone");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
