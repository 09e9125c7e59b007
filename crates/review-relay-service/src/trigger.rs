//! Outbound dispatch to the messaging endpoint.
//!
//! The pipeline hands a fully resolved [`DispatchRequest`] to a
//! [`ReviewTrigger`]; this module implements that trait over HTTP for
//! deployments with a messaging endpoint, and as a no-op for deployments
//! without one.

use async_trait::async_trait;
use review_relay_core::{DispatchReceipt, DispatchRequest, ReviewTrigger, TriggerError};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Longest error-body excerpt carried into logs and audit rows.
const MAX_ERROR_DETAIL: usize = 256;

// ============================================================================
// HttpReviewTrigger
// ============================================================================

/// [`ReviewTrigger`] that POSTs each dispatch as JSON to a fixed endpoint.
///
/// A 2xx response must carry a [`DispatchReceipt`] body; anything else is a
/// trigger error, which the pipeline records as a failed dispatch.
pub struct HttpReviewTrigger {
    client: reqwest::Client,
    url: Url,
}

impl HttpReviewTrigger {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, TriggerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("review-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TriggerError::Unavailable {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl ReviewTrigger for HttpReviewTrigger {
    #[instrument(skip(self, request), fields(transaction_id = %request.external_transaction_id))]
    async fn process_transaction(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchReceipt, TriggerError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| TriggerError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriggerError::Rejected {
                status: status.as_u16(),
                message: error_detail(&body),
            });
        }

        response
            .json::<DispatchReceipt>()
            .await
            .map_err(|e| TriggerError::InvalidResponse {
                message: e.to_string(),
            })
    }
}

/// Error bodies ride into logs and audit rows; cap them so a misbehaving
/// endpoint cannot flood either.
fn error_detail(body: &str) -> String {
    body.chars().take(MAX_ERROR_DETAIL).collect()
}

// ============================================================================
// NoopReviewTrigger
// ============================================================================

/// Trigger for deployments without a messaging endpoint.
///
/// Transactions are still evaluated and audited; the audit row records that
/// no SMS was queued and why.
#[derive(Debug, Default)]
pub struct NoopReviewTrigger;

#[async_trait]
impl ReviewTrigger for NoopReviewTrigger {
    async fn process_transaction(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchReceipt, TriggerError> {
        debug!(
            transaction_id = %request.external_transaction_id,
            "messaging trigger not configured; dropping dispatch"
        );

        Ok(DispatchReceipt {
            sms_queued: false,
            detail: Some("messaging trigger not configured".to_string()),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
