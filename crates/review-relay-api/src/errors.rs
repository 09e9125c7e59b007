//! Error types for the HTTP service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

/// Rejection returned to a webhook sender before any processing happens.
///
/// Status code mapping:
///
/// - `404 Not Found`: the URL segment is not a known provider
/// - `401 Unauthorized`: the delivery could not be authenticated (no
///   credentials configured, signature header absent, or verification failed)
/// - `400 Bad Request`: the delivery authenticated but carries an unusable
///   payload
/// - `500 Internal Server Error`: unexpected server-side failure
///
/// All 401 responses share one generic body. The response never reveals
/// which verification step failed; the distinction lives in server-side logs
/// and metrics only.
#[derive(Debug, thiserror::Error)]
pub enum WebhookRejection {
    /// The `{provider}` path segment is not a known payment provider.
    #[error("Unknown webhook provider: {provider}")]
    UnknownProvider { provider: String },

    /// The provider is known but no credentials are configured for it.
    ///
    /// Deliveries that cannot be verified are refused rather than accepted
    /// unverified.
    #[error("Webhook provider is not configured: {provider}")]
    NotConfigured { provider: String },

    /// The request is missing the provider's signature header.
    #[error("Missing required signature header '{header}'")]
    MissingSignature { header: &'static str },

    /// The signature did not verify against the shared secret.
    #[error("Webhook signature verification failed")]
    SignatureRejected,

    /// The request body is not valid JSON.
    #[error("Malformed webhook payload: {message}")]
    MalformedPayload { message: String },

    /// The payload or headers carry no usable event identity.
    #[error("Webhook delivery carries no event identity: missing {field}")]
    MissingEventIdentity { field: &'static str },

    /// Unexpected internal failure while accepting the delivery.
    #[error("Internal server error")]
    Internal { message: String },
}

impl WebhookRejection {
    /// Stable label for the rejection counter.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::UnknownProvider { .. } => "unknown_provider",
            Self::NotConfigured { .. } => "not_configured",
            Self::MissingSignature { .. } => "missing_signature",
            Self::SignatureRejected => "bad_signature",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::MissingEventIdentity { .. } => "missing_identity",
            Self::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::UnknownProvider { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::NotConfigured { .. } => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::MissingSignature { .. } => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::SignatureRejected => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::MalformedPayload { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::MissingEventIdentity { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Internal { ref message } => {
                // Log the detail server-side, return a generic message
                error!(error = %message, "Internal error while accepting webhook");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}
