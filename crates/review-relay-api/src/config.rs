//! Configuration types for the HTTP service.
//!
//! Every section carries serde defaults so a minimal (or empty) config file
//! yields a runnable service. Provider sections are optional; a provider
//! without credentials is simply not accepted at the webhook endpoint.
//!
//! Config structs deliberately implement `Deserialize` only. Secrets flow in
//! from files and environment variables but must never flow back out through
//! serialization, and `Debug` output redacts them.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::fmt;

// ============================================================================
// Service Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Transaction pipeline settings
    pub pipeline: PipelineConfig,

    /// Payment provider credentials
    pub providers: ProvidersConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check the configuration for values that cannot work at runtime.
    ///
    /// Called once at startup, before the server binds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be non-zero".to_string(),
            });
        }

        if self.pipeline.lookup_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.lookup_timeout_ms must be non-zero".to_string(),
            });
        }

        if let Some(trigger_url) = &self.pipeline.trigger_url {
            url::Url::parse(trigger_url).map_err(|error| ConfigError::Invalid {
                message: format!("pipeline.trigger_url is not a valid URL: {error}"),
            })?;
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Invalid {
                    message: format!("logging.level '{other}' is not a recognized level"),
                });
            }
        }

        if let Some(stripe) = &self.providers.stripe {
            if stripe.signing_secret.is_empty() {
                return Err(ConfigError::Missing {
                    key: "providers.stripe.signing_secret".to_string(),
                });
            }
        }

        if let Some(square) = &self.providers.square {
            if square.signature_key.is_empty() {
                return Err(ConfigError::Missing {
                    key: "providers.square.signature_key".to_string(),
                });
            }
            url::Url::parse(&square.notification_url).map_err(|error| ConfigError::Invalid {
                message: format!(
                    "providers.square.notification_url is not a valid URL: {error}"
                ),
            })?;
        }

        if let Some(shopify) = &self.providers.shopify {
            if shopify.shared_secret.is_empty() {
                return Err(ConfigError::Missing {
                    key: "providers.shopify.shared_secret".to_string(),
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
            shutdown_timeout_seconds: 30,
        }
    }
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Transaction pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Treat a lone active integration as the match when merchant evidence
    /// resolves nothing
    pub single_tenant_fallback: bool,

    /// Upper bound for customer directory lookups in milliseconds
    pub lookup_timeout_ms: u64,

    /// Review-request endpoint receiving dispatched transactions
    pub trigger_url: Option<String>,

    /// Path to a seed file of integrations loaded at startup
    pub integrations_file: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            single_tenant_fallback: true,
            lookup_timeout_ms: 2000,
            trigger_url: None,
            integrations_file: None,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Per-provider webhook credentials
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Stripe credentials, absent when Stripe webhooks are not accepted
    pub stripe: Option<StripeConfig>,

    /// Square credentials, absent when Square webhooks are not accepted
    pub square: Option<SquareConfig>,

    /// Shopify credentials, absent when Shopify webhooks are not accepted
    pub shopify: Option<ShopifyConfig>,
}

/// Stripe webhook credentials
#[derive(Clone, Deserialize)]
pub struct StripeConfig {
    /// Endpoint signing secret from the Stripe dashboard
    pub signing_secret: String,

    /// API key for customer phone lookups
    pub api_key: Option<String>,

    /// Maximum accepted age of a signed timestamp in seconds; zero disables
    /// the age check
    #[serde(default = "default_tolerance_seconds")]
    pub tolerance_seconds: u64,
}

fn default_tolerance_seconds() -> u64 {
    300
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("signing_secret", &"<REDACTED>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

/// Square webhook credentials
#[derive(Clone, Deserialize)]
pub struct SquareConfig {
    /// Webhook signature key from the Square developer dashboard
    pub signature_key: String,

    /// Notification URL the webhook subscription was registered with; Square
    /// signs it together with the body
    pub notification_url: String,

    /// Access token for customer phone lookups
    pub access_token: Option<String>,
}

impl fmt::Debug for SquareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SquareConfig")
            .field("signature_key", &"<REDACTED>")
            .field("notification_url", &self.notification_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Shopify webhook credentials
#[derive(Clone, Deserialize)]
pub struct ShopifyConfig {
    /// Shared secret from the app or store notification settings
    pub shared_secret: String,
}

impl fmt::Debug for ShopifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopifyConfig")
            .field("shared_secret", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
