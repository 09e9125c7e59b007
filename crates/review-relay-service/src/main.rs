//! # Review-Relay Service
//!
//! Binary entry point for the Review-Relay webhook ingestion service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes logging
//! - Builds signature verifiers and the transaction pipeline
//! - Starts the HTTP server from review-relay-api

mod directory;
mod seed;
mod trigger;

use directory::{DirectoryConfig, HttpCustomerDirectory};
use review_relay_api::{start_server, DefaultHealthChecker, ServiceConfig, ServiceError};
use review_relay_core::{
    CustomerDirectory, EventLedger, InMemoryEventLedger, InMemoryIntegrationStore,
    InMemoryTransactionLogStore, IntegrationResolver, IntegrationStore, NullCustomerDirectory,
    PhoneResolver, Provider, ReviewTrigger, ShopifySignatureVerifier, SquareSignatureVerifier,
    StripeSignatureVerifier, TransactionLogStore, TransactionPipeline, VerifierRegistry,
    WebhookSecret,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trigger::{HttpReviewTrigger, NoopReviewTrigger};

/// Timeout for one dispatch POST. Dispatches run on the background task, so
/// this never sits on the webhook response path.
const TRIGGER_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order, later sources override earlier ones):
    //  1. /etc/review-relay/service.yaml   (system-wide defaults)
    //  2. ./config/service.yaml            (deployment-local override)
    //  3. Path given by RR_CONFIG_FILE env (operator-specified file)
    //  4. Environment variables prefixed RR__ (double-underscore separator)
    //     e.g. RR__SERVER__PORT=9090 sets server.port = 9090
    //
    // All fields carry serde defaults, so absent files or an entirely
    // unconfigured environment produces a valid config. A malformed file or
    // an environment variable that cannot be coerced to the right type is a
    // hard error.
    //
    // Logging is not up yet, so failures here go to stderr.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/review-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    // Optional explicit path supplied by the operator.
    let mut explicit_path = None;
    if let Ok(path) = std::env::var("RR_CONFIG_FILE") {
        if !path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
            explicit_path = Some(path);
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("RR").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to build configuration: {e}");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            eprintln!("Could not deserialize service configuration: {e}. Fix the configuration and restart.");
            std::process::exit(3);
        }
    };

    // -------------------------------------------------------------------------
    // Initialize logging
    //
    // RUST_LOG overrides the configured level when set.
    // -------------------------------------------------------------------------
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "review_relay_service={level},review_relay_api={level},review_relay_core={level},tower_http=info",
            level = service_config.logging.level
        ))
    });

    if service_config.logging.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Review-Relay service");
    if let Some(path) = &explicit_path {
        info!(path = %path, "Loaded configuration from explicit path");
    }

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Build signature verifiers
    //
    // One verifier per configured provider. Providers without a configured
    // secret stay unregistered and their deliveries are rejected with 401;
    // fail closed rather than accept unverifiable traffic.
    // -------------------------------------------------------------------------
    let verifiers = build_verifiers(&service_config);

    // -------------------------------------------------------------------------
    // Build stores and seed integrations
    // -------------------------------------------------------------------------
    let integration_store = Arc::new(InMemoryIntegrationStore::new());

    match &service_config.pipeline.integrations_file {
        Some(path) => match seed::load_integrations(path) {
            Ok(integrations) => {
                let count = integrations.len();
                for integration in integrations {
                    integration_store.insert(integration).await;
                }
                info!(count, path = %path, "Seeded merchant integrations");
            }
            Err(e) => {
                error!(error = %e, "Failed to load integrations file; aborting");
                std::process::exit(3);
            }
        },
        None => {
            warn!("No integrations file configured; events will resolve against an empty store");
        }
    }

    let ledger = Arc::new(InMemoryEventLedger::new());
    let log_store = Arc::new(InMemoryTransactionLogStore::new());

    // -------------------------------------------------------------------------
    // Assemble the pipeline
    // -------------------------------------------------------------------------
    let resolver = IntegrationResolver::new(
        integration_store as Arc<dyn IntegrationStore>,
        service_config.pipeline.single_tenant_fallback,
    );
    let phone = PhoneResolver::new(
        build_directory(&service_config),
        Duration::from_millis(service_config.pipeline.lookup_timeout_ms),
    );
    let pipeline = Arc::new(TransactionPipeline::new(
        ledger as Arc<dyn EventLedger>,
        resolver,
        phone,
        build_trigger(&service_config),
        Arc::clone(&log_store) as Arc<dyn TransactionLogStore>,
    ));

    let health_checker = Arc::new(DefaultHealthChecker);

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        "Starting HTTP server"
    );

    // Start the server
    if let Err(e) = start_server(
        service_config,
        Arc::new(verifiers),
        pipeline,
        log_store as Arc<dyn TransactionLogStore>,
        health_checker,
    )
    .await
    {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Build the verifier registry from the provider configuration sections.
fn build_verifiers(config: &ServiceConfig) -> VerifierRegistry {
    let mut verifiers = VerifierRegistry::new();

    if let Some(stripe) = &config.providers.stripe {
        verifiers.register(
            Provider::Stripe,
            Arc::new(StripeSignatureVerifier::new(
                WebhookSecret::new(stripe.signing_secret.clone()),
                Duration::from_secs(stripe.tolerance_seconds),
            )),
        );
        info!("Registered Stripe webhook verifier");
    }

    if let Some(square) = &config.providers.square {
        verifiers.register(
            Provider::Square,
            Arc::new(SquareSignatureVerifier::new(
                WebhookSecret::new(square.signature_key.clone()),
                square.notification_url.clone(),
            )),
        );
        info!("Registered Square webhook verifier");
    }

    if let Some(shopify) = &config.providers.shopify {
        verifiers.register(
            Provider::Shopify,
            Arc::new(ShopifySignatureVerifier::new(WebhookSecret::new(
                shopify.shared_secret.clone(),
            ))),
        );
        info!("Registered Shopify webhook verifier");
    }

    for provider in Provider::all() {
        if !verifiers.contains(provider) {
            warn!(
                provider = %provider,
                "No webhook secret configured; deliveries for this provider will be rejected"
            );
        }
    }

    verifiers
}

/// Build the customer directory from configured provider API credentials.
///
/// Without any credentials, lookups are disabled entirely rather than sent
/// to endpoints that would reject them.
fn build_directory(config: &ServiceConfig) -> Arc<dyn CustomerDirectory> {
    let stripe_api_key = config
        .providers
        .stripe
        .as_ref()
        .and_then(|stripe| stripe.api_key.clone());
    let square_access_token = config
        .providers
        .square
        .as_ref()
        .and_then(|square| square.access_token.clone());

    if stripe_api_key.is_none() && square_access_token.is_none() {
        info!("No provider API credentials configured; customer directory lookups are disabled");
        return Arc::new(NullCustomerDirectory);
    }

    let directory_config = DirectoryConfig {
        stripe_api_key,
        square_access_token,
        timeout: Duration::from_millis(config.pipeline.lookup_timeout_ms),
        ..DirectoryConfig::default()
    };

    match HttpCustomerDirectory::new(directory_config) {
        Ok(http_directory) => Arc::new(http_directory),
        Err(e) => {
            error!(error = %e, "Failed to build customer directory; aborting");
            std::process::exit(3);
        }
    }
}

/// Build the messaging trigger from the pipeline configuration.
fn build_trigger(config: &ServiceConfig) -> Arc<dyn ReviewTrigger> {
    let raw_url = match &config.pipeline.trigger_url {
        Some(url) => url,
        None => {
            warn!(
                "No messaging trigger configured; transactions will be evaluated \
                 and audited but no SMS will be queued"
            );
            return Arc::new(NoopReviewTrigger);
        }
    };

    // validate() already confirmed this parses
    let url = match url::Url::parse(raw_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %raw_url, error = %e, "Messaging trigger URL is invalid; aborting");
            std::process::exit(3);
        }
    };

    match HttpReviewTrigger::new(url, TRIGGER_TIMEOUT) {
        Ok(http_trigger) => {
            info!(url = %raw_url, "Messaging dispatches will POST to the configured trigger");
            Arc::new(http_trigger)
        }
        Err(e) => {
            error!(error = %e, "Failed to build messaging trigger; aborting");
            std::process::exit(3);
        }
    }
}
