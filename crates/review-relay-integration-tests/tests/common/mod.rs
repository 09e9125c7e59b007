//! Common test utilities for Review-Relay integration tests
//!
//! This module provides:
//! - A full-service harness: real verifiers, resolver, pipeline, and audit
//!   log behind the HTTP router, with only the outbound trigger mocked
//! - A recording trigger whose receipt (or error) is configurable per test
//! - Signature forging helpers matching each provider's scheme
//! - Payload and signed-request builders for all three providers

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use review_relay_api::{
    create_router, AppState, DefaultHealthChecker, ServiceConfig, ServiceMetrics,
};
use review_relay_core::{
    CustomerDirectory, DispatchReceipt, DispatchRequest, EventLedger, InMemoryEventLedger,
    InMemoryIntegrationStore, InMemoryTransactionLogStore, Integration, IntegrationId,
    IntegrationResolver, IntegrationStore, LocationSettings, NullCustomerDirectory, PhoneResolver,
    Provider, ReviewTrigger, ShopifySignatureVerifier, SquareSignatureVerifier,
    StripeSignatureVerifier, Timestamp, TransactionLog, TransactionLogStore, TransactionPipeline,
    TriggerError, UserId, VerifierRegistry, WebhookSecret,
};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Shared secrets
// ============================================================================

// The Square scheme signs the notification URL together with the body, so
// requests must be forged against this exact string.
#[allow(dead_code)]
pub const STRIPE_TEST_SECRET: &str = "whsec_integration_test";
#[allow(dead_code)]
pub const SQUARE_SIGNATURE_KEY: &str = "sq_signature_key_integration_test";
#[allow(dead_code)]
pub const SQUARE_NOTIFICATION_URL: &str = "https://relay.example.com/webhooks/square";
#[allow(dead_code)]
pub const SHOPIFY_SHARED_SECRET: &str = "shpss_integration_test";

// ============================================================================
// Recording trigger
// ============================================================================

/// Stand-in for the messaging service that records every dispatch request.
///
/// Returns a queued receipt unless a test overrides the result.
pub struct RecordingTrigger {
    requests: Mutex<Vec<DispatchRequest>>,
    result_factory: Mutex<Box<dyn Fn() -> Result<DispatchReceipt, TriggerError> + Send + Sync>>,
}

impl RecordingTrigger {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            result_factory: Mutex::new(Box::new(|| {
                Ok(DispatchReceipt {
                    sms_queued: true,
                    detail: None,
                })
            })),
        }
    }

    #[allow(dead_code)]
    pub fn set_receipt(&self, receipt: DispatchReceipt) {
        *self.result_factory.lock().unwrap() = Box::new(move || Ok(receipt.clone()));
    }

    #[allow(dead_code)]
    pub fn set_error(&self, message: &str) {
        let message = message.to_string();
        *self.result_factory.lock().unwrap() = Box::new(move || {
            Err(TriggerError::Unavailable {
                message: message.clone(),
            })
        });
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ReviewTrigger for RecordingTrigger {
    async fn process_transaction(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchReceipt, TriggerError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.result_factory.lock().unwrap())()
    }
}

// ============================================================================
// Service harness
// ============================================================================

/// Fully wired service with handles on the pieces tests observe.
pub struct TestHarness {
    pub app: Router,
    pub ledger: Arc<InMemoryEventLedger>,
    pub log_store: Arc<InMemoryTransactionLogStore>,
    pub trigger: Arc<RecordingTrigger>,
}

/// Build a harness with verifiers for all three providers.
#[allow(dead_code)]
pub async fn build_harness(integrations: Vec<Integration>) -> TestHarness {
    build_harness_for(integrations, &Provider::all()).await
}

/// Build a harness with verifiers for the given providers only. Deliveries
/// for an unregistered provider are rejected before any processing.
#[allow(dead_code)]
pub async fn build_harness_for(
    integrations: Vec<Integration>,
    providers: &[Provider],
) -> TestHarness {
    let store = Arc::new(InMemoryIntegrationStore::new());
    for integration in integrations {
        store.insert(integration).await;
    }

    let ledger = Arc::new(InMemoryEventLedger::new());
    let log_store = Arc::new(InMemoryTransactionLogStore::new());
    let trigger = Arc::new(RecordingTrigger::new());

    let resolver = IntegrationResolver::new(Arc::clone(&store) as Arc<dyn IntegrationStore>, true);
    let phone = PhoneResolver::new(
        Arc::new(NullCustomerDirectory) as Arc<dyn CustomerDirectory>,
        Duration::from_millis(100),
    );
    let pipeline = Arc::new(TransactionPipeline::new(
        Arc::clone(&ledger) as Arc<dyn EventLedger>,
        resolver,
        phone,
        Arc::clone(&trigger) as Arc<dyn ReviewTrigger>,
        Arc::clone(&log_store) as Arc<dyn TransactionLogStore>,
    ));

    let mut verifiers = VerifierRegistry::new();
    for provider in providers {
        match provider {
            Provider::Stripe => verifiers.register(
                Provider::Stripe,
                Arc::new(StripeSignatureVerifier::new(
                    WebhookSecret::new(STRIPE_TEST_SECRET),
                    StripeSignatureVerifier::DEFAULT_TOLERANCE,
                )),
            ),
            Provider::Square => verifiers.register(
                Provider::Square,
                Arc::new(SquareSignatureVerifier::new(
                    WebhookSecret::new(SQUARE_SIGNATURE_KEY),
                    SQUARE_NOTIFICATION_URL,
                )),
            ),
            Provider::Shopify => verifiers.register(
                Provider::Shopify,
                Arc::new(ShopifySignatureVerifier::new(WebhookSecret::new(
                    SHOPIFY_SHARED_SECRET,
                ))),
            ),
        }
    }

    let state = AppState::new(
        ServiceConfig::default(),
        Arc::new(verifiers),
        pipeline,
        Arc::clone(&log_store) as Arc<dyn TransactionLogStore>,
        Arc::new(DefaultHealthChecker),
        Arc::new(ServiceMetrics::default()),
    );

    TestHarness {
        app: create_router(state),
        ledger,
        log_store,
        trigger,
    }
}

// ============================================================================
// Integration fixtures
// ============================================================================

/// Integration with every flag enabled and no account mapping.
#[allow(dead_code)]
pub fn integration(id: u64, user: u64, provider: Provider) -> Integration {
    Integration {
        id: IntegrationId::new(id),
        user_id: UserId::new(user),
        provider,
        is_active: true,
        trigger_on_checkout: true,
        trigger_on_terminal: true,
        account_ref: None,
        customer_ref: None,
        location_settings: LocationSettings::default(),
    }
}

#[allow(dead_code)]
pub fn stripe_integration(id: u64, user: u64) -> Integration {
    integration(id, user, Provider::Stripe)
}

/// Square integration routed by merchant id.
#[allow(dead_code)]
pub fn square_integration(id: u64, user: u64, merchant_id: &str) -> Integration {
    let mut fixture = integration(id, user, Provider::Square);
    fixture.account_ref = Some(merchant_id.to_string());
    fixture
}

/// Shopify integration routed by shop domain.
#[allow(dead_code)]
pub fn shopify_integration(id: u64, user: u64, shop_domain: &str) -> Integration {
    let mut fixture = integration(id, user, Provider::Shopify);
    fixture.account_ref = Some(shop_domain.to_string());
    fixture
}

// ============================================================================
// Payload builders
// ============================================================================

/// Completed Stripe Checkout session. Tests mutate the returned value for
/// variants (subscription mode, missing phone, metadata user routing).
#[allow(dead_code)]
pub fn stripe_checkout_payload(event_id: &str, session_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "mode": "payment",
                "amount_total": 2599,
                "payment_intent": format!("pi_for_{}", session_id),
                "customer_details": {
                    "name": "Ada Lovelace",
                    "phone": "+1 555 111 2222"
                }
            }
        }
    })
}

/// Stripe payment intent succeeded event.
#[allow(dead_code)]
pub fn stripe_payment_intent_payload(event_id: &str, intent_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": intent_id,
                "amount": 2599,
                "metadata": {
                    "phone": "+1 555 111 2222"
                }
            }
        }
    })
}

/// Stripe charge event carrying the payment intent it settled.
#[allow(dead_code)]
pub fn stripe_charge_payload(event_id: &str, charge_id: &str, intent_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "charge.succeeded",
        "data": {
            "object": {
                "id": charge_id,
                "amount": 2599,
                "payment_intent": intent_id,
                "billing_details": {
                    "name": "Ada Lovelace",
                    "phone": "+1 555 111 2222"
                }
            }
        }
    })
}

/// Square payment.created envelope for an online payment.
#[allow(dead_code)]
pub fn square_payment_payload(event_id: &str, payment_id: &str, merchant_id: &str) -> Value {
    json!({
        "event_id": event_id,
        "type": "payment.created",
        "merchant_id": merchant_id,
        "data": {
            "object": {
                "payment": {
                    "id": payment_id,
                    "amount_money": { "amount": 2599, "currency": "USD" },
                    "buyer_phone_number": "+1 555 333 4444",
                    "location_id": "LOC_1"
                }
            }
        }
    })
}

/// Shopify order creation payload. The order itself is the body; routing
/// identity rides in on request headers.
#[allow(dead_code)]
pub fn shopify_order_payload(order_id: u64) -> Value {
    json!({
        "id": order_id,
        "total_price": "25.99",
        "source_name": "web",
        "customer": {
            "first_name": "Ada",
            "last_name": "Lovelace",
            "phone": "+1 555 111 2222"
        }
    })
}

// ============================================================================
// Signature forging
// ============================================================================

/// `Stripe-Signature` header value: `t={ts},v1={hex hmac over "ts.body"}`.
#[allow(dead_code)]
pub fn stripe_signature(body: &str) -> String {
    let timestamp = Timestamp::now().unix_seconds();
    let mut mac = HmacSha256::new_from_slice(STRIPE_TEST_SECRET.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Square signature: base64 HMAC over the notification URL and body.
#[allow(dead_code)]
pub fn square_signature(body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(SQUARE_SIGNATURE_KEY.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(SQUARE_NOTIFICATION_URL.as_bytes());
    mac.update(body.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Shopify signature: base64 HMAC over the raw body.
#[allow(dead_code)]
pub fn shopify_signature(body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(SHOPIFY_SHARED_SECRET.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

// ============================================================================
// Request builders
// ============================================================================

#[allow(dead_code)]
pub fn signed_stripe_request(payload: &Value) -> Request<Body> {
    let body = payload.to_string();
    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json")
        .header("Stripe-Signature", stripe_signature(&body))
        .body(Body::from(body))
        .unwrap()
}

#[allow(dead_code)]
pub fn signed_square_request(payload: &Value) -> Request<Body> {
    let body = payload.to_string();
    Request::builder()
        .method("POST")
        .uri("/webhooks/square")
        .header("content-type", "application/json")
        .header("x-square-hmacsha256-signature", square_signature(&body))
        .body(Body::from(body))
        .unwrap()
}

/// Shopify deliveries carry event identity and shop domain in headers, not
/// in the payload.
#[allow(dead_code)]
pub fn signed_shopify_request(
    payload: &Value,
    webhook_id: &str,
    topic: &str,
    shop_domain: &str,
) -> Request<Body> {
    let body = payload.to_string();
    Request::builder()
        .method("POST")
        .uri("/webhooks/shopify")
        .header("content-type", "application/json")
        .header("X-Shopify-Hmac-Sha256", shopify_signature(&body))
        .header("x-shopify-webhook-id", webhook_id)
        .header("x-shopify-topic", topic)
        .header("x-shopify-shop-domain", shop_domain)
        .body(Body::from(body))
        .unwrap()
}

// ============================================================================
// Response and synchronization helpers
// ============================================================================

/// Parse a response body as JSON. An empty body becomes `Value::Null`.
#[allow(dead_code)]
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    }
}

/// Poll until the trigger has received at least `count` dispatches.
///
/// Webhook acknowledgement races the background pipeline task, so
/// observations need to wait rather than assert immediately.
#[allow(dead_code)]
pub async fn wait_for_dispatches(trigger: &Arc<RecordingTrigger>, count: usize) {
    for _ in 0..200 {
        if trigger.call_count() >= count {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {} dispatch call(s)", count);
}

/// Poll until the audit log holds at least `count` rows, returning them
/// newest first.
#[allow(dead_code)]
pub async fn wait_for_audit_rows(
    log_store: &Arc<InMemoryTransactionLogStore>,
    count: usize,
) -> Vec<TransactionLog> {
    for _ in 0..200 {
        let rows = log_store
            .recent(50)
            .await
            .expect("in-memory audit log never fails");
        if rows.len() >= count {
            return rows;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {} audit row(s)", count);
}

/// Give spawned pipeline tasks time to finish before a negative assertion.
#[allow(dead_code)]
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}
