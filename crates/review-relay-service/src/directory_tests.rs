//! Tests for HTTP customer directory lookups.

use super::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn customer(provider: Provider, customer_id: &str) -> CustomerRef {
    CustomerRef {
        provider,
        customer_id: customer_id.to_string(),
    }
}

fn config_for(server: &MockServer) -> DirectoryConfig {
    DirectoryConfig {
        stripe_api_key: Some("sk_test_123".to_string()),
        square_access_token: Some("sq_token_456".to_string()),
        timeout: Duration::from_secs(1),
        stripe_base_url: server.uri(),
        square_base_url: server.uri(),
    }
}

/// Verify that a Stripe profile phone is fetched and normalized.
#[tokio::test]
async fn test_stripe_lookup_returns_profile_phone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_123"))
        .and(header("Authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cus_123",
            "phone": "+1 (555) 867-5309"
        })))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_123"))
        .await
        .unwrap();

    assert_eq!(result.unwrap().as_str(), "+15558675309");
}

/// Verify that a missing Stripe customer reads as no phone.
#[tokio::test]
async fn test_stripe_lookup_treats_not_found_as_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_gone"))
        .await
        .unwrap();

    assert!(result.is_none());
}

/// Verify that a profile without a phone reads as no phone.
#[tokio::test]
async fn test_stripe_lookup_handles_profile_without_phone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_silent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cus_silent",
            "phone": null
        })))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_silent"))
        .await
        .unwrap();

    assert!(result.is_none());
}

/// Verify that an unusable stored phone reads as no phone rather than an
/// error.
#[tokio::test]
async fn test_stripe_lookup_discards_unusable_phone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cus_bad",
            "phone": "call me maybe"
        })))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_bad"))
        .await
        .unwrap();

    assert!(result.is_none());
}

/// Verify that a provider error status surfaces as a request failure.
#[tokio::test]
async fn test_stripe_lookup_surfaces_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_err"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_err"))
        .await;

    assert!(matches!(result, Err(DirectoryError::RequestFailed { .. })));
}

/// Verify that an unreadable response body surfaces as an invalid response.
#[tokio::test]
async fn test_stripe_lookup_surfaces_unreadable_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_html"))
        .await;

    assert!(matches!(result, Err(DirectoryError::InvalidResponse { .. })));
}

/// Verify that a Square profile phone is fetched from the wrapped customer
/// object.
#[tokio::test]
async fn test_square_lookup_returns_profile_phone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/customers/SQ_CUST_1"))
        .and(header("Authorization", "Bearer sq_token_456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "customer": {
                "id": "SQ_CUST_1",
                "phone_number": "+1-555-222-3333"
            }
        })))
        .mount(&server)
        .await;

    let directory = HttpCustomerDirectory::new(config_for(&server)).unwrap();
    let result = directory
        .lookup_phone(&customer(Provider::Square, "SQ_CUST_1"))
        .await
        .unwrap();

    assert_eq!(result.unwrap().as_str(), "+15552223333");
}

/// Verify that lookups without credentials resolve to no phone without
/// calling out.
#[tokio::test]
async fn test_lookup_without_credentials_is_absent() {
    let directory = HttpCustomerDirectory::new(DirectoryConfig {
        timeout: Duration::from_millis(100),
        ..DirectoryConfig::default()
    })
    .unwrap();

    let result = directory
        .lookup_phone(&customer(Provider::Stripe, "cus_123"))
        .await
        .unwrap();

    assert!(result.is_none());
}

/// Verify that Shopify has no directory behind it.
#[tokio::test]
async fn test_shopify_lookup_is_always_absent() {
    let directory = HttpCustomerDirectory::new(DirectoryConfig::default()).unwrap();

    let result = directory
        .lookup_phone(&customer(Provider::Shopify, "any"))
        .await
        .unwrap();

    assert!(result.is_none());
}

/// Verify that directory credentials never appear in debug output.
#[test]
fn test_directory_config_debug_is_redacted() {
    let config = DirectoryConfig {
        stripe_api_key: Some("sk_live_secret".to_string()),
        square_access_token: Some("sq_live_secret".to_string()),
        ..DirectoryConfig::default()
    };

    let debug = format!("{config:?}");

    assert!(!debug.contains("sk_live_secret"));
    assert!(!debug.contains("sq_live_secret"));
    assert!(debug.contains("REDACTED"));
}
