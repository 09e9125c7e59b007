//! Tests for [`ServiceConfig`] defaults, validation, and secret redaction.

use super::*;

// ============================================================================
// Default and deserialization tests
// ============================================================================

mod defaults_tests {
    use super::*;

    /// Verify that the default configuration passes validation.
    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
    }

    /// Verify the default server binding values.
    #[test]
    fn test_default_server_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_body_size, 1024 * 1024);
        assert_eq!(config.server.shutdown_timeout_seconds, 30);
    }

    /// Verify the default pipeline values.
    #[test]
    fn test_default_pipeline_values() {
        let config = ServiceConfig::default();
        assert!(config.pipeline.single_tenant_fallback);
        assert_eq!(config.pipeline.lookup_timeout_ms, 2000);
        assert!(config.pipeline.trigger_url.is_none());
        assert!(config.pipeline.integrations_file.is_none());
    }

    /// Verify that an empty document deserializes into the full default
    /// configuration.
    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ServiceConfig = serde_json::from_str("{}").expect("empty config must parse");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert!(config.providers.stripe.is_none());
        assert!(config.providers.square.is_none());
        assert!(config.providers.shopify.is_none());
    }

    /// Verify that a partial section inherits defaults for omitted fields.
    #[test]
    fn test_partial_server_section_inherits_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"server": {"port": 9090}}"#).expect("config must parse");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.max_body_size, 1024 * 1024);
    }

    /// Verify that a Stripe section without tolerance_seconds defaults to 300.
    #[test]
    fn test_stripe_tolerance_defaults_to_300() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"providers": {"stripe": {"signing_secret": "whsec_test"}}}"#,
        )
        .expect("config must parse");

        let stripe = config.providers.stripe.expect("stripe section must be set");
        assert_eq!(stripe.signing_secret, "whsec_test");
        assert!(stripe.api_key.is_none());
        assert_eq!(stripe.tolerance_seconds, 300);
    }
}

// ============================================================================
// Validation tests
// ============================================================================

mod validate_tests {
    use super::*;

    fn config_with_stripe(signing_secret: &str) -> ServiceConfig {
        ServiceConfig {
            providers: ProvidersConfig {
                stripe: Some(StripeConfig {
                    signing_secret: signing_secret.to_string(),
                    api_key: None,
                    tolerance_seconds: 300,
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Verify that port zero is rejected.
    #[test]
    fn test_port_zero_fails() {
        let mut config = ServiceConfig::default();
        config.server.port = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            matches!(&result, Err(ConfigError::Invalid { message }) if message.contains("server.port")),
            "expected a server.port error, got: {result:?}"
        );
    }

    /// Verify that a zero body size limit is rejected.
    #[test]
    fn test_zero_body_size_fails() {
        let mut config = ServiceConfig::default();
        config.server.max_body_size = 0;
        assert!(config.validate().is_err());
    }

    /// Verify that a zero lookup timeout is rejected.
    #[test]
    fn test_zero_lookup_timeout_fails() {
        let mut config = ServiceConfig::default();
        config.pipeline.lookup_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    /// Verify that a malformed trigger URL is rejected.
    #[test]
    fn test_invalid_trigger_url_fails() {
        let mut config = ServiceConfig::default();
        config.pipeline.trigger_url = Some("not a url".to_string());

        let result = config.validate();
        assert!(
            matches!(&result, Err(ConfigError::Invalid { message }) if message.contains("trigger_url")),
            "expected a trigger_url error, got: {result:?}"
        );
    }

    /// Verify that a well-formed trigger URL passes.
    #[test]
    fn test_valid_trigger_url_passes() {
        let mut config = ServiceConfig::default();
        config.pipeline.trigger_url = Some("https://messaging.internal/requests".to_string());
        assert!(config.validate().is_ok());
    }

    /// Verify that an unrecognized logging level is rejected.
    #[test]
    fn test_unrecognized_log_level_fails() {
        let mut config = ServiceConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    /// Verify that an empty Stripe signing secret fails with the config key.
    #[test]
    fn test_empty_stripe_secret_fails() {
        let config = config_with_stripe("");

        let result = config.validate();
        assert!(
            matches!(&result, Err(ConfigError::Missing { key }) if key == "providers.stripe.signing_secret"),
            "expected a missing-secret error, got: {result:?}"
        );
    }

    /// Verify that a populated Stripe section passes.
    #[test]
    fn test_populated_stripe_section_passes() {
        let config = config_with_stripe("whsec_live_secret");
        assert!(config.validate().is_ok());
    }

    /// Verify that a malformed Square notification URL is rejected.
    #[test]
    fn test_invalid_square_notification_url_fails() {
        let config = ServiceConfig {
            providers: ProvidersConfig {
                square: Some(SquareConfig {
                    signature_key: "sq_signature_key".to_string(),
                    notification_url: "://missing-scheme".to_string(),
                    access_token: None,
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let result = config.validate();
        assert!(
            matches!(&result, Err(ConfigError::Invalid { message }) if message.contains("notification_url")),
            "expected a notification_url error, got: {result:?}"
        );
    }

    /// Verify that an empty Square signature key fails before the URL check.
    #[test]
    fn test_empty_square_signature_key_fails() {
        let config = ServiceConfig {
            providers: ProvidersConfig {
                square: Some(SquareConfig {
                    signature_key: String::new(),
                    notification_url: "https://relay.example.com/webhooks/square".to_string(),
                    access_token: None,
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing { .. })
        ));
    }

    /// Verify that an empty Shopify shared secret is rejected.
    #[test]
    fn test_empty_shopify_secret_fails() {
        let config = ServiceConfig {
            providers: ProvidersConfig {
                shopify: Some(ShopifyConfig {
                    shared_secret: String::new(),
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing { key }) if key == "providers.shopify.shared_secret"
        ));
    }
}

// ============================================================================
// Redaction tests
// ============================================================================

mod redaction_tests {
    use super::*;

    /// Verify that Stripe Debug output redacts both credentials.
    #[test]
    fn test_stripe_debug_redacts_secrets() {
        let config = StripeConfig {
            signing_secret: "whsec_super_sensitive".to_string(),
            api_key: Some("sk_live_sensitive".to_string()),
            tolerance_seconds: 300,
        };

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("whsec_super_sensitive"));
        assert!(!debug_str.contains("sk_live_sensitive"));
        assert!(debug_str.contains("<REDACTED>"));
        assert!(debug_str.contains("300"));
    }

    /// Verify that Square Debug output redacts credentials but keeps the
    /// notification URL visible.
    #[test]
    fn test_square_debug_redacts_key_keeps_url() {
        let config = SquareConfig {
            signature_key: "sq_sensitive_key".to_string(),
            notification_url: "https://relay.example.com/webhooks/square".to_string(),
            access_token: Some("sq_access_sensitive".to_string()),
        };

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("sq_sensitive_key"));
        assert!(!debug_str.contains("sq_access_sensitive"));
        assert!(debug_str.contains("https://relay.example.com/webhooks/square"));
    }

    /// Verify that Shopify Debug output redacts the shared secret.
    #[test]
    fn test_shopify_debug_redacts_secret() {
        let config = ShopifyConfig {
            shared_secret: "shpss_sensitive".to_string(),
        };

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("shpss_sensitive"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
