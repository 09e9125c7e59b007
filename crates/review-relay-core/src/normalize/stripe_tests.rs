//! Tests for Stripe payload handlers.

use super::*;
use crate::ledger::{ClaimOutcome, InMemoryEventLedger};
use crate::normalize::{PhoneSource, TransactionCandidate};
use serde_json::json;

fn transaction(normalized: NormalizedEvent) -> TransactionCandidate {
    match normalized {
        NormalizedEvent::Transaction(candidate) => *candidate,
        other => panic!("expected transaction, got {other:?}"),
    }
}

fn checkout_event(session: serde_json::Value) -> WebhookEvent {
    WebhookEvent::new(
        Provider::Stripe,
        "evt_checkout_1",
        "checkout.session.completed",
        json!({ "id": "evt_checkout_1", "data": { "object": session } }),
    )
}

#[test]
fn test_checkout_session_builds_candidate() {
    let event = checkout_event(json!({
        "id": "cs_test_1",
        "mode": "payment",
        "amount_total": 4999,
        "payment_intent": "pi_123",
        "customer": "cus_42",
        "metadata": { "user_id": "7", "phone": "+15551111111" },
        "customer_details": { "name": "Ada Lovelace", "phone": "+15552222222" },
        "shipping_details": { "phone": "+15553333333" }
    }));

    let candidate = transaction(checkout_session_completed(&event).unwrap());

    assert_eq!(candidate.external_transaction_id, "cs_test_1");
    assert_eq!(candidate.purchase_amount.to_string(), "49.99");
    assert_eq!(candidate.origin, TransactionOrigin::Checkout);
    assert_eq!(candidate.customer_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(candidate.merchant.explicit_user_id, Some(UserId::new(7)));
    assert_eq!(candidate.merchant.customer_ref.as_deref(), Some("cus_42"));
    assert_eq!(candidate.mark_refs, vec!["pi_123".to_string()]);
    assert!(candidate.guard_refs.is_empty());

    // Metadata phone outranks checkout details, which outrank shipping
    let kinds: Vec<_> = candidate.phone_sources.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PhoneSourceKind::Metadata,
            PhoneSourceKind::CheckoutDetails,
            PhoneSourceKind::Shipping
        ]
    );

    let lookup = candidate.lookup_ref.unwrap();
    assert_eq!(lookup.provider, Provider::Stripe);
    assert_eq!(lookup.customer_id, "cus_42");
}

#[test]
fn test_checkout_session_subscription_mode_is_ignored() {
    for mode in ["subscription", "setup"] {
        let event = checkout_event(json!({
            "id": "cs_sub_1",
            "mode": mode,
            "amount_total": 999
        }));

        let normalized = checkout_session_completed(&event).unwrap();
        assert!(matches!(
            normalized,
            NormalizedEvent::Ignored {
                reason: SkipReason::SubscriptionCheckout
            }
        ));
    }
}

#[test]
fn test_checkout_session_requires_amount() {
    let event = checkout_event(json!({ "id": "cs_test_1", "mode": "payment" }));

    let err = checkout_session_completed(&event).unwrap_err();
    assert!(matches!(
        err,
        NormalizeError::MissingField { field } if field == "amount_total"
    ));
}

#[test]
fn test_checkout_session_unparseable_user_id_is_ignored() {
    let event = checkout_event(json!({
        "id": "cs_test_1",
        "mode": "payment",
        "amount_total": 1000,
        "metadata": { "user_id": "not-a-number" }
    }));

    let candidate = transaction(checkout_session_completed(&event).unwrap());
    assert_eq!(candidate.merchant.explicit_user_id, None);
}

#[test]
fn test_payment_intent_card_present_is_terminal() {
    let event = WebhookEvent::new(
        Provider::Stripe,
        "evt_pi_1",
        "payment_intent.succeeded",
        json!({ "data": { "object": {
            "id": "pi_456",
            "amount": 2500,
            "payment_method_types": ["card_present"]
        } } }),
    );

    let candidate = transaction(payment_intent_succeeded(&event).unwrap());

    assert_eq!(candidate.origin, TransactionOrigin::Terminal);
    assert_eq!(candidate.external_transaction_id, "pi_456");
    // The intent guards itself: a checkout session that marked pi_456
    // already owns this purchase
    assert_eq!(
        candidate.guard_refs,
        vec![GuardRef {
            object_id: "pi_456".to_string(),
            conflict_reason: SkipReason::Duplicate
        }]
    );
}

#[test]
fn test_payment_intent_collects_charge_billing_phone() {
    let event = WebhookEvent::new(
        Provider::Stripe,
        "evt_pi_2",
        "payment_intent.succeeded",
        json!({ "data": { "object": {
            "id": "pi_789",
            "amount": 1200,
            "payment_method_types": ["card"],
            "charges": { "data": [ {
                "billing_details": { "name": "Grace Hopper", "phone": "+15554443322" }
            } ] }
        } } }),
    );

    let candidate = transaction(payment_intent_succeeded(&event).unwrap());

    assert_eq!(candidate.origin, TransactionOrigin::Checkout);
    assert_eq!(candidate.customer_name.as_deref(), Some("Grace Hopper"));
    assert_eq!(
        candidate.phone_sources,
        vec![PhoneSource {
            kind: PhoneSourceKind::Billing,
            raw: "+15554443322".to_string()
        }]
    );
}

#[tokio::test]
async fn test_charge_with_processed_intent_is_ignored() {
    let ledger = InMemoryEventLedger::new();
    assert_eq!(
        ledger
            .claim(Provider::Stripe, "pi_123", "payment_intent.succeeded")
            .await
            .unwrap(),
        ClaimOutcome::Claimed
    );

    let event = WebhookEvent::new(
        Provider::Stripe,
        "evt_ch_1",
        "charge.succeeded",
        json!({ "data": { "object": {
            "id": "ch_111",
            "amount": 4999,
            "payment_intent": "pi_123"
        } } }),
    );

    let normalized = charge_succeeded(&event, &ledger).await.unwrap();
    assert!(matches!(
        normalized,
        NormalizedEvent::Ignored {
            reason: SkipReason::AlreadyProcessedViaPaymentIntent
        }
    ));
}

#[tokio::test]
async fn test_charge_with_fresh_intent_guards_on_it() {
    let ledger = InMemoryEventLedger::new();

    let event = WebhookEvent::new(
        Provider::Stripe,
        "evt_ch_2",
        "charge.succeeded",
        json!({ "data": { "object": {
            "id": "ch_222",
            "amount": 1500,
            "payment_intent": "pi_999",
            "billing_details": { "name": "Alan Turing", "phone": "+15556667788" },
            "metadata": { "user_id": "3" }
        } } }),
    );

    let candidate = transaction(charge_succeeded(&event, &ledger).await.unwrap());

    assert_eq!(candidate.origin, TransactionOrigin::Charge);
    assert_eq!(candidate.external_transaction_id, "ch_222");
    assert_eq!(candidate.merchant.explicit_user_id, Some(UserId::new(3)));
    assert_eq!(
        candidate.guard_refs,
        vec![GuardRef {
            object_id: "pi_999".to_string(),
            conflict_reason: SkipReason::AlreadyProcessedViaPaymentIntent
        }]
    );
    assert_eq!(candidate.customer_name.as_deref(), Some("Alan Turing"));
}

#[tokio::test]
async fn test_charge_card_present_is_terminal() {
    let ledger = InMemoryEventLedger::new();

    let event = WebhookEvent::new(
        Provider::Stripe,
        "evt_ch_3",
        "charge.succeeded",
        json!({ "data": { "object": {
            "id": "ch_333",
            "amount": 800,
            "payment_method_details": { "type": "card_present" }
        } } }),
    );

    let candidate = transaction(charge_succeeded(&event, &ledger).await.unwrap());

    assert_eq!(candidate.origin, TransactionOrigin::Terminal);
    assert!(candidate.guard_refs.is_empty());
}
