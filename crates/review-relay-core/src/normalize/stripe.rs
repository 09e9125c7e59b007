//! Stripe payload handlers.
//!
//! Stripe describes one purchase through up to three deliveries: the
//! checkout session, its payment intent, and the underlying charge. The
//! handlers wire guard-refs and mark-refs so whichever delivery arrives
//! first owns the purchase in the ledger and the siblings dedupe against it.

use serde_json::Value;

use super::{
    optional_str, push_phone_source, required_i64, required_str, CustomerRef, GuardRef,
    MerchantRef, NormalizeError, NormalizedEvent, PhoneSourceKind, TransactionCandidate,
    WebhookEvent,
};
use crate::ledger::EventLedger;
use crate::{amount_from_minor_units, Provider, SkipReason, TransactionOrigin, UserId};

/// Stripe wraps the subject resource under `data.object`.
fn data_object(event: &WebhookEvent) -> Result<&Value, NormalizeError> {
    event
        .payload
        .get("data")
        .and_then(|data| data.get("object"))
        .ok_or_else(|| NormalizeError::MissingField {
            field: "data.object".to_string(),
        })
}

/// Metadata user ids are merchant-entered strings; anything that does not
/// parse is treated as absent so resolution can fall through.
fn metadata_user_id(object: &Value) -> Option<UserId> {
    optional_str(object, &["metadata", "user_id"]).and_then(|raw| raw.parse::<UserId>().ok())
}

fn customer_refs(object: &Value) -> (Option<String>, Option<CustomerRef>) {
    match optional_str(object, &["customer"]) {
        Some(customer_id) => (
            Some(customer_id.to_string()),
            Some(CustomerRef {
                provider: Provider::Stripe,
                customer_id: customer_id.to_string(),
            }),
        ),
        None => (None, None),
    }
}

/// `checkout.session.completed`: an online checkout finished.
///
/// Subscription and setup-mode sessions belong to the billing pipeline and
/// are ignored here. The session's `payment_intent` id is recorded as a
/// mark-ref so the sibling intent and charge deliveries dedupe.
pub(super) fn checkout_session_completed(
    event: &WebhookEvent,
) -> Result<NormalizedEvent, NormalizeError> {
    let session = data_object(event)?;

    if matches!(
        optional_str(session, &["mode"]),
        Some("subscription") | Some("setup")
    ) {
        return Ok(NormalizedEvent::ignored(SkipReason::SubscriptionCheckout));
    }

    let session_id = required_str(session, &["id"])?;
    let purchase_amount = amount_from_minor_units(required_i64(session, &["amount_total"])?);

    let (customer_ref, lookup_ref) = customer_refs(session);
    let merchant = MerchantRef {
        explicit_user_id: metadata_user_id(session),
        account_ref: None,
        customer_ref,
    };

    let mut phone_sources = Vec::new();
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Metadata,
        optional_str(session, &["metadata", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::CheckoutDetails,
        optional_str(session, &["customer_details", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Shipping,
        optional_str(session, &["shipping_details", "phone"]),
    );

    let mark_refs = optional_str(session, &["payment_intent"])
        .map(|intent_id| vec![intent_id.to_string()])
        .unwrap_or_default();

    Ok(NormalizedEvent::transaction(TransactionCandidate {
        external_transaction_id: session_id.to_string(),
        customer_name: optional_str(session, &["customer_details", "name"]).map(str::to_string),
        purchase_amount,
        location_id: None,
        location_name: None,
        origin: TransactionOrigin::Checkout,
        merchant,
        phone_sources,
        lookup_ref,
        guard_refs: Vec::new(),
        mark_refs,
    }))
}

/// `payment_intent.succeeded`: a payment completed, with or without a
/// checkout session in front of it.
///
/// The intent id itself rides as a guard-ref: when a checkout session
/// already marked it, this delivery is the same purchase seen again.
pub(super) fn payment_intent_succeeded(
    event: &WebhookEvent,
) -> Result<NormalizedEvent, NormalizeError> {
    let intent = data_object(event)?;

    let intent_id = required_str(intent, &["id"])?;
    let purchase_amount = amount_from_minor_units(required_i64(intent, &["amount"])?);

    let card_present = intent
        .get("payment_method_types")
        .and_then(Value::as_array)
        .map_or(false, |types| {
            types.iter().any(|t| t.as_str() == Some("card_present"))
        });
    let origin = if card_present {
        TransactionOrigin::Terminal
    } else {
        TransactionOrigin::Checkout
    };

    let (customer_ref, lookup_ref) = customer_refs(intent);
    let merchant = MerchantRef {
        explicit_user_id: metadata_user_id(intent),
        account_ref: None,
        customer_ref,
    };

    let first_charge = intent
        .get("charges")
        .and_then(|charges| charges.get("data"))
        .and_then(Value::as_array)
        .and_then(|data| data.first());

    let mut phone_sources = Vec::new();
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Metadata,
        optional_str(intent, &["metadata", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Shipping,
        optional_str(intent, &["shipping", "phone"]),
    );
    if let Some(charge) = first_charge {
        push_phone_source(
            &mut phone_sources,
            PhoneSourceKind::Billing,
            optional_str(charge, &["billing_details", "phone"]),
        );
    }

    let customer_name = optional_str(intent, &["shipping", "name"])
        .or_else(|| {
            first_charge.and_then(|charge| optional_str(charge, &["billing_details", "name"]))
        })
        .map(str::to_string);

    Ok(NormalizedEvent::transaction(TransactionCandidate {
        external_transaction_id: intent_id.to_string(),
        customer_name,
        purchase_amount,
        location_id: None,
        location_name: None,
        origin,
        merchant,
        phone_sources,
        lookup_ref,
        guard_refs: vec![GuardRef {
            object_id: intent_id.to_string(),
            conflict_reason: SkipReason::Duplicate,
        }],
        mark_refs: Vec::new(),
    }))
}

/// `charge.succeeded`: the broadest delivery; most merchants receive it
/// alongside the intent event for the same purchase.
///
/// The ledger read is a fast path only. The guard-ref claim at the atomic
/// boundary closes the window where the intent event lands between this
/// read and the claim.
pub(super) async fn charge_succeeded(
    event: &WebhookEvent,
    ledger: &dyn EventLedger,
) -> Result<NormalizedEvent, NormalizeError> {
    let charge = data_object(event)?;

    let charge_id = required_str(charge, &["id"])?;
    let purchase_amount = amount_from_minor_units(required_i64(charge, &["amount"])?);

    let mut guard_refs = Vec::new();
    if let Some(intent_id) = optional_str(charge, &["payment_intent"]) {
        if ledger.is_processed(Provider::Stripe, intent_id).await? {
            return Ok(NormalizedEvent::ignored(
                SkipReason::AlreadyProcessedViaPaymentIntent,
            ));
        }
        guard_refs.push(GuardRef {
            object_id: intent_id.to_string(),
            conflict_reason: SkipReason::AlreadyProcessedViaPaymentIntent,
        });
    }

    let card_present =
        optional_str(charge, &["payment_method_details", "type"]) == Some("card_present");
    let origin = if card_present {
        TransactionOrigin::Terminal
    } else {
        TransactionOrigin::Charge
    };

    let (customer_ref, lookup_ref) = customer_refs(charge);
    let merchant = MerchantRef {
        explicit_user_id: metadata_user_id(charge),
        account_ref: None,
        customer_ref,
    };

    let mut phone_sources = Vec::new();
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Metadata,
        optional_str(charge, &["metadata", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Billing,
        optional_str(charge, &["billing_details", "phone"]),
    );

    Ok(NormalizedEvent::transaction(TransactionCandidate {
        external_transaction_id: charge_id.to_string(),
        customer_name: optional_str(charge, &["billing_details", "name"]).map(str::to_string),
        purchase_amount,
        location_id: None,
        location_name: None,
        origin,
        merchant,
        phone_sources,
        lookup_ref,
        guard_refs,
        mark_refs: Vec::new(),
    }))
}

#[cfg(test)]
#[path = "stripe_tests.rs"]
mod tests;
