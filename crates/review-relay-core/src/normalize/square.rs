//! Square payload handlers.
//!
//! Square wraps the payment under `data.object.payment` and carries the
//! merchant identity on the event envelope rather than the payment itself.

use serde_json::Value;

use super::{
    optional_str, push_phone_source, required_i64, required_str, CustomerRef, MerchantRef,
    NormalizeError, NormalizedEvent, PhoneSourceKind, TransactionCandidate, WebhookEvent,
};
use crate::{amount_from_minor_units, Provider, TransactionOrigin};

fn present(value: Option<&Value>) -> bool {
    value.map_or(false, |v| !v.is_null())
}

/// `payment.created`: the only Square event that yields a transaction.
///
/// Payments rarely carry a phone in the payload; the buyer's `customer_id`
/// is kept as a directory-lookup ref instead. A `device_details` block or a
/// `terminal_checkout_id` marks a point-of-sale payment.
pub(super) fn payment_created(event: &WebhookEvent) -> Result<NormalizedEvent, NormalizeError> {
    let payment = event
        .payload
        .get("data")
        .and_then(|data| data.get("object"))
        .and_then(|object| object.get("payment"))
        .ok_or_else(|| NormalizeError::MissingField {
            field: "data.object.payment".to_string(),
        })?;

    let payment_id = required_str(payment, &["id"])?;
    let purchase_amount =
        amount_from_minor_units(required_i64(payment, &["amount_money", "amount"])?);

    let origin = if present(payment.get("device_details"))
        || present(payment.get("terminal_checkout_id"))
    {
        TransactionOrigin::Terminal
    } else {
        TransactionOrigin::Checkout
    };

    let merchant = MerchantRef {
        explicit_user_id: None,
        account_ref: optional_str(&event.payload, &["merchant_id"]).map(str::to_string),
        customer_ref: None,
    };

    let lookup_ref = optional_str(payment, &["customer_id"]).map(|customer_id| CustomerRef {
        provider: Provider::Square,
        customer_id: customer_id.to_string(),
    });

    let mut phone_sources = Vec::new();
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::CheckoutDetails,
        optional_str(payment, &["buyer_phone_number"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Shipping,
        optional_str(payment, &["shipping_address", "phone_number"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Billing,
        optional_str(payment, &["billing_address", "phone_number"]),
    );

    Ok(NormalizedEvent::transaction(TransactionCandidate {
        external_transaction_id: payment_id.to_string(),
        customer_name: None,
        purchase_amount,
        location_id: optional_str(payment, &["location_id"]).map(str::to_string),
        location_name: None,
        origin,
        merchant,
        phone_sources,
        lookup_ref,
        guard_refs: Vec::new(),
        mark_refs: Vec::new(),
    }))
}

#[cfg(test)]
#[path = "square_tests.rs"]
mod tests;
