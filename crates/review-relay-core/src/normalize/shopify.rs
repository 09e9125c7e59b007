//! Shopify payload handlers.
//!
//! Shopify posts the order object as the whole payload; the event type and
//! shop identity arrive on transport headers, which the HTTP layer has
//! already folded into the [`WebhookEvent`].

use serde_json::Value;

use super::{
    optional_str, push_phone_source, required_str, MerchantRef, NormalizeError, NormalizedEvent,
    PhoneSourceKind, TransactionCandidate, WebhookEvent,
};
use crate::{Decimal, TransactionOrigin};
use std::str::FromStr;

/// Shopify ids are numeric in webhook payloads but strings in some admin
/// exports; both forms are accepted.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn customer_display_name(customer: Option<&Value>) -> Option<String> {
    let customer = customer?;
    let first = optional_str(customer, &["first_name"]);
    let last = optional_str(customer, &["last_name"]);
    match (first, last) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first.to_string()),
        (None, Some(last)) => Some(last.to_string()),
        (None, None) => None,
    }
}

/// `orders/create`: a new order, online or at the point of sale.
///
/// `total_price` is already a decimal string; no minor-unit conversion.
/// `source_name == "pos"` marks in-person orders.
pub(super) fn orders_create(event: &WebhookEvent) -> Result<NormalizedEvent, NormalizeError> {
    let order = &event.payload;

    let order_id = id_string(order.get("id")).ok_or_else(|| NormalizeError::MissingField {
        field: "id".to_string(),
    })?;

    let raw_price = required_str(order, &["total_price"])?;
    let purchase_amount = Decimal::from_str(raw_price).map_err(|_| NormalizeError::InvalidField {
        field: "total_price".to_string(),
        message: format!("'{raw_price}' is not a decimal amount"),
    })?;

    let origin = if optional_str(order, &["source_name"]) == Some("pos") {
        TransactionOrigin::Terminal
    } else {
        TransactionOrigin::Checkout
    };

    let merchant = MerchantRef {
        explicit_user_id: None,
        account_ref: event.account_hint.clone(),
        customer_ref: None,
    };

    let mut phone_sources = Vec::new();
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::CheckoutDetails,
        optional_str(order, &["phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::CustomerProfile,
        optional_str(order, &["customer", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Shipping,
        optional_str(order, &["shipping_address", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::Billing,
        optional_str(order, &["billing_address", "phone"]),
    );
    push_phone_source(
        &mut phone_sources,
        PhoneSourceKind::CustomerProfile,
        optional_str(order, &["customer", "default_address", "phone"]),
    );

    Ok(NormalizedEvent::transaction(TransactionCandidate {
        external_transaction_id: order_id,
        customer_name: customer_display_name(order.get("customer")),
        purchase_amount,
        location_id: id_string(order.get("location_id")),
        location_name: None,
        origin,
        merchant,
        phone_sources,
        lookup_ref: None,
        guard_refs: Vec::new(),
        mark_refs: Vec::new(),
    }))
}

#[cfg(test)]
#[path = "shopify_tests.rs"]
mod tests;
