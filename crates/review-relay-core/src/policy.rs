//! # Trigger Policy
//!
//! Merchants opt in to review requests per transaction origin. The check is
//! pure; everything it needs is already on the integration record.

use crate::integration::Integration;
use crate::{SkipReason, TransactionOrigin};

/// Whether the integration allows review requests for this origin.
///
/// Terminal payments gate on `trigger_on_terminal`; checkout and direct
/// charges gate on `trigger_on_checkout`.
pub fn allows(integration: &Integration, origin: TransactionOrigin) -> bool {
    match origin {
        TransactionOrigin::Terminal => integration.trigger_on_terminal,
        TransactionOrigin::Checkout | TransactionOrigin::Charge => {
            integration.trigger_on_checkout
        }
    }
}

/// Skip reason for a denied origin.
pub fn denial_reason(origin: TransactionOrigin) -> SkipReason {
    SkipReason::TriggerDisabled(origin)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
