//! # Integration Resolution
//!
//! Maps the identity evidence a webhook carries to the merchant integration
//! it belongs to. Evidence quality varies by provider and by how the
//! merchant set up their checkout, so resolution is an ordered fallback
//! chain rather than a single lookup:
//!
//! 1. explicit internal user id embedded in payment metadata;
//! 2. provider-scoped account identifier (Square merchant id, Shopify shop
//!    domain);
//! 3. provider customer identifier with a stored mapping;
//! 4. single-tenant fallback: exactly one active integration for the
//!    provider.
//!
//! Steps 1-3 match regardless of the active flag and stop on an inactive
//! match; a disabled connection must audit as `integration_inactive`, not
//! silently resolve to some other account.

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::integration::{Integration, IntegrationQuery, IntegrationStore};
use crate::normalize::MerchantRef;
use crate::{Provider, StoreError};

/// Outcome of a resolution attempt.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(Integration),
    /// An identity step matched, but the integration is switched off.
    FoundInactive(Integration),
    NotFound,
}

/// Ordered fallback resolution over an [`IntegrationStore`].
pub struct IntegrationResolver {
    store: Arc<dyn IntegrationStore>,
    single_tenant_fallback: bool,
}

impl IntegrationResolver {
    pub fn new(store: Arc<dyn IntegrationStore>, single_tenant_fallback: bool) -> Self {
        Self {
            store,
            single_tenant_fallback,
        }
    }

    #[instrument(skip(self, merchant), fields(provider = %provider))]
    pub async fn resolve(
        &self,
        provider: Provider,
        merchant: &MerchantRef,
    ) -> Result<Resolution, StoreError> {
        if let Some(user_id) = merchant.explicit_user_id {
            let query = IntegrationQuery {
                provider: Some(provider),
                user_id: Some(user_id),
                ..IntegrationQuery::default()
            };
            if let Some(integration) = self.store.find_one(&query).await? {
                debug!(user_id = %user_id, "resolved by explicit user id");
                return Ok(Self::gate_active(integration));
            }
        }

        if let Some(account_ref) = &merchant.account_ref {
            let query = IntegrationQuery {
                provider: Some(provider),
                account_ref: Some(account_ref.clone()),
                ..IntegrationQuery::default()
            };
            if let Some(integration) = self.store.find_one(&query).await? {
                debug!(account_ref = %account_ref, "resolved by account ref");
                return Ok(Self::gate_active(integration));
            }
        }

        if let Some(customer_ref) = &merchant.customer_ref {
            let query = IntegrationQuery {
                provider: Some(provider),
                customer_ref: Some(customer_ref.clone()),
                ..IntegrationQuery::default()
            };
            if let Some(integration) = self.store.find_one(&query).await? {
                debug!(customer_ref = %customer_ref, "resolved by customer mapping");
                return Ok(Self::gate_active(integration));
            }
        }

        if self.single_tenant_fallback {
            let query = IntegrationQuery {
                provider: Some(provider),
                active_only: true,
                ..IntegrationQuery::default()
            };
            let mut active = self.store.find_all(&query).await?;
            if active.len() == 1 {
                debug!("resolved by single-tenant fallback");
                return Ok(Resolution::Resolved(active.remove(0)));
            }
            debug!(
                active_count = active.len(),
                "single-tenant fallback needs exactly one active integration"
            );
        }

        Ok(Resolution::NotFound)
    }

    fn gate_active(integration: Integration) -> Resolution {
        if integration.is_active {
            Resolution::Resolved(integration)
        } else {
            Resolution::FoundInactive(integration)
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
