//! # Merchant Integrations
//!
//! An [`Integration`] is one merchant's connection to one provider: who the
//! merchant is, whether the connection is live, which transaction origins
//! may trigger review requests, and how provider location ids map to
//! human-readable names.
//!
//! The store is read-only from the pipeline's point of view. Integration
//! management (onboarding, toggles, location naming) lives in the account
//! settings surface, outside this service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{IntegrationId, Provider, StoreError, UserId};

// ============================================================================
// Integration
// ============================================================================

/// Display name for one provider location id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub id: String,
    pub name: String,
}

/// Location display names for a merchant's integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationSettings {
    /// Name used when the transaction's location id has no entry.
    #[serde(default)]
    pub default_name: Option<String>,
    #[serde(default)]
    pub locations: Vec<LocationEntry>,
}

impl LocationSettings {
    /// Resolve a display name for a provider location id.
    pub fn name_for(&self, location_id: Option<&str>) -> Option<String> {
        if let Some(id) = location_id {
            if let Some(entry) = self.locations.iter().find(|entry| entry.id == id) {
                return Some(entry.name.clone());
            }
        }
        self.default_name.clone()
    }
}

fn default_true() -> bool {
    true
}

/// One merchant's provider connection.
///
/// Deserializable from seed files; boolean flags default to enabled so a
/// minimal seed entry behaves like a fresh onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub user_id: UserId,
    pub provider: Provider,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub trigger_on_checkout: bool,
    #[serde(default = "default_true")]
    pub trigger_on_terminal: bool,
    /// Provider-scoped account identifier (Square merchant id, Shopify shop
    /// domain).
    #[serde(default)]
    pub account_ref: Option<String>,
    /// Provider customer identifier mapped to this merchant.
    #[serde(default)]
    pub customer_ref: Option<String>,
    #[serde(default)]
    pub location_settings: LocationSettings,
}

// ============================================================================
// Queries
// ============================================================================

/// Criteria for integration lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationQuery {
    pub provider: Option<Provider>,
    pub user_id: Option<UserId>,
    pub account_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub active_only: bool,
}

impl IntegrationQuery {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }

    pub fn matches(&self, integration: &Integration) -> bool {
        if let Some(provider) = self.provider {
            if integration.provider != provider {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if integration.user_id != user_id {
                return false;
            }
        }
        if let Some(account_ref) = &self.account_ref {
            if integration.account_ref.as_deref() != Some(account_ref.as_str()) {
                return false;
            }
        }
        if let Some(customer_ref) = &self.customer_ref {
            if integration.customer_ref.as_deref() != Some(customer_ref.as_str()) {
                return false;
            }
        }
        if self.active_only && !integration.is_active {
            return false;
        }
        true
    }
}

// ============================================================================
// IntegrationStore
// ============================================================================

/// Read access to merchant integrations.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// First integration matching the query, in stable store order.
    async fn find_one(&self, query: &IntegrationQuery)
        -> Result<Option<Integration>, StoreError>;

    /// All integrations matching the query.
    async fn find_all(&self, query: &IntegrationQuery) -> Result<Vec<Integration>, StoreError>;
}

/// Vec-backed store for single-process deployments and tests. Iteration
/// order is insertion order, which makes `find_one` deterministic.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationStore {
    integrations: RwLock<Vec<Integration>>,
}

impl InMemoryIntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, integration: Integration) {
        self.integrations.write().await.push(integration);
    }

    pub async fn len(&self) -> usize {
        self.integrations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.integrations.read().await.is_empty()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn find_one(
        &self,
        query: &IntegrationQuery,
    ) -> Result<Option<Integration>, StoreError> {
        let integrations = self.integrations.read().await;
        Ok(integrations.iter().find(|i| query.matches(i)).cloned())
    }

    async fn find_all(&self, query: &IntegrationQuery) -> Result<Vec<Integration>, StoreError> {
        let integrations = self.integrations.read().await;
        Ok(integrations
            .iter()
            .filter(|i| query.matches(i))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "integration_tests.rs"]
mod tests;
