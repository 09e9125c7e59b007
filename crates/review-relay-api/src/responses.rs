//! Response types, query parameters, and health checking for the API.

use review_relay_core::{Timestamp, TransactionLog};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rows returned by the transaction listing when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Upper bound on a single transaction listing request.
pub const MAX_LIST_LIMIT: usize = 500;

// ============================================================================
// Response Types
// ============================================================================

/// Acknowledgement returned to a provider once a delivery is accepted.
///
/// Sent as soon as the delivery verifies and parses; pipeline processing
/// continues on a background task after this response.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub checks: HashMap<String, HealthCheckResult>,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: Timestamp,
}

/// Transaction audit listing response
#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionLog>,
    pub count: usize,
}

// ============================================================================
// Query Parameter Types
// ============================================================================

/// Parameters for transaction listing
#[derive(Debug, Deserialize)]
pub struct TransactionListParams {
    pub limit: Option<usize>,
}

impl TransactionListParams {
    /// Listing size with the default applied and the cap enforced.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

// ============================================================================
// Supporting Types
// ============================================================================

/// Health check result for individual components
#[derive(Debug, Serialize, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Overall health status
#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub checks: HashMap<String, HealthCheckResult>,
}

// ============================================================================
// Trait Definitions
// ============================================================================

/// Interface for system health monitoring
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Basic health check (fast)
    async fn check_health(&self) -> HealthStatus;

    /// Readiness check for load balancers
    async fn check_readiness(&self) -> bool;
}

// ============================================================================
// Default Implementations
// ============================================================================

/// Default health checker implementation
pub struct DefaultHealthChecker;

#[async_trait::async_trait]
impl HealthChecker for DefaultHealthChecker {
    async fn check_health(&self) -> HealthStatus {
        let start = std::time::Instant::now();
        let mut checks = HashMap::new();

        // If we can respond, the service loop is alive
        checks.insert(
            "service".to_string(),
            HealthCheckResult {
                healthy: true,
                message: "Service is running".to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );

        HealthStatus {
            is_healthy: true,
            checks,
        }
    }

    async fn check_readiness(&self) -> bool {
        // In-memory stores need no warm-up; a running service is a ready one
        true
    }
}
