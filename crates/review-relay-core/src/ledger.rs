//! # Processed-Event Ledger
//!
//! Append-only record of handled webhook deliveries, unique on
//! `(provider, event_id)`. Providers deliver at-least-once; the ledger is
//! what turns that into at-most-one dispatch.
//!
//! [`EventLedger::claim`] is the correctness boundary: an atomic
//! insert-if-absent that must run before any side effect. Two concurrent
//! deliveries of the same event race through `claim`, and exactly one
//! observes [`ClaimOutcome::Claimed`]. [`EventLedger::is_processed`] is a
//! read-only fast path and the lookup used for cross-event references; it
//! never substitutes for a claim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{Provider, StoreError, Timestamp};

// ============================================================================
// Records
// ============================================================================

/// One handled delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEventRecord {
    pub provider: Provider,
    pub event_id: String,
    /// Provider event type, kept for audit queries. Guard and mark claims
    /// carry the type of the event that claimed them.
    pub event_type: String,
    pub processed_at: Timestamp,
}

/// Outcome of a [`EventLedger::claim`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller inserted the record and owns the event.
    Claimed,
    /// A record already existed; the event was handled elsewhere.
    AlreadyProcessed,
}

// ============================================================================
// EventLedger
// ============================================================================

/// Store abstraction for duplicate suppression.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Check whether an event id has already been claimed.
    async fn is_processed(&self, provider: Provider, event_id: &str)
        -> Result<bool, StoreError>;

    /// Atomically record an event id, failing softly if it already exists.
    ///
    /// The insert and the uniqueness check are one operation; callers must
    /// not check-then-claim.
    async fn claim(
        &self,
        provider: Provider,
        event_id: &str,
        event_type: &str,
    ) -> Result<ClaimOutcome, StoreError>;
}

// ============================================================================
// InMemoryEventLedger
// ============================================================================

/// Mutex-guarded map ledger for single-process deployments and tests.
///
/// Entries live for the process lifetime; provider retry windows are far
/// shorter than any realistic uptime.
#[derive(Debug, Default)]
pub struct InMemoryEventLedger {
    records: Mutex<HashMap<(Provider, String), ProcessedEventRecord>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, for test inspection.
    pub async fn records(&self) -> Vec<ProcessedEventRecord> {
        self.records.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn is_processed(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<bool, StoreError> {
        let records = self.records.lock().await;
        Ok(records.contains_key(&(provider, event_id.to_string())))
    }

    async fn claim(
        &self,
        provider: Provider,
        event_id: &str,
        event_type: &str,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut records = self.records.lock().await;
        match records.entry((provider, event_id.to_string())) {
            Entry::Occupied(_) => Ok(ClaimOutcome::AlreadyProcessed),
            Entry::Vacant(slot) => {
                slot.insert(ProcessedEventRecord {
                    provider,
                    event_id: event_id.to_string(),
                    event_type: event_type.to_string(),
                    processed_at: Timestamp::now(),
                });
                Ok(ClaimOutcome::Claimed)
            }
        }
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
