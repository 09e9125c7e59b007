//! # Transaction Pipeline
//!
//! Drives one verified webhook event through its full evaluation:
//!
//! ```text
//! fast-path dedupe -> normalize -> atomic claim (event id + guard refs)
//!   -> mark refs -> integration resolution -> trigger policy
//!   -> phone resolution -> dispatch -> audit row
//! ```
//!
//! The atomic claim is the correctness boundary: it runs before any side
//! effect, so two concurrent deliveries of the same purchase settle to
//! exactly one dispatch. Everything after the claim is terminal. A failed
//! check skips the event with an auditable reason, and a messaging failure
//! degrades to a `failed` audit row. The provider's retry (deduplicated by
//! the ledger) is the only retry path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::integration::Integration;
use crate::ledger::{ClaimOutcome, EventLedger};
use crate::normalize::{normalize, NormalizeError, NormalizedEvent, TransactionCandidate, WebhookEvent};
use crate::phone::PhoneResolver;
use crate::policy;
use crate::resolver::{IntegrationResolver, Resolution};
use crate::{
    Decimal, IntegrationId, PhoneNumber, Provider, SkipReason, StoreError, Timestamp,
    TransactionLogId, TransactionOrigin, UserId,
};

// ============================================================================
// Audit log
// ============================================================================

/// Terminal messaging state of an evaluated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsStatus {
    Queued,
    Failed,
    Skipped,
}

/// Write-once audit row; one per terminal outcome of a normalized
/// transaction. Ignored events (duplicates, unhandled types) produce no row.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionLog {
    pub id: TransactionLogId,
    pub integration_id: Option<IntegrationId>,
    pub provider: Provider,
    pub external_transaction_id: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<PhoneNumber>,
    pub purchase_amount: Decimal,
    pub location_name: Option<String>,
    pub origin: TransactionOrigin,
    pub sms_status: SmsStatus,
    pub skip_reason: Option<SkipReason>,
    pub detail: Option<String>,
    pub logged_at: Timestamp,
}

impl TransactionLog {
    /// Combined status code for the audit surface: `queued`, `failed`, or
    /// `skipped_{reason}`.
    pub fn status_code(&self) -> String {
        match (self.sms_status, self.skip_reason) {
            (SmsStatus::Queued, _) => "queued".to_string(),
            (SmsStatus::Failed, _) => "failed".to_string(),
            (SmsStatus::Skipped, Some(SkipReason::NoPhoneNumber)) => {
                "skipped_no_phone".to_string()
            }
            (SmsStatus::Skipped, Some(reason)) => format!("skipped_{}", reason.code()),
            (SmsStatus::Skipped, None) => "skipped".to_string(),
        }
    }
}

/// Append/read access to the transaction audit log.
#[async_trait]
pub trait TransactionLogStore: Send + Sync {
    async fn append(&self, entry: TransactionLog) -> Result<(), StoreError>;

    /// Most recent entries, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<TransactionLog>, StoreError>;
}

/// Vec-backed audit log for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryTransactionLogStore {
    entries: Mutex<Vec<TransactionLog>>,
}

impl InMemoryTransactionLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLogStore for InMemoryTransactionLogStore {
    async fn append(&self, entry: TransactionLog) -> Result<(), StoreError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TransactionLog>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

// ============================================================================
// Review trigger
// ============================================================================

/// Everything the messaging side needs to send one review request.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    pub integration_id: IntegrationId,
    pub user_id: UserId,
    pub provider: Provider,
    pub external_transaction_id: String,
    pub customer_name: Option<String>,
    pub customer_phone: PhoneNumber,
    pub purchase_amount: Decimal,
    pub location_name: Option<String>,
    pub origin: TransactionOrigin,
}

/// Acknowledgement from the messaging side.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchReceipt {
    pub sms_queued: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Error type for dispatch attempts. Never propagated past the pipeline;
/// a failed dispatch becomes a `failed` audit row.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TriggerError {
    #[error("Messaging trigger not reachable: {message}")]
    Unavailable { message: String },

    #[error("Messaging trigger rejected the dispatch (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Messaging trigger returned an unreadable response: {message}")]
    InvalidResponse { message: String },
}

/// Outbound messaging collaborator.
#[async_trait]
pub trait ReviewTrigger: Send + Sync {
    async fn process_transaction(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchReceipt, TriggerError>;
}

// ============================================================================
// Pipeline
// ============================================================================

/// Terminal outcome of one processed event.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// The transaction reached the messaging trigger.
    Dispatched {
        log_id: TransactionLogId,
        sms_queued: bool,
    },
    /// The event was fully evaluated and intentionally not dispatched.
    Skipped { reason: SkipReason },
}

/// Error type for pipeline failures. These are infrastructure problems, not
/// evaluation outcomes; benign conditions all flow through
/// [`PipelineOutcome::Skipped`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

enum RowOutcome {
    Queued { detail: Option<String> },
    Failed { detail: Option<String> },
    Skipped { reason: SkipReason },
}

fn display_location(
    candidate: &TransactionCandidate,
    integration: Option<&Integration>,
) -> Option<String> {
    candidate.location_name.clone().or_else(|| {
        integration
            .and_then(|i| i.location_settings.name_for(candidate.location_id.as_deref()))
    })
}

/// One-way evaluation of verified webhook events.
pub struct TransactionPipeline {
    ledger: Arc<dyn EventLedger>,
    resolver: IntegrationResolver,
    phone: PhoneResolver,
    trigger: Arc<dyn ReviewTrigger>,
    log: Arc<dyn TransactionLogStore>,
}

impl TransactionPipeline {
    pub fn new(
        ledger: Arc<dyn EventLedger>,
        resolver: IntegrationResolver,
        phone: PhoneResolver,
        trigger: Arc<dyn ReviewTrigger>,
        log: Arc<dyn TransactionLogStore>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            phone,
            trigger,
            log,
        }
    }

    /// Evaluate one event end to end.
    ///
    /// Errors are infrastructure failures only; every behavioral outcome is
    /// a [`PipelineOutcome`].
    #[instrument(skip(self, event), fields(
        provider = %event.provider,
        event_id = %event.event_id,
        event_type = %event.event_type,
        correlation_id = %event.correlation_id,
    ))]
    pub async fn process(&self, event: &WebhookEvent) -> Result<PipelineOutcome, PipelineError> {
        if self
            .ledger
            .is_processed(event.provider, &event.event_id)
            .await?
        {
            debug!("event already processed");
            return Ok(PipelineOutcome::Skipped {
                reason: SkipReason::Duplicate,
            });
        }

        // Normalization reads the payload (and, for cross-referencing
        // handlers, the ledger) but has no side effects.
        let normalized = normalize(event, self.ledger.as_ref()).await?;

        // Correctness boundary. A concurrent delivery of the same event
        // loses this claim and skips before any side effect.
        if self
            .ledger
            .claim(event.provider, &event.event_id, &event.event_type)
            .await?
            == ClaimOutcome::AlreadyProcessed
        {
            debug!("lost the claim race to a concurrent delivery");
            return Ok(PipelineOutcome::Skipped {
                reason: SkipReason::Duplicate,
            });
        }

        let candidate = match normalized {
            NormalizedEvent::Transaction(candidate) => *candidate,
            NormalizedEvent::Ignored { reason } => {
                debug!(reason = %reason, "event carries nothing to dispatch");
                return Ok(PipelineOutcome::Skipped { reason });
            }
        };

        // Guard refs extend the claim to sibling-event ids. A conflict
        // means another delivery already owns this purchase.
        for guard in &candidate.guard_refs {
            if self
                .ledger
                .claim(event.provider, &guard.object_id, &event.event_type)
                .await?
                == ClaimOutcome::AlreadyProcessed
            {
                info!(
                    object_id = %guard.object_id,
                    reason = %guard.conflict_reason,
                    "purchase already handled through a sibling event"
                );
                return Ok(PipelineOutcome::Skipped {
                    reason: guard.conflict_reason,
                });
            }
        }

        // Mark refs claim sibling ids on this event's behalf; an existing
        // claim is fine either way.
        for mark in &candidate.mark_refs {
            self.ledger
                .claim(event.provider, mark, &event.event_type)
                .await?;
        }

        let resolution = self
            .resolver
            .resolve(event.provider, &candidate.merchant)
            .await?;
        let integration = match resolution {
            Resolution::Resolved(integration) => integration,
            Resolution::FoundInactive(integration) => {
                return self
                    .skip(event, &candidate, Some(&integration), SkipReason::IntegrationInactive)
                    .await;
            }
            Resolution::NotFound => {
                return self
                    .skip(event, &candidate, None, SkipReason::NoIntegration)
                    .await;
            }
        };

        if !policy::allows(&integration, candidate.origin) {
            let reason = policy::denial_reason(candidate.origin);
            return self.skip(event, &candidate, Some(&integration), reason).await;
        }

        let resolved = self
            .phone
            .resolve(&candidate.phone_sources, candidate.lookup_ref.as_ref())
            .await;
        let resolved = match resolved {
            Some(resolved) => resolved,
            None => {
                return self
                    .skip(event, &candidate, Some(&integration), SkipReason::NoPhoneNumber)
                    .await;
            }
        };

        let request = DispatchRequest {
            integration_id: integration.id,
            user_id: integration.user_id,
            provider: event.provider,
            external_transaction_id: candidate.external_transaction_id.clone(),
            customer_name: candidate.customer_name.clone(),
            customer_phone: resolved.number.clone(),
            purchase_amount: candidate.purchase_amount,
            location_name: display_location(&candidate, Some(&integration)),
            origin: candidate.origin,
        };

        let (sms_queued, outcome) = match self.trigger.process_transaction(&request).await {
            Ok(receipt) => {
                if receipt.sms_queued {
                    (true, RowOutcome::Queued { detail: receipt.detail })
                } else {
                    (false, RowOutcome::Failed { detail: receipt.detail })
                }
            }
            Err(trigger_error) => {
                error!(error = %trigger_error, "messaging trigger failed");
                (
                    false,
                    RowOutcome::Failed {
                        detail: Some(trigger_error.to_string()),
                    },
                )
            }
        };

        let log_id = self
            .record(
                event,
                &candidate,
                Some(&integration),
                Some(resolved.number),
                outcome,
            )
            .await?;

        info!(
            log_id = %log_id,
            sms_queued,
            phone_source = resolved.source.as_str(),
            amount = %candidate.purchase_amount,
            "transaction evaluated"
        );
        Ok(PipelineOutcome::Dispatched { log_id, sms_queued })
    }

    async fn skip(
        &self,
        event: &WebhookEvent,
        candidate: &TransactionCandidate,
        integration: Option<&Integration>,
        reason: SkipReason,
    ) -> Result<PipelineOutcome, PipelineError> {
        info!(reason = %reason, "transaction skipped");
        self.record(event, candidate, integration, None, RowOutcome::Skipped { reason })
            .await?;
        Ok(PipelineOutcome::Skipped { reason })
    }

    async fn record(
        &self,
        event: &WebhookEvent,
        candidate: &TransactionCandidate,
        integration: Option<&Integration>,
        customer_phone: Option<PhoneNumber>,
        outcome: RowOutcome,
    ) -> Result<TransactionLogId, PipelineError> {
        let (sms_status, skip_reason, detail) = match outcome {
            RowOutcome::Queued { detail } => (SmsStatus::Queued, None, detail),
            RowOutcome::Failed { detail } => (SmsStatus::Failed, None, detail),
            RowOutcome::Skipped { reason } => (SmsStatus::Skipped, Some(reason), None),
        };

        let id = TransactionLogId::new();
        self.log
            .append(TransactionLog {
                id,
                integration_id: integration.map(|i| i.id),
                provider: event.provider,
                external_transaction_id: candidate.external_transaction_id.clone(),
                customer_name: candidate.customer_name.clone(),
                customer_phone,
                purchase_amount: candidate.purchase_amount,
                location_name: display_location(candidate, integration),
                origin: candidate.origin,
                sms_status,
                skip_reason,
                detail,
                logged_at: Timestamp::now(),
            })
            .await?;
        Ok(id)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
