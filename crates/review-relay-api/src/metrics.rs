//! Metrics collection for the webhook service.

use prometheus::{HistogramVec, IntCounterVec};
use review_relay_core::{PipelineOutcome, Provider};
use std::sync::Arc;

/// Service metrics for observability
///
/// Every accepted delivery lands in exactly one of the dispatched, skipped,
/// or failed counters once its background run finishes.
#[derive(Debug)]
pub struct ServiceMetrics {
    /// Webhook deliveries hitting the endpoint, counted before verification
    pub webhooks_received_total: IntCounterVec,

    /// Deliveries refused at the HTTP boundary, by provider and reason
    pub webhooks_rejected_total: IntCounterVec,

    /// Transactions that reached the review trigger
    pub transactions_dispatched_total: IntCounterVec,

    /// Transactions dropped with an audit record, by provider and skip code
    pub transactions_skipped_total: IntCounterVec,

    /// Background pipeline runs that ended in an error
    pub pipeline_failures_total: IntCounterVec,

    /// End-to-end background processing time per delivery
    pub processing_duration_seconds: HistogramVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        use prometheus::{register_histogram_vec, register_int_counter_vec};

        Ok(Arc::new(Self {
            webhooks_received_total: register_int_counter_vec!(
                "webhooks_received_total",
                "Webhook deliveries received per provider",
                &["provider"]
            )?,
            webhooks_rejected_total: register_int_counter_vec!(
                "webhooks_rejected_total",
                "Webhook deliveries rejected before processing",
                &["provider", "reason"]
            )?,
            transactions_dispatched_total: register_int_counter_vec!(
                "transactions_dispatched_total",
                "Transactions forwarded to the review trigger",
                &["provider"]
            )?,
            transactions_skipped_total: register_int_counter_vec!(
                "transactions_skipped_total",
                "Transactions skipped with an audit record",
                &["provider", "reason"]
            )?,
            pipeline_failures_total: register_int_counter_vec!(
                "pipeline_failures_total",
                "Background pipeline runs that failed",
                &["provider"]
            )?,
            processing_duration_seconds: register_histogram_vec!(
                "processing_duration_seconds",
                "Background processing time per webhook delivery",
                &["provider"],
                vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
            )?,
        }))
    }

    /// Count a delivery hitting the endpoint.
    ///
    /// The label is the canonical provider name, or `unknown` when the URL
    /// segment does not parse; raw segments never become label values.
    pub fn record_received(&self, provider_label: &str) {
        self.webhooks_received_total
            .with_label_values(&[provider_label])
            .inc();
    }

    /// Count a delivery refused at the HTTP boundary.
    pub fn record_rejected(&self, provider_label: &str, reason: &str) {
        self.webhooks_rejected_total
            .with_label_values(&[provider_label, reason])
            .inc();
    }

    /// Count the terminal outcome of a processed delivery.
    pub fn record_outcome(&self, provider: Provider, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Dispatched { .. } => {
                self.transactions_dispatched_total
                    .with_label_values(&[provider.as_str()])
                    .inc();
            }
            PipelineOutcome::Skipped { reason } => {
                self.transactions_skipped_total
                    .with_label_values(&[provider.as_str(), reason.code()])
                    .inc();
            }
        }
    }

    /// Count a background pipeline run that returned an error.
    pub fn record_failure(&self, provider: Provider) {
        self.pipeline_failures_total
            .with_label_values(&[provider.as_str()])
            .inc();
    }

    /// Observe how long background processing took for one delivery.
    pub fn record_processing_duration(&self, provider: Provider, duration: std::time::Duration) {
        self.processing_duration_seconds
            .with_label_values(&[provider.as_str()])
            .observe(duration.as_secs_f64());
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        // Stub implementation for tests. Production code uses
        // ServiceMetrics::new() so the metrics keep their exported names.
        use prometheus::{register_histogram_vec, register_int_counter_vec};

        // Unique names with a timestamp suffix avoid registration conflicts
        // in the process-global registry when tests run in parallel
        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        Self {
            webhooks_received_total: register_int_counter_vec!(
                format!("webhooks_received_total_test_{}", suffix),
                "Test webhooks received",
                &["provider"]
            )
            .unwrap(),
            webhooks_rejected_total: register_int_counter_vec!(
                format!("webhooks_rejected_total_test_{}", suffix),
                "Test webhooks rejected",
                &["provider", "reason"]
            )
            .unwrap(),
            transactions_dispatched_total: register_int_counter_vec!(
                format!("transactions_dispatched_total_test_{}", suffix),
                "Test transactions dispatched",
                &["provider"]
            )
            .unwrap(),
            transactions_skipped_total: register_int_counter_vec!(
                format!("transactions_skipped_total_test_{}", suffix),
                "Test transactions skipped",
                &["provider", "reason"]
            )
            .unwrap(),
            pipeline_failures_total: register_int_counter_vec!(
                format!("pipeline_failures_total_test_{}", suffix),
                "Test pipeline failures",
                &["provider"]
            )
            .unwrap(),
            processing_duration_seconds: register_histogram_vec!(
                format!("processing_duration_seconds_test_{}", suffix),
                "Test processing duration",
                &["provider"]
            )
            .unwrap(),
        }
    }
}
