//! # Prometheus Metrics
//!
//! Operational metrics for the validator node, scraped at the `/metrics`
//! HTTP endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles wrap `Arc` internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Registry that owns every metric below.
    registry: Registry,
    /// Blocks appended to the DAG ledger.
    pub blocks_appended_total: IntCounter,
    /// Transactions that reached commit and were stored.
    pub transactions_committed_total: IntCounter,
    /// Submissions rejected (commit failure, conflict, weight, blacklist).
    pub transactions_rejected_total: IntCounter,
    /// Leader elections performed (including retained tenures).
    pub leader_elections_total: IntCounter,
    /// Validators currently on the blacklist.
    pub blacklisted_validators: IntGauge,
    /// Blocks currently stored (genesis included).
    pub ledger_blocks: IntGauge,
    /// End-to-end submission latency in seconds.
    pub submission_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("tessera".into()), None)
            .expect("failed to create prometheus registry");

        let blocks_appended_total = IntCounter::new(
            "blocks_appended_total",
            "Blocks appended to the DAG ledger",
        )
        .expect("metric creation");
        registry
            .register(Box::new(blocks_appended_total.clone()))
            .expect("metric registration");

        let transactions_committed_total = IntCounter::new(
            "transactions_committed_total",
            "Transactions committed and stored in the ledger",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_committed_total.clone()))
            .expect("metric registration");

        let transactions_rejected_total = IntCounter::new(
            "transactions_rejected_total",
            "Submissions rejected at any stage of the pipeline",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_rejected_total.clone()))
            .expect("metric registration");

        let leader_elections_total = IntCounter::new(
            "leader_elections_total",
            "Leader elections performed, retained tenures included",
        )
        .expect("metric creation");
        registry
            .register(Box::new(leader_elections_total.clone()))
            .expect("metric registration");

        let blacklisted_validators = IntGauge::new(
            "blacklisted_validators",
            "Validators currently barred from proposing",
        )
        .expect("metric creation");
        registry
            .register(Box::new(blacklisted_validators.clone()))
            .expect("metric registration");

        let ledger_blocks =
            IntGauge::new("ledger_blocks", "Blocks stored in the ledger, genesis included")
                .expect("metric creation");
        registry
            .register(Box::new(ledger_blocks.clone()))
            .expect("metric registration");

        let submission_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "submission_latency_seconds",
                "End-to-end transaction submission latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(submission_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            blocks_appended_total,
            transactions_committed_total,
            transactions_rejected_total,
            leader_elections_total,
            blacklisted_validators,
            ledger_blocks,
            submission_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
