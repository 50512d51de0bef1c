//! Prometheus metrics for the TomChain server.

use std::sync::Arc;

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

/// Central collection of server metrics. The registry is served in
/// Prometheus text format when `profiler-listen` is enabled.
pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Votes accepted into pending blocks (duplicates excluded).
    pub votes_received: IntCounter,
    /// Blocks sealed by the packer.
    pub blocks_packed: IntCounter,
    /// Blocks committed via local quorum merge.
    pub blocks_committed: IntCounter,
    /// Blocks committed via a peer commit broadcast.
    pub commits_applied: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub pending_blocks: IntGauge,
    pub committed_blocks: IntGauge,
    pub dead_blocks: IntGauge,
    pub pending_txs: IntGauge,
    pub alive_peers: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Proposal-to-commit latency in milliseconds.
    pub commit_latency_ms: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let votes_received = register_int_counter_with_registry!(
            Opts::new("tomchain_votes_received_total", "Votes accepted into pending blocks"),
            registry
        )
        .expect("failed to register votes_received counter");

        let blocks_packed = register_int_counter_with_registry!(
            Opts::new("tomchain_blocks_packed_total", "Blocks sealed by the packer"),
            registry
        )
        .expect("failed to register blocks_packed counter");

        let blocks_committed = register_int_counter_with_registry!(
            Opts::new(
                "tomchain_blocks_committed_total",
                "Blocks committed via local quorum merge"
            ),
            registry
        )
        .expect("failed to register blocks_committed counter");

        let commits_applied = register_int_counter_with_registry!(
            Opts::new(
                "tomchain_commits_applied_total",
                "Blocks committed via peer commit broadcast"
            ),
            registry
        )
        .expect("failed to register commits_applied counter");

        let pending_blocks = register_int_gauge_with_registry!(
            Opts::new("tomchain_pending_blocks", "Blocks awaiting quorum"),
            registry
        )
        .expect("failed to register pending_blocks gauge");

        let committed_blocks = register_int_gauge_with_registry!(
            Opts::new("tomchain_committed_blocks", "Blocks in the committed pool"),
            registry
        )
        .expect("failed to register committed_blocks gauge");

        let dead_blocks = register_int_gauge_with_registry!(
            Opts::new("tomchain_dead_blocks", "Blocks evicted past the age threshold"),
            registry
        )
        .expect("failed to register dead_blocks gauge");

        let pending_txs = register_int_gauge_with_registry!(
            Opts::new("tomchain_pending_txs", "Transactions awaiting packing"),
            registry
        )
        .expect("failed to register pending_txs gauge");

        let alive_peers = register_int_gauge_with_registry!(
            Opts::new("tomchain_alive_peers", "Peers answering heartbeats"),
            registry
        )
        .expect("failed to register alive_peers gauge");

        let commit_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "tomchain_commit_latency_ms",
                "Proposal-to-commit latency in milliseconds"
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ]),
            registry
        )
        .expect("failed to register commit_latency histogram");

        Self {
            registry,
            votes_received,
            blocks_packed,
            blocks_committed,
            commits_applied,
            pending_blocks,
            committed_blocks,
            dead_blocks,
            pending_txs,
            alive_peers,
            commit_latency_ms,
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `GET /metrics` on the given address until shutdown is signaled.
pub async fn serve_metrics(
    metrics: Arc<NodeMetrics>,
    addr: String,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    use axum::{extract::State, routing::get, Router};

    async fn metrics_handler(State(metrics): State<Arc<NodeMetrics>>) -> String {
        metrics.render()
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!(addr = %addr, error = %e, "cannot bind metrics endpoint");
            return;
        }
    };
    tracing::info!(addr = %addr, "metrics endpoint listening");

    tokio::select! {
        result = async { axum::serve(listener, app).await } => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "metrics endpoint exited");
            }
        }
        _ = shutdown.recv() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_render() {
        let metrics = NodeMetrics::new();
        metrics.votes_received.inc();
        metrics.pending_blocks.set(3);
        metrics.commit_latency_ms.observe(120.0);
        let text = metrics.render();
        assert!(text.contains("tomchain_votes_received_total"));
        assert!(text.contains("tomchain_pending_blocks 3"));
    }
}
