//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    /// Funding requests by outcome label
    pub fund_requests: IntCounterVec,
    /// Submitted funding transactions by path
    pub funding_kind: IntCounterVec,
    pub sequence_refreshes: IntCounter,
    pub bad_sequence_errors: IntCounter,
    /// Bootstrap batches by result label
    pub bootstrap_batches: IntCounterVec,
    pub bootstrap_retries: IntCounter,

    // Gauges
    pub minion_pool_size: IntGauge,

    // Histograms
    pub fund_latency: Histogram,
    pub submit_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let fund_requests = IntCounterVec::new(
            Opts::new("friendbot_fund_requests_total", "Funding requests by outcome"),
            &["outcome"],
        )?;

        let funding_kind = IntCounterVec::new(
            Opts::new(
                "friendbot_funding_transactions_total",
                "Funding transactions submitted by operation kind",
            ),
            &["kind"],
        )?;

        let sequence_refreshes = IntCounter::with_opts(Opts::new(
            "friendbot_sequence_refreshes_total",
            "Channel account sequence fetches from the ledger",
        ))?;

        let bad_sequence_errors = IntCounter::with_opts(Opts::new(
            "friendbot_bad_sequence_total",
            "Submissions rejected for a stale sequence number",
        ))?;

        let bootstrap_batches = IntCounterVec::new(
            Opts::new(
                "friendbot_bootstrap_batches_total",
                "Channel account creation batches by result",
            ),
            &["result"],
        )?;

        let bootstrap_retries = IntCounter::with_opts(Opts::new(
            "friendbot_bootstrap_retries_total",
            "Channel account creation batches retried after a timeout",
        ))?;

        let minion_pool_size = IntGauge::with_opts(Opts::new(
            "friendbot_minion_pool_size",
            "Number of channel accounts in the pool",
        ))?;

        let fund_latency = Histogram::with_opts(
            HistogramOpts::new("friendbot_fund_latency_seconds", "End-to-end funding latency")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("friendbot_submit_latency_seconds", "Transaction submission latency")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(fund_requests.clone()))?;
        registry.register(Box::new(funding_kind.clone()))?;
        registry.register(Box::new(sequence_refreshes.clone()))?;
        registry.register(Box::new(bad_sequence_errors.clone()))?;
        registry.register(Box::new(bootstrap_batches.clone()))?;
        registry.register(Box::new(bootstrap_retries.clone()))?;
        registry.register(Box::new(minion_pool_size.clone()))?;
        registry.register(Box::new(fund_latency.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;

        Ok(Self {
            registry,
            fund_requests,
            funding_kind,
            sequence_refreshes,
            bad_sequence_errors,
            bootstrap_batches,
            bootstrap_retries,
            minion_pool_size,
            fund_latency,
            submit_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_fund_outcome(&self, outcome: &str) {
        self.fund_requests.with_label_values(&[outcome]).inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
