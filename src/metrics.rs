//! Prometheus metrics for monitoring trawl.
//!
//! Cache metrics are recorded by the cache controller on the client side,
//! API metrics by the request middleware of `trawl serve`.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::sync::Arc;
use tracing::error;

/// All metrics for the trawl service and cache client
pub struct Metrics {
    pub registry: Registry,

    // Cache metrics
    pub cache_entries: Gauge,
    pub cache_reads_total: CounterVec,
    pub cache_fetch_total: CounterVec,
    pub cache_fetch_duration_seconds: Histogram,
    pub cache_fetch_deduplicated_total: Counter,
    pub cache_revalidations_total: CounterVec,

    // API metrics
    pub api_requests_total: CounterVec,
    pub api_request_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new metrics registry with all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cache metrics
        let cache_entries = Gauge::with_opts(Opts::new(
            "trawl_cache_entries",
            "Number of keys held by the cache controller",
        ))?;
        registry.register(Box::new(cache_entries.clone()))?;

        let cache_reads_total = CounterVec::new(
            Opts::new(
                "trawl_cache_reads_total",
                "Subscriptions by how they were served",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(cache_reads_total.clone()))?;

        let cache_fetch_total = CounterVec::new(
            Opts::new("trawl_cache_fetch_total", "Fetches issued by the cache"),
            &["status"],
        )?;
        registry.register(Box::new(cache_fetch_total.clone()))?;

        let cache_fetch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "trawl_cache_fetch_duration_seconds",
                "Duration of cache fetches",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(cache_fetch_duration_seconds.clone()))?;

        let cache_fetch_deduplicated_total = Counter::with_opts(Opts::new(
            "trawl_cache_fetch_deduplicated_total",
            "Requests that joined an in-flight fetch",
        ))?;
        registry.register(Box::new(cache_fetch_deduplicated_total.clone()))?;

        let cache_revalidations_total = CounterVec::new(
            Opts::new(
                "trawl_cache_revalidations_total",
                "Fetches started, by trigger",
            ),
            &["trigger"],
        )?;
        registry.register(Box::new(cache_revalidations_total.clone()))?;

        // API metrics
        let api_requests_total = CounterVec::new(
            Opts::new("trawl_api_requests_total", "API requests"),
            &["route", "status"],
        )?;
        registry.register(Box::new(api_requests_total.clone()))?;

        let api_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "trawl_api_request_duration_seconds",
                "API request duration in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
            &["route"],
        )?;
        registry.register(Box::new(api_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            cache_entries,
            cache_reads_total,
            cache_fetch_total,
            cache_fetch_duration_seconds,
            cache_fetch_deduplicated_total,
            cache_revalidations_total,
            api_requests_total,
            api_request_duration_seconds,
        })
    }

    /// Record how a subscription was served (seeded, hit, miss)
    pub fn record_read(&self, outcome: &str) {
        self.cache_reads_total.with_label_values(&[outcome]).inc();
    }

    /// Record a completed fetch
    pub fn record_fetch(&self, status: &str, duration_secs: f64) {
        self.cache_fetch_total.with_label_values(&[status]).inc();
        self.cache_fetch_duration_seconds.observe(duration_secs);
    }

    pub fn record_dedup(&self) {
        self.cache_fetch_deduplicated_total.inc();
    }

    pub fn record_revalidation(&self, trigger: &str) {
        self.cache_revalidations_total
            .with_label_values(&[trigger])
            .inc();
    }

    pub fn set_cache_entries(&self, count: usize) {
        self.cache_entries.set(count as f64);
    }

    /// Record an API request
    pub fn record_api_request(&self, route: &str, status: u16, duration_secs: f64) {
        self.api_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
        self.api_request_duration_seconds
            .with_label_values(&[route])
            .observe(duration_secs);
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                String::new()
            }
        }
    }
}

/// Shared metrics instance
pub type SharedMetrics = Arc<Metrics>;

/// Create a shared metrics instance
pub fn create_metrics() -> anyhow::Result<SharedMetrics> {
    Ok(Arc::new(Metrics::new()?))
}
