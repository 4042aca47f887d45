//! Recovery Metrics
//!
//! Prometheus counters for encode, retention swap and recovery outcomes.
//! Each [`RecoveryMetrics`] owns its own registry so independent
//! orchestrators (and tests) never collide on metric names.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::{Error, Result};

/// Outcome label for a finished encode.
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// Prometheus metrics for the encode pipeline
#[derive(Clone)]
pub struct RecoveryMetrics {
    registry: Registry,
    encodes_total: IntCounterVec,
    encode_duration_seconds: HistogramVec,
    retention_swaps_total: IntCounterVec,
    blocks_recovered_total: IntCounter,
}

impl std::fmt::Debug for RecoveryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryMetrics").finish_non_exhaustive()
    }
}

impl RecoveryMetrics {
    /// Create and register all metrics in a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let encodes_total = IntCounterVec::new(
            Opts::new("dagrecovery_encodes_total", "Encode requests by outcome"),
            &["strategy", "status"],
        )
        .map_err(metrics_error)?;
        let encode_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dagrecovery_encode_duration_seconds",
                "Time spent encoding a DAG, including the retention swap",
            ),
            &["strategy"],
        )
        .map_err(metrics_error)?;
        let retention_swaps_total = IntCounterVec::new(
            Opts::new(
                "dagrecovery_retention_swaps_total",
                "Retention swaps by outcome",
            ),
            &["status"],
        )
        .map_err(metrics_error)?;
        let blocks_recovered_total = IntCounter::new(
            "dagrecovery_blocks_recovered_total",
            "Blocks rebuilt from redundancy",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(encodes_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(encode_duration_seconds.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(retention_swaps_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(blocks_recovered_total.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            encodes_total,
            encode_duration_seconds,
            retention_swaps_total,
            blocks_recovered_total,
        })
    }

    pub fn record_encode(&self, strategy: &str, status: &str, seconds: f64) {
        self.encodes_total
            .with_label_values(&[strategy, status])
            .inc();
        if status == STATUS_SUCCESS {
            self.encode_duration_seconds
                .with_label_values(&[strategy])
                .observe(seconds);
        }
    }

    pub fn record_swap(&self, status: &str) {
        self.retention_swaps_total.with_label_values(&[status]).inc();
    }

    pub fn record_recovered(&self, blocks: usize) {
        self.blocks_recovered_total.inc_by(blocks as u64);
    }

    /// Encodes finished with `status` for `strategy`.
    pub fn encodes(&self, strategy: &str, status: &str) -> u64 {
        self.encodes_total
            .with_label_values(&[strategy, status])
            .get()
    }

    pub fn swaps(&self, status: &str) -> u64 {
        self.retention_swaps_total.with_label_values(&[status]).get()
    }

    pub fn blocks_recovered(&self) -> u64 {
        self.blocks_recovered_total.get()
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
