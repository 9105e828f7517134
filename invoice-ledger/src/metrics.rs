//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//! Every [`Metrics`] owns its registry, so several ledgers can live in one
//! process.
//!
//! # Metrics
//!
//! - `invoice_ledger_blocks_appended_total` - Blocks committed to the chain
//! - `invoice_ledger_duplicate_rejections_total` - Appends refused for a reused invoice number
//! - `invoice_ledger_append_duration_seconds` - Histogram of append latencies
//! - `invoice_ledger_invalid_blocks_total` - Blocks flagged by chain verification
//! - `invoice_ledger_chain_height` - Number of blocks in the chain

use crate::verify::VerificationReport;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Blocks committed
    pub blocks_appended: IntCounter,

    /// Duplicate invoice numbers refused
    pub duplicate_rejections: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Invalid blocks found by verification
    pub invalid_blocks: IntCounter,

    /// Current chain height
    pub chain_height: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("blocks_appended", &self.blocks_appended.get())
            .field("chain_height", &self.chain_height.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let blocks_appended = IntCounter::new(
            "invoice_ledger_blocks_appended_total",
            "Total number of blocks appended",
        )?;
        registry.register(Box::new(blocks_appended.clone()))?;

        let duplicate_rejections = IntCounter::new(
            "invoice_ledger_duplicate_rejections_total",
            "Appends rejected because the invoice number already exists",
        )?;
        registry.register(Box::new(duplicate_rejections.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "invoice_ledger_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let invalid_blocks = IntCounter::new(
            "invoice_ledger_invalid_blocks_total",
            "Blocks that failed chain verification",
        )?;
        registry.register(Box::new(invalid_blocks.clone()))?;

        let chain_height = IntGauge::new("invoice_ledger_chain_height", "Blocks in the chain")?;
        registry.register(Box::new(chain_height.clone()))?;

        Ok(Self {
            blocks_appended,
            duplicate_rejections,
            append_duration,
            invalid_blocks,
            chain_height,
            registry,
        })
    }

    /// Record a committed block
    pub fn record_block_appended(&self, sequence_index: u64, duration_seconds: f64) {
        self.blocks_appended.inc();
        self.append_duration.observe(duration_seconds);
        self.chain_height.set(sequence_index.saturating_add(1) as i64);
    }

    /// Record a duplicate invoice rejection
    pub fn record_duplicate(&self) {
        self.duplicate_rejections.inc();
    }

    /// Record a chain verification run
    pub fn record_verification(&self, report: &VerificationReport) {
        self.invalid_blocks.inc_by(report.invalid_blocks as u64);
        self.chain_height.set(report.total_blocks as i64);
    }

    /// Set chain height (after opening an existing store)
    pub fn set_chain_height(&self, height: u64) {
        self.chain_height.set(height as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.blocks_appended.get(), 0);
        assert_eq!(metrics.chain_height.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_duplicate();
        assert_eq!(a.duplicate_rejections.get(), 1);
        assert_eq!(b.duplicate_rejections.get(), 0);
    }

    #[test]
    fn test_record_block_appended() {
        let metrics = Metrics::new().unwrap();
        metrics.record_block_appended(0, 0.002);
        metrics.record_block_appended(1, 0.003);
        assert_eq!(metrics.blocks_appended.get(), 2);
        assert_eq!(metrics.chain_height.get(), 2);
        assert_eq!(metrics.append_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_verification() {
        let metrics = Metrics::new().unwrap();
        let report = VerificationReport {
            total_blocks: 5,
            valid_blocks: 3,
            invalid_blocks: 2,
            results: vec![],
        };
        metrics.record_verification(&report);
        assert_eq!(metrics.invalid_blocks.get(), 2);
        assert_eq!(metrics.chain_height.get(), 5);
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_block_appended(0, 0.001);
        let text = metrics.render().unwrap();
        assert!(text.contains("invoice_ledger_blocks_appended_total 1"));
        assert!(text.contains("invoice_ledger_chain_height 1"));
    }
}
