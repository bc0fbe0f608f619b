//! Consensus engine metrics, exported through a prometheus registry.

use ledgerlink_common::error::{LedgerError, Result};
use prometheus::{histogram_opts, opts, Encoder, Histogram, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct ConsensusMetrics {
    registry: Registry,

    pub blocks_accepted_total: IntCounter,
    pub blocks_orphaned_total: IntCounter,
    pub blocks_promoted_total: IntCounter,
    pub blocks_rejected_total: IntCounter,
    pub blocks_duplicate_total: IntCounter,
    pub orphans_evicted_total: IntCounter,
    pub reorgs_total: IntCounter,

    pub tip_height: IntGauge,
    pub orphan_count: IntGauge,

    pub block_processing_time: Histogram,
}

impl ConsensusMetrics {
    /// Metrics registered into a private registry.
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Metrics registered into `registry`, typically shared with the rest of the node.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let metrics = Self {
            blocks_accepted_total: IntCounter::with_opts(opts!(
                "ledgerlink_blocks_accepted_total",
                "Blocks stored as resolved links on arrival"
            ))
            .map_err(metrics_error)?,
            blocks_orphaned_total: IntCounter::with_opts(opts!(
                "ledgerlink_blocks_orphaned_total",
                "Blocks stored as orphans"
            ))
            .map_err(metrics_error)?,
            blocks_promoted_total: IntCounter::with_opts(opts!(
                "ledgerlink_blocks_promoted_total",
                "Orphans resolved by a promotion cascade"
            ))
            .map_err(metrics_error)?,
            blocks_rejected_total: IntCounter::with_opts(opts!(
                "ledgerlink_blocks_rejected_total",
                "Blocks failing validation"
            ))
            .map_err(metrics_error)?,
            blocks_duplicate_total: IntCounter::with_opts(opts!(
                "ledgerlink_blocks_duplicate_total",
                "Blocks that were already stored"
            ))
            .map_err(metrics_error)?,
            orphans_evicted_total: IntCounter::with_opts(opts!(
                "ledgerlink_orphans_evicted_total",
                "Orphans dropped to respect the orphan cap"
            ))
            .map_err(metrics_error)?,
            reorgs_total: IntCounter::with_opts(opts!(
                "ledgerlink_reorgs_total",
                "Tip changes that abandoned part of the active chain"
            ))
            .map_err(metrics_error)?,
            tip_height: IntGauge::with_opts(opts!("ledgerlink_tip_height", "Height of the active tip"))
                .map_err(metrics_error)?,
            orphan_count: IntGauge::with_opts(opts!("ledgerlink_orphan_count", "Unresolved orphans held"))
                .map_err(metrics_error)?,
            block_processing_time: Histogram::with_opts(histogram_opts!(
                "ledgerlink_block_processing_duration_seconds",
                "Time spent in add_block"
            ))
            .map_err(metrics_error)?,
            registry,
        };
        metrics.register()?;
        Ok(metrics)
    }

    fn register(&self) -> Result<()> {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(self.blocks_accepted_total.clone()),
            Box::new(self.blocks_orphaned_total.clone()),
            Box::new(self.blocks_promoted_total.clone()),
            Box::new(self.blocks_rejected_total.clone()),
            Box::new(self.blocks_duplicate_total.clone()),
            Box::new(self.orphans_evicted_total.clone()),
            Box::new(self.reorgs_total.clone()),
            Box::new(self.tip_height.clone()),
            Box::new(self.orphan_count.clone()),
            Box::new(self.block_processing_time.clone()),
        ];
        for collector in collectors {
            self.registry.register(collector).map_err(metrics_error)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of everything in the registry.
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(metrics_error)
    }
}

fn metrics_error<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Config(format!("metrics: {}", e))
}
