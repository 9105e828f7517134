//! Main ledger orchestration layer
//!
//! This module ties together storage, the writer actor and verification
//! into a high-level API for recording invoices.
//!
//! # Example
//!
//! ```no_run
//! use invoice_ledger::{AuthorId, Config, Ledger, NewInvoice};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> invoice_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     let invoice = NewInvoice::new("INV-1", "Acme SAS", "900123456", Decimal::new(100000, 2));
//!     let block = ledger.append_block(invoice, AuthorId::new("7")).await?;
//!     assert!(ledger.verify_stored_block(block.sequence_index)?);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    distribution::DistributionTable,
    metrics::Metrics,
    stats::{ChainStats, DEFAULT_RECENT_LIMIT},
    types::{AuthorId, Block, NewInvoice},
    verify::{self, VerificationReport},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for appends
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Open storage
        let storage = Arc::new(Storage::open(&config)?);

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        metrics.set_chain_height(storage.get_stats()?.next_sequence_index);

        // Spawn actor
        let handle = spawn_ledger_actor(
            storage.clone(),
            config.mailbox_capacity,
            config.tax.rate,
            config.tax.distribution.clone(),
            metrics.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            tax_rate = %config.tax.rate,
            distribution_version = config.tax.distribution.version,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Append an invoice as the next block of the chain
    ///
    /// Concurrent calls are serialized by the writer actor, so every block
    /// links to the digest of the block committed immediately before it.
    pub async fn append_block(&self, invoice: NewInvoice, author: AuthorId) -> Result<Block> {
        if author.as_str().trim().is_empty() {
            return Err(Error::Validation("author id must not be empty".to_string()));
        }
        invoice.validate()?;

        self.handle.append_block(invoice, author).await
    }

    /// Get block by sequence index
    pub fn get_block(&self, sequence_index: u64) -> Result<Block> {
        self.storage.get_block(sequence_index)
    }

    /// Find the block recording an invoice number
    pub fn find_by_invoice_number(&self, invoice_number: &str) -> Result<Option<Block>> {
        match self.storage.invoice_index(invoice_number.trim())? {
            Some(index) => Ok(Some(self.storage.get_block(index)?)),
            None => Ok(None),
        }
    }

    /// Get latest block
    pub fn latest_block(&self) -> Result<Option<Block>> {
        self.storage.get_latest_block()
    }

    /// All blocks in ascending sequence order
    pub fn blocks(&self) -> Result<Vec<Block>> {
        self.storage.scan_blocks()
    }

    /// Newest blocks first, at most `limit`
    pub fn recent_blocks(&self, limit: usize) -> Result<Vec<Block>> {
        self.storage.recent_blocks(limit)
    }

    /// Blocks submitted by one author, ascending
    pub fn blocks_by_author(&self, author: &AuthorId) -> Result<Vec<Block>> {
        self.storage.blocks_by_author(author)
    }

    /// Recompute one stored block's digest and compare it to the stored one
    pub fn verify_stored_block(&self, sequence_index: u64) -> Result<bool> {
        let block = self.storage.get_block(sequence_index)?;
        Ok(verify::verify_block(&block))
    }

    /// Replay the stored chain from genesis
    pub fn verify_chain(&self) -> Result<VerificationReport> {
        let blocks = self.storage.scan_blocks()?;
        let report = verify::verify_chain(&blocks);
        self.metrics.record_verification(&report);

        if report.is_valid() {
            tracing::info!(total_blocks = report.total_blocks, "Chain verified");
        } else {
            tracing::warn!(
                total_blocks = report.total_blocks,
                invalid_blocks = report.invalid_blocks,
                "Chain verification found tampered blocks"
            );
        }

        Ok(report)
    }

    /// Aggregate statistics over the stored chain
    pub fn stats(&self) -> Result<ChainStats> {
        let blocks = self.storage.scan_blocks()?;
        Ok(ChainStats::from_blocks(&blocks, DEFAULT_RECENT_LIMIT))
    }

    /// Table used to distribute tax
    pub fn distribution_table(&self) -> &DistributionTable {
        &self.config.tax.distribution
    }

    /// Tax rate applied to subtotals
    pub fn tax_rate(&self) -> Decimal {
        self.config.tax.rate
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
