//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task owns the chain tail, so two appends can never
//!   read the same previous digest
//! - The duplicate check, hashing and the commit happen inside one message
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Ledger::append_block (many concurrent)         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  duplicate check → tail → timestamp → tax → digest    │
//! │  → distribution                                       │
//! │                       │                               │
//! │                       ▼                               │
//! │            Storage::append_block()                    │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Reads never go through the actor; they hit storage directly.

use crate::canonical::{self, CanonicalFields};
use crate::distribution::{distribute, DistributionTable};
use crate::metrics::Metrics;
use crate::types::{AuthorId, Block, Digest, NewInvoice};
use crate::{Error, Result, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Price, hash, link and commit a new invoice
    AppendBlock {
        invoice: NewInvoice,
        author: AuthorId,
        response: oneshot::Sender<Result<Block>>,
    },

    /// Stop the actor; acknowledged once storage is released
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that owns the write path
#[derive(Debug)]
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Tax rate applied to every subtotal
    tax_rate: Decimal,

    /// Table used to distribute each block's tax
    table: DistributionTable,

    /// Metrics
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        tax_rate: Decimal,
        table: DistributionTable,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            tax_rate,
            table,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut ack = None;
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::AppendBlock {
                    invoice,
                    author,
                    response,
                } => {
                    let result = self.append_block(invoice, author);
                    if let Err(ref e) = result {
                        tracing::debug!(error = %e, "Append rejected");
                    }
                    // Caller may have gone away; the block is committed regardless
                    let _ = response.send(result);
                }
                LedgerMessage::Shutdown { response } => {
                    ack = Some(response);
                    break;
                }
            }
        }

        // Pending appends are dropped with the mailbox; their callers see a closed channel
        drop(self);
        tracing::info!("Ledger writer stopped");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Build and commit the next block
    fn append_block(&mut self, invoice: NewInvoice, author: AuthorId) -> Result<Block> {
        let started = Instant::now();

        let payload = invoice.into_payload(self.tax_rate)?;

        if self.storage.invoice_index(&payload.invoice_number)?.is_some() {
            self.metrics.record_duplicate();
            tracing::warn!(
                invoice_number = %payload.invoice_number,
                author = %author,
                "Duplicate invoice number rejected"
            );
            return Err(Error::DuplicateInvoice(payload.invoice_number));
        }

        let (sequence_index, previous_digest) = match self.storage.get_latest_block()? {
            Some(tail) => (tail.sequence_index + 1, tail.digest),
            None => (0, Digest::genesis()),
        };

        let created_at = Utc::now();
        let digest = canonical::compute_digest(
            &CanonicalFields {
                payload: &payload,
                created_at: &created_at,
                author_id: &author,
            },
            &previous_digest,
        )
        .map_err(|e| {
            tracing::error!(
                invoice_number = %payload.invoice_number,
                error = %e,
                "Block fields cannot be canonicalized"
            );
            e
        })?;

        let distribution = distribute(payload.tax_amount, &self.table)?;

        let block = Block {
            sequence_index,
            payload,
            author_id: author,
            created_at,
            previous_digest,
            digest,
            distribution,
        };

        self.storage.append_block(&block)?;

        self.metrics
            .record_block_appended(sequence_index, started.elapsed().as_secs_f64());

        tracing::info!(
            sequence_index = block.sequence_index,
            invoice_number = %block.payload.invoice_number,
            author = %block.author_id,
            digest = %block.digest,
            tax_amount = %block.payload.tax_amount,
            "Block appended"
        );

        Ok(block)
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Append an invoice as the next block
    pub async fn append_block(&self, invoice: NewInvoice, author: AuthorId) -> Result<Block> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::AppendBlock {
                invoice,
                author,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor and wait until it has stopped
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    mailbox_capacity: usize,
    tax_rate: Decimal,
    table: DistributionTable,
    metrics: Metrics,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, tax_rate, table, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tempfile::TempDir;

    fn spawn_test_actor() -> (LedgerHandle, Arc<Storage>, Metrics, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let metrics = Metrics::new().unwrap();
        let handle = spawn_ledger_actor(
            storage.clone(),
            16,
            config.tax.rate,
            config.tax.distribution.clone(),
            metrics.clone(),
        );
        (handle, storage, metrics, temp_dir)
    }

    fn invoice(number: &str) -> NewInvoice {
        NewInvoice::new(number, "Acme SAS", "900123456", Decimal::new(100000, 2))
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _storage, _metrics, _temp) = spawn_test_actor();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_append_links_blocks() {
        let (handle, storage, metrics, _temp) = spawn_test_actor();

        let first = handle
            .append_block(invoice("INV-1"), AuthorId::new("1"))
            .await
            .unwrap();
        assert_eq!(first.sequence_index, 0);
        assert!(first.previous_digest.is_genesis());
        assert_eq!(first.payload.tax_amount, Decimal::new(19000, 2));

        let second = handle
            .append_block(invoice("INV-2"), AuthorId::new("1"))
            .await
            .unwrap();
        assert_eq!(second.sequence_index, 1);
        assert_eq!(second.previous_digest, first.digest);

        assert_eq!(storage.get_block(1).unwrap(), second);
        assert_eq!(metrics.blocks_appended.get(), 2);
        assert_eq!(metrics.chain_height.get(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_duplicate() {
        let (handle, storage, metrics, _temp) = spawn_test_actor();

        handle
            .append_block(invoice("INV-1"), AuthorId::new("1"))
            .await
            .unwrap();
        let err = handle
            .append_block(invoice("INV-1"), AuthorId::new("2"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateInvoice(ref n) if n == "INV-1"));
        assert_eq!(metrics.duplicate_rejections.get(), 1);
        assert_eq!(storage.get_latest_block().unwrap().unwrap().sequence_index, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_invalid_invoice() {
        let (handle, storage, _metrics, _temp) = spawn_test_actor();

        let bad = NewInvoice::new("INV-1", "A", "900123456", Decimal::new(100, 2));
        let err = handle.append_block(bad, AuthorId::new("1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(storage.get_latest_block().unwrap().is_none());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let (handle, _storage, _metrics, _temp) = spawn_test_actor();
        handle.shutdown().await.unwrap();

        let err = handle
            .append_block(invoice("INV-1"), AuthorId::new("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }
}
