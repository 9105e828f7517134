//! Invoice Ledger
//!
//! Append-only, hash-linked ledger of invoices with tax distribution.
//!
//! # Architecture
//!
//! - **Hash Chain**: Each block's SHA-256 digest covers its invoice fields and
//!   the previous block's digest
//! - **Single Writer**: One writer task serializes every append
//! - **Atomic Commit**: Block, distribution and indices land in one RocksDB write batch
//! - **Tamper Detection**: Any stored block can be re-hashed and the chain replayed
//!
//! # Invariants
//!
//! - Unique invoice numbers: at most one block per invoice number
//! - Linkage: block `n` carries the digest of block `n - 1` (genesis carries the zero digest)
//! - Tax conservation: sector amounts of a distribution sum to the block's tax
//! - Append-only: blocks are never modified or deleted through the ledger API

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod canonical;
pub mod distribution;
pub mod verify;
pub mod storage;
pub mod actor;
pub mod ledger;
pub mod stats;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{AuthorId, Block, Digest, DistributionEntry, InvoicePayload, NewInvoice};
pub use distribution::{distribute, DistributionTable};
pub use verify::{verify_block, verify_chain, VerificationReport};
pub use storage::Storage;
pub use stats::ChainStats;
pub use ledger::Ledger;
pub use config::Config;
