//! Tamper detection over the hash chain
//!
//! Single-writer, single-copy verification: every block's digest is
//! recomputed from its stored fields, and every `previous_digest` is compared
//! to the stored digest of the block before it. A mismatch is a reportable
//! result, never an error.

use crate::types::{Block, Digest};
use serde::Serialize;

/// Why a block failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockFault {
    /// Stored digest differs from the one recomputed from the stored fields
    DigestMismatch {
        /// Digest found in storage
        stored: Digest,
        /// Recomputed digest, `None` if the fields could not be canonicalized
        computed: Option<Digest>,
    },

    /// `previous_digest` does not match the preceding block's digest
    BrokenLink {
        /// Digest of the preceding block (or the genesis constant)
        expected: Digest,
        /// `previous_digest` found in storage
        found: Digest,
    },

    /// `sequence_index` is not the successor of the preceding block's index
    SequenceGap {
        /// Index the block should carry
        expected: u64,
        /// Index found in storage
        found: u64,
    },
}

/// Verification outcome for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockVerification {
    /// Block position
    pub sequence_index: u64,
    /// Stored digest
    pub digest: Digest,
    /// Failed checks (empty when valid)
    pub faults: Vec<BlockFault>,
}

impl BlockVerification {
    /// All checks passed
    pub fn is_valid(&self) -> bool {
        self.faults.is_empty()
    }

    /// Stored digest matches the recomputed digest
    pub fn digest_valid(&self) -> bool {
        !self
            .faults
            .iter()
            .any(|f| matches!(f, BlockFault::DigestMismatch { .. }))
    }

    /// `previous_digest` matches the preceding block
    pub fn link_valid(&self) -> bool {
        !self
            .faults
            .iter()
            .any(|f| matches!(f, BlockFault::BrokenLink { .. }))
    }
}

/// Result of replaying a chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Blocks examined
    pub total_blocks: usize,
    /// Blocks passing every check
    pub valid_blocks: usize,
    /// Blocks failing at least one check
    pub invalid_blocks: usize,
    /// Per-block outcome, in chain order
    pub results: Vec<BlockVerification>,
}

impl VerificationReport {
    /// Every block passed
    pub fn is_valid(&self) -> bool {
        self.invalid_blocks == 0
    }

    /// Outcomes of the blocks that failed
    pub fn invalid(&self) -> impl Iterator<Item = &BlockVerification> {
        self.results.iter().filter(|r| !r.is_valid())
    }
}

fn digest_fault(block: &Block) -> Option<BlockFault> {
    match block.compute_digest() {
        Ok(computed) if computed == block.digest => None,
        Ok(computed) => Some(BlockFault::DigestMismatch {
            stored: block.digest.clone(),
            computed: Some(computed),
        }),
        Err(e) => {
            tracing::error!(
                sequence_index = block.sequence_index,
                error = %e,
                "Stored block cannot be canonicalized"
            );
            Some(BlockFault::DigestMismatch {
                stored: block.digest.clone(),
                computed: None,
            })
        }
    }
}

/// Recompute a block's digest and compare it to the stored one
pub fn verify_block(block: &Block) -> bool {
    digest_fault(block).is_none()
}

/// Replay `blocks` (ascending sequence order) from the genesis constant
///
/// The expected previous digest advances to each block's stored digest, so a
/// rewritten digest flags both the rewritten block and its successor.
pub fn verify_chain(blocks: &[Block]) -> VerificationReport {
    let mut report = VerificationReport::default();
    let mut expected_previous = Digest::genesis();
    let mut expected_index = 0u64;

    for block in blocks {
        let mut faults = Vec::new();

        if block.sequence_index != expected_index {
            faults.push(BlockFault::SequenceGap {
                expected: expected_index,
                found: block.sequence_index,
            });
        }
        if let Some(fault) = digest_fault(block) {
            faults.push(fault);
        }
        if block.previous_digest != expected_previous {
            faults.push(BlockFault::BrokenLink {
                expected: expected_previous.clone(),
                found: block.previous_digest.clone(),
            });
        }

        if faults.is_empty() {
            report.valid_blocks += 1;
        } else {
            report.invalid_blocks += 1;
            tracing::warn!(
                sequence_index = block.sequence_index,
                digest = %block.digest,
                ?faults,
                "Block failed verification"
            );
        }

        report.results.push(BlockVerification {
            sequence_index: block.sequence_index,
            digest: block.digest.clone(),
            faults,
        });

        expected_previous = block.digest.clone();
        expected_index = block.sequence_index.saturating_add(1);
    }

    report.total_blocks = blocks.len();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthorId, InvoicePayload};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn chain(len: u64) -> Vec<Block> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut previous = Digest::genesis();
        let mut blocks = Vec::new();

        for i in 0..len {
            let mut block = Block {
                sequence_index: i,
                payload: InvoicePayload {
                    invoice_number: format!("INV-{}", i),
                    company_name: "Acme SAS".to_string(),
                    company_nit: "900123456".to_string(),
                    subtotal: Decimal::new(100000, 2),
                    tax_amount: Decimal::new(19000, 2),
                    total_amount: Decimal::new(119000, 2),
                },
                author_id: AuthorId::new("7"),
                created_at: start + Duration::seconds(i as i64),
                previous_digest: previous.clone(),
                digest: Digest::genesis(),
                distribution: vec![],
            };
            block.digest = block.compute_digest().unwrap();
            previous = block.digest.clone();
            blocks.push(block);
        }

        blocks
    }

    #[test]
    fn test_valid_chain() {
        let blocks = chain(3);
        assert!(blocks.iter().all(verify_block));

        let report = verify_chain(&blocks);
        assert_eq!(report.total_blocks, 3);
        assert_eq!(report.valid_blocks, 3);
        assert_eq!(report.invalid_blocks, 0);
        assert!(report.is_valid());
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let report = verify_chain(&[]);
        assert_eq!(report.total_blocks, 0);
        assert!(report.is_valid());
    }

    #[test]
    fn test_tampered_amount_fails_own_digest_only() {
        let mut blocks = chain(3);
        blocks[1].payload.total_amount = Decimal::new(119001, 2);

        assert!(!verify_block(&blocks[1]));

        let report = verify_chain(&blocks);
        assert_eq!(report.invalid_blocks, 1);
        let bad = &report.results[1];
        assert!(!bad.digest_valid());
        assert!(bad.link_valid());
        assert!(report.results[2].is_valid());
    }

    #[test]
    fn test_rewritten_digest_breaks_successor_link() {
        let mut blocks = chain(2);
        blocks[0].digest = Digest::parse("f".repeat(64)).unwrap();

        let report = verify_chain(&blocks);
        assert_eq!(report.valid_blocks, 0);
        assert_eq!(report.invalid_blocks, 2);

        assert!(!report.results[0].digest_valid());
        assert!(report.results[0].link_valid());

        assert!(report.results[1].digest_valid());
        assert!(!report.results[1].link_valid());
    }

    #[test]
    fn test_missing_block_reports_gap_and_link() {
        let mut blocks = chain(3);
        blocks.remove(1);

        let report = verify_chain(&blocks);
        let faults = &report.results[1].faults;
        assert!(faults.contains(&BlockFault::SequenceGap { expected: 1, found: 2 }));
        assert!(!report.results[1].link_valid());
        assert!(report.results[1].digest_valid());
    }

    #[test]
    fn test_genesis_must_point_at_constant() {
        let mut blocks = chain(1);
        blocks[0].previous_digest = Digest::parse("1".repeat(64)).unwrap();
        blocks[0].digest = blocks[0].compute_digest().unwrap();

        let report = verify_chain(&blocks);
        assert!(report.results[0].digest_valid());
        assert!(!report.results[0].link_valid());
    }
}
