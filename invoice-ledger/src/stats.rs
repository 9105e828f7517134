//! Chain statistics

use crate::types::{round_currency, Block};
use rust_decimal::Decimal;
use serde::Serialize;

/// Number of recent blocks reported by default
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Tax collected by one sector across the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectorTotal {
    /// Sector name
    pub sector: String,
    /// Sum of sector-level amounts
    pub total_amount: Decimal,
    /// Blocks contributing to this sector
    pub transaction_count: u64,
    /// Share of all tax collected, in percent
    pub percentage: Decimal,
}

/// Aggregates over the whole chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    /// Blocks in the chain
    pub total_invoices: u64,
    /// Sum of tax amounts
    pub total_tax_collected: Decimal,
    /// Sum of total amounts
    pub total_amount_processed: Decimal,
    /// Mean total amount, zero for an empty chain
    pub average_invoice_amount: Decimal,
    /// Per-sector totals, in first-seen order
    pub sectors: Vec<SectorTotal>,
    /// Newest blocks first
    pub recent_blocks: Vec<Block>,
}

impl ChainStats {
    /// Compute statistics over `blocks` (ascending sequence order)
    pub fn from_blocks(blocks: &[Block], recent_limit: usize) -> Self {
        let mut total_tax_collected = Decimal::ZERO;
        let mut total_amount_processed = Decimal::ZERO;
        let mut sectors: Vec<SectorTotal> = Vec::new();

        for block in blocks {
            total_tax_collected += block.payload.tax_amount;
            total_amount_processed += block.payload.total_amount;

            for entry in block.distribution.iter().filter(|e| e.is_sector_total()) {
                match sectors.iter_mut().find(|s| s.sector == entry.sector) {
                    Some(total) => {
                        total.total_amount += entry.amount;
                        total.transaction_count += 1;
                    }
                    None => sectors.push(SectorTotal {
                        sector: entry.sector.clone(),
                        total_amount: entry.amount,
                        transaction_count: 1,
                        percentage: Decimal::ZERO,
                    }),
                }
            }
        }

        if !total_tax_collected.is_zero() {
            for total in &mut sectors {
                total.percentage =
                    round_currency(total.total_amount * Decimal::ONE_HUNDRED / total_tax_collected);
            }
        }

        let total_invoices = blocks.len() as u64;
        let average_invoice_amount = if total_invoices == 0 {
            Decimal::ZERO
        } else {
            round_currency(total_amount_processed / Decimal::from(total_invoices))
        };

        let recent_blocks = blocks.iter().rev().take(recent_limit).cloned().collect();

        Self {
            total_invoices,
            total_tax_collected,
            total_amount_processed,
            average_invoice_amount,
            sectors,
            recent_blocks,
        }
    }

    /// Totals for one sector
    pub fn sector(&self, name: &str) -> Option<&SectorTotal> {
        self.sectors.iter().find(|s| s.sector == name)
    }
}
