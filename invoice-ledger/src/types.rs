//! Core types for the invoice chain
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use crate::{
    canonical::{self, CanonicalFields},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places carried by every currency amount
pub const CURRENCY_SCALE: u32 = 2;

/// Previous digest recorded by the genesis block (64 zero characters)
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Invoice number length bounds (characters, after trimming)
pub const INVOICE_NUMBER_LEN: (usize, usize) = (1, 100);

/// Company name length bounds (characters, after trimming)
pub const COMPANY_NAME_LEN: (usize, usize) = (2, 200);

/// Company tax ID (NIT) length bounds (characters, after trimming)
pub const COMPANY_NIT_LEN: (usize, usize) = (5, 50);

/// Round a currency amount to cents, half away from zero
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Authenticated author identifier, supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorId(String);

impl AuthorId {
    /// Create new author ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 digest rendered as 64 lowercase hex characters
///
/// Values read back from storage are taken verbatim so that a corrupted digest
/// reaches the verifier as a mismatch; use [`Digest::parse`] for external input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// The genesis constant
    pub fn genesis() -> Self {
        Self(GENESIS_DIGEST.to_string())
    }

    /// Hex-encode raw hash output
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parse a hex digest, rejecting anything but 64 lowercase hex characters
    pub fn parse(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != DIGEST_HEX_LEN {
            return Err(Error::Validation(format!(
                "Digest must be {} hex characters, got {}",
                DIGEST_HEX_LEN,
                hex.len()
            )));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(Error::Validation(
                "Digest must be lowercase hexadecimal".to_string(),
            ));
        }
        Ok(Self(hex))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the genesis constant
    pub fn is_genesis(&self) -> bool {
        self.0 == GENESIS_DIGEST
    }
}

impl From<String> for Digest {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoice as submitted by a client, before tax is computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    /// Business key, unique across the chain
    pub invoice_number: String,

    /// Issuing company
    pub company_name: String,

    /// Issuing company tax ID (NIT)
    pub company_nit: String,

    /// Amount before tax
    pub subtotal: Decimal,
}

impl NewInvoice {
    /// Create new invoice submission
    pub fn new(
        invoice_number: impl Into<String>,
        company_name: impl Into<String>,
        company_nit: impl Into<String>,
        subtotal: Decimal,
    ) -> Self {
        Self {
            invoice_number: invoice_number.into(),
            company_name: company_name.into(),
            company_nit: company_nit.into(),
            subtotal,
        }
    }

    /// Check field lengths and the subtotal
    pub fn validate(&self) -> Result<()> {
        check_len("invoice_number", &self.invoice_number, INVOICE_NUMBER_LEN)?;
        check_len("company_name", &self.company_name, COMPANY_NAME_LEN)?;
        check_len("company_nit", &self.company_nit, COMPANY_NIT_LEN)?;

        if self.subtotal.is_sign_negative() && !self.subtotal.is_zero() {
            return Err(Error::Validation(
                "subtotal must not be negative".to_string(),
            ));
        }
        if self.subtotal.round_dp(CURRENCY_SCALE) != self.subtotal {
            return Err(Error::Validation(format!(
                "subtotal carries more than {} decimal places",
                CURRENCY_SCALE
            )));
        }

        Ok(())
    }

    /// Validate, trim and price the invoice at the given tax rate
    pub fn into_payload(self, tax_rate: Decimal) -> Result<InvoicePayload> {
        self.validate()?;

        let subtotal = self.subtotal;
        let tax_amount = compute_tax(subtotal, tax_rate)?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .ok_or_else(|| Error::Validation("total amount out of range".to_string()))?;

        Ok(InvoicePayload {
            invoice_number: self.invoice_number.trim().to_string(),
            company_name: self.company_name.trim().to_string(),
            company_nit: self.company_nit.trim().to_string(),
            subtotal,
            tax_amount,
            total_amount,
        })
    }
}

fn check_len(field: &str, value: &str, (min, max): (usize, usize)) -> Result<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(Error::Validation(format!(
            "{} must be between {} and {} characters, got {}",
            field, min, max, len
        )));
    }
    Ok(())
}

/// Tax owed on a subtotal, rounded to cents
pub fn compute_tax(subtotal: Decimal, rate: Decimal) -> Result<Decimal> {
    subtotal
        .checked_mul(rate)
        .map(round_currency)
        .ok_or_else(|| Error::Validation("tax amount out of range".to_string()))
}

/// Canonical invoice fields covered by the block digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayload {
    /// Business key, unique across the chain
    pub invoice_number: String,

    /// Issuing company
    pub company_name: String,

    /// Issuing company tax ID (NIT)
    pub company_nit: String,

    /// Amount before tax
    pub subtotal: Decimal,

    /// Tax computed from the subtotal
    pub tax_amount: Decimal,

    /// Subtotal plus tax
    pub total_amount: Decimal,
}

/// One hash-linked invoice record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, 0 for genesis
    pub sequence_index: u64,

    /// Hashed invoice fields
    pub payload: InvoicePayload,

    /// Submitting user
    pub author_id: AuthorId,

    /// Stamped before hashing, never changed afterwards
    pub created_at: DateTime<Utc>,

    /// Digest of the preceding block, or the genesis constant
    pub previous_digest: Digest,

    /// Digest over payload, created_at, previous_digest and author_id
    pub digest: Digest,

    /// Tax distribution breakdown (not covered by the digest)
    pub distribution: Vec<DistributionEntry>,
}

impl Block {
    /// Fields fed to the hasher, borrowed from this block
    pub fn canonical_fields(&self) -> CanonicalFields<'_> {
        CanonicalFields {
            payload: &self.payload,
            created_at: &self.created_at,
            author_id: &self.author_id,
        }
    }

    /// Recompute the digest from the stored fields
    pub fn compute_digest(&self) -> Result<Digest> {
        canonical::compute_digest(&self.canonical_fields(), &self.previous_digest)
    }

    /// First block of the chain
    pub fn is_genesis(&self) -> bool {
        self.sequence_index == 0
    }
}

/// One row of a tax distribution
///
/// Sector rows carry no subsector fields; subsector rows repeat the sector's
/// percentage and amount next to their own share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEntry {
    /// Sector name
    pub sector: String,

    /// Share of the total tax
    pub percentage: Decimal,

    /// Sector amount
    pub amount: Decimal,

    /// Subsector name
    pub subsector: Option<String>,

    /// Share of the sector amount
    pub subsector_percentage: Option<Decimal>,

    /// Subsector amount
    pub subsector_amount: Option<Decimal>,
}

impl DistributionEntry {
    /// Sector-level row (as opposed to a subsector breakdown row)
    pub fn is_sector_total(&self) -> bool {
        self.subsector.is_none()
    }
}
