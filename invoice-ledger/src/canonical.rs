//! Canonical serialization for block hashing
//!
//! Ensures a deterministic byte representation of a block before it is
//! hashed. Uses a fixed field order, length-prefixed strings and fixed-scale
//! decimals. JSON is never used: key ordering and float formatting would make
//! the digest depend on the serializer.
//!
//! Field order:
//!
//! ```text
//! invoice_number | company_name | company_nit | subtotal | tax_amount |
//! total_amount | created_at | previous_digest | author_id
//! ```

use crate::{
    types::{AuthorId, Digest, InvoicePayload, CURRENCY_SCALE},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest as _, Sha256};

/// Canonical serializer
#[derive(Debug, Default)]
pub struct CanonicalSerializer {
    buffer: Vec<u8>,
}

impl CanonicalSerializer {
    /// Create new serializer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write string (u32 big-endian byte length, then UTF-8 bytes verbatim)
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Encoding(format!("string of {} bytes too long", bytes.len())))?;
        self.write_bytes(&len.to_be_bytes());
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write i64 (big-endian)
    pub fn write_i64(&mut self, n: i64) {
        self.write_bytes(&n.to_be_bytes());
    }

    /// Write a currency amount as a decimal string with exactly two places
    ///
    /// Amounts that would lose precision at that scale are rejected.
    pub fn write_amount(&mut self, field: &str, amount: &Decimal) -> Result<()> {
        let mut scaled = amount.round_dp(CURRENCY_SCALE);
        if scaled != *amount {
            return Err(Error::Encoding(format!(
                "{} = {} is not representable with {} decimal places",
                field, amount, CURRENCY_SCALE
            )));
        }
        scaled.rescale(CURRENCY_SCALE);
        self.write_string(&scaled.to_string())
    }

    /// Write a timestamp as nanoseconds since the Unix epoch
    pub fn write_timestamp(&mut self, field: &str, ts: &DateTime<Utc>) -> Result<()> {
        let nanos = ts.timestamp_nanos_opt().ok_or_else(|| {
            Error::Encoding(format!("{} = {} is outside the nanosecond range", field, ts))
        })?;
        self.write_i64(nanos);
        Ok(())
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }

    /// Compute SHA-256 over the buffered bytes
    pub fn hash(self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.buffer);
        hasher.finalize().into()
    }
}

/// Block fields covered by the digest, apart from the previous digest
#[derive(Debug, Clone, Copy)]
pub struct CanonicalFields<'a> {
    /// Invoice fields
    pub payload: &'a InvoicePayload,
    /// Hash-time timestamp
    pub created_at: &'a DateTime<Utc>,
    /// Owning user
    pub author_id: &'a AuthorId,
}

impl CanonicalFields<'_> {
    fn write_canonical(&self, ser: &mut CanonicalSerializer, previous_digest: &Digest) -> Result<()> {
        let p = self.payload;
        ser.write_string(&p.invoice_number)?;
        ser.write_string(&p.company_name)?;
        ser.write_string(&p.company_nit)?;
        ser.write_amount("subtotal", &p.subtotal)?;
        ser.write_amount("tax_amount", &p.tax_amount)?;
        ser.write_amount("total_amount", &p.total_amount)?;
        ser.write_timestamp("created_at", self.created_at)?;
        ser.write_string(previous_digest.as_str())?;
        ser.write_string(self.author_id.as_str())?;
        Ok(())
    }
}

/// Canonical bytes for a block
pub fn canonical_bytes(fields: &CanonicalFields<'_>, previous_digest: &Digest) -> Result<Vec<u8>> {
    let mut ser = CanonicalSerializer::new();
    fields.write_canonical(&mut ser, previous_digest)?;
    Ok(ser.finalize())
}

/// Block Hasher: SHA-256 over the canonical bytes, as lowercase hex
pub fn compute_digest(fields: &CanonicalFields<'_>, previous_digest: &Digest) -> Result<Digest> {
    let mut ser = CanonicalSerializer::new();
    fields.write_canonical(&mut ser, previous_digest)?;
    Ok(Digest::from_bytes(ser.hash()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload() -> InvoicePayload {
        InvoicePayload {
            invoice_number: "INV-1".to_string(),
            company_name: "Acme SAS".to_string(),
            company_nit: "900123456".to_string(),
            subtotal: Decimal::new(100000, 2),
            tax_amount: Decimal::new(19000, 2),
            total_amount: Decimal::new(119000, 2),
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let payload = payload();
        let created_at = ts();
        let author = AuthorId::new("42");
        let fields = CanonicalFields {
            payload: &payload,
            created_at: &created_at,
            author_id: &author,
        };

        let a = compute_digest(&fields, &Digest::genesis()).unwrap();
        let b = compute_digest(&fields, &Digest::genesis()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_amount_scale_does_not_change_digest() {
        let created_at = ts();
        let author = AuthorId::new("42");

        let p1 = payload();
        let mut p2 = payload();
        p2.subtotal = Decimal::new(1000, 0); // 1000 vs 1000.00

        let d1 = compute_digest(
            &CanonicalFields { payload: &p1, created_at: &created_at, author_id: &author },
            &Digest::genesis(),
        )
        .unwrap();
        let d2 = compute_digest(
            &CanonicalFields { payload: &p2, created_at: &created_at, author_id: &author },
            &Digest::genesis(),
        )
        .unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_previous_digest_changes_digest() {
        let payload = payload();
        let created_at = ts();
        let author = AuthorId::new("42");
        let fields = CanonicalFields {
            payload: &payload,
            created_at: &created_at,
            author_id: &author,
        };

        let a = compute_digest(&fields, &Digest::genesis()).unwrap();
        let b = compute_digest(&fields, &a).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_length_prefix_prevents_field_shifting() {
        let created_at = ts();
        let author = AuthorId::new("42");

        let mut p1 = payload();
        p1.invoice_number = "INV-1A".to_string();
        p1.company_name = "cme SAS".to_string();
        let mut p2 = payload();
        p2.invoice_number = "INV-1".to_string();
        p2.company_name = "Acme SAS".to_string();

        let b1 = canonical_bytes(
            &CanonicalFields { payload: &p1, created_at: &created_at, author_id: &author },
            &Digest::genesis(),
        )
        .unwrap();
        let b2 = canonical_bytes(
            &CanonicalFields { payload: &p2, created_at: &created_at, author_id: &author },
            &Digest::genesis(),
        )
        .unwrap();
        assert_ne!(b1, b2);
    }

    #[test]
    fn test_sub_cent_amount_is_encoding_error() {
        let created_at = ts();
        let author = AuthorId::new("42");
        let mut p = payload();
        p.tax_amount = Decimal::new(190005, 3);

        let err = compute_digest(
            &CanonicalFields { payload: &p, created_at: &created_at, author_id: &author },
            &Digest::genesis(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn test_out_of_range_timestamp_is_encoding_error() {
        let created_at = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
        let author = AuthorId::new("42");
        let p = payload();

        let err = compute_digest(
            &CanonicalFields { payload: &p, created_at: &created_at, author_id: &author },
            &Digest::genesis(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn test_amount_encoding_layout() {
        let mut ser = CanonicalSerializer::new();
        ser.write_amount("subtotal", &Decimal::new(5, 0)).unwrap();
        let bytes = ser.finalize();
        assert_eq!(&bytes[..4], &4u32.to_be_bytes());
        assert_eq!(&bytes[4..], b"5.00");
    }
}
