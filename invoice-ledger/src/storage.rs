//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `blocks` - Hash-linked blocks with their distribution (key: sequence_index, big-endian)
//! - `indices` - Unique and secondary indices
//!
//! # Index keys
//!
//! - `i` || invoice_number -> sequence_index (unique business key)
//! - `d` || digest -> sequence_index (unique digest)
//! - `a` || len(author) || author || sequence_index -> empty

use crate::{
    error::{Error, Result},
    types::{AuthorId, Block, Digest},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_BLOCKS: &str = "blocks";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_INVOICE: u8 = b'i';
const IDX_DIGEST: u8 = b'd';
const IDX_AUTHOR: u8 = b'a';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_blocks()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB block store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_blocks() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Uniqueness checks are point lookups
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Persistence(format!("Column family {} not found", name)))
    }

    // Block writes

    /// Append a block with its indices in one atomic write
    ///
    /// Fails without writing anything if the invoice number or the digest is
    /// already indexed. Callers must serialize appends (see `actor`).
    pub fn append_block(&self, block: &Block) -> Result<()> {
        if self.invoice_index(&block.payload.invoice_number)?.is_some() {
            return Err(Error::DuplicateInvoice(block.payload.invoice_number.clone()));
        }
        if self.digest_index(&block.digest)?.is_some() {
            return Err(Error::Persistence(format!(
                "Digest {} already stored",
                block.digest
            )));
        }
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        if self.db.get_cf(&cf_blocks, block.sequence_index.to_be_bytes())?.is_some() {
            return Err(Error::Persistence(format!(
                "Sequence index {} already stored",
                block.sequence_index
            )));
        }

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let index_value = block.sequence_index.to_be_bytes();

        let mut batch = WriteBatch::default();

        // 1. Block (with distribution rows)
        let value = bincode::serialize(block)?;
        batch.put_cf(&cf_blocks, block.sequence_index.to_be_bytes(), &value);

        // 2. Indices
        batch.put_cf(
            &cf_indices,
            Self::index_key_invoice(&block.payload.invoice_number),
            index_value,
        );
        batch.put_cf(&cf_indices, Self::index_key_digest(&block.digest), index_value);
        batch.put_cf(
            &cf_indices,
            Self::index_key_author(&block.author_id, Some(block.sequence_index))?,
            b"",
        );

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            sequence_index = block.sequence_index,
            digest = %block.digest,
            "Block committed"
        );

        Ok(())
    }

    /// Rewrite a stored block in place, bypassing every check and index
    #[cfg(test)]
    pub(crate) fn overwrite_block_unchecked(&self, block: &Block) -> Result<()> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db
            .put_cf(&cf, block.sequence_index.to_be_bytes(), bincode::serialize(block)?)?;
        Ok(())
    }

    // Block reads

    /// Get block by sequence index
    pub fn get_block(&self, sequence_index: u64) -> Result<Block> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        let value = self
            .db
            .get_cf(&cf, sequence_index.to_be_bytes())?
            .ok_or(Error::BlockNotFound(sequence_index))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Get the chain tail (highest sequence index)
    pub fn get_latest_block(&self) -> Result<Option<Block>> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        match self.db.iterator_cf(&cf, IteratorMode::End).next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(bincode::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Scan all blocks in ascending sequence order
    pub fn scan_blocks(&self) -> Result<Vec<Block>> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        let mut blocks = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            blocks.push(bincode::deserialize(&value)?);
        }

        Ok(blocks)
    }

    /// Newest blocks first, at most `limit`
    pub fn recent_blocks(&self, limit: usize) -> Result<Vec<Block>> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        let mut blocks = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(&cf, IteratorMode::End).take(limit) {
            let (_, value) = item?;
            blocks.push(bincode::deserialize(&value)?);
        }

        Ok(blocks)
    }

    /// Blocks submitted by one author, ascending
    pub fn blocks_by_author(&self, author: &AuthorId) -> Result<Vec<Block>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_author(author, None)?;

        let mut blocks = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_indices, IteratorMode::From(prefix.as_slice(), Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let index = Self::decode_index(&key[prefix.len()..])?;
            blocks.push(self.get_block(index)?);
        }

        Ok(blocks)
    }

    /// Sequence index of the block holding `invoice_number`
    pub fn invoice_index(&self, invoice_number: &str) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_INDICES)?;
        self.db
            .get_cf(&cf, Self::index_key_invoice(invoice_number))?
            .map(|v| Self::decode_index(&v))
            .transpose()
    }

    /// Sequence index of the block carrying `digest`
    pub fn digest_index(&self, digest: &Digest) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_INDICES)?;
        self.db
            .get_cf(&cf, Self::index_key_digest(digest))?
            .map(|v| Self::decode_index(&v))
            .transpose()
    }

    // Index key helpers

    fn index_key_invoice(invoice_number: &str) -> Vec<u8> {
        let mut key = vec![IDX_INVOICE];
        key.extend_from_slice(invoice_number.as_bytes());
        key
    }

    fn index_key_digest(digest: &Digest) -> Vec<u8> {
        let mut key = vec![IDX_DIGEST];
        key.extend_from_slice(digest.as_str().as_bytes());
        key
    }

    fn index_key_author(author: &AuthorId, sequence_index: Option<u64>) -> Result<Vec<u8>> {
        let bytes = author.as_str().as_bytes();
        let mut key = vec![IDX_AUTHOR];
        // Length prefix keeps one author's keys from prefixing another's
        key.extend_from_slice(&Self::length_prefix(bytes.len())?);
        key.extend_from_slice(bytes);
        if let Some(index) = sequence_index {
            key.extend_from_slice(&index.to_be_bytes());
        }
        Ok(key)
    }

    fn length_prefix(len: usize) -> Result<[u8; 4]> {
        u32::try_from(len)
            .map(u32::to_be_bytes)
            .map_err(|_| Error::Persistence(format!("Index key component of {} bytes is too long", len)))
    }

    fn decode_index(bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Persistence(format!("Malformed index value of {} bytes", bytes.len())))?;
        Ok(u64::from_be_bytes(raw))
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;

        let total_blocks = self
            .db
            .property_int_value_cf(&cf_blocks, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        let next_sequence_index = self
            .get_latest_block()?
            .map(|b| b.sequence_index + 1)
            .unwrap_or(0);

        Ok(StorageStats {
            total_blocks,
            next_sequence_index,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of stored blocks
    pub total_blocks: u64,
    /// Index the next appended block will receive
    pub next_sequence_index: u64,
}
