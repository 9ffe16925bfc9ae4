//! Types and narrow collaborator traits consumed from the ledger and the
//! off-chain storage service.
//!
//! The search core never owns a ledger; it is handed an
//! `Arc<dyn LedgerSource>` capability at construction and calls through it. Same for off-chain storage.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Content-addressed block identifier (the block's hex hash).
pub type BlockId = String;

/// Reference to an encrypted file stored off-chain.
#[derive(Debug, Clone)]
pub struct OffChainRef {
    /// Path/key identifying the file within the storage service.
    pub file_path: String,
    /// MIME content type of the decrypted file.
    pub content_type: String,
    /// Size, in bytes, of the decrypted file.
    pub file_size: u64,
}

/// A ledger block, as consumed read-only by the search core.
#[derive(Debug, Clone)]
pub struct Block {
    /// Monotonic block number.
    pub block_number: u64,
    /// Content-addressed hash of the block (hex string).
    pub hash: String,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
    /// Whether `payload_bytes` is AES-256-GCM encrypted (see `wire`).
    pub is_encrypted: bool,
    /// Opaque payload bytes; plaintext UTF-8 when `!is_encrypted`.
    pub payload_bytes: Vec<u8>,
    /// Five-field pipe-delimited wire string, present only
    /// when `is_encrypted`.
    pub encryption_metadata: Option<String>,
    /// User-supplied keywords, plaintext or encrypted depending on
    /// `is_encrypted`; opaque to this type, interpreted by
    /// `MetadataLayerManager`.
    pub manual_keywords: Option<Vec<String>>,
    /// Free-form content category string.
    pub content_category: String,
    /// Optional reference to an associated off-chain file.
    pub off_chain_ref: Option<OffChainRef>,
}

/// Read-only operations the search core consumes from the ledger.
pub trait LedgerSource: Send + Sync {
    /// Total number of blocks currently on the ledger.
    fn get_block_count(&self) -> u64;

    /// Page through all blocks, in storage order.
    fn get_blocks_paginated(&self, offset: u64, limit: u64) -> Vec<Block>;

    /// Most recent encrypted blocks, ordered by `block_number` descending.
    fn get_encrypted_blocks_paginated_desc(&self, offset: u64, limit: u64) -> Vec<Block>;

    /// Like the above, but lets the ledger filter out already-seen ids at
    /// the source.
    fn get_encrypted_blocks_excluding(
        &self,
        offset: u64,
        limit: u64,
        exclude_ids: &[BlockId],
    ) -> Vec<Block>;

    /// Decrypt a block's payload with the given password. Fails silently
    /// (returns `None`) on a wrong password or corrupted data.
    fn get_decrypted_block_data(&self, block_number: u64, password: &str) -> Option<String>;
}

/// Off-chain file storage operations the search core consumes.
pub trait OffChainStorage: Send + Sync {
    /// Whether the referenced file currently exists in storage.
    fn file_exists(&self, reference: &OffChainRef) -> bool;

    /// Retrieve and decrypt the file's bytes. `None` on any failure
    /// (missing file, wrong password, corrupted data).
    fn retrieve_data(&self, reference: &OffChainRef, password: &str) -> Option<Vec<u8>>;
}

/// Shared handle to a ledger capability.
pub type LedgerHandle = Arc<dyn LedgerSource>;

/// Shared handle to an off-chain storage capability.
pub type OffChainHandle = Arc<dyn OffChainStorage>;
