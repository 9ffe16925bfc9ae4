//! Fake ledger and off-chain storage collaborators shared by the
//! integration scenario tests.

use ledger_search_core::{Block, BlockId, LedgerSource, OffChainRef, OffChainStorage};
use std::collections::HashMap;
use std::sync::{Mutex, Once};

static TRACING_INIT: Once = Once::new();

/// Install a test-writer `tracing` subscriber once per process, so
/// strategy-fallback and decryption-failure events show up under
/// `cargo test -- --nocapture` instead of going nowhere.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").init();
    });
}

pub struct FakeLedger {
    blocks: Vec<Block>,
    password: String,
}

impl FakeLedger {
    pub fn new(blocks: Vec<Block>, password: impl Into<String>) -> Self {
        Self {
            blocks,
            password: password.into(),
        }
    }
}

impl LedgerSource for FakeLedger {
    fn get_block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn get_blocks_paginated(&self, offset: u64, limit: u64) -> Vec<Block> {
        self.blocks.iter().skip(offset as usize).take(limit as usize).cloned().collect()
    }

    fn get_encrypted_blocks_paginated_desc(&self, offset: u64, limit: u64) -> Vec<Block> {
        let mut sorted: Vec<Block> = self.blocks.iter().filter(|b| b.is_encrypted).cloned().collect();
        sorted.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        sorted.into_iter().skip(offset as usize).take(limit as usize).collect()
    }

    fn get_encrypted_blocks_excluding(&self, offset: u64, limit: u64, exclude_ids: &[BlockId]) -> Vec<Block> {
        let excluded: std::collections::HashSet<&BlockId> = exclude_ids.iter().collect();
        let mut sorted: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| b.is_encrypted && !excluded.contains(&b.hash))
            .cloned()
            .collect();
        sorted.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        sorted.into_iter().skip(offset as usize).take(limit as usize).collect()
    }

    fn get_decrypted_block_data(&self, block_number: u64, password: &str) -> Option<String> {
        if password != self.password {
            return None;
        }
        self.blocks
            .iter()
            .find(|b| b.block_number == block_number)
            .map(|b| String::from_utf8_lossy(&b.payload_bytes).to_string())
    }
}

pub struct FakeOffChainStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    password: String,
}

impl FakeOffChainStorage {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            password: password.into(),
        }
    }

    pub fn put(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path.into(), bytes);
    }
}

impl OffChainStorage for FakeOffChainStorage {
    fn file_exists(&self, reference: &OffChainRef) -> bool {
        self.files.lock().unwrap().contains_key(&reference.file_path)
    }

    fn retrieve_data(&self, reference: &OffChainRef, password: &str) -> Option<Vec<u8>> {
        if password != self.password {
            return None;
        }
        self.files.lock().unwrap().get(&reference.file_path).cloned()
    }
}
